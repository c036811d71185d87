use serde::Deserialize;
use serde::Serialize;

/// Backing key/value server connection settings.
///
/// Production deployments talk to the server over its domain socket; test
/// setups flip `use_local_tcp` to reach a locally started instance instead.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StoreConfig {
    /// Connect over local TCP instead of the domain socket
    pub use_local_tcp: bool,
    /// Domain socket path of the key/value server
    pub unix_socket_path: String,
    /// Local TCP address of the key/value server
    pub tcp_address: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            use_local_tcp: false,
            unix_socket_path: "/var/run/redis/redis.sock".to_string(),
            tcp_address: "127.0.0.1:6379".to_string(),
        }
    }
}

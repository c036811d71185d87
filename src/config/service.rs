use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Client authentication modes accepted by the frontend.
pub const AUTH_MODES: [&str; 3] = ["none", "cert", "password"];

/// RPC listener and client authentication settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServiceConfig {
    /// Address the gNMI server binds, e.g. `0.0.0.0:8080`
    pub listen_address: String,
    /// Enabled client authentication modes, any of `none`, `cert`, `password`
    pub client_auth: Vec<String>,
    /// Directory for the service log file; empty logs to stderr only
    pub log_dir: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0:8080".to_string(),
            client_auth: vec!["password".to_string()],
            log_dir: String::new(),
        }
    }
}

impl ServiceConfig {
    pub fn validate(&self) -> Result<()> {
        self.listen_address
            .parse::<std::net::SocketAddr>()
            .map_err(|e| {
                ConfigError::Message(format!(
                    "invalid listen_address {}: {}",
                    self.listen_address, e
                ))
            })?;

        for mode in &self.client_auth {
            if !AUTH_MODES.contains(&mode.as_str()) {
                return Err(ConfigError::Message(format!(
                    "invalid client_auth mode {mode}, expected one of {AUTH_MODES:?}"
                ))
                .into());
            }
        }
        Ok(())
    }
}

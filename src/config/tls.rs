use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// TLS material locations for the RPC listener.
///
/// `insecure` serves plaintext and is meant for test setups only; the server
/// refuses to start without certificates otherwise.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct TlsConfig {
    /// Skip TLS entirely, for testing only
    pub insecure: bool,
    /// Server certificate path (PEM)
    pub server_certificate_path: String,
    /// Server private key path (PEM)
    pub server_private_key_path: String,
    /// CA certificate for client certificate validation; enables mTLS when set
    pub client_ca_certificate_path: String,
}

impl TlsConfig {
    pub fn validate(&self) -> Result<()> {
        if self.insecure {
            return Ok(());
        }
        if self.server_certificate_path.is_empty() {
            return Err(
                ConfigError::Message("server_certificate_path must be set".to_string()).into(),
            );
        }
        if self.server_private_key_path.is_empty() {
            return Err(
                ConfigError::Message("server_private_key_path must be set".to_string()).into(),
            );
        }
        Ok(())
    }
}

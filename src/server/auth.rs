use std::collections::HashSet;

use tonic::Request;
use tonic::Status;
use tracing::debug;

/// Client authentication policy, enforced before any resolution begins.
///
/// The modes mirror the CLI surface: `none` admits everyone, `password`
/// requires username/password metadata, `cert` requires a verified peer
/// certificate on the connection. A client passes if any enabled mode
/// accepts it.
#[derive(Debug, Clone, Default)]
pub struct AuthPolicy {
    modes: HashSet<String>,
}

impl AuthPolicy {
    pub fn from_modes<S: AsRef<str>>(modes: impl IntoIterator<Item = S>) -> Self {
        Self {
            modes: modes
                .into_iter()
                .map(|m| m.as_ref().to_string())
                .collect(),
        }
    }

    /// A policy admitting everyone, for tests and the insecure toggle.
    pub fn open() -> Self {
        Self::from_modes(["none"])
    }

    pub fn authenticate<T>(&self, request: &Request<T>) -> Result<(), Status> {
        if self.modes.is_empty() || self.modes.contains("none") {
            return Ok(());
        }

        if self.modes.contains("password") {
            let meta = request.metadata();
            let user = meta.get("username").and_then(|v| v.to_str().ok());
            let pass = meta.get("password").and_then(|v| v.to_str().ok());
            if let (Some(user), Some(pass)) = (user, pass) {
                if !user.is_empty() && !pass.is_empty() {
                    debug!("authenticated {user} via password metadata");
                    return Ok(());
                }
            }
        }

        if self.modes.contains("cert") {
            if let Some(certs) = request.peer_certs() {
                if !certs.is_empty() {
                    debug!("authenticated via client certificate");
                    return Ok(());
                }
            }
        }

        Err(Status::permission_denied(
            "client failed every enabled authentication mode",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::AuthPolicy;

    #[test]
    fn test_none_admits_everyone() {
        let policy = AuthPolicy::open();
        let request = tonic::Request::new(());
        assert!(policy.authenticate(&request).is_ok());
    }

    #[test]
    fn test_password_requires_metadata() {
        let policy = AuthPolicy::from_modes(["password"]);

        let request = tonic::Request::new(());
        assert!(policy.authenticate(&request).is_err());

        let mut request = tonic::Request::new(());
        request
            .metadata_mut()
            .insert("username", "admin".parse().unwrap());
        request
            .metadata_mut()
            .insert("password", "sonic".parse().unwrap());
        assert!(policy.authenticate(&request).is_ok());
    }

    #[test]
    fn test_cert_without_connection_certs_denied() {
        let policy = AuthPolicy::from_modes(["cert"]);
        let request = tonic::Request::new(());
        assert!(policy.authenticate(&request).is_err());
    }
}

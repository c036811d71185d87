use std::io::Write;

use tempfile::NamedTempFile;

use super::TelemetryConfig;

#[test]
fn test_defaults_validate() {
    let cfg = TelemetryConfig {
        tls: super::TlsConfig {
            insecure: true,
            ..Default::default()
        },
        ..Default::default()
    };
    let cfg = cfg.validate().expect("default config should validate");
    assert_eq!(cfg.service.listen_address, "0.0.0.0:8080");
    assert_eq!(cfg.store.unix_socket_path, "/var/run/redis/redis.sock");
    assert_eq!(cfg.engine.field_poll_interval_ms, 200);
}

#[test]
fn test_tls_requires_material() {
    let cfg = TelemetryConfig::default();
    assert!(cfg.validate().is_err());
}

#[test]
fn test_invalid_listen_address_rejected() {
    let cfg = TelemetryConfig {
        service: super::ServiceConfig {
            listen_address: "not-an-address".to_string(),
            ..Default::default()
        },
        tls: super::TlsConfig {
            insecure: true,
            ..Default::default()
        },
        ..Default::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_invalid_auth_mode_rejected() {
    let cfg = TelemetryConfig {
        service: super::ServiceConfig {
            client_auth: vec!["token".to_string()],
            ..Default::default()
        },
        tls: super::TlsConfig {
            insecure: true,
            ..Default::default()
        },
        ..Default::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_file_override() {
    let mut file = NamedTempFile::with_suffix(".toml").expect("create temp config");
    writeln!(
        file,
        r#"
[service]
listen_address = "127.0.0.1:9339"

[engine]
queue_capacity = 16
"#
    )
    .expect("write temp config");

    let cfg = TelemetryConfig::default()
        .with_override_config(file.path().to_str().unwrap())
        .expect("override should load");
    assert_eq!(cfg.service.listen_address, "127.0.0.1:9339");
    assert_eq!(cfg.engine.queue_capacity, 16);
    // untouched sections keep their defaults
    assert_eq!(cfg.engine.table_batch_interval_ms, 100);
}

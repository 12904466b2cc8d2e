use std::fs;
use tempfile::TempDir;
use zerg_common::config::SystemConfig;

fn base_config() -> &'static str {
    r#"
    [server]
    bind_addr = "0.0.0.0"
    port = 8080

    [database]
    url = "postgresql://localhost/zerg_test"
    max_connections = 5

    [scheduler]
    poll_interval_secs = 15

    [websocket]
    jwt_secret = "test-secret"
    client_queue_depth = 64

    [trigger]
    timestamp_tolerance_secs = 120
    "#
}

#[test]
fn loads_full_config_from_toml() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, base_config()).unwrap();

    let config = SystemConfig::load(path.to_str().unwrap()).unwrap();

    assert_eq!(config.server.port, 8080);
    assert_eq!(config.database.max_connections, 5);
    assert_eq!(config.scheduler.poll_interval_secs, 15);
    assert_eq!(config.websocket.client_queue_depth, 64);
    assert_eq!(config.trigger.timestamp_tolerance_secs, 120);
}

#[test]
fn env_override_replaces_jwt_secret_and_port() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, base_config()).unwrap();

    std::env::set_var("ZERG_JWT_SECRET", "overridden-secret");
    std::env::set_var("ZERG_PORT", "9999");
    let config = SystemConfig::load(path.to_str().unwrap()).unwrap();
    std::env::remove_var("ZERG_JWT_SECRET");
    std::env::remove_var("ZERG_PORT");

    assert_eq!(config.websocket.jwt_secret, "overridden-secret");
    assert_eq!(config.server.port, 9999);
}

#[test]
fn missing_required_field_fails_to_parse() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
        [server]
        bind_addr = "0.0.0.0"
        port = 8080

        [scheduler]

        [websocket]
        jwt_secret = "test-secret"

        [trigger]
        "#,
    )
    .unwrap();

    let result = SystemConfig::load(path.to_str().unwrap());
    assert!(result.is_err());
}

//! System configuration (spec §8), loaded from a TOML file with environment
//! overrides for secrets, in the teacher's `SystemConfig::load` style.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
    pub websocket: WebsocketConfig,
    pub trigger: TriggerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Poll interval for due cron schedules, in seconds (spec §4.7).
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

fn default_poll_interval_secs() -> u64 {
    30
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebsocketConfig {
    /// Secret for HS256 validation of the handshake JWT (spec §4.3, C3).
    pub jwt_secret: String,
    /// Max buffered outbound messages before FIFO eviction kicks in
    /// (spec §4.2).
    #[serde(default = "default_client_queue_depth")]
    pub client_queue_depth: usize,
}

fn default_client_queue_depth() -> usize {
    256
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Clock skew tolerance for the `X-Zerg-Timestamp` replay check
    /// (spec §4.8), in seconds.
    #[serde(default = "default_timestamp_tolerance_secs")]
    pub timestamp_tolerance_secs: i64,
}

fn default_timestamp_tolerance_secs() -> i64 {
    300
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            timestamp_tolerance_secs: default_timestamp_tolerance_secs(),
        }
    }
}

impl SystemConfig {
    /// Load from a TOML file, then apply `ZERG_*` environment overrides for
    /// values that shouldn't live in a checked-in config file.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: SystemConfig = toml::from_str(&content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("ZERG_DATABASE_URL") {
            self.database.url = url;
        }
        if let Ok(secret) = std::env::var("ZERG_JWT_SECRET") {
            self.websocket.jwt_secret = secret;
        }
        if let Ok(port) = std::env::var("ZERG_PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_fixture(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_minimal_config_with_defaults() {
        let file = write_fixture(
            r#"
            [server]
            bind_addr = "127.0.0.1"
            port = 9000

            [database]
            url = "postgres://localhost/zerg"

            [scheduler]

            [websocket]
            jwt_secret = "test-secret"

            [trigger]
            "#,
        );
        let config = SystemConfig::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.scheduler.poll_interval_secs, 30);
        assert_eq!(config.websocket.client_queue_depth, 256);
        assert_eq!(config.trigger.timestamp_tolerance_secs, 300);
    }

    #[test]
    fn env_override_replaces_database_url() {
        let file = write_fixture(
            r#"
            [server]
            bind_addr = "127.0.0.1"
            port = 9000

            [database]
            url = "postgres://localhost/zerg"

            [scheduler]

            [websocket]
            jwt_secret = "test-secret"

            [trigger]
            "#,
        );
        std::env::set_var("ZERG_DATABASE_URL", "postgres://override/zerg");
        let config = SystemConfig::load(file.path().to_str().unwrap()).unwrap();
        std::env::remove_var("ZERG_DATABASE_URL");
        assert_eq!(config.database.url, "postgres://override/zerg");
    }
}

use crate::event::code::DEFAULT_MAX_ATTEMPTS;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;

/// Complete eventhub configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

/// Entity store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file path (":memory:" for a throwaway store)
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "eventhub.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Event registry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EventsConfig {
    /// Candidates tried before code generation gives up
    #[serde(default = "default_code_max_attempts")]
    pub code_max_attempts: u32,
}

fn default_code_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            code_max_attempts: default_code_max_attempts(),
        }
    }
}

/// API configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiConfig {
    /// Require `?userId=<host>` on delete and attendee listing
    #[serde(default)]
    pub enforce_host_identity: bool,
}

impl AppConfig {
    /// Apply `EVENTHUB_*` environment overrides. Unparseable values are ignored.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("EVENTHUB_HOST") {
            self.server.host = v;
        }
        if let Some(v) = lookup("EVENTHUB_PORT") {
            if let Ok(port) = v.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Some(v) = lookup("EVENTHUB_DB_PATH") {
            self.database.path = v;
        }
        if let Some(v) = lookup("EVENTHUB_CODE_MAX_ATTEMPTS") {
            if let Ok(n) = v.parse::<u32>() {
                self.events.code_max_attempts = n;
            }
        }
        if let Some(v) = lookup("EVENTHUB_ENFORCE_HOST_IDENTITY") {
            if let Ok(b) = v.parse::<bool>() {
                self.api.enforce_host_identity = b;
            }
        }
    }
}

/// Load configuration from TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<AppConfig> {
    let contents = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&contents)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.path, "eventhub.db");
        assert_eq!(config.events.code_max_attempts, 32);
        assert!(!config.api.enforce_host_identity);
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [server]
            host = "127.0.0.1"
            port = 9000

            [database]
            path = "/var/lib/eventhub/events.db"

            [events]
            code_max_attempts = 100

            [api]
            enforce_host_identity = true
        "#;

        let config: AppConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.database.path, "/var/lib/eventhub/events.db");
        assert_eq!(config.events.code_max_attempts, 100);
        assert!(config.api.enforce_host_identity);
        assert_eq!(
            config.server.bind_addr().unwrap(),
            "127.0.0.1:9000".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn test_partial_config() {
        // Missing sections use defaults
        let toml = r#"
            [server]
            port = 3000
        "#;

        let config: AppConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.host, "0.0.0.0"); // Default
        assert_eq!(config.database.path, "eventhub.db"); // Default
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("EVENTHUB_PORT", "7000"),
            ("EVENTHUB_DB_PATH", ":memory:"),
            ("EVENTHUB_CODE_MAX_ATTEMPTS", "not-a-number"),
            ("EVENTHUB_ENFORCE_HOST_IDENTITY", "true"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.server.port, 7000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.database.path, ":memory:");
        assert_eq!(config.events.code_max_attempts, 32); // Invalid value ignored
        assert!(config.api.enforce_host_identity);
    }

    #[test]
    fn test_code_max_attempts_override() {
        let mut config = AppConfig::default();
        config.apply_overrides(|key| (key == "EVENTHUB_CODE_MAX_ATTEMPTS").then(|| "64".to_string()));

        assert_eq!(config.events.code_max_attempts, 64);
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[database]\npath = \"events.db\"").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.database.path, "events.db");
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_load_config_missing_file() {
        assert!(load_config("/nonexistent/eventhub.toml").is_err());
    }
}

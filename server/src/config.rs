//! Server configuration.
//!
//! Values come from defaults, an optional TOML file and command line
//! overrides, in that order.

use crate::error::{ServerError, ServerResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server_name: String,
    pub motd: String,
    pub server_ip: String,
    pub server_port: u16,
    pub max_players: usize,
    pub use_encryption: bool,
    pub allow_query: bool,
    pub debug_mode: bool,
    /// Ticks per second.
    pub tick_rate: u32,
    /// Ticks between announce data refreshes.
    pub announce_interval: u64,
    /// Chunk radius a session is interested in around its position.
    pub view_radius: i32,
    pub default_level: String,
    /// Root directory for persisted chunks; chunks stay in memory when unset.
    pub data_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_name: "Chunkwire Server".to_string(),
            motd: "A chunkwire server".to_string(),
            server_ip: "0.0.0.0".to_string(),
            server_port: 19132,
            max_players: 20,
            use_encryption: false,
            allow_query: true,
            debug_mode: false,
            tick_rate: 20,
            announce_interval: 20,
            view_radius: 4,
            default_level: "world".to_string(),
            data_dir: None,
        }
    }
}

impl ServerConfig {
    /// Reads a TOML file; missing keys keep their defaults.
    pub fn from_file(path: &Path) -> ServerResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> ServerResult<Self> {
        let config: ServerConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ServerResult<()> {
        if self.tick_rate == 0 {
            return Err(ServerError::Config("tick_rate must be positive".to_string()));
        }
        if self.announce_interval == 0 {
            return Err(ServerError::Config(
                "announce_interval must be positive".to_string(),
            ));
        }
        if self.max_players == 0 {
            return Err(ServerError::Config("max_players must be positive".to_string()));
        }
        if self.view_radius < 0 {
            return Err(ServerError::Config("view_radius must not be negative".to_string()));
        }
        Ok(())
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_rate.max(1)))
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_ip, self.server_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.announce_interval, 20);
        assert_eq!(config.bind_address(), "0.0.0.0:19132");
        assert_eq!(config.tick_duration(), Duration::from_millis(50));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ServerConfig::from_toml(
            r#"
            motd = "Hello"
            server_port = 19133
            use_encryption = true
            "#,
        )
        .unwrap();
        assert_eq!(config.motd, "Hello");
        assert_eq!(config.server_port, 19133);
        assert!(config.use_encryption);
        assert_eq!(config.max_players, 20);
        assert_eq!(config.default_level, "world");
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            ServerConfig::from_toml("tick_rate = 0"),
            Err(ServerError::Config(_))
        ));
        assert!(matches!(
            ServerConfig::from_toml("announce_interval = 0"),
            Err(ServerError::Config(_))
        ));
        assert!(matches!(
            ServerConfig::from_toml("server_port = \"abc\""),
            Err(ServerError::Config(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "server_name = \"Test\"\nmax_players = 4").unwrap();
        let config = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.server_name, "Test");
        assert_eq!(config.max_players, 4);

        let missing = ServerConfig::from_file(Path::new("/nonexistent/server.toml"));
        assert!(matches!(missing, Err(ServerError::Io(_))));
    }
}

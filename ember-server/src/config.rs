//! Runtime configuration, read once at startup. Changes require restart.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ember_session::StreamConfig;
use serde::{Deserialize, Serialize};

/// One announcement shown on the client's login screen.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Announcement {
    pub header: String,
    pub message: String,
}

/// The whole configuration surface. Every field has a default, so a
/// partial (or absent) file works.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address clients are told to reach us on; also what we bind.
    pub server_hostname: String,
    pub login_port: u16,
    pub auth_port: u16,
    pub game_port: u16,

    pub server_public_key: PathBuf,
    pub server_private_key: PathBuf,

    /// Login/Auth connections idle longer than this are dropped.
    pub client_timeout_secs: u64,
    /// Game sessions with no received packets longer than this are destroyed.
    pub session_idle_timeout_secs: u64,
    /// Unclaimed auth tokens are forgotten after this.
    pub auth_token_timeout_secs: u64,

    pub max_in_flight: usize,
    pub retransmit_interval_ms: u64,
    pub min_ack_resend_interval_ms: u64,
    pub heartbeat_interval_secs: u64,
    pub fragment_max_length: usize,
    pub min_compress_size: usize,

    pub blood_message_max_per_area: usize,
    pub bloodstain_max_per_area: usize,
    pub ghost_max_per_area: usize,
    pub sign_max_per_area: usize,
    /// How many stored artifacts to warm each area pool with at startup.
    pub prime_count_per_area: usize,

    pub database_trim_interval_secs: u64,
    pub announcements: Vec<Announcement>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_hostname: "127.0.0.1".into(),
            login_port: 50050,
            auth_port: 50000,
            game_port: 50010,
            server_public_key: "server_public.pem".into(),
            server_private_key: "server_private.pem".into(),
            client_timeout_secs: 10,
            session_idle_timeout_secs: 30,
            auth_token_timeout_secs: 30,
            max_in_flight: 10,
            retransmit_interval_ms: 500,
            min_ack_resend_interval_ms: 100,
            heartbeat_interval_secs: 10,
            fragment_max_length: ember_proto::fragment::MAX_FRAGMENT_LEN,
            min_compress_size: ember_proto::fragment::MIN_COMPRESS_SIZE,
            blood_message_max_per_area: 50,
            bloodstain_max_per_area: 50,
            ghost_max_per_area: 50,
            sign_max_per_area: 50,
            prime_count_per_area: 30,
            database_trim_interval_secs: 600,
            announcements: vec![Announcement {
                header: "Welcome".into(),
                message: "This server is an unofficial replacement service.".into(),
            }],
        }
    }
}

/// Errors loading the configuration file.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e)    => write!(f, "config file: {e}"),
            Self::Parse(e) => write!(f, "config file is not valid JSON: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl ServerConfig {
    /// Load from a JSON file; a missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };
        serde_json::from_str(&text).map_err(ConfigError::Parse)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs)
    }

    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session_idle_timeout_secs)
    }

    pub fn auth_token_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_token_timeout_secs)
    }

    pub fn database_trim_interval(&self) -> Duration {
        Duration::from_secs(self.database_trim_interval_secs)
    }

    /// The per-session reliable-stream tunables.
    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            max_in_flight: self.max_in_flight,
            retransmit_interval: Duration::from_millis(self.retransmit_interval_ms),
            min_ack_resend_interval: Duration::from_millis(self.min_ack_resend_interval_ms),
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs),
            fragment_max_len: self.fragment_max_length,
            min_compress_size: self.min_compress_size,
            ..StreamConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_json() {
        let config = ServerConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let back: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.game_port, config.game_port);
        assert_eq!(back.max_in_flight, config.max_in_flight);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let config: ServerConfig = serde_json::from_str(r#"{"game_port": 60000}"#).unwrap();
        assert_eq!(config.game_port, 60000);
        assert_eq!(config.login_port, ServerConfig::default().login_port);
    }

    #[test]
    fn missing_file_is_defaults() {
        let config = ServerConfig::load("/nonexistent/ember.json").unwrap();
        assert_eq!(config.auth_port, ServerConfig::default().auth_port);
    }
}

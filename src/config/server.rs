use std::net::SocketAddr;
use std::path::PathBuf;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Client-facing server parameters
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    /// Address the request/response listener binds to
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Upper bound on a single request/response frame
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,

    /// How long a session waits for the request frame before giving up
    #[serde(default = "default_request_timeout")]
    pub request_timeout_in_ms: u64,

    /// Directory the file log appender writes into
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            max_frame_bytes: default_max_frame_bytes(),
            request_timeout_in_ms: default_request_timeout(),
            log_dir: default_log_dir(),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<()> {
        self.listen_addr()?;

        if self.max_frame_bytes == 0 {
            return Err(Error::Config(ConfigError::Message(
                "server.max_frame_bytes must be greater than 0".into(),
            )));
        }

        if self.request_timeout_in_ms < 1 {
            return Err(Error::Config(ConfigError::Message(
                "server.request_timeout_in_ms must be at least 1ms".into(),
            )));
        }

        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen_address.parse().map_err(|_| {
            Error::Config(ConfigError::Message(format!(
                "server.listen_address is not a valid socket address: {}",
                self.listen_address
            )))
        })
    }
}

fn default_listen_address() -> String {
    "127.0.0.1:7741".to_string()
}

fn default_max_frame_bytes() -> usize {
    // Large enough for one max-size chunk plus the response envelope
    8 * 1024 * 1024
}

// in ms
fn default_request_timeout() -> u64 {
    5_000
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}

use crate::error::RagError;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Defines how the process obtains its Snowflake session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    /// Adopt the session the container host provides through its token file.
    Host,
    /// Sign key-pair JWTs from credentials found in the environment.
    KeyPair,
}

impl ConnectionMode {
    /// Host mode when the host token file exists, key-pair mode otherwise.
    pub fn detect(host_token_path: &Path) -> Self {
        if host_token_path.is_file() {
            ConnectionMode::Host
        } else {
            ConnectionMode::KeyPair
        }
    }
}

impl FromStr for ConnectionMode {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "host" | "active" | "container" => Ok(ConnectionMode::Host),
            "keypair" | "key-pair" | "credentials" => Ok(ConnectionMode::KeyPair),
            other => Err(RagError::ConfigError(format!(
                "Unknown connection mode '{}'. Expected 'host' or 'keypair'.",
                other
            ))),
        }
    }
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionMode::Host => write!(f, "host"),
            ConnectionMode::KeyPair => write!(f, "keypair"),
        }
    }
}

//! Handshake line written by a plugin once it can accept connections.
//!
//! Format: `<protocol-version>|<magic-cookie>|<transport-address>`.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::error::{ProtocolError, Result};

/// Protocol version spoken by this build.
pub const PROTOCOL_VERSION: u32 = 1;

/// Environment variable carrying the magic cookie into the plugin process.
pub const MAGIC_COOKIE_KEY: &str = "TETHER_PLUGIN_MAGIC_COOKIE";

/// Shared constant proving both ends speak this protocol. Not a credential.
pub const MAGIC_COOKIE_VALUE: &str = "0d7c4a6e-93f1-4b2e-b8a5-6f1e2c9d3a70";

/// Environment variable carrying the host's protocol version.
pub const PROTOCOL_VERSION_KEY: &str = "TETHER_PLUGIN_PROTOCOL_VERSION";

/// Address the plugin listens on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportAddress {
    /// `tcp://host:port`
    Tcp(String),
    /// `unix:///path/to/socket`
    Unix(PathBuf),
}

impl FromStr for TransportAddress {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        if let Some(rest) = s.strip_prefix("tcp://") {
            let valid = rest
                .rsplit_once(':')
                .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
            if !valid {
                return Err(ProtocolError::InvalidAddress(s.to_string()));
            }
            return Ok(Self::Tcp(rest.to_string()));
        }
        if let Some(rest) = s.strip_prefix("unix://") {
            if rest.is_empty() {
                return Err(ProtocolError::InvalidAddress(s.to_string()));
            }
            return Ok(Self::Unix(PathBuf::from(rest)));
        }
        Err(ProtocolError::InvalidAddress(s.to_string()))
    }
}

impl fmt::Display for TransportAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(addr) => write!(f, "tcp://{addr}"),
            Self::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

/// Why a well-formed handshake was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeMismatch {
    #[error("protocol version mismatch: host speaks {expected}, plugin speaks {actual}")]
    Version { expected: u32, actual: u32 },

    #[error("magic cookie mismatch")]
    Cookie,
}

/// Parsed handshake line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeLine {
    pub protocol_version: u32,
    pub magic_cookie: String,
    pub address: TransportAddress,
}

impl HandshakeLine {
    /// Handshake for this build's version and cookie.
    pub fn new(address: TransportAddress) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            magic_cookie: MAGIC_COOKIE_VALUE.to_string(),
            address,
        }
    }

    /// Parse a raw line. Surrounding whitespace is ignored.
    pub fn parse(line: &str) -> Result<Self> {
        let trimmed = line.trim();
        let parts: Vec<&str> = trimmed.split('|').collect();
        if parts.len() != 3 {
            return Err(ProtocolError::malformed_handshake(
                trimmed,
                format!("expected 3 '|'-separated fields, found {}", parts.len()),
            ));
        }

        let protocol_version = parts[0].trim().parse::<u32>().map_err(|_| {
            ProtocolError::malformed_handshake(trimmed, "protocol version is not an integer")
        })?;

        let magic_cookie = parts[1].trim();
        if magic_cookie.is_empty() {
            return Err(ProtocolError::malformed_handshake(
                trimmed,
                "magic cookie is empty",
            ));
        }

        let address = parts[2].trim().parse::<TransportAddress>()?;

        Ok(Self {
            protocol_version,
            magic_cookie: magic_cookie.to_string(),
            address,
        })
    }

    /// Check version and cookie against what the host expects.
    pub fn validate(
        &self,
        expected_version: u32,
        expected_cookie: &str,
    ) -> std::result::Result<(), HandshakeMismatch> {
        if self.protocol_version != expected_version {
            return Err(HandshakeMismatch::Version {
                expected: expected_version,
                actual: self.protocol_version,
            });
        }
        if self.magic_cookie != expected_cookie {
            return Err(HandshakeMismatch::Cookie);
        }
        Ok(())
    }
}

impl fmt::Display for HandshakeLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}",
            self.protocol_version, self.magic_cookie, self.address
        )
    }
}

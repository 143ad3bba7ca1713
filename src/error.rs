//! Error type for client setup and the fallible edges of the pipeline.
//!
//! Covers configuration, connection, and handshake failures. Frame-level
//! parse failures on the hot path use `Option` (not `Result`) -- the
//! dispatcher drops malformed frames silently, no error variant needed.

use std::fmt;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error for the Deribit client.
#[derive(Debug)]
pub enum Error {
    /// Missing or invalid configuration (credentials, endpoints).
    Config(String),
    /// TCP-level failure while connecting or configuring the socket.
    Io(std::io::Error),
    /// TLS connector construction failed.
    Tls(native_tls::Error),
    /// WebSocket handshake or protocol failure.
    Handshake(tungstenite::Error),
    /// Failed to spawn a worker OS thread.
    Spawn(std::io::Error),
    /// Unsupported candle resolution string.
    Resolution(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Io(e) => write!(f, "socket error: {e}"),
            Self::Tls(e) => write!(f, "TLS setup error: {e}"),
            Self::Handshake(e) => write!(f, "websocket handshake error: {e}"),
            Self::Spawn(e) => write!(f, "failed to spawn thread: {e}"),
            Self::Resolution(r) => write!(f, "unsupported resolution: {r:?}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) | Self::Spawn(e) => Some(e),
            Self::Tls(e) => Some(e),
            Self::Handshake(e) => Some(e),
            Self::Config(_) | Self::Resolution(_) => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<native_tls::Error> for Error {
    fn from(e: native_tls::Error) -> Self {
        Self::Tls(e)
    }
}

impl From<tungstenite::Error> for Error {
    fn from(e: tungstenite::Error) -> Self {
        Self::Handshake(e)
    }
}

//! Error types for rrdpoll
//!
//! Fatal error hierarchy for configuration loading, socket setup and
//! shutdown. Per-request SNMP failures are *not* errors in this sense:
//! they travel to owner callbacks as [`crate::snmp::SnmpCode`] values and
//! never cross the event loop as `Err`.

use thiserror::Error;

/// rrdpoll error type
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error with details
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message
        message: String,
        /// Optional source error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Network transport error (socket setup, send path)
    #[error("transport error: {message}")]
    Transport {
        /// Human-readable error message
        message: String,
        /// Optional source error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// SNMP wire protocol error (encode overflow, malformed packet)
    #[error("protocol error: {message}")]
    Protocol {
        /// Human-readable error message
        message: String,
    },

    /// Hostname resolution error
    #[error("resolve error for '{host}': {message}")]
    Resolve {
        /// The hostname being resolved
        host: String,
        /// Human-readable error message
        message: String,
    },

    /// I/O error with file context
    #[error("i/o error with '{path}': {message}")]
    Io {
        /// The file path involved
        path: String,
        /// Human-readable error message
        message: String,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Invariant violation inside the engine
    #[error("internal error: {message}")]
    Internal {
        /// Human-readable error message
        message: String,
    },
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a configuration error with a source error
    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Create a transport error with a source error
    pub fn transport_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a resolution error
    pub fn resolve(host: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Resolve {
            host: host.into(),
            message: message.into(),
        }
    }

    /// Create an I/O error with file context
    pub fn io(path: impl Into<String>, message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: message.into(),
            source,
        }
    }

    /// Create an internal invariant error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// rrdpoll operation result
pub type Result<T> = std::result::Result<T, Error>;

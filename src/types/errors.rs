//! Application error types.
//!
//! All errors use `thiserror` for automatic Error trait derivation and provide
//! clear error messages with context. Each variant knows how it is reported
//! on both wire surfaces (HTTP envelope code, RPC error code).

use std::time::Duration;

use thiserror::Error;

/// Application result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error enum for the conversion service.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or empty input, batch size out of range (map to 400 / INVALID_ARGUMENT).
    #[error("validation error: {0}")]
    Validation(String),

    /// The conversion capability rejected or failed on an input (map to 500 / INTERNAL).
    #[error("conversion failed: {0}")]
    Conversion(String),

    /// Unknown route or RPC method (map to 404 / NOT_FOUND).
    #[error("not found: {0}")]
    NotFound(String),

    /// Reserved operation with no implementation (map to 501 / UNIMPLEMENTED).
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// Operation exceeded its time budget (map to 504 / DEADLINE_EXCEEDED).
    #[error("timeout: {0}")]
    Timeout(String),

    /// Payload exceeds a configured size cap (map to 400 / RESOURCE_EXHAUSTED).
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Invalid configuration value; fatal at startup.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A protocol server could not acquire its listening socket; fatal at startup.
    #[error("{protocol} server failed to bind {addr}: {source}")]
    Bind {
        protocol: &'static str,
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// A server did not drain within its grace window. Logged, never sent to clients.
    #[error("{protocol} server did not drain within {grace:?}")]
    ShutdownTimeout {
        protocol: &'static str,
        grace: Duration,
    },

    /// Internal errors (map to 500 / INTERNAL).
    #[error("internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Business code carried in the HTTP response envelope.
    pub fn to_envelope_code(&self) -> u16 {
        match self {
            Error::Validation(_) | Error::ResourceExhausted(_) | Error::Serialization(_) => 400,
            Error::NotFound(_) => 404,
            Error::NotImplemented(_) => 501,
            Error::Timeout(_) => 504,
            Error::Conversion(_)
            | Error::Config(_)
            | Error::Bind { .. }
            | Error::ShutdownTimeout { .. }
            | Error::Internal(_)
            | Error::Io(_) => 500,
        }
    }

    /// Error code string carried in RPC error frames.
    pub fn to_rpc_error_code(&self) -> &'static str {
        match self {
            Error::Validation(_) | Error::Serialization(_) => "INVALID_ARGUMENT",
            Error::NotFound(_) => "NOT_FOUND",
            Error::NotImplemented(_) => "UNIMPLEMENTED",
            Error::Timeout(_) => "DEADLINE_EXCEEDED",
            Error::ResourceExhausted(_) => "RESOURCE_EXHAUSTED",
            Error::Conversion(_)
            | Error::Config(_)
            | Error::Bind { .. }
            | Error::ShutdownTimeout { .. }
            | Error::Internal(_)
            | Error::Io(_) => "INTERNAL",
        }
    }

    /// Whether the caller sent something unacceptable (as opposed to a server-side fault).
    pub fn is_client_error(&self) -> bool {
        matches!(self.to_envelope_code(), 400..=499)
    }
}

// Convenience constructors
impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conversion(msg: impl Into<String>) -> Self {
        Self::Conversion(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn not_implemented(msg: impl Into<String>) -> Self {
        Self::NotImplemented(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn resource_exhausted(msg: impl Into<String>) -> Self {
        Self::ResourceExhausted(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn bind(protocol: &'static str, addr: impl Into<String>, source: std::io::Error) -> Self {
        Self::Bind {
            protocol,
            addr: addr.into(),
            source,
        }
    }
}

//! Error types for the application.

use thiserror::Error;

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {message}")]
    ParseError { message: String },

    #[error("Config validation failed: {message}")]
    ValidationError { message: String },
}

/// Errors raised by the Skype transport.
#[derive(Debug, Error)]
pub enum SkypeError {
    #[error("Login failed: {reason}")]
    Login { reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: &'static str, status: u16 },

    #[error("Invalid response from {endpoint}: {message}")]
    InvalidResponse {
        endpoint: &'static str,
        message: String,
    },

    #[error("Skype session expired")]
    SessionExpired,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Binary download failures.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("Invalid URL '{url}'")]
    InvalidUrl { url: String },

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Download of {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A token that does not decode back into a raw identifier.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Token is not valid base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("Token does not decode to UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

/// A Skype event resource that could not be decoded.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventDecodeError {
    #[error("Missing field '{field}'")]
    MissingField { field: &'static str },

    #[error("Invalid field '{field}': {message}")]
    InvalidField {
        field: &'static str,
        message: String,
    },
}

/// Errors crossing the bridge boundary in either direction.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Skype error: {0}")]
    Skype(#[from] SkypeError),

    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("Matrix request to {endpoint} failed: {message}")]
    Matrix {
        endpoint: &'static str,
        message: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Skype transport operations.
pub type SkypeResult<T> = std::result::Result<T, SkypeError>;

/// Result type alias for bridge operations.
pub type BridgeResult<T> = std::result::Result<T, BridgeError>;

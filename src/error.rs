// src/error.rs

use thiserror::Error;

/// Core error types for pacbind
#[derive(Error, Debug)]
pub enum Error {
    /// libalpm refused to create a session for the given root/dbpath
    #[error("Failed to initialize alpm session: {message} (code {code})")]
    Initialization { code: i32, message: String },

    /// The session handle was already released
    #[error("Session handle has already been released")]
    AlreadyReleased,

    /// The object is bound to a database that was unregistered
    #[error("Object is no longer valid: {0}")]
    Invalidated(String),

    /// A libalpm call returned a failure sentinel
    #[error("alpm error: {message} (code {code})")]
    NativeRejected { code: i32, message: String },

    /// A database with this name is already registered
    #[error("Database '{0}' is already registered")]
    DuplicateName(String),

    /// An argument could not be passed across the C boundary
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The AUR answered with 502, 503 or 504
    #[error("AUR is unavailable at this moment")]
    ServiceUnavailable,

    /// The AUR answered with a non-empty `error` field
    #[error("status {status}: {message}")]
    Payload { status: u16, message: String },

    /// HTTP transport or response decoding errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<std::ffi::NulError> for Error {
    fn from(err: std::ffi::NulError) -> Self {
        Error::InvalidArgument(format!("string contains an interior NUL byte: {}", err))
    }
}

/// Result type alias using pacbind's Error type
pub type Result<T> = std::result::Result<T, Error>;

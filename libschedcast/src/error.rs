//! Error types for Schedcast

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SchedcastError>;

#[derive(Error, Debug)]
pub enum SchedcastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Publish service rejected the request (HTTP {status}): {message}")]
    RemoteRejection { status: u16, message: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl SchedcastError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            SchedcastError::Validation(_) | SchedcastError::NotFound(_) => 3,
            SchedcastError::Dispatch(DispatchError::Authentication(_)) => 2,
            SchedcastError::Dispatch(_) => 1,
            SchedcastError::RemoteRejection { .. } => 1,
            SchedcastError::Config(_) => 1,
            SchedcastError::Storage(_) => 1,
        }
    }

    /// True when the error happened after the post was persisted, i.e. the
    /// record exists locally but the publish service did not accept it.
    pub fn is_dispatch_failure(&self) -> bool {
        matches!(
            self,
            SchedcastError::Dispatch(_) | SchedcastError::RemoteRejection { .. }
        )
    }

    pub(crate) fn post_not_found(post_id: &str) -> Self {
        SchedcastError::NotFound(format!("post {}", post_id))
    }

    pub(crate) fn connection_not_found(connection_id: &str) -> Self {
        SchedcastError::NotFound(format!("connection {}", connection_id))
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Corrupt row in {table}: {reason}")]
    CorruptRow { table: &'static str, reason: String },
}

#[derive(Error, Debug, Clone)]
pub enum DispatchError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Invalid response from publish service: {0}")]
    InvalidResponse(String),

    #[error("Publish service not configured: {0}")]
    NotConfigured(String),
}

/// Convert a [`reqwest::Error`] into a [`DispatchError`].
///
/// Timeouts map to [`DispatchError::Timeout`], decode failures to
/// [`DispatchError::InvalidResponse`], everything else to
/// [`DispatchError::Network`].
pub(crate) fn from_reqwest(e: reqwest::Error) -> DispatchError {
    if e.is_timeout() {
        DispatchError::Timeout(e.to_string())
    } else if e.is_decode() {
        DispatchError::InvalidResponse(e.to_string())
    } else {
        DispatchError::Network(e.to_string())
    }
}

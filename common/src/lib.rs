use arrow::error::ArrowError;
use thiserror::Error;
use url::ParseError;

pub mod config;
pub mod telemetry;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Network/API failure or a malformed upstream response.
    #[error("Upstream fetch error: {0}")]
    UpstreamFetch(String),

    /// The warehouse session could not be established.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Bulk-load failure scoped to a single file.
    #[error("File ingest error for {file}: {detail}")]
    FileIngest { file: String, detail: String },

    /// The named external transformation failed and was rolled back.
    #[error("Transformation error in {procedure}: {detail}")]
    Transformation { procedure: String, detail: String },

    #[error("HTTP error: {0}")]
    Http(#[from] rquest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether an orchestrator may retry a stage that failed with this error.
    ///
    /// Upstream and connectivity failures are transient; transformation
    /// failures and bad input are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::UpstreamFetch(_)
                | Error::Connection(_)
                | Error::Http(_)
                | Error::Io(_)
                | Error::Other(_)
        )
    }

    pub fn upstream(detail: impl Into<String>) -> Self {
        Error::UpstreamFetch(detail.into())
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error::InvalidInput(format!("URL parse error: {}", err))
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Other(format!("Background task failed: {}", err))
    }
}

use thiserror::Error;

/// Failure talking to a printer's HTTP API.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("could not connect to {url}: {message}")]
    Connect { url: String, message: String },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("failed to read response from {url}: {message}")]
    Body { url: String, message: String },
}

impl DeviceError {
    /// Transport-level failures worth another attempt: timeouts, refused
    /// connections, throttling and gateway/server errors.
    pub fn is_retryable(&self) -> bool {
        match self {
            DeviceError::Timeout { .. } | DeviceError::Connect { .. } => true,
            DeviceError::Status { status, .. } => {
                matches!(status, 429 | 500 | 502 | 503 | 504)
            }
            DeviceError::Body { .. } => false,
        }
    }
}

/// Failure writing to or reading from the local job log.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("job log I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("job log CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("job log is missing the uuid column")]
    MissingUuidColumn,

    #[error("background write task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Failure mirroring rows to the remote spreadsheet.
#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("failed to load credentials from {path}: {message}")]
    Credentials { path: String, message: String },

    #[error("invalid spreadsheet API URL: {0}")]
    InvalidUrl(String),

    #[error("spreadsheet request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("spreadsheet API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("page_size must be at least 1")]
    ZeroPageSize,

    #[error("remote_batch_size must be at least 1")]
    ZeroBatchSize,

    #[error("unknown timezone '{0}'")]
    UnknownTimezone(String),
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("API request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No data returned for {0}")]
    EmptyResponse(String),

    #[error("Invalid experiment data: {0}")]
    Validation(String),

    #[error("Run did not finish within {0} seconds")]
    RunDeadline(u64),
}

pub type Result<T> = std::result::Result<T, WatchError>;

//! Error types for waypost

use thiserror::Error;

/// Main error type for waypost
#[derive(Error, Debug)]
pub enum WaypostError {
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Script error: {0}")]
    Script(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Data file error: {0}")]
    Data(String),
}

impl From<rquickjs::Error> for WaypostError {
    fn from(err: rquickjs::Error) -> Self {
        WaypostError::Script(format!("JavaScript error: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, WaypostError>;

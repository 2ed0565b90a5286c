//! Error types for downloading the published spreadsheet.

use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum FetchError {
    /// The configured listing URL doesn't parse
    #[error("Invalid listing URL: {message}")]
    InvalidUrl { message: String },

    /// The HTTP client couldn't be set up
    #[error("Network error: {message}")]
    Network { message: String },

    #[error("failed to fetch schedule files: {message}")]
    Listing { message: String },

    /// The listing page has no spreadsheet links
    #[error("No schedule documents found at {url}")]
    NoDocuments { url: String },

    #[error("failed to download {url}: {message}")]
    Download { url: String, message: String },
}

impl From<url::ParseError> for FetchError {
    fn from(err: url::ParseError) -> Self {
        FetchError::InvalidUrl {
            message: err.to_string(),
        }
    }
}

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to read fixture '{path}'")]
    ReadFixture {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {what} as JSON: {source}")]
    ParseJson {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("HTTP {method} {url} returned status {status}")]
    HttpStatus {
        method: String,
        url: String,
        status: u16,
    },

    #[error("Expected status code {expected}, got {actual}")]
    Status { expected: u16, actual: u16 },

    #[error("Response has no '{0}' header")]
    MissingHeader(String),

    #[error("Header '{header}' value '{actual}' does not contain '{expected}'")]
    HeaderMismatch {
        header: String,
        expected: String,
        actual: String,
    },

    #[error("{0}")]
    Mismatch(String),
}

pub type Result<T> = std::result::Result<T, Error>;

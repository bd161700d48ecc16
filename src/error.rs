//! Crate-wide error type.
//!
//! Most failures in the pipeline are recovered close to where they happen
//! (a failed listing fetch becomes an empty result, a duplicate URL becomes a
//! counter bump). The variants below are what crosses module boundaries
//! before that recovery happens, plus the startup failures `main` reports.

use thiserror::Error;

/// Errors produced while fetching, parsing, storing or configuring sources.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport-level failure, including request timeouts.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The upstream site answered with a non-success status code.
    #[error("{url} responded with status {status}")]
    Status { url: String, status: u16 },

    /// A listing or base address could not be parsed or joined.
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    /// A CSS selector in a source definition does not parse.
    #[error("invalid selector `{selector}`: {message}")]
    Selector { selector: String, message: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("could not read sources file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Configuration that parses but makes no sense (zero limit, empty name...).
    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

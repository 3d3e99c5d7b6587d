//! Error types for fetching, registering and reporting metrics

use crate::models::ResourceKind;

/// Failure to retrieve a resource list from the inventory source
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The listing command could not be started
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The listing command exited with a non-zero status
    #[error("command exited with {status}: {output}")]
    Command { status: String, output: String },

    /// Non-2xx response from the inventory API
    #[error("inventory API HTTP error: status={status}, body={body}")]
    Http { status: u16, body: String },

    /// Transport-level error from `reqwest`
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The endpoint URL could not be built
    #[error("invalid inventory URL: {0}")]
    Url(#[from] url::ParseError),

    /// Response body was not the expected shape
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

/// The sink refused a metric declaration
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("metric {0} declared twice")]
    Duplicate(String),

    #[error("invalid metric {name}: {reason}")]
    Invalid { name: String, reason: String },

    #[error("monitoring API HTTP error declaring {name}: status={status}, body={body}")]
    Http {
        name: String,
        status: u16,
        body: String,
    },

    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid monitoring URL: {0}")]
    Url(#[from] url::ParseError),
}

/// The sink refused a write
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("metric {0} was never declared")]
    Undeclared(String),

    #[error("labels of metric {0} do not match its descriptor")]
    LabelMismatch(String),

    #[error("monitoring API HTTP error: status={status}, body={body}")]
    Http { status: u16, body: String },

    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid monitoring URL: {0}")]
    Url(#[from] url::ParseError),
}

/// A single metric failed within a scrape cycle
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("fetching {kind}: {source}")]
    Fetch {
        kind: ResourceKind,
        #[source]
        source: FetchError,
    },

    #[error("reporting {metric}: {source}")]
    Report {
        metric: String,
        #[source]
        source: ReportError,
    },
}

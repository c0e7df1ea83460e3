use thiserror::Error;

/// Errors from the web-monitoring-db client
#[derive(Debug, Error)]
pub enum DbError {
    #[error(
        "No web-monitoring-db credentials; set WEB_MONITORING_DB_EMAIL and WEB_MONITORING_DB_PASSWORD"
    )]
    MissingCredentials,

    #[error("Invalid web-monitoring-db URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("web-monitoring-db returned HTTP {status} for {url}: {body}")]
    Status { status: u16, url: String, body: String },

    #[error("Could not decode response from {url}: {message}")]
    Decode { url: String, message: String },
}

pub type Result<T> = std::result::Result<T, DbError>;

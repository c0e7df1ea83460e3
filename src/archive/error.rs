use thiserror::Error;

/// Failure fetching one memento
#[derive(Debug, Error)]
pub enum FetchError {
    /// The index knows the capture but the archive cannot reconstruct it
    #[error("Memento at {url} could not be played back: {reason}")]
    Playback { url: String, reason: String },

    #[error("Missing memento: {url}")]
    NotFound { url: String },

    #[error("HTTP {status} fetching {url}")]
    Http { status: u16, url: String },

    /// No connection could be established (DNS, refused, TLS handshake)
    #[error("Failed to establish a connection for {url}: {message}")]
    Connect { url: String, message: String },

    #[error("Timed out fetching {url}")]
    Timeout { url: String },

    #[error("Fetch failed for {url}: {message}")]
    Other { url: String, message: String },
}

impl FetchError {
    /// Errors that leave a session's connection pool unusable
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, FetchError::Connect { .. })
    }

    /// Build from a transport-level reqwest error
    pub fn from_reqwest(url: &str, error: &reqwest::Error) -> Self {
        if error.is_connect() {
            FetchError::Connect {
                url: url.to_string(),
                message: error.to_string(),
            }
        } else if error.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else if error.is_redirect() {
            FetchError::Playback {
                url: url.to_string(),
                reason: "too many redirects".to_string(),
            }
        } else {
            FetchError::Other {
                url: url.to_string(),
                message: error.to_string(),
            }
        }
    }
}

/// Failure listing captures for one query target
#[derive(Debug, Error)]
pub enum ListError {
    #[error("{url} is blocked from archive access: {message}")]
    BlockedByPolicy { url: String, message: String },

    #[error("The archive does not have archived versions of {url}")]
    NoArchivedVersions { url: String },

    #[error("Archive index error for {url}: {message}")]
    Index { url: String, message: String },
}

pub type FetchResult<T> = std::result::Result<T, FetchError>;

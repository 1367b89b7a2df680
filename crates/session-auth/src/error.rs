//! Error types for session operations

/// Errors from session operations.
///
/// The first four variants are the client-perceived failure classes of a
/// backend call; the rest are local faults.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("request failed: {0}")]
    Network(String),

    #[error("backend rejected credentials ({status})")]
    Unauthorized { status: u16 },

    #[error("backend returned {status}")]
    Status { status: u16 },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("no access token held")]
    NoToken,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid url: {0}")]
    Url(String),

    #[error("http client error: {0}")]
    Client(String),
}

impl Error {
    /// Map a non-success status to `Unauthorized` or `Status`.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Error::Unauthorized { status },
            _ => Error::Status { status },
        }
    }

    /// Label for structured logs.
    pub fn label(&self) -> &'static str {
        match self {
            Error::Network(_) => "network",
            Error::Unauthorized { .. } => "unauthorized",
            Error::Status { .. } => "status",
            Error::Malformed(_) => "malformed",
            Error::NoToken => "no_token",
            Error::Storage(_) => "storage",
            Error::Url(_) => "url",
            Error::Client(_) => "client",
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Error::Url(e.to_string())
    }
}

/// Result alias for session operations.
pub type Result<T> = std::result::Result<T, Error>;

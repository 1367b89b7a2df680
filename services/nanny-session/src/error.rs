//! Service-specific error types

use thiserror::Error;

/// Dashboard API errors, classified the way the user is told about them.
///
/// Display text is the user-facing message; the detail behind `Network` and
/// `Unknown` is for logs.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unable to connect to the NannyAI API. Check your connection and try again.")]
    Network(String),

    #[error("Your session is not authorized ({status}). Please sign in again.")]
    Auth { status: u16 },

    #[error("The NannyAI API is having problems ({status}). Please try again later.")]
    Server { status: u16 },

    #[error("Unexpected response from the NannyAI API.")]
    Unknown(String),

    #[error("Not signed in. Run `nanny-session login` first.")]
    NotSignedIn,
}

impl ApiError {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => ApiError::Auth { status },
            500.. => ApiError::Server { status },
            _ => ApiError::Unknown(format!("status {status}")),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Auth { status } | ApiError::Server { status } => Some(*status),
            _ => None,
        }
    }

    /// Internal detail for structured logs.
    pub fn detail(&self) -> String {
        match self {
            ApiError::Network(detail) | ApiError::Unknown(detail) => detail.clone(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Unknown(format!("response body: {e}"))
        } else if let Some(status) = e.status() {
            ApiError::from_status(status.as_u16())
        } else {
            ApiError::Network(e.to_string())
        }
    }
}

impl From<session_auth::Error> for ApiError {
    fn from(e: session_auth::Error) -> Self {
        match e {
            session_auth::Error::Network(detail) => ApiError::Network(detail),
            session_auth::Error::Unauthorized { status } => ApiError::Auth { status },
            session_auth::Error::Status { status } => ApiError::from_status(status),
            session_auth::Error::NoToken => ApiError::NotSignedIn,
            other => ApiError::Unknown(other.to_string()),
        }
    }
}

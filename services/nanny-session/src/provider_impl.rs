//! HTTP session provider: the guard's steps over the real backend.
//!
//! Each step delegates to the shared `SessionClient` and folds its typed
//! error into a `FailureKind`. The client owns every piece of session state,
//! so a token refreshed here is the token the dashboard client sends next.

use std::sync::Arc;

use session_auth::SessionClient;
use session_provider::{FailureKind, SessionProvider, StepFuture};

pub struct HttpSessionProvider {
    session: Arc<SessionClient>,
    cross_domain: bool,
}

impl HttpSessionProvider {
    pub fn new(session: Arc<SessionClient>, cross_domain: bool) -> Self {
        Self {
            session,
            cross_domain,
        }
    }
}

/// Fold a session error into the failure class the guard logs.
pub fn failure_kind(err: &session_auth::Error) -> FailureKind {
    match err {
        session_auth::Error::Network(_) => FailureKind::Network,
        session_auth::Error::Unauthorized { .. } => FailureKind::Unauthorized,
        session_auth::Error::Status { .. } => FailureKind::Server,
        session_auth::Error::Malformed(_) => FailureKind::Malformed,
        session_auth::Error::NoToken => FailureKind::MissingToken,
        // Local faults: the session could not be recorded
        session_auth::Error::Storage(_)
        | session_auth::Error::Url(_)
        | session_auth::Error::Client(_) => FailureKind::Server,
    }
}

impl SessionProvider for HttpSessionProvider {
    fn id(&self) -> &str {
        "http"
    }

    fn cross_domain(&self) -> bool {
        self.cross_domain
    }

    fn validate(&self) -> StepFuture<'_> {
        Box::pin(async move {
            self.session
                .try_validate()
                .await
                .map_err(|e| failure_kind(&e))
        })
    }

    fn refresh(&self) -> StepFuture<'_> {
        Box::pin(async move {
            self.session
                .try_refresh()
                .await
                .map_err(|e| failure_kind(&e))
        })
    }

    fn probe_profile(&self) -> StepFuture<'_> {
        Box::pin(async move {
            self.session
                .try_fetch_profile()
                .await
                .map(|_| ())
                .map_err(|e| failure_kind(&e))
        })
    }

    fn exchange_code<'a>(&'a self, code: &'a str) -> StepFuture<'a> {
        Box::pin(async move {
            self.session
                .try_exchange_code(code)
                .await
                .map_err(|e| failure_kind(&e))
        })
    }
}

//! Session provider abstraction for the route guard
//!
//! Defines the `SessionProvider` trait that decouples the guard's decision
//! procedure from how each step talks to the backend. The HTTP-backed
//! implementation lives in the service; tests drive the guard with scripted
//! providers.
//!
//! Every step reports a `StepOutcome`. Failures carry a `FailureKind` so the
//! guard can log which class of error ended a step, but the guard itself only
//! ever branches on success vs failure.

use serde::Serialize;
use std::future::Future;
use std::pin::Pin;

/// Client-perceived failure of a single session step.
///
/// All of these are terminal for the step that produced them; the guard moves
/// on to the next fallback regardless of the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The request never completed (connect error, reset, timeout)
    #[error("network failure")]
    Network,
    /// Backend rejected the credential (401/403)
    #[error("unauthorized")]
    Unauthorized,
    /// Any other non-success status (404, 5xx, ...)
    #[error("server error")]
    Server,
    /// Success status but the body was unparsable or lacked a token
    #[error("malformed response")]
    Malformed,
    /// No access token was held, so nothing was sent
    #[error("no access token")]
    MissingToken,
}

impl FailureKind {
    /// Label for structured logs.
    pub fn label(&self) -> &'static str {
        match self {
            FailureKind::Network => "network",
            FailureKind::Unauthorized => "unauthorized",
            FailureKind::Server => "server",
            FailureKind::Malformed => "malformed",
            FailureKind::MissingToken => "missing_token",
        }
    }
}

/// Result of one guard step.
pub type StepOutcome = std::result::Result<(), FailureKind>;

/// Boxed step future. `Pin<Box<dyn Future>>` keeps the trait dyn-compatible
/// so the guard can hold an `Arc<dyn SessionProvider>`.
pub type StepFuture<'a> = Pin<Box<dyn Future<Output = StepOutcome> + Send + 'a>>;

/// The backend operations the route guard sequences.
///
/// Implementations must absorb their own errors: a step never panics and
/// never returns anything but a `StepOutcome`.
pub trait SessionProvider: Send + Sync {
    /// Identifier for logging (e.g. "http")
    fn id(&self) -> &str;

    /// Whether the app and API live on different origins. Only then does the
    /// guard try to exchange an OAuth callback code itself.
    fn cross_domain(&self) -> bool;

    /// Ask the backend whether the held access token is currently valid.
    fn validate(&self) -> StepFuture<'_>;

    /// Trade the ambient refresh credential for a new access token.
    fn refresh(&self) -> StepFuture<'_>;

    /// Credentialed profile fetch that recovers an access token from the
    /// session cookie.
    fn probe_profile(&self) -> StepFuture<'_>;

    /// Exchange a one-time OAuth callback code for a session.
    fn exchange_code<'a>(&'a self, code: &'a str) -> StepFuture<'a>;
}

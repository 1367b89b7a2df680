//! Render policy for guarded views

use crate::location::Location;
use crate::state::AuthState;

/// What a guarded view slot shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered<R> {
    /// Neutral loading indicator, no content
    Loading,
    View(R),
    /// Navigation to `to` is under way; nothing of the view is shown
    Redirecting { to: String },
    /// Unauthenticated on the entry path itself; redirecting would loop
    Nothing,
}

impl<R> Rendered<R> {
    pub fn is_view(&self) -> bool {
        matches!(self, Rendered::View(_))
    }
}

/// Decide what a guarded slot renders. `view` runs only when authenticated.
pub fn guard_view<R>(
    state: AuthState,
    location: &Location,
    entry_path: &str,
    view: impl FnOnce() -> R,
) -> Rendered<R> {
    match state {
        AuthState::Unknown => Rendered::Loading,
        AuthState::Authenticated => Rendered::View(view()),
        AuthState::Unauthenticated if location.path() == entry_path => Rendered::Nothing,
        AuthState::Unauthenticated => Rendered::Redirecting {
            to: entry_path.to_owned(),
        },
    }
}

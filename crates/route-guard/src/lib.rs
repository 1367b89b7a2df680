//! Route guard for protected dashboard views
//!
//! Decides, once per navigation, whether a protected view may render. The
//! decision is a fixed chain of session steps, each tried only after the
//! previous one failed:
//!
//! 1. OAuth callback code in the URL → strip it; in cross-domain deployments
//!    exchange it and probe the profile
//! 2. Validate the held access token
//! 3. Refresh from the refresh cookie
//! 4. Probe the profile endpoint directly
//! 5. Nothing worked → unauthenticated, redirect to the entry path
//!
//! The chain is a pure state machine (`state::handle_event`) driven by a
//! per-mount evaluator (`Mount::evaluate`). Side effects go through
//! `GuardEffects`; rendering is a plain function over the resulting
//! `AuthState`, so none of this needs a UI framework to run or test.

pub mod effects;
pub mod guard;
pub mod location;
pub mod render;
pub mod state;

pub use effects::{Effect, GuardEffects, Notification, RecordedEffects, Redirect};
pub use guard::{GuardConfig, Mount, RouteGuard};
pub use location::Location;
pub use render::{Rendered, guard_view};
pub use state::{AuthState, GuardAction, GuardEvent, GuardState, Step, handle_event};

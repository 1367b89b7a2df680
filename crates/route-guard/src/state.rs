//! Guard state machine
//!
//! Pure state machine: receives events, returns (new_state, action).
//! The mount evaluator executes the I/O implied by each action.

use serde::Serialize;
use session_provider::FailureKind;

/// One session step, in chain order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Exchange an OAuth callback code, then probe the profile
    AbsorbCallback,
    Validate,
    Refresh,
    Probe,
}

impl Step {
    /// The fallback tried after this step fails.
    pub fn next(self) -> Option<Step> {
        match self {
            Step::AbsorbCallback => Some(Step::Validate),
            Step::Validate => Some(Step::Refresh),
            Step::Refresh => Some(Step::Probe),
            Step::Probe => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Step::AbsorbCallback => "absorb_callback",
            Step::Validate => "validate",
            Step::Refresh => "refresh",
            Step::Probe => "probe",
        }
    }
}

/// What a view may know about the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    /// Check still in progress
    Unknown,
    Authenticated,
    Unauthenticated,
}

/// Guard states.
///
/// `Authenticated` and `Unauthenticated` are terminal for the mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardState {
    /// Mounted, chain not started
    Idle,
    /// Waiting on a step
    Checking(Step),
    Authenticated { via: Step },
    Unauthenticated { last_failure: FailureKind },
}

impl GuardState {
    pub fn auth_state(&self) -> AuthState {
        match self {
            GuardState::Idle | GuardState::Checking(_) => AuthState::Unknown,
            GuardState::Authenticated { .. } => AuthState::Authenticated,
            GuardState::Unauthenticated { .. } => AuthState::Unauthenticated,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.auth_state() != AuthState::Unknown
    }
}

/// Events that drive state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardEvent {
    /// Mount started. `exchange_code` is set when a callback code is present
    /// and the deployment is cross-domain.
    Mounted { exchange_code: bool },
    StepSucceeded,
    StepFailed(FailureKind),
}

/// Actions the evaluator should execute after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardAction {
    Run(Step),
    /// Terminal state reached: apply its side effects
    Settle,
    None,
}

/// Handle a state transition. Pure function: no I/O.
pub fn handle_event(state: GuardState, event: GuardEvent) -> (GuardState, GuardAction) {
    match (state, event) {
        // --- Idle ---
        (GuardState::Idle, GuardEvent::Mounted { exchange_code }) => {
            let first = if exchange_code {
                Step::AbsorbCallback
            } else {
                Step::Validate
            };
            (GuardState::Checking(first), GuardAction::Run(first))
        }

        // --- Checking ---
        (GuardState::Checking(step), GuardEvent::StepSucceeded) => (
            GuardState::Authenticated { via: step },
            GuardAction::Settle,
        ),

        (GuardState::Checking(step), GuardEvent::StepFailed(kind)) => match step.next() {
            Some(next) => (GuardState::Checking(next), GuardAction::Run(next)),
            None => (
                GuardState::Unauthenticated { last_failure: kind },
                GuardAction::Settle,
            ),
        },

        // --- Terminal states and stray events: stay put ---
        (state, _event) => (state, GuardAction::None),
    }
}

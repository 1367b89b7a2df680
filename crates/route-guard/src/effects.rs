//! Side effects the guard asks its host to perform
//!
//! The guard never touches history, navigation or notifications directly.
//! A UI host implements `GuardEffects`; `RecordedEffects` keeps them in a list
//! for headless callers and tests.

use parking_lot::Mutex;

use crate::location::Location;

/// User-visible notice shown when a protected route turns away the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    SignInRequired,
    /// The session could not be checked at all (network failure)
    SessionError,
}

impl Notification {
    pub fn title(&self) -> &'static str {
        match self {
            Notification::SignInRequired => "Authentication required",
            Notification::SessionError => "Authentication error",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Notification::SignInRequired => "Please sign in to access this page",
            Notification::SessionError => "Unable to verify your session. Please sign in again.",
        }
    }
}

/// Client-side navigation to the entry path. `from` is the location the user
/// tried to reach, for an optional return after sign-in. Replaces the current
/// history entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub to: String,
    pub from: Location,
}

pub trait GuardEffects: Send + Sync {
    /// Rewrite the visible URL without navigating (history replace).
    fn replace_location(&self, location: &Location);

    fn redirect(&self, redirect: &Redirect);

    fn notify(&self, notification: Notification);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    ReplaceLocation(Location),
    Redirect(Redirect),
    Notify(Notification),
}

/// Effects sink that records everything in order.
#[derive(Debug, Default)]
pub struct RecordedEffects {
    effects: Mutex<Vec<Effect>>,
}

impl RecordedEffects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn effects(&self) -> Vec<Effect> {
        self.effects.lock().clone()
    }

    pub fn redirects(&self) -> Vec<Redirect> {
        self.effects
            .lock()
            .iter()
            .filter_map(|e| match e {
                Effect::Redirect(r) => Some(r.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.effects
            .lock()
            .iter()
            .filter_map(|e| match e {
                Effect::Notify(n) => Some(*n),
                _ => None,
            })
            .collect()
    }

    /// The last URL written with `replace_location`.
    pub fn current_location(&self) -> Option<Location> {
        self.effects.lock().iter().rev().find_map(|e| match e {
            Effect::ReplaceLocation(l) => Some(l.clone()),
            _ => None,
        })
    }
}

impl GuardEffects for RecordedEffects {
    fn replace_location(&self, location: &Location) {
        self.effects
            .lock()
            .push(Effect::ReplaceLocation(location.clone()));
    }

    fn redirect(&self, redirect: &Redirect) {
        self.effects.lock().push(Effect::Redirect(redirect.clone()));
    }

    fn notify(&self, notification: Notification) {
        self.effects.lock().push(Effect::Notify(notification));
    }
}

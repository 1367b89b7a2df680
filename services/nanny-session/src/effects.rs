//! Terminal rendition of the guard's side effects.

use parking_lot::Mutex;
use route_guard::{GuardEffects, Location, Notification, Redirect};
use tracing::info;

/// Prints notifications and navigation to stdout and remembers where the
/// "browser" ended up.
#[derive(Debug, Default)]
pub struct ConsoleEffects {
    location: Mutex<Option<Location>>,
}

impl ConsoleEffects {
    pub fn new() -> Self {
        Self::default()
    }

    /// Location after the last history replace or redirect.
    pub fn location(&self) -> Option<Location> {
        self.location.lock().clone()
    }
}

impl GuardEffects for ConsoleEffects {
    fn replace_location(&self, location: &Location) {
        info!(location = %location, "history replaced");
        *self.location.lock() = Some(location.clone());
    }

    fn redirect(&self, redirect: &Redirect) {
        info!(to = %redirect.to, from = %redirect.from, "redirecting");
        println!("-> {} (from {})", redirect.to, redirect.from);
        let target = redirect.from.url().join(&redirect.to).ok().map(Location::new);
        *self.location.lock() = target;
    }

    fn notify(&self, notification: Notification) {
        println!("{}: {}", notification.title(), notification.description());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[test]
    fn redirect_moves_the_location() {
        let effects = ConsoleEffects::new();
        let from = Location::new(Url::parse("http://app.local/dashboard?tab=agents").unwrap());
        effects.replace_location(&from);
        assert_eq!(effects.location(), Some(from.clone()));

        effects.redirect(&Redirect {
            to: "/".into(),
            from,
        });
        assert_eq!(effects.location().unwrap().relative(), "/");
    }

    #[test]
    fn notify_prints_without_moving_the_location() {
        let effects = ConsoleEffects::new();
        let here = Location::new(Url::parse("http://app.local/account").unwrap());
        effects.replace_location(&here);

        effects.notify(Notification::SessionError);
        assert_eq!(effects.location(), Some(here));
    }
}

//! Per-mount guard evaluation
//!
//! `RouteGuard` is the shared, cheap-to-clone handle a host keeps around.
//! Every navigation to a protected view calls `mount`, and the returned
//! `Mount` owns that navigation's state, liveness flag and one-shot
//! notification latch. Dropping a `Mount` unmounts it.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use session_provider::{FailureKind, SessionProvider, StepOutcome};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::effects::{GuardEffects, Notification, Redirect};
use crate::location::Location;
use crate::render::{Rendered, guard_view};
use crate::state::{AuthState, GuardAction, GuardEvent, GuardState, Step, handle_event};

const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// Public entry path unauthenticated users are sent to
    pub entry_path: String,
    /// Upper bound on one step; expiry counts as a network failure
    pub step_timeout: Duration,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            entry_path: "/".to_string(),
            step_timeout: DEFAULT_STEP_TIMEOUT,
        }
    }
}

#[derive(Clone)]
pub struct RouteGuard {
    provider: Arc<dyn SessionProvider>,
    effects: Arc<dyn GuardEffects>,
    config: Arc<GuardConfig>,
}

impl RouteGuard {
    pub fn new(
        provider: Arc<dyn SessionProvider>,
        effects: Arc<dyn GuardEffects>,
        config: GuardConfig,
    ) -> Self {
        Self {
            provider,
            effects,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Start guarding a navigation to `location`. Nothing runs until
    /// `evaluate` (or `spawn_evaluation`) is called.
    pub fn mount(&self, location: Location) -> Mount {
        let id = Uuid::new_v4();
        debug!(mount_id = %id, path = location.path(), provider = self.provider.id(), "guard mounted");
        Mount {
            inner: Arc::new(MountInner {
                id,
                location,
                guard: self.clone(),
                state: Mutex::new(GuardState::Idle),
                alive: AtomicBool::new(true),
                started: AtomicBool::new(false),
                notified: AtomicBool::new(false),
            }),
        }
    }
}

/// One navigation's guard instance.
pub struct Mount {
    inner: Arc<MountInner>,
}

struct MountInner {
    id: Uuid,
    location: Location,
    guard: RouteGuard,
    state: Mutex<GuardState>,
    alive: AtomicBool,
    started: AtomicBool,
    notified: AtomicBool,
}

impl Mount {
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// The location as mounted, callback code included.
    pub fn location(&self) -> &Location {
        &self.inner.location
    }

    pub fn guard_state(&self) -> GuardState {
        self.inner.state.lock().clone()
    }

    pub fn state(&self) -> AuthState {
        self.inner.state.lock().auth_state()
    }

    /// Run the session chain to completion and return the resulting state.
    ///
    /// The chain runs at most once per mount. Later calls return the current
    /// state without touching the provider, which is `Unknown` while the
    /// first evaluation is still in flight.
    pub async fn evaluate(&self) -> AuthState {
        self.inner.run().await
    }

    /// `evaluate` on a background task, for hosts that keep rendering while
    /// the check runs.
    pub fn spawn_evaluation(&self) -> JoinHandle<AuthState> {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.run().await })
    }

    /// Render through the guard. May be called any number of times; effects
    /// are never re-issued by rendering.
    pub fn render<R>(&self, view: impl FnOnce() -> R) -> Rendered<R> {
        guard_view(
            self.state(),
            &self.inner.location,
            &self.inner.guard.config.entry_path,
            view,
        )
    }

    /// Stop accepting results. An in-flight step still completes, but its
    /// outcome changes nothing and triggers no effects.
    pub fn unmount(&self) {
        if self.inner.alive.swap(false, Ordering::SeqCst) {
            debug!(mount_id = %self.inner.id, "guard unmounted");
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.is_alive()
    }
}

impl Drop for Mount {
    fn drop(&mut self) {
        self.unmount();
    }
}

impl MountInner {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn current(&self) -> AuthState {
        self.state.lock().auth_state()
    }

    async fn run(&self) -> AuthState {
        if !self.is_alive() || self.started.swap(true, Ordering::SeqCst) {
            return self.current();
        }

        let code = self.location.callback_code();
        if code.is_some() {
            // Before any await: a reload must never resubmit the code.
            let clean = self.location.without_callback_code();
            self.guard.effects.replace_location(&clean);
            debug!(mount_id = %self.id, location = %clean, "stripped callback code");
        }

        let exchange_code = code.is_some() && self.guard.provider.cross_domain();
        let (mut state, mut action) =
            handle_event(GuardState::Idle, GuardEvent::Mounted { exchange_code });
        *self.state.lock() = state.clone();

        loop {
            match action {
                GuardAction::Run(step) => {
                    let outcome = self.run_step(step, code.as_deref()).await;
                    if !self.is_alive() {
                        debug!(mount_id = %self.id, step = step.label(), "unmounted mid-step, result discarded");
                        return self.current();
                    }
                    let event = match outcome {
                        Ok(()) => GuardEvent::StepSucceeded,
                        Err(kind) => {
                            debug!(mount_id = %self.id, step = step.label(), kind = kind.label(), "step failed");
                            GuardEvent::StepFailed(kind)
                        }
                    };
                    (state, action) = handle_event(state, event);
                    *self.state.lock() = state.clone();
                }
                GuardAction::Settle => {
                    self.settle(&state);
                    break;
                }
                GuardAction::None => break,
            }
        }

        state.auth_state()
    }

    /// One step, isolated: a timeout or a panic inside the provider becomes
    /// an ordinary failure.
    async fn run_step(&self, step: Step, code: Option<&str>) -> StepOutcome {
        let provider = &self.guard.provider;
        let work = async move {
            match step {
                // Only scheduled when a code is present
                Step::AbsorbCallback => match code {
                    Some(code) => match provider.exchange_code(code).await {
                        Ok(()) => provider.probe_profile().await,
                        Err(kind) => Err(kind),
                    },
                    None => Err(FailureKind::Malformed),
                },
                Step::Validate => provider.validate().await,
                Step::Refresh => provider.refresh().await,
                Step::Probe => provider.probe_profile().await,
            }
        };

        let timeout = self.guard.config.step_timeout;
        match tokio::time::timeout(timeout, AssertUnwindSafe(work).catch_unwind()).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => {
                error!(mount_id = %self.id, step = step.label(), "session step panicked");
                Err(FailureKind::Server)
            }
            Err(_) => {
                warn!(
                    mount_id = %self.id,
                    step = step.label(),
                    timeout_secs = timeout.as_secs_f64(),
                    "session step timed out"
                );
                Err(FailureKind::Network)
            }
        }
    }

    fn settle(&self, state: &GuardState) {
        if !self.is_alive() {
            return;
        }
        match state {
            GuardState::Authenticated { via } => {
                info!(mount_id = %self.id, path = self.location.path(), via = via.label(), "session authenticated");
            }
            GuardState::Unauthenticated { last_failure } => {
                let entry_path = &self.guard.config.entry_path;
                if self.location.path() == entry_path.as_str() {
                    info!(mount_id = %self.id, kind = last_failure.label(), "unauthenticated on entry path");
                    return;
                }
                if self.notified.swap(true, Ordering::SeqCst) {
                    return;
                }

                let notification = match last_failure {
                    FailureKind::Network => Notification::SessionError,
                    _ => Notification::SignInRequired,
                };
                let redirect = Redirect {
                    to: entry_path.clone(),
                    from: self.location.without_callback_code(),
                };
                info!(
                    mount_id = %self.id,
                    path = self.location.path(),
                    kind = last_failure.label(),
                    to = %redirect.to,
                    "session check failed, redirecting"
                );
                self.guard.effects.notify(notification);
                self.guard.effects.redirect(&redirect);
            }
            GuardState::Idle | GuardState::Checking(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::{Effect, RecordedEffects};
    use session_provider::StepFuture;
    use tokio::sync::Notify;
    use url::Url;

    /// Pauses the first step until released.
    struct Gate {
        entered: Notify,
        release: Notify,
    }

    struct ScriptedProvider {
        cross_domain: bool,
        validate: StepOutcome,
        refresh: StepOutcome,
        probe: StepOutcome,
        exchange: StepOutcome,
        calls: Mutex<Vec<&'static str>>,
        gate: Option<Arc<Gate>>,
        panic_on: Option<&'static str>,
        stall_on: Option<&'static str>,
    }

    impl ScriptedProvider {
        fn failing() -> Self {
            Self {
                cross_domain: false,
                validate: Err(FailureKind::MissingToken),
                refresh: Err(FailureKind::Unauthorized),
                probe: Err(FailureKind::Unauthorized),
                exchange: Err(FailureKind::Server),
                calls: Mutex::new(Vec::new()),
                gate: None,
                panic_on: None,
                stall_on: None,
            }
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().clone()
        }

        fn step(&self, name: &'static str, outcome: StepOutcome) -> StepFuture<'_> {
            self.calls.lock().push(name);
            Box::pin(async move {
                if self.panic_on == Some(name) {
                    panic!("scripted panic in {name}");
                }
                if self.stall_on == Some(name) {
                    std::future::pending::<()>().await;
                }
                if let Some(gate) = &self.gate {
                    gate.entered.notify_one();
                    gate.release.notified().await;
                }
                outcome
            })
        }
    }

    impl SessionProvider for ScriptedProvider {
        fn id(&self) -> &str {
            "scripted"
        }

        fn cross_domain(&self) -> bool {
            self.cross_domain
        }

        fn validate(&self) -> StepFuture<'_> {
            self.step("validate", self.validate)
        }

        fn refresh(&self) -> StepFuture<'_> {
            self.step("refresh", self.refresh)
        }

        fn probe_profile(&self) -> StepFuture<'_> {
            self.step("probe", self.probe)
        }

        fn exchange_code<'a>(&'a self, _code: &'a str) -> StepFuture<'a> {
            self.step("exchange", self.exchange)
        }
    }

    fn at(target: &str) -> Location {
        Location::resolve(&Url::parse("http://app.local").unwrap(), target).unwrap()
    }

    fn guard_with(provider: ScriptedProvider) -> (RouteGuard, Arc<ScriptedProvider>, Arc<RecordedEffects>) {
        let provider = Arc::new(provider);
        let effects = Arc::new(RecordedEffects::new());
        let guard = RouteGuard::new(provider.clone(), effects.clone(), GuardConfig::default());
        (guard, provider, effects)
    }

    #[tokio::test]
    async fn all_steps_failing_redirects_and_notifies_once() {
        let (guard, provider, effects) = guard_with(ScriptedProvider::failing());
        let mount = guard.mount(at("/dashboard"));

        assert_eq!(mount.evaluate().await, AuthState::Unauthenticated);
        assert_eq!(provider.calls(), vec!["validate", "refresh", "probe"]);
        assert_eq!(effects.notifications(), vec![Notification::SignInRequired]);
        let redirects = effects.redirects();
        assert_eq!(redirects.len(), 1);
        assert_eq!(redirects[0].to, "/");
        assert_eq!(redirects[0].from.relative(), "/dashboard");
    }

    #[tokio::test]
    async fn valid_token_short_circuits() {
        let (guard, provider, effects) = guard_with(ScriptedProvider {
            validate: Ok(()),
            ..ScriptedProvider::failing()
        });
        let mount = guard.mount(at("/dashboard"));

        assert_eq!(mount.evaluate().await, AuthState::Authenticated);
        assert_eq!(provider.calls(), vec!["validate"]);
        assert!(effects.effects().is_empty());
        assert_eq!(mount.guard_state(), GuardState::Authenticated { via: Step::Validate });
    }

    #[tokio::test]
    async fn successful_refresh_skips_probe() {
        let (guard, provider, _effects) = guard_with(ScriptedProvider {
            refresh: Ok(()),
            ..ScriptedProvider::failing()
        });
        let mount = guard.mount(at("/dashboard"));

        assert_eq!(mount.evaluate().await, AuthState::Authenticated);
        assert_eq!(provider.calls(), vec!["validate", "refresh"]);
    }

    #[tokio::test]
    async fn probe_is_the_last_resort() {
        let (guard, provider, _effects) = guard_with(ScriptedProvider {
            probe: Ok(()),
            ..ScriptedProvider::failing()
        });
        let mount = guard.mount(at("/agents"));

        assert_eq!(mount.evaluate().await, AuthState::Authenticated);
        assert_eq!(provider.calls(), vec!["validate", "refresh", "probe"]);
        assert_eq!(mount.guard_state(), GuardState::Authenticated { via: Step::Probe });
    }

    #[tokio::test]
    async fn rerender_does_not_renotify() {
        let (guard, provider, effects) = guard_with(ScriptedProvider::failing());
        let mount = guard.mount(at("/dashboard"));
        mount.evaluate().await;

        for _ in 0..3 {
            assert_eq!(mount.render(|| "content"), Rendered::Redirecting { to: "/".into() });
        }
        // A repeat evaluation neither re-runs the chain nor re-notifies.
        assert_eq!(mount.evaluate().await, AuthState::Unauthenticated);

        assert_eq!(effects.notifications().len(), 1);
        assert_eq!(effects.redirects().len(), 1);
        assert_eq!(provider.calls().len(), 3);
    }

    #[tokio::test]
    async fn entry_path_never_redirects() {
        let (guard, _provider, effects) = guard_with(ScriptedProvider::failing());
        let mount = guard.mount(at("/"));

        assert_eq!(mount.evaluate().await, AuthState::Unauthenticated);
        assert!(effects.effects().is_empty());
        assert_eq!(mount.render(|| "content"), Rendered::Nothing);
    }

    #[tokio::test]
    async fn same_domain_code_is_stripped_without_exchange() {
        let (guard, provider, effects) = guard_with(ScriptedProvider {
            validate: Ok(()),
            ..ScriptedProvider::failing()
        });
        let mount = guard.mount(at("/dashboard?code=XYZ&tab=agents"));

        assert_eq!(mount.evaluate().await, AuthState::Authenticated);
        assert_eq!(provider.calls(), vec!["validate"]);
        let visible = effects.current_location().unwrap();
        assert_eq!(visible.relative(), "/dashboard?tab=agents");
        assert_eq!(effects.effects()[0], Effect::ReplaceLocation(visible));
    }

    #[tokio::test]
    async fn cross_domain_exchange_authenticates_without_validate() {
        let (guard, provider, effects) = guard_with(ScriptedProvider {
            cross_domain: true,
            exchange: Ok(()),
            probe: Ok(()),
            ..ScriptedProvider::failing()
        });
        let mount = guard.mount(at("/dashboard?code=XYZ"));

        assert_eq!(mount.evaluate().await, AuthState::Authenticated);
        assert_eq!(provider.calls(), vec!["exchange", "probe"]);
        assert_eq!(mount.guard_state(), GuardState::Authenticated { via: Step::AbsorbCallback });
        assert_eq!(effects.current_location().unwrap().relative(), "/dashboard");
    }

    #[tokio::test]
    async fn failed_exchange_falls_through_to_the_chain() {
        let (guard, provider, effects) = guard_with(ScriptedProvider {
            cross_domain: true,
            ..ScriptedProvider::failing()
        });
        let mount = guard.mount(at("/dashboard?code=XYZ"));

        assert_eq!(mount.evaluate().await, AuthState::Unauthenticated);
        assert_eq!(provider.calls(), vec!["exchange", "validate", "refresh", "probe"]);
        assert_eq!(effects.current_location().unwrap().relative(), "/dashboard");
        // Redirect carries the cleaned location.
        assert_eq!(effects.redirects()[0].from.relative(), "/dashboard");
    }

    #[tokio::test]
    async fn exchange_then_failed_probe_falls_through() {
        let (guard, provider, _effects) = guard_with(ScriptedProvider {
            cross_domain: true,
            exchange: Ok(()),
            refresh: Ok(()),
            ..ScriptedProvider::failing()
        });
        let mount = guard.mount(at("/dashboard?code=XYZ"));

        assert_eq!(mount.evaluate().await, AuthState::Authenticated);
        assert_eq!(provider.calls(), vec!["exchange", "probe", "validate", "refresh"]);
    }

    #[tokio::test]
    async fn network_failure_shows_session_error() {
        let (guard, _provider, effects) = guard_with(ScriptedProvider {
            probe: Err(FailureKind::Network),
            ..ScriptedProvider::failing()
        });
        let mount = guard.mount(at("/dashboard"));

        mount.evaluate().await;
        assert_eq!(effects.notifications(), vec![Notification::SessionError]);
        assert_eq!(
            mount.guard_state(),
            GuardState::Unauthenticated { last_failure: FailureKind::Network }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_step_times_out_and_falls_through() {
        let (guard, provider, effects) = guard_with(ScriptedProvider {
            stall_on: Some("refresh"),
            probe: Ok(()),
            ..ScriptedProvider::failing()
        });
        let mount = guard.mount(at("/dashboard"));

        assert_eq!(mount.evaluate().await, AuthState::Authenticated);
        assert_eq!(provider.calls(), vec!["validate", "refresh", "probe"]);
        assert!(effects.effects().is_empty());
    }

    #[tokio::test]
    async fn panicking_step_counts_as_failure() {
        let (guard, provider, _effects) = guard_with(ScriptedProvider {
            panic_on: Some("validate"),
            refresh: Ok(()),
            ..ScriptedProvider::failing()
        });
        let mount = guard.mount(at("/dashboard"));

        assert_eq!(mount.evaluate().await, AuthState::Authenticated);
        assert_eq!(provider.calls(), vec!["validate", "refresh"]);
    }

    #[tokio::test]
    async fn unmount_mid_step_discards_result() {
        let gate = Arc::new(Gate {
            entered: Notify::new(),
            release: Notify::new(),
        });
        let (guard, provider, effects) = guard_with(ScriptedProvider {
            validate: Ok(()),
            gate: Some(gate.clone()),
            ..ScriptedProvider::failing()
        });
        let mount = guard.mount(at("/dashboard"));

        let handle = mount.spawn_evaluation();
        gate.entered.notified().await;
        assert_eq!(mount.render(|| "content"), Rendered::Loading);

        mount.unmount();
        gate.release.notify_one();

        assert_eq!(handle.await.unwrap(), AuthState::Unknown);
        assert_eq!(mount.guard_state(), GuardState::Checking(Step::Validate));
        assert_eq!(provider.calls(), vec!["validate"]);
        assert!(effects.effects().is_empty());
    }

    #[tokio::test]
    async fn dropped_mount_never_redirects() {
        let gate = Arc::new(Gate {
            entered: Notify::new(),
            release: Notify::new(),
        });
        let (guard, _provider, effects) = guard_with(ScriptedProvider {
            gate: Some(gate.clone()),
            ..ScriptedProvider::failing()
        });
        let mount = guard.mount(at("/dashboard"));
        let handle = mount.spawn_evaluation();
        gate.entered.notified().await;

        drop(mount);
        gate.release.notify_one();

        handle.await.unwrap();
        assert!(effects.redirects().is_empty());
        assert!(effects.notifications().is_empty());
    }

    #[tokio::test]
    async fn unmounted_before_evaluate_does_nothing() {
        let (guard, provider, effects) = guard_with(ScriptedProvider::failing());
        let mount = guard.mount(at("/dashboard?code=XYZ"));
        mount.unmount();

        assert_eq!(mount.evaluate().await, AuthState::Unknown);
        assert!(!mount.is_mounted());
        assert!(provider.calls().is_empty());
        assert!(effects.effects().is_empty());
    }

    #[tokio::test]
    async fn each_mount_evaluates_independently() {
        let (guard, provider, effects) = guard_with(ScriptedProvider::failing());

        let first = guard.mount(at("/dashboard"));
        first.evaluate().await;
        let second = guard.mount(at("/agents"));
        second.evaluate().await;

        assert_ne!(first.id(), second.id());
        assert_eq!(provider.calls().len(), 6);
        assert_eq!(effects.notifications().len(), 2);
    }
}

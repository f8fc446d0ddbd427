//! On/off supervision for a single ability.
//!
//! Each successful [`AbilitySupervisor::on`] opens a *session*: a fresh
//! [`CancellationToken`] paired with a one-shot completion channel. The
//! capability reports its termination on that channel exactly once, and a
//! per-session watcher task classifies the termination:
//!
//! | Token cancelled when the result arrives? | Event |
//! |---|---|
//! | yes (someone called `off()`) | `ability.stopped` |
//! | no (it ended on its own) | `ability.crashed` |
//!
//! The returned error value never decides the classification. A Runnable that
//! returns an error in response to cancellation still counts as stopped.

use crate::ability::capability::{Ability, Capability, CapabilityKind};
use crate::ability::event::{AbilityEvent, AbilityEventKind, EventSink};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Per-ability options supplied by the owner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AbilityOptions {
    /// Whether the owner should switch the ability on right after creating it.
    ///
    /// The supervisor itself never acts on this flag.
    pub auto_start: bool,
}

/// Live execution session. Token and completion channel are always created
/// together in `on()`.
struct Session {
    id: u64,
    cancel: CancellationToken,
}

#[derive(Default)]
struct SessionState {
    session: Option<Session>,
    /// Id of the most recently opened session.
    last_id: u64,
}

impl SessionState {
    fn is_on(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| !session.cancel.is_cancelled())
    }
}

type SharedState = Arc<Mutex<SessionState>>;

fn lock_state(state: &SharedState) -> MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Supervises one named ability: switching it on and off, observing its
/// termination and reporting lifecycle events to the sink.
pub struct AbilitySupervisor {
    name: Arc<str>,
    capability: Capability,
    options: AbilityOptions,
    sink: Arc<dyn EventSink>,
    state: SharedState,
}

impl AbilitySupervisor {
    /// Create a supervisor. The ability starts switched off.
    pub fn new(
        name: impl Into<String>,
        implementation: Arc<dyn Ability>,
        sink: Arc<dyn EventSink>,
        options: AbilityOptions,
    ) -> Self {
        let name: String = name.into();
        Self {
            name: Arc::from(name),
            capability: Capability::resolve(&implementation),
            options,
            sink,
            state: Arc::new(Mutex::new(SessionState::default())),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn options(&self) -> AbilityOptions {
        self.options
    }

    #[must_use]
    pub fn capability_kind(&self) -> CapabilityKind {
        self.capability.kind()
    }

    /// Whether a session is live (opened and not yet cancelled).
    #[must_use]
    pub fn is_on(&self) -> bool {
        lock_state(&self.state).is_on()
    }

    /// Switch the ability on. No-op when already on.
    ///
    /// Must be called from within a tokio runtime. Returns as soon as the
    /// session is started; the outcome is reported through the event sink.
    pub fn on(&self) {
        // Held across test-and-set and until `ability.started` is emitted.
        let mut state = lock_state(&self.state);
        if state.is_on() {
            return;
        }

        debug!(ability = %self.name, "switching ability on");

        state.last_id += 1;
        let id = state.last_id;
        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = oneshot::channel();
        state.session = Some(Session {
            id,
            cancel: cancel.clone(),
        });

        let watcher = Watcher {
            name: Arc::clone(&self.name),
            sink: Arc::clone(&self.sink),
            state: Arc::clone(&self.state),
            id,
            cancel: cancel.clone(),
        };
        tokio::spawn(watcher.watch(done_rx));

        self.dispatch(cancel, done_tx);

        info!(
            ability = %self.name,
            capability = %self.capability.kind(),
            "ability switched on"
        );
        AbilityEvent::new(AbilityEventKind::Started, &*self.name).emit(self.sink.as_ref());
    }

    /// Switch the ability off. No-op when already off.
    ///
    /// Only requests cancellation; teardown and the `ability.stopped` event
    /// happen asynchronously in the session watcher.
    pub fn off(&self) {
        let state = lock_state(&self.state);
        let Some(session) = state
            .session
            .as_ref()
            .filter(|session| !session.cancel.is_cancelled())
        else {
            return;
        };

        debug!(ability = %self.name, session = session.id, "switching ability off");
        session.cancel.cancel();
    }

    fn dispatch(&self, cancel: CancellationToken, done_tx: oneshot::Sender<Result<()>>) {
        match &self.capability {
            Capability::Activable(activable) => {
                activable.activate(true);
                let activable = Arc::clone(activable);
                tokio::spawn(async move {
                    cancel.cancelled().await;
                    activable.activate(false);
                    let _ = done_tx.send(Ok(()));
                });
            }
            Capability::Runnable(runnable) => {
                let runnable = Arc::clone(runnable);
                tokio::spawn(async move {
                    let result = runnable.run(cancel).await;
                    let _ = done_tx.send(result);
                });
            }
            Capability::Inert => {
                tokio::spawn(async move {
                    cancel.cancelled().await;
                    let _ = done_tx.send(Ok(()));
                });
            }
        }
    }
}

impl std::fmt::Debug for AbilitySupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AbilitySupervisor")
            .field("name", &self.name)
            .field("capability", &self.capability.kind())
            .field("options", &self.options)
            .field("on", &self.is_on())
            .finish()
    }
}

/// Classify a termination by whether cancellation had been requested when
/// the completion result was received.
fn classify(cancel_requested: bool) -> AbilityEventKind {
    if cancel_requested {
        AbilityEventKind::Stopped
    } else {
        AbilityEventKind::Crashed
    }
}

/// Waits for one session to end and reports how it ended.
struct Watcher {
    name: Arc<str>,
    sink: Arc<dyn EventSink>,
    state: SharedState,
    id: u64,
    cancel: CancellationToken,
}

impl Watcher {
    async fn watch(self, done_rx: oneshot::Receiver<Result<()>>) {
        // `on()` keeps the lock until `ability.started` is out, so taking it
        // here orders every terminal event after the start event.
        drop(lock_state(&self.state));

        let outcome = done_rx.await;
        let kind = classify(self.cancel.is_cancelled());
        self.cancel.cancel();

        {
            let mut state = lock_state(&self.state);
            if state
                .session
                .as_ref()
                .is_some_and(|session| session.id == self.id)
            {
                state.session = None;
            }
        }

        let mut event = AbilityEvent::new(kind, &*self.name);
        match (kind, outcome) {
            (AbilityEventKind::Crashed, Ok(Ok(()))) => {
                error!(ability = %self.name, "ability crashed: exited without being switched off");
            }
            (AbilityEventKind::Crashed, Ok(Err(e))) => {
                error!(ability = %self.name, error = %e, "ability crashed");
                event = event.with_error(e.to_string());
            }
            (AbilityEventKind::Crashed, Err(_)) => {
                let reason = "ability task ended without reporting a result";
                error!(ability = %self.name, "ability crashed: {reason}");
                event = event.with_error(reason);
            }
            (_, Ok(Err(e))) => {
                debug!(
                    ability = %self.name,
                    error = %e,
                    "ability returned an error while stopping"
                );
                info!(ability = %self.name, "ability switched off");
            }
            _ => {
                info!(ability = %self.name, "ability switched off");
            }
        }
        event.emit(self.sink.as_ref());
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::ability::capability::{Activable, Runnable};
    use crate::error::BrainError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct ChannelSink(mpsc::UnboundedSender<(String, serde_json::Value)>);

    impl EventSink for ChannelSink {
        fn send(&self, event: &str, payload: serde_json::Value) {
            let _ = self.0.send((event.to_owned(), payload));
        }
    }

    fn channel_sink() -> (
        Arc<dyn EventSink>,
        mpsc::UnboundedReceiver<(String, serde_json::Value)>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(ChannelSink(tx)), rx)
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<(String, serde_json::Value)>) -> String {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("sink closed")
            .0
    }

    /// Returns an error once cancelled.
    struct ErrOnCancel;

    #[async_trait]
    impl Runnable for ErrOnCancel {
        async fn run(&self, cancel: CancellationToken) -> Result<()> {
            cancel.cancelled().await;
            Err(BrainError::Ability("interrupted".into()))
        }
    }

    impl Ability for ErrOnCancel {
        fn as_runnable(self: Arc<Self>) -> Option<Arc<dyn Runnable>> {
            Some(self)
        }
    }

    /// Finishes immediately with success.
    struct FinishesAtOnce;

    #[async_trait]
    impl Runnable for FinishesAtOnce {
        async fn run(&self, _cancel: CancellationToken) -> Result<()> {
            Ok(())
        }
    }

    impl Ability for FinishesAtOnce {
        fn as_runnable(self: Arc<Self>) -> Option<Arc<dyn Runnable>> {
            Some(self)
        }
    }

    struct Panics;

    #[async_trait]
    impl Runnable for Panics {
        async fn run(&self, _cancel: CancellationToken) -> Result<()> {
            panic!("boom");
        }
    }

    impl Ability for Panics {
        fn as_runnable(self: Arc<Self>) -> Option<Arc<dyn Runnable>> {
            Some(self)
        }
    }

    #[derive(Default)]
    struct Toggle {
        on: AtomicUsize,
        off: AtomicUsize,
    }

    impl Activable for Toggle {
        fn activate(&self, enabled: bool) {
            if enabled {
                self.on.fetch_add(1, Ordering::SeqCst);
            } else {
                self.off.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    impl Ability for Toggle {
        fn as_activable(self: Arc<Self>) -> Option<Arc<dyn Activable>> {
            Some(self)
        }
    }

    struct Nothing;

    impl Ability for Nothing {}

    #[test]
    fn classify_keys_off_cancellation_only() {
        assert_eq!(classify(true), AbilityEventKind::Stopped);
        assert_eq!(classify(false), AbilityEventKind::Crashed);
    }

    #[tokio::test]
    async fn error_returned_after_cancellation_is_a_clean_stop() {
        let (sink, mut rx) = channel_sink();
        let ability = AbilitySupervisor::new(
            "Recorder",
            Arc::new(ErrOnCancel),
            sink,
            AbilityOptions::default(),
        );

        ability.on();
        assert_eq!(next_event(&mut rx).await, "ability.started");
        ability.off();
        assert_eq!(next_event(&mut rx).await, "ability.stopped");
        assert!(!ability.is_on());
    }

    #[tokio::test]
    async fn successful_return_without_off_is_a_crash() {
        let (sink, mut rx) = channel_sink();
        let ability = AbilitySupervisor::new(
            "Once",
            Arc::new(FinishesAtOnce),
            sink,
            AbilityOptions::default(),
        );

        ability.on();
        assert_eq!(next_event(&mut rx).await, "ability.started");
        assert_eq!(next_event(&mut rx).await, "ability.crashed");
        assert!(!ability.is_on());
    }

    #[tokio::test]
    async fn panicking_runnable_is_reported_as_crash() {
        let (sink, mut rx) = channel_sink();
        let ability =
            AbilitySupervisor::new("Panics", Arc::new(Panics), sink, AbilityOptions::default());

        ability.on();
        assert_eq!(next_event(&mut rx).await, "ability.started");
        let (event, payload) = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, "ability.crashed");
        assert!(payload["error"].is_string());
        assert!(!ability.is_on());
    }

    #[tokio::test]
    async fn inert_ability_stays_on_until_switched_off() {
        let (sink, mut rx) = channel_sink();
        let ability =
            AbilitySupervisor::new("Inert", Arc::new(Nothing), sink, AbilityOptions::default());
        assert_eq!(ability.capability_kind(), CapabilityKind::Inert);

        ability.on();
        assert_eq!(next_event(&mut rx).await, "ability.started");
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(ability.is_on());
        assert!(rx.try_recv().is_err());

        ability.off();
        assert_eq!(next_event(&mut rx).await, "ability.stopped");
    }

    #[tokio::test]
    async fn activable_is_toggled_once_per_cycle() {
        let (sink, mut rx) = channel_sink();
        let toggle = Arc::new(Toggle::default());
        let ability = AbilitySupervisor::new(
            "Toggle",
            Arc::clone(&toggle) as Arc<dyn Ability>,
            sink,
            AbilityOptions::default(),
        );

        ability.on();
        ability.on();
        assert_eq!(toggle.on.load(Ordering::SeqCst), 1);
        assert_eq!(next_event(&mut rx).await, "ability.started");

        ability.off();
        ability.off();
        assert_eq!(next_event(&mut rx).await, "ability.stopped");
        assert_eq!(toggle.off.load(Ordering::SeqCst), 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: AbilityOptions = serde_json::from_str("{}").unwrap();
        assert!(!options.auto_start);
        let options: AbilityOptions = serde_json::from_str(r#"{"auto_start": true}"#).unwrap();
        assert!(options.auto_start);
    }
}

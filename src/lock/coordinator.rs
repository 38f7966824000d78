use std::sync::{Arc, Mutex as StdMutex};

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::{sync::Mutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    energy::{DepletionSink, EnergyConfig, EnergyLedger},
    platform::Notifier,
};

use super::{
    actuator::EnforcementActuator,
    alerts::{LockedAlert, StatusAlert},
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockState {
    pub locked: bool,
    pub notification_shown: bool,
    pub last_energy: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AlertAction {
    Show,
    Hide,
    Status(i64),
}

/// Derives the locked state from the ledger's energy stream and keeps the
/// locked alert in step with it.
#[derive(Clone)]
pub struct LockCoordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    ledger: EnergyLedger,
    notifier: Arc<dyn Notifier>,
    actuator: Arc<EnforcementActuator>,
    config: EnergyConfig,
    state: StdMutex<LockState>,
    observer: Mutex<Option<(JoinHandle<()>, CancellationToken)>>,
}

impl LockCoordinator {
    pub fn new(
        ledger: EnergyLedger,
        notifier: Arc<dyn Notifier>,
        actuator: Arc<EnforcementActuator>,
        config: EnergyConfig,
    ) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                ledger,
                notifier,
                actuator,
                config,
                state: StdMutex::new(LockState::default()),
                observer: Mutex::new(None),
            }),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.state().locked
    }

    pub fn notification_shown(&self) -> bool {
        self.state().notification_shown
    }

    pub fn state(&self) -> LockState {
        *self.inner.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Start observing the ledger. Waits for the ledger's initial load (bounded
    /// retries) before the first evaluation; if it never finishes the
    /// coordinator stays unlocked until the next energy change.
    pub async fn start(&self) {
        let mut observer = self.inner.observer.lock().await;
        if observer.is_some() {
            return;
        }

        let cancel_token = CancellationToken::new();
        let coordinator = self.clone();
        let token = cancel_token.clone();
        let handle = tokio::spawn(async move { coordinator.observe(token).await });
        *observer = Some((handle, cancel_token));
    }

    pub async fn stop(&self) -> Result<()> {
        let observer = self.inner.observer.lock().await.take();
        if let Some((handle, token)) = observer {
            token.cancel();
            handle.await.context("lock observer task failed to join")?;
        }

        if self.notification_shown() {
            self.perform(AlertAction::Hide).await;
        }
        Ok(())
    }

    /// Apply an observed energy value. Repeating a value changes nothing
    /// unless the previous alert update failed, in which case it is retried.
    pub async fn handle_energy(&self, energy: i64) {
        let actions = {
            let mut state = self.inner.state.lock().unwrap_or_else(|p| p.into_inner());
            transition(&mut state, energy)
        };
        for action in actions {
            self.perform(action).await;
        }
    }

    async fn observe(self, cancel_token: CancellationToken) {
        let mut rx = self.inner.ledger.subscribe();

        match self.wait_for_initial_energy(&cancel_token).await {
            Some(energy) => {
                rx.borrow_and_update();
                self.handle_energy(energy).await;
            }
            None if cancel_token.is_cancelled() => return,
            None => log_warn!("Ledger not initialized; starting unlocked"),
        }

        loop {
            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let energy = *rx.borrow_and_update();
                    self.handle_energy(energy).await;
                }
                _ = cancel_token.cancelled() => break,
            }
        }
        log_debug!("lock observer stopped");
    }

    async fn wait_for_initial_energy(&self, cancel_token: &CancellationToken) -> Option<i64> {
        for attempt in 0..self.inner.config.coordinator_init_retries {
            if self.inner.ledger.is_initialized() {
                return Some(self.inner.ledger.current_energy());
            }
            log_debug!("Waiting for ledger initialization (attempt {})", attempt + 1);
            tokio::select! {
                _ = tokio::time::sleep(self.inner.config.coordinator_init_delay) => {}
                _ = cancel_token.cancelled() => return None,
            }
        }
        self.inner
            .ledger
            .is_initialized()
            .then(|| self.inner.ledger.current_energy())
    }

    /// Run one notifier call; the shown flag follows only successful calls.
    async fn perform(&self, action: AlertAction) {
        let notifier = &self.inner.notifier;
        let result = match action {
            AlertAction::Show => {
                log_info!("Energy depleted; bad-habit apps locked");
                notifier.show_depleted_alert(&LockedAlert::default())
            }
            AlertAction::Hide => {
                log_info!("Energy restored; bad-habit apps unlocked");
                notifier.hide_depleted_alert()
            }
            AlertAction::Status(energy) => {
                let max = self.inner.ledger.max_energy().await;
                notifier.show_status(&StatusAlert::new(energy, max))
            }
        };
        match result {
            Ok(()) => {
                let mut state = self.inner.state.lock().unwrap_or_else(|p| p.into_inner());
                match action {
                    AlertAction::Show => state.notification_shown = true,
                    AlertAction::Hide => state.notification_shown = false,
                    AlertAction::Status(_) => {}
                }
            }
            Err(err) => log_warn!("Notification update failed: {err:?}"),
        }
    }
}

/// Locks right away and blocks the offending app. The alert is left to the
/// energy observer, which sees the same zero on the watch channel.
impl DepletionSink for LockCoordinator {
    fn energy_depleted(&self, package_id: &str) {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .locked = true;

        let _ = self
            .inner
            .actuator
            .dispatch_immediate_block(package_id.to_string());
    }
}

/// Updates the lock flag and picks the notifier calls. `notification_shown`
/// is left alone here; `perform` sets it once the notifier accepts.
fn transition(state: &mut LockState, energy: i64) -> Vec<AlertAction> {
    let mut actions = Vec::new();

    if energy <= 0 {
        state.locked = true;
        if !state.notification_shown {
            actions.push(AlertAction::Show);
        }
    } else {
        state.locked = false;
        if state.notification_shown {
            actions.push(AlertAction::Hide);
        }
        if state.last_energy != Some(energy) {
            actions.push(AlertAction::Status(energy));
        }
    }

    state.last_energy = Some(energy);
    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::HabitApp,
        platform::AccessibilityRegistry,
        testing::{MemoryStore, RecordingChannel, RecordingNotifier, ScriptedForeground},
    };
    use std::time::Duration;

    struct Harness {
        ledger: EnergyLedger,
        coordinator: LockCoordinator,
        notifier: Arc<RecordingNotifier>,
        channel: Arc<RecordingChannel>,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        store.put_habit(HabitApp::bad("com.video", "Video"));
        let config = EnergyConfig::default();
        let ledger = EnergyLedger::new(
            store.clone(),
            Arc::new(ScriptedForeground::new()),
            config.clone(),
            180,
        );
        let registry = AccessibilityRegistry::new();
        let channel = Arc::new(RecordingChannel::default());
        registry.connect(channel.clone());
        let actuator = Arc::new(EnforcementActuator::new(registry, store, config.clone()));
        let notifier = Arc::new(RecordingNotifier::default());
        let coordinator = LockCoordinator::new(ledger.clone(), notifier.clone(), actuator, config);
        ledger.set_depletion_sink(Arc::new(coordinator.clone()));

        Harness {
            ledger,
            coordinator,
            notifier,
            channel,
        }
    }

    fn applied(state: &mut LockState, energy: i64) -> Vec<AlertAction> {
        let actions = transition(state, energy);
        for action in &actions {
            match action {
                AlertAction::Show => state.notification_shown = true,
                AlertAction::Hide => state.notification_shown = false,
                AlertAction::Status(_) => {}
            }
        }
        actions
    }

    #[test]
    fn transitions_are_idempotent() {
        let mut state = LockState::default();
        assert_eq!(applied(&mut state, 0), vec![AlertAction::Show]);
        assert!(applied(&mut state, 0).is_empty());
        assert_eq!(
            applied(&mut state, 5),
            vec![AlertAction::Hide, AlertAction::Status(5)]
        );
        assert!(applied(&mut state, 5).is_empty());
        assert_eq!(applied(&mut state, 4), vec![AlertAction::Status(4)]);
        assert!(!state.locked);
    }

    #[test]
    fn unconfirmed_show_is_chosen_again() {
        let mut state = LockState::default();
        assert_eq!(transition(&mut state, 0), vec![AlertAction::Show]);
        assert!(state.locked);
        assert_eq!(transition(&mut state, 0), vec![AlertAction::Show]);
    }

    #[tokio::test(start_paused = true)]
    async fn depletion_locks_shows_alert_and_blocks_once() {
        let h = harness();
        h.ledger.load_current_energy().await.unwrap();
        h.ledger.set_current_energy(1).await;
        h.coordinator.start().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!h.coordinator.is_locked());

        for _ in 0..60 {
            h.ledger.accumulate("com.video", 1).await;
        }
        assert_eq!(h.ledger.current_energy(), 0);
        assert!(h.coordinator.is_locked());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(h.notifier.shown_count(), 1);
        assert_eq!(h.channel.home_count(), 1);

        h.ledger.set_current_energy(0).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(h.notifier.shown_count(), 1);
        assert_eq!(h.channel.home_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn recovery_hides_alert() {
        let h = harness();
        h.ledger.load_current_energy().await.unwrap();
        h.coordinator.start().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(h.coordinator.is_locked(), "empty day starts locked");
        assert!(h.coordinator.notification_shown());

        h.ledger.credit(10).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(!h.coordinator.is_locked());
        assert!(!h.coordinator.notification_shown());
        assert_eq!(h.notifier.hidden_count(), 1);
        assert_eq!(h.notifier.last_status(), Some(StatusAlert::new(10, 180)));
    }

    #[tokio::test(start_paused = true)]
    async fn uninitialized_ledger_defaults_to_unlocked_after_retries() {
        let h = harness();
        h.coordinator.start().await;

        tokio::time::sleep(Duration::from_millis(4_900)).await;
        assert!(!h.coordinator.is_locked());
        assert_eq!(h.notifier.shown_count(), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        h.ledger.set_current_energy(0).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(h.coordinator.is_locked());

        h.coordinator.stop().await.unwrap();
        assert_eq!(h.notifier.hidden_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn charge_right_after_depletion_leaves_no_alert() {
        let h = harness();
        h.ledger.load_current_energy().await.unwrap();
        h.ledger.set_current_energy(1).await;
        h.coordinator.start().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        for _ in 0..60 {
            h.ledger.accumulate("com.video", 1).await;
        }
        assert!(h.coordinator.is_locked());
        h.ledger.credit(10).await;

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!h.coordinator.is_locked());
        assert!(!h.coordinator.notification_shown());
        assert_eq!(h.notifier.shown_count(), h.notifier.hidden_count());
        assert_eq!(h.notifier.last_status(), Some(StatusAlert::new(10, 180)));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_alert_is_retried_on_next_empty_value() {
        let h = harness();
        h.ledger.load_current_energy().await.unwrap();
        h.notifier.fail_show(true);
        h.coordinator.start().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(h.coordinator.is_locked());
        assert!(!h.coordinator.notification_shown());
        assert_eq!(h.notifier.shown_count(), 0);

        h.notifier.fail_show(false);
        h.ledger.set_current_energy(0).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(h.coordinator.notification_shown());
        assert_eq!(h.notifier.shown_count(), 1);
    }
}

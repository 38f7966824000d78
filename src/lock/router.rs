use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::{sync::Mutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{energy::EnergyLedger, platform::UserMessage};

use super::{actuator::EnforcementActuator, coordinator::LockCoordinator};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum SwitchDecision {
    /// Our own package or not a bad-habit app.
    Ignored,
    Block,
    WarnLowEnergy { energy: i64 },
    Record,
}

/// Priority order: empty or locked blocks, low energy warns, anything else
/// just records.
pub fn decide(energy: i64, locked: bool, low_energy_threshold: i64) -> SwitchDecision {
    if energy <= 0 || locked {
        SwitchDecision::Block
    } else if energy < low_energy_threshold {
        SwitchDecision::WarnLowEnergy { energy }
    } else {
        SwitchDecision::Record
    }
}

/// Reacts to each foreground switch, independently of the per-minute
/// settlement in the ledger.
#[derive(Clone)]
pub struct SwitchRouter {
    ledger: EnergyLedger,
    coordinator: LockCoordinator,
    actuator: Arc<EnforcementActuator>,
    observer: Arc<Mutex<Option<(JoinHandle<()>, CancellationToken)>>>,
}

impl SwitchRouter {
    pub fn new(
        ledger: EnergyLedger,
        coordinator: LockCoordinator,
        actuator: Arc<EnforcementActuator>,
    ) -> Self {
        Self {
            ledger,
            coordinator,
            actuator,
            observer: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn on_foreground_changed(&self, package_id: &str) -> SwitchDecision {
        if package_id == self.ledger.config().own_package_id {
            return SwitchDecision::Ignored;
        }
        if !self.actuator.is_bad_habit(package_id).await {
            return SwitchDecision::Ignored;
        }

        let energy = self.ledger.current_energy();
        let decision = decide(
            energy,
            self.coordinator.is_locked(),
            self.ledger.config().low_energy_threshold,
        );
        log_debug!("Switch to {package_id} at energy {energy}: {decision:?}");

        match decision {
            SwitchDecision::Block => {
                let handle = self.actuator.dispatch_force_block(package_id.to_string());
                match handle.await {
                    Ok(outcome) => log_debug!("force block of {package_id}: {outcome:?}"),
                    Err(err) => log_warn!("Block task for {package_id} failed: {err:?}"),
                }
            }
            SwitchDecision::WarnLowEnergy { energy } => {
                self.actuator.show_message(&UserMessage::LowEnergy { energy });
                self.ledger.record_app_switch(package_id).await;
            }
            SwitchDecision::Record => self.ledger.record_app_switch(package_id).await,
            SwitchDecision::Ignored => {}
        }
        decision
    }

    /// Follow the ledger's foreground changes until stopped.
    pub async fn start(&self) {
        let mut observer = self.observer.lock().await;
        if observer.is_some() {
            return;
        }

        let cancel_token = CancellationToken::new();
        let token = cancel_token.clone();
        let router = self.clone();
        let handle = tokio::spawn(async move {
            let mut rx = router.ledger.subscribe_foreground();
            rx.borrow_and_update();
            loop {
                tokio::select! {
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let current = rx.borrow_and_update().clone();
                        if let Some(package_id) = current {
                            router.on_foreground_changed(&package_id).await;
                        }
                    }
                    _ = token.cancelled() => break,
                }
            }
        });
        *observer = Some((handle, cancel_token));
    }

    pub async fn stop(&self) -> Result<()> {
        let observer = self.observer.lock().await.take();
        if let Some((handle, token)) = observer {
            token.cancel();
            handle.await.context("switch router task failed to join")?;
        }
        Ok(())
    }
}

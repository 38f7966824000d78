use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::{
    db::EnergyStore,
    energy::{EnergyConfig, HabitCache},
    platform::{AccessibilityRegistry, BlockingChannel, UserMessage},
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BlockOutcome {
    Blocked,
    /// The package is not a bad-habit app; nothing was done.
    NotBadHabit,
    /// The accessibility service is not connected.
    Unavailable,
    /// Gave up after the retry.
    Abandoned,
}

#[derive(Debug, Clone, Copy)]
enum BlockKind {
    /// Message, short delay, then home.
    Immediate,
    /// Straight home.
    Force,
}

/// Sends the device home when a bad-habit app is in front.
pub struct EnforcementActuator {
    registry: AccessibilityRegistry,
    habits: Arc<HabitCache>,
    config: EnergyConfig,
}

impl EnforcementActuator {
    pub fn new(
        registry: AccessibilityRegistry,
        store: Arc<dyn EnergyStore>,
        config: EnergyConfig,
    ) -> Self {
        let habits = Arc::new(HabitCache::new(
            "actuator",
            store,
            config.habit_cache_ttl,
        ));
        Self {
            registry,
            habits,
            config,
        }
    }

    pub fn habit_cache(&self) -> Arc<HabitCache> {
        self.habits.clone()
    }

    pub fn is_ready(&self) -> bool {
        self.registry.is_connected()
    }

    pub async fn is_bad_habit(&self, package_id: &str) -> bool {
        self.habits.is_bad_habit(package_id).await
    }

    /// Show the block message, wait for it to render, then go home.
    pub async fn immediately_block(&self, package_id: &str) -> Result<BlockOutcome> {
        self.attempt(package_id, BlockKind::Immediate).await
    }

    /// Go home without a message. Used once the lock is already in place.
    pub async fn force_block(&self, package_id: &str) -> Result<BlockOutcome> {
        self.attempt(package_id, BlockKind::Force).await
    }

    /// Best-effort transient message; silently skipped when not connected.
    pub fn show_message(&self, message: &UserMessage) {
        let Some(channel) = self.registry.get() else {
            log_debug!("Accessibility service not connected; dropping message");
            return;
        };
        if let Err(err) = channel.show_message(message) {
            log_warn!("Failed to show message: {err:?}");
        }
    }

    /// Run `immediately_block` off the caller's task, retrying once.
    pub fn dispatch_immediate_block(self: &Arc<Self>, package_id: String) -> JoinHandle<BlockOutcome> {
        self.dispatch(package_id, BlockKind::Immediate)
    }

    pub fn dispatch_force_block(self: &Arc<Self>, package_id: String) -> JoinHandle<BlockOutcome> {
        self.dispatch(package_id, BlockKind::Force)
    }

    fn dispatch(self: &Arc<Self>, package_id: String, kind: BlockKind) -> JoinHandle<BlockOutcome> {
        let actuator = Arc::clone(self);
        tokio::spawn(async move {
            match actuator.attempt(&package_id, kind).await {
                Ok(BlockOutcome::Unavailable) => {
                    log_warn!("Accessibility service not ready; retrying block of {package_id}");
                }
                Ok(outcome) => return outcome,
                Err(err) => log_warn!("Blocking {package_id} failed, retrying: {err:?}"),
            }

            tokio::time::sleep(actuator.config.actuator_retry_delay).await;

            match actuator.attempt(&package_id, kind).await {
                Ok(BlockOutcome::Unavailable) => {
                    log_error!("Accessibility service still not ready; abandoning block of {package_id}");
                    BlockOutcome::Abandoned
                }
                Ok(outcome) => outcome,
                Err(err) => {
                    log_error!("Abandoning block of {package_id}: {err:?}");
                    BlockOutcome::Abandoned
                }
            }
        })
    }

    async fn attempt(&self, package_id: &str, kind: BlockKind) -> Result<BlockOutcome> {
        if !self.habits.is_bad_habit(package_id).await {
            log_debug!("{package_id} is not a bad-habit app; not blocking");
            return Ok(BlockOutcome::NotBadHabit);
        }

        let Some(channel) = self.registry.get() else {
            return Ok(BlockOutcome::Unavailable);
        };

        match kind {
            BlockKind::Immediate => self.block_with_message(channel, package_id).await?,
            BlockKind::Force => channel
                .go_home()
                .with_context(|| format!("go home failed while blocking {package_id}"))?,
        }

        log_info!("Blocked {package_id} ({kind:?})");
        Ok(BlockOutcome::Blocked)
    }

    async fn block_with_message(
        &self,
        channel: Arc<dyn BlockingChannel>,
        package_id: &str,
    ) -> Result<()> {
        if let Err(err) = channel.show_message(&UserMessage::ImmediateBlock) {
            log_warn!("Failed to show block message: {err:?}");
        }
        tokio::time::sleep(self.config.block_message_delay).await;
        channel
            .go_home()
            .with_context(|| format!("go home failed while blocking {package_id}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::HabitApp,
        testing::{MemoryStore, RecordingChannel},
    };
    use std::time::Duration;

    fn actuator(store: Arc<MemoryStore>, registry: AccessibilityRegistry) -> Arc<EnforcementActuator> {
        Arc::new(EnforcementActuator::new(registry, store, EnergyConfig::default()))
    }

    fn bad_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.put_habit(HabitApp::bad("com.video", "Video"));
        store
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_block_shows_message_then_goes_home_after_delay() {
        let registry = AccessibilityRegistry::new();
        let channel = Arc::new(RecordingChannel::default());
        registry.connect(channel.clone());
        let actuator = actuator(bad_store(), registry);

        let handle = tokio::spawn({
            let actuator = actuator.clone();
            async move { actuator.immediately_block("com.video").await.unwrap() }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(channel.messages().last(), Some(&UserMessage::ImmediateBlock));
        assert_eq!(channel.home_count(), 0);

        assert_eq!(handle.await.unwrap(), BlockOutcome::Blocked);
        assert_eq!(channel.home_count(), 1);
    }

    #[tokio::test]
    async fn force_block_goes_home_without_message() {
        let registry = AccessibilityRegistry::new();
        let channel = Arc::new(RecordingChannel::default());
        registry.connect(channel.clone());
        let actuator = actuator(bad_store(), registry);

        assert_eq!(actuator.force_block("com.video").await.unwrap(), BlockOutcome::Blocked);
        assert_eq!(channel.home_count(), 1);
        assert_eq!(channel.messages(), vec![UserMessage::ServiceConnected]);
    }

    #[tokio::test]
    async fn non_bad_apps_are_left_alone() {
        let registry = AccessibilityRegistry::new();
        let channel = Arc::new(RecordingChannel::default());
        registry.connect(channel.clone());
        let actuator = actuator(bad_store(), registry);

        assert_eq!(
            actuator.immediately_block("com.reader").await.unwrap(),
            BlockOutcome::NotBadHabit
        );
        assert_eq!(channel.home_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dispatch_retries_once_when_service_connects_late() {
        let registry = AccessibilityRegistry::new();
        let actuator = actuator(bad_store(), registry.clone());

        let handle = actuator.dispatch_force_block("com.video".into());
        tokio::time::sleep(Duration::from_millis(300)).await;

        let channel = Arc::new(RecordingChannel::default());
        registry.connect(channel.clone());

        assert_eq!(handle.await.unwrap(), BlockOutcome::Blocked);
        assert_eq!(channel.home_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dispatch_abandons_after_single_retry() {
        let actuator = actuator(bad_store(), AccessibilityRegistry::new());
        let started = tokio::time::Instant::now();

        let outcome = actuator.dispatch_immediate_block("com.video".into()).await.unwrap();

        assert_eq!(outcome, BlockOutcome::Abandoned);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(1) && elapsed < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn failing_channel_is_reported() {
        let registry = AccessibilityRegistry::new();
        let channel = Arc::new(RecordingChannel::default());
        registry.connect(channel.clone());
        channel.fail_home(true);
        let actuator = actuator(bad_store(), registry);

        assert!(actuator.force_block("com.video").await.is_err());
    }
}

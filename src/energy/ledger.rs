use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, RwLock,
    },
};

use anyhow::Result;
use chrono::{Local, NaiveDate};
use serde::Serialize;
use tokio::sync::{watch, Mutex};

use crate::{
    db::{EnergyStore, HabitClass, UsageRecord},
    platform::ForegroundSource,
    sensing::{ForegroundSampler, SamplerController},
    utils::logging::debug_mode,
};

use super::{
    config::{EnergyConfig, PartialMinutePolicy, ENERGY_DEDUCTION_PER_MINUTE},
    habit_cache::HabitCache,
    state::{energy_from_records, EnergyBalance, EnergyTransition, UsageCounter},
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Receives the positive-to-empty crossing caused by a bad-habit minute.
/// Called inline from the tick, so implementations must not block.
pub trait DepletionSink: Send + Sync {
    fn energy_depleted(&self, package_id: &str);
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSnapshot {
    pub energy: i64,
    pub max_energy: i64,
    pub monitoring: bool,
    pub foreground: Option<String>,
}

/// Owner of the energy value.
///
/// All writes (tick settlement, charges, overrides) go through the `balance`
/// mutex, so there is exactly one serialized writer; readers observe the value
/// through a watch channel.
#[derive(Clone)]
pub struct EnergyLedger {
    inner: Arc<LedgerInner>,
}

struct LedgerInner {
    config: EnergyConfig,
    store: Arc<dyn EnergyStore>,
    source: Arc<dyn ForegroundSource>,
    habits: Arc<HabitCache>,
    balance: Mutex<EnergyBalance>,
    energy_tx: watch::Sender<i64>,
    counters: RwLock<HashMap<String, Arc<UsageCounter>>>,
    foreground_tx: watch::Sender<Option<String>>,
    monitor: Mutex<SamplerController>,
    monitoring: AtomicBool,
    initialized: AtomicBool,
    depletion_sink: RwLock<Option<Arc<dyn DepletionSink>>>,
    verbose: bool,
}

impl EnergyLedger {
    pub fn new(
        store: Arc<dyn EnergyStore>,
        source: Arc<dyn ForegroundSource>,
        config: EnergyConfig,
        max_energy: i64,
    ) -> Self {
        let habits = Arc::new(HabitCache::new(
            "ledger",
            store.clone(),
            config.habit_cache_ttl,
        ));
        let balance = EnergyBalance::new(0, max_energy);
        let (energy_tx, _) = watch::channel(balance.value());

        Self {
            inner: Arc::new(LedgerInner {
                config,
                store,
                source,
                habits,
                balance: Mutex::new(balance),
                energy_tx,
                counters: RwLock::new(HashMap::new()),
                foreground_tx: watch::channel(None).0,
                monitor: Mutex::new(SamplerController::new()),
                monitoring: AtomicBool::new(false),
                initialized: AtomicBool::new(false),
                depletion_sink: RwLock::new(None),
                verbose: debug_mode(),
            }),
        }
    }

    pub fn config(&self) -> &EnergyConfig {
        &self.inner.config
    }

    pub fn habit_cache(&self) -> Arc<HabitCache> {
        self.inner.habits.clone()
    }

    pub fn set_depletion_sink(&self, sink: Arc<dyn DepletionSink>) {
        let mut guard = self
            .inner
            .depletion_sink
            .write()
            .unwrap_or_else(|p| p.into_inner());
        *guard = Some(sink);
    }

    // ---------------------------------------------------------------------
    // Observation
    // ---------------------------------------------------------------------

    pub fn current_energy(&self) -> i64 {
        *self.inner.energy_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<i64> {
        self.inner.energy_tx.subscribe()
    }

    pub async fn max_energy(&self) -> i64 {
        self.inner.balance.lock().await.max()
    }

    pub fn is_monitoring(&self) -> bool {
        self.inner.monitoring.load(Ordering::SeqCst)
    }

    /// Whether the initial load from storage has completed.
    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::SeqCst)
    }

    pub fn current_foreground(&self) -> Option<String> {
        self.inner.foreground_tx.borrow().clone()
    }

    /// Foreground changes as seen by the sampler.
    pub fn subscribe_foreground(&self) -> watch::Receiver<Option<String>> {
        self.inner.foreground_tx.subscribe()
    }

    /// Seconds accumulated for `package_id` since its last flush.
    pub fn usage_seconds(&self, package_id: &str) -> u64 {
        self.existing_counter(package_id)
            .map(|counter| counter.seconds())
            .unwrap_or(0)
    }

    pub fn unflushed_minutes(&self, package_id: &str) -> u32 {
        self.existing_counter(package_id)
            .map(|counter| counter.unflushed_minutes())
            .unwrap_or(0)
    }

    pub async fn snapshot(&self) -> LedgerSnapshot {
        let balance = *self.inner.balance.lock().await;
        LedgerSnapshot {
            energy: balance.value(),
            max_energy: balance.max(),
            monitoring: self.is_monitoring(),
            foreground: self.current_foreground(),
        }
    }

    // ---------------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------------

    /// Direct override, clamped to `[0, max]`.
    pub async fn set_current_energy(&self, value: i64) -> EnergyTransition {
        let transition = {
            let mut balance = self.inner.balance.lock().await;
            let transition = balance.set(value);
            self.publish(transition.current);
            transition
        };
        log_info!(
            "Energy set to {} (was {})",
            transition.current,
            transition.previous
        );
        transition
    }

    /// Adds `amount` (may be negative), clamped to `[0, max]`.
    pub async fn credit(&self, amount: i64) -> EnergyTransition {
        let mut balance = self.inner.balance.lock().await;
        let transition = balance.apply(amount);
        self.publish(transition.current);
        transition
    }

    pub async fn set_max_energy(&self, max: i64) -> EnergyTransition {
        let mut balance = self.inner.balance.lock().await;
        let transition = balance.set_max(max);
        self.publish(transition.current);
        log_info!("Max energy set to {}", balance.max());
        transition
    }

    pub async fn reset_energy(&self) -> EnergyTransition {
        let max = self.max_energy().await;
        self.set_current_energy(max).await
    }

    /// Test tooling: drain `amount` energy, floored at zero.
    pub async fn simulate_consumption(&self, amount: i64) -> EnergyTransition {
        let transition = self.credit(-amount.abs()).await;
        log_info!(
            "Simulated consumption of {amount}: {} -> {}",
            transition.previous,
            transition.current
        );
        transition
    }

    /// Rebuild today's energy from persisted records. Storage failures leave
    /// the current value untouched.
    pub async fn load_current_energy(&self) -> Result<i64> {
        self.inner.habits.reload().await;
        let today = today();
        let max = self.max_energy().await;
        let value = match self.energy_for_date(today, max).await {
            Ok(value) => value,
            Err(err) => {
                log_error!("Failed to rebuild energy for {today}: {err:?}");
                self.inner.initialized.store(true, Ordering::SeqCst);
                return Err(err);
            }
        };

        self.set_current_energy(value).await;
        self.inner.initialized.store(true, Ordering::SeqCst);
        Ok(value)
    }

    /// Energy for `date` recomputed from storage, without touching the live value.
    pub async fn energy_for_date(&self, date: NaiveDate, max: i64) -> Result<i64> {
        let usage = self.inner.store.query_usage(date).await?;
        let charges = self.inner.store.query_charge(date).await?;
        let habits = self.inner.habits.snapshot().await;
        Ok(energy_from_records(&usage, &charges, &habits, max))
    }

    pub fn reload_habit_config(&self) {
        self.inner.habits.invalidate();
    }

    pub fn clear_usage_counters(&self) {
        self.inner
            .counters
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .clear();
    }

    // ---------------------------------------------------------------------
    // Monitoring
    // ---------------------------------------------------------------------

    /// Start the sampling loop. Returns `false` if it was already running.
    pub async fn start_monitoring(&self) -> bool {
        let mut monitor = self.inner.monitor.lock().await;
        if monitor.is_running() {
            return false;
        }

        let sampler = ForegroundSampler::new(
            self.inner.source.clone(),
            self.current_foreground(),
            &self.inner.config,
        );
        monitor.start(self.clone(), sampler);
        self.inner.monitoring.store(true, Ordering::SeqCst);
        log_info!("Energy monitoring started");
        true
    }

    /// Halt the sampling loop, then flush pending minutes before returning.
    ///
    /// A sampling task that died still counts as stopped: the flag is cleared
    /// and pending minutes are flushed before the join error is returned.
    pub async fn stop_monitoring(&self) -> Result<()> {
        let joined = {
            let mut monitor = self.inner.monitor.lock().await;
            monitor.stop().await
        };
        if let Err(err) = &joined {
            log_error!("Sampling loop ended abnormally: {err:?}");
        }

        if self.inner.monitoring.swap(false, Ordering::SeqCst) {
            self.flush_remaining().await;
            log_info!("Energy monitoring stopped");
        }
        joined
    }

    /// One sampling tick: detect a switch, settle the previous app, then
    /// accumulate time for the current one.
    pub(crate) async fn run_tick(&self, sampler: &mut ForegroundSampler) {
        let outcome = sampler.poll(chrono::Utc::now());

        if let Some(previous) = outcome.switched_from.as_deref() {
            self.record_app_switch(previous).await;
        }
        self.set_foreground(outcome.current.clone());

        if let Some(current) = outcome.current.as_deref() {
            let seconds = self.inner.config.tick_interval.as_secs().max(1);
            self.accumulate(current, seconds).await;
        }

        if self.inner.verbose {
            log_debug!(
                "tick: foreground={:?} energy={}",
                outcome.current,
                self.current_energy()
            );
        }
    }

    /// Add foreground time for `package_id`, settling each completed minute.
    pub async fn accumulate(&self, package_id: &str, seconds: u64) {
        let counter = self.counter(package_id);
        let minutes = counter.add_seconds(seconds, self.inner.config.seconds_per_minute);

        for _ in 0..minutes {
            let unflushed = counter.add_minute();
            self.settle_minute(package_id).await;

            // A rejected write puts the minutes back for the next boundary.
            let flush_every = self.inner.config.usage_flush_minutes;
            if flush_every > 0 && unflushed >= flush_every {
                let flushed = counter.take_unflushed(flush_every);
                if !self.write_usage(package_id, flushed).await {
                    counter.restore_unflushed(flushed);
                }
            }
        }
    }

    /// Settle `package_id` after it lost the foreground. Calling this again
    /// without new foreground time writes nothing.
    pub async fn record_app_switch(&self, package_id: &str) {
        let Some(counter) = self.existing_counter(package_id) else {
            return;
        };

        let unflushed = counter.unflushed_minutes();
        if unflushed >= self.inner.config.min_final_flush_minutes && unflushed > 0 {
            let minutes = counter.reset();
            if minutes > 0 && !self.write_usage(package_id, minutes).await {
                counter.restore_unflushed(minutes);
            }
            return;
        }

        if self.inner.config.partial_minutes == PartialMinutePolicy::Discard {
            let dropped = counter.reset();
            if dropped > 0 {
                log_debug!("Discarded {dropped} partial minutes for {package_id}");
            }
        }
    }

    fn set_foreground(&self, package_id: Option<String>) {
        self.inner.foreground_tx.send_if_modified(|current| {
            if *current == package_id {
                return false;
            }
            log_info!("Foreground app: {:?}", package_id);
            *current = package_id;
            true
        });
    }

    async fn settle_minute(&self, package_id: &str) {
        match self.inner.habits.classify(package_id).await {
            HabitClass::Bad => {
                let transition = self.credit(-ENERGY_DEDUCTION_PER_MINUTE).await;
                log_debug!(
                    "Bad habit minute for {package_id}: energy {} -> {}",
                    transition.previous,
                    transition.current
                );
                if transition.depleted() {
                    log_warn!("Energy depleted while {package_id} is in the foreground");
                    self.notify_depleted(package_id);
                }
            }
            HabitClass::Good { ratio } => {
                let earned = f64::from(ratio).round() as i64;
                let transition = self.credit(earned).await;
                log_debug!(
                    "Good habit minute for {package_id}: +{earned}, energy {} -> {}",
                    transition.previous,
                    transition.current
                );
            }
            HabitClass::Neutral => {}
        }
    }

    fn notify_depleted(&self, package_id: &str) {
        let sink = self
            .inner
            .depletion_sink
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone();
        match sink {
            Some(sink) => sink.energy_depleted(package_id),
            None => log_warn!("No depletion sink registered; {package_id} not blocked"),
        }
    }

    async fn flush_remaining(&self) {
        let counters: Vec<(String, Arc<UsageCounter>)> = {
            let mut guard = self
                .inner
                .counters
                .write()
                .unwrap_or_else(|p| p.into_inner());
            guard.drain().collect()
        };

        for (package_id, counter) in counters {
            let minutes = counter.reset();
            if minutes >= self.inner.config.min_final_flush_minutes && minutes > 0 {
                self.write_usage(&package_id, minutes).await;
            } else if minutes > 0 {
                log_debug!("Dropping {minutes} unflushed minutes for {package_id} on stop");
            }
        }
    }

    /// Persist `minutes` for `package_id`; `false` when the store rejected it.
    async fn write_usage(&self, package_id: &str, minutes: u32) -> bool {
        let display_name = self
            .inner
            .habits
            .get(package_id)
            .await
            .map(|app| app.display_name)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| package_id.to_string());

        let record = UsageRecord::new(package_id, display_name, today(), minutes);
        match self.inner.store.record_usage(&record).await {
            Ok(()) => {
                log_info!("Recorded {minutes} minutes for {package_id}");
                true
            }
            Err(err) => {
                log_error!("Failed to record usage for {package_id}: {err:?}");
                false
            }
        }
    }

    fn publish(&self, value: i64) {
        self.inner.energy_tx.send_replace(value);
    }

    fn counter(&self, package_id: &str) -> Arc<UsageCounter> {
        if let Some(counter) = self.existing_counter(package_id) {
            return counter;
        }
        self.inner
            .counters
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .entry(package_id.to_string())
            .or_default()
            .clone()
    }

    fn existing_counter(&self, package_id: &str) -> Option<Arc<UsageCounter>> {
        self.inner
            .counters
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(package_id)
            .cloned()
    }
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

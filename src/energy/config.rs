use std::time::Duration;

pub const DEFAULT_MAX_ENERGY: i64 = 180;
pub const ENERGY_DEDUCTION_PER_MINUTE: i64 = 1;

/// What happens to minutes still below the final-flush threshold when a
/// package loses the foreground.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartialMinutePolicy {
    /// Keep the remainder and continue counting when the package returns.
    CarryForward,
    /// Drop the remainder.
    Discard,
}

/// Tunables for the sampler, ledger, coordinator and actuator.
#[derive(Debug, Clone)]
pub struct EnergyConfig {
    pub tick_interval: Duration,
    /// Upper bound on one tick's work before it is abandoned.
    pub tick_timeout: Duration,
    pub seconds_per_minute: u64,
    /// Minutes of continuous use between periodic usage flushes.
    pub usage_flush_minutes: u32,
    /// Minimum unflushed minutes written on app switch or stop.
    pub min_final_flush_minutes: u32,
    pub partial_minutes: PartialMinutePolicy,
    pub habit_cache_ttl: Duration,
    pub low_energy_threshold: i64,
    pub default_max_energy: i64,
    /// Delay between the blocking message and navigating home.
    pub block_message_delay: Duration,
    pub actuator_retry_delay: Duration,
    pub coordinator_init_retries: u32,
    pub coordinator_init_delay: Duration,
    /// Consecutive foreground-query failures before escalating to an error log.
    pub sampler_failure_escalation: u32,
    pub free_charge_minutes: u32,
    pub free_charge_ratio: f32,
    pub free_charge_cooldown: Duration,
    /// The tracker's own package; never routed through enforcement.
    pub own_package_id: String,
}

impl Default for EnergyConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            tick_timeout: Duration::from_secs(5),
            seconds_per_minute: 60,
            usage_flush_minutes: 10,
            min_final_flush_minutes: 5,
            partial_minutes: PartialMinutePolicy::CarryForward,
            habit_cache_ttl: Duration::from_secs(30),
            low_energy_threshold: 10,
            default_max_energy: DEFAULT_MAX_ENERGY,
            block_message_delay: Duration::from_millis(500),
            actuator_retry_delay: Duration::from_secs(1),
            coordinator_init_retries: 10,
            coordinator_init_delay: Duration::from_millis(500),
            sampler_failure_escalation: 5,
            free_charge_minutes: 10,
            free_charge_ratio: 1.0,
            free_charge_cooldown: Duration::from_secs(15 * 60),
            own_package_id: "com.example.appenergytracker".into(),
        }
    }
}

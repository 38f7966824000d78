use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use serde::Serialize;

use crate::db::{ChargeRecord, HabitApp, UsageRecord};

pub fn clamp_energy(value: i64, max: i64) -> i64 {
    value.clamp(0, max.max(0))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnergyTransition {
    pub previous: i64,
    pub current: i64,
}

impl EnergyTransition {
    /// Crossed from positive to empty.
    pub fn depleted(&self) -> bool {
        self.previous > 0 && self.current <= 0
    }

    /// Crossed from empty back to positive.
    pub fn restored(&self) -> bool {
        self.previous <= 0 && self.current > 0
    }

    pub fn delta(&self) -> i64 {
        self.current - self.previous
    }
}

/// Current energy and its ceiling. Every mutation clamps to `[0, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnergyBalance {
    value: i64,
    max: i64,
}

impl EnergyBalance {
    pub fn new(value: i64, max: i64) -> Self {
        let max = max.max(0);
        Self {
            value: clamp_energy(value, max),
            max,
        }
    }

    pub fn value(&self) -> i64 {
        self.value
    }

    pub fn max(&self) -> i64 {
        self.max
    }

    pub fn apply(&mut self, delta: i64) -> EnergyTransition {
        self.set(self.value.saturating_add(delta))
    }

    pub fn set(&mut self, value: i64) -> EnergyTransition {
        let previous = self.value;
        self.value = clamp_energy(value, self.max);
        EnergyTransition {
            previous,
            current: self.value,
        }
    }

    pub fn set_max(&mut self, max: i64) -> EnergyTransition {
        self.max = max.max(0);
        self.set(self.value)
    }
}

/// Foreground time for one package. Incremented by the tick task and read by
/// flush paths that may run elsewhere, hence atomics.
#[derive(Debug, Default)]
pub struct UsageCounter {
    /// Seconds since the last flush or reset.
    seconds: AtomicU64,
    /// Whole minutes observed since the counter was created.
    total_minutes: AtomicU64,
    /// Whole minutes not yet written to storage.
    unflushed_minutes: AtomicU32,
}

impl UsageCounter {
    /// Adds `seconds` and returns how many minute boundaries were crossed.
    pub fn add_seconds(&self, seconds: u64, seconds_per_minute: u64) -> u64 {
        let per_minute = seconds_per_minute.max(1);
        let before = self.seconds.fetch_add(seconds, Ordering::SeqCst);
        let after = before + seconds;
        after / per_minute - before / per_minute
    }

    /// Records one settled minute and returns the unflushed total.
    pub fn add_minute(&self) -> u32 {
        self.total_minutes.fetch_add(1, Ordering::SeqCst);
        self.unflushed_minutes.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn seconds(&self) -> u64 {
        self.seconds.load(Ordering::SeqCst)
    }

    pub fn total_minutes(&self) -> u64 {
        self.total_minutes.load(Ordering::SeqCst)
    }

    pub fn unflushed_minutes(&self) -> u32 {
        self.unflushed_minutes.load(Ordering::SeqCst)
    }

    /// Removes `minutes` from the unflushed total for a periodic flush.
    pub fn take_unflushed(&self, minutes: u32) -> u32 {
        let _ = self
            .unflushed_minutes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                Some(current.saturating_sub(minutes))
            });
        minutes
    }

    /// Returns minutes whose write failed to the unflushed total.
    pub fn restore_unflushed(&self, minutes: u32) {
        self.unflushed_minutes.fetch_add(minutes, Ordering::SeqCst);
    }

    /// Clears unflushed minutes and partial seconds, returning the minutes.
    pub fn reset(&self) -> u32 {
        self.seconds.store(0, Ordering::SeqCst);
        self.unflushed_minutes.swap(0, Ordering::SeqCst)
    }
}

/// Energy for a day rebuilt from persisted records:
/// `clamp(0, max, Σ usage delta + Σ charge delta)`.
pub fn energy_from_records(
    usage: &[UsageRecord],
    charges: &[ChargeRecord],
    habits: &HashMap<String, HabitApp>,
    max: i64,
) -> i64 {
    let usage_delta: i64 = usage
        .iter()
        .map(|record| {
            habits
                .get(&record.package_id)
                .map(|app| app.classification().usage_delta(record.minutes))
                .unwrap_or(0)
        })
        .sum();

    let charge_delta: i64 = charges.iter().map(ChargeRecord::energy_delta).sum();

    clamp_energy(usage_delta + charge_delta, max)
}

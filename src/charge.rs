//! User-initiated energy charges: manual entries, the free grant and timed
//! activity sessions. Every credit goes through the ledger.

use std::{sync::Arc, time::Duration};

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

use crate::{
    db::{
        models::{charge_energy, validation::validate_ratio},
        ChargeRecord, EnergyStore,
    },
    energy::{ledger::today, EnergyConfig, EnergyLedger},
    settings::SettingsStore,
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

pub const FREE_CHARGE_ACTIVITY: &str = "免費充能";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeOutcome {
    /// Energy granted by the record, before capping.
    pub credited: i64,
    pub energy: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreeCharge {
    Granted(ChargeOutcome),
    CoolingDown { remaining: Duration },
}

#[derive(Clone)]
pub struct ChargeService {
    store: Arc<dyn EnergyStore>,
    ledger: EnergyLedger,
    settings: Arc<SettingsStore>,
    config: EnergyConfig,
}

impl ChargeService {
    pub fn new(
        store: Arc<dyn EnergyStore>,
        ledger: EnergyLedger,
        settings: Arc<SettingsStore>,
        config: EnergyConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            settings,
            config,
        }
    }

    /// Append a charge for today and credit `round(duration × ratio)`.
    pub async fn insert_charge(
        &self,
        activity: &str,
        duration_minutes: u32,
        ratio: f32,
    ) -> Result<ChargeOutcome> {
        let activity = activity.trim();
        if activity.is_empty() {
            bail!("Activity type is required");
        }
        validate_ratio(ratio)?;

        let record = ChargeRecord::new(activity, today(), duration_minutes, ratio);
        self.store.record_charge(&record).await?;

        let credited = charge_energy(duration_minutes, ratio);
        let transition = self.ledger.credit(credited).await;
        log_info!(
            "Charged {activity}: {duration_minutes} min x {ratio} = {credited}, energy {} -> {}",
            transition.previous,
            transition.current
        );

        Ok(ChargeOutcome {
            credited,
            energy: transition.current,
        })
    }

    pub async fn free_charge(&self) -> Result<FreeCharge> {
        self.free_charge_at(Utc::now()).await
    }

    /// Fixed grant, at most once per cooldown window.
    pub async fn free_charge_at(&self, now: DateTime<Utc>) -> Result<FreeCharge> {
        if let Some(remaining) = self.free_charge_cooldown(now) {
            return Ok(FreeCharge::CoolingDown { remaining });
        }

        let outcome = self
            .insert_charge(
                FREE_CHARGE_ACTIVITY,
                self.config.free_charge_minutes,
                self.config.free_charge_ratio,
            )
            .await?;
        self.settings.update_last_free_charge(now)?;
        Ok(FreeCharge::Granted(outcome))
    }

    /// Time left before the next free charge, if any.
    pub fn free_charge_cooldown(&self, now: DateTime<Utc>) -> Option<Duration> {
        let last = self.settings.last_free_charge_at()?;
        let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
        self.config
            .free_charge_cooldown
            .checked_sub(elapsed)
            .filter(|remaining| !remaining.is_zero())
    }

    pub fn start_timed_charge(&self, activity: &str, ratio: f32) -> Result<TimedCharge> {
        if activity.trim().is_empty() {
            bail!("Activity type is required");
        }
        validate_ratio(ratio)?;
        Ok(TimedCharge {
            service: self.clone(),
            activity: activity.trim().to_string(),
            ratio,
            started_at: Instant::now(),
        })
    }

    pub async fn clear_history(&self) -> Result<()> {
        self.store.clear_history().await?;
        log_info!("Usage and charge history cleared");
        Ok(())
    }
}

/// A running activity. Finishing converts elapsed whole minutes to a charge.
pub struct TimedCharge {
    service: ChargeService,
    activity: String,
    ratio: f32,
    started_at: Instant,
}

impl TimedCharge {
    pub fn activity(&self) -> &str {
        &self.activity
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Returns `None` when less than a minute has passed.
    pub async fn finish(self) -> Result<Option<ChargeOutcome>> {
        let minutes = u32::try_from(self.elapsed().as_secs() / 60).unwrap_or(u32::MAX);
        if minutes == 0 {
            log_debug!("Timed charge '{}' shorter than a minute; nothing recorded", self.activity);
            return Ok(None);
        }
        self.service
            .insert_charge(&self.activity, minutes, self.ratio)
            .await
            .map(Some)
    }
}

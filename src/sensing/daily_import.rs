use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Local, TimeZone, Utc};

use crate::{
    db::{EnergyStore, UsageRecord},
    energy::{ledger::today, HabitCache},
    platform::DailyUsageSource,
};

const ENABLE_LOGS: bool = true;

use crate::log_info;

/// Rebuilds today's usage rows from the platform's per-package totals.
pub struct UsageImporter {
    store: Arc<dyn EnergyStore>,
    habits: Arc<HabitCache>,
}

impl UsageImporter {
    pub fn new(store: Arc<dyn EnergyStore>, habits: Arc<HabitCache>) -> Self {
        Self { store, habits }
    }

    /// Replace today's usage with whole minutes per package. Packages under a
    /// minute are skipped. Returns the number of rows written.
    pub async fn import_today(&self, source: &dyn DailyUsageSource) -> Result<usize> {
        let date = today();
        let midnight = date
            .and_hms_opt(0, 0, 0)
            .and_then(|naive| Local.from_local_datetime(&naive).earliest())
            .map(|local| local.with_timezone(&Utc))
            .context("local midnight is not representable")?;

        let totals = source
            .foreground_millis_since(midnight)
            .context("failed to read daily usage totals")?;
        let habits = self.habits.snapshot().await;

        let mut records: Vec<UsageRecord> = totals
            .into_iter()
            .filter_map(|(package_id, millis)| {
                let minutes = u32::try_from(millis / 60_000).unwrap_or(u32::MAX);
                if minutes == 0 {
                    return None;
                }
                let display_name = habits
                    .get(&package_id)
                    .map(|app| app.display_name.clone())
                    .filter(|name| !name.is_empty())
                    .unwrap_or_else(|| package_id.clone());
                Some(UsageRecord::new(package_id, display_name, date, minutes))
            })
            .collect();
        records.sort_by(|a, b| b.minutes.cmp(&a.minutes));

        let written = self.store.replace_usage_for_date(date, records).await?;
        log_info!("Imported {written} usage rows for {date}");
        Ok(written)
    }
}

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

use super::{ChargeRecord, Database, HabitApp, UsageRecord};

/// Persistence contract used by the ledger, caches and services.
///
/// `Database` is the production implementation; tests swap in an in-memory
/// store with failure injection.
#[async_trait]
pub trait EnergyStore: Send + Sync {
    async fn record_usage(&self, record: &UsageRecord) -> Result<()>;

    async fn query_usage(&self, date: NaiveDate) -> Result<Vec<UsageRecord>>;

    async fn replace_usage_for_date(
        &self,
        date: NaiveDate,
        records: Vec<UsageRecord>,
    ) -> Result<usize>;

    async fn record_charge(&self, record: &ChargeRecord) -> Result<()>;

    async fn query_charge(&self, date: NaiveDate) -> Result<Vec<ChargeRecord>>;

    async fn habit_config(&self) -> Result<HashMap<String, HabitApp>>;

    async fn upsert_habit_app(&self, app: &HabitApp) -> Result<()>;

    async fn delete_habit_app(&self, package_id: &str) -> Result<()>;

    async fn clear_habit_apps(&self) -> Result<()>;

    /// Drop every usage and charge record.
    async fn clear_history(&self) -> Result<()>;
}

#[async_trait]
impl EnergyStore for Database {
    async fn record_usage(&self, record: &UsageRecord) -> Result<()> {
        self.insert_usage_record(record).await
    }

    async fn query_usage(&self, date: NaiveDate) -> Result<Vec<UsageRecord>> {
        self.get_usage_records_for_date(date).await
    }

    async fn replace_usage_for_date(
        &self,
        date: NaiveDate,
        records: Vec<UsageRecord>,
    ) -> Result<usize> {
        self.replace_usage_records_for_date(date, records).await
    }

    async fn record_charge(&self, record: &ChargeRecord) -> Result<()> {
        self.insert_charge_record(record).await.map(|_| ())
    }

    async fn query_charge(&self, date: NaiveDate) -> Result<Vec<ChargeRecord>> {
        self.get_charge_records_for_date(date).await
    }

    async fn habit_config(&self) -> Result<HashMap<String, HabitApp>> {
        self.get_habit_app_map().await
    }

    async fn upsert_habit_app(&self, app: &HabitApp) -> Result<()> {
        Database::upsert_habit_app(self, app.clone()).await
    }

    async fn delete_habit_app(&self, package_id: &str) -> Result<()> {
        Database::delete_habit_app(self, package_id.to_string()).await
    }

    async fn clear_habit_apps(&self) -> Result<()> {
        self.delete_all_habit_apps().await
    }

    async fn clear_history(&self) -> Result<()> {
        self.delete_history().await
    }
}

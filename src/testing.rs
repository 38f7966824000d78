//! In-memory fakes for the storage and platform traits.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Mutex,
    },
    time::Duration,
};

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::{
    db::{ChargeRecord, EnergyStore, HabitApp, UsageRecord},
    lock::alerts::{LockedAlert, StatusAlert},
    platform::{BlockingChannel, ForegroundSource, Notifier, UsageEvent, UserMessage},
};

#[derive(Default)]
pub struct MemoryStore {
    usage: Mutex<Vec<UsageRecord>>,
    charges: Mutex<Vec<ChargeRecord>>,
    habits: Mutex<HashMap<String, HabitApp>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    write_delay: Mutex<Option<Duration>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_habit(&self, app: HabitApp) {
        self.habits
            .lock()
            .unwrap()
            .insert(app.package_id.clone(), app);
    }

    pub fn push_usage(&self, record: UsageRecord) {
        self.usage.lock().unwrap().push(record);
    }

    pub fn push_charge(&self, record: ChargeRecord) {
        self.charges.lock().unwrap().push(record);
    }

    pub fn usage_records(&self) -> Vec<UsageRecord> {
        self.usage.lock().unwrap().clone()
    }

    pub fn charge_records(&self) -> Vec<ChargeRecord> {
        self.charges.lock().unwrap().clone()
    }

    pub fn habit(&self, package_id: &str) -> Option<HabitApp> {
        self.habits.lock().unwrap().get(package_id).cloned()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Every usage write sleeps for `delay` before it lands.
    pub fn slow_writes(&self, delay: Duration) {
        *self.write_delay.lock().unwrap() = Some(delay);
    }

    fn check_read(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            bail!("simulated read failure");
        }
        Ok(())
    }

    fn check_write(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("simulated write failure");
        }
        Ok(())
    }
}

#[async_trait]
impl EnergyStore for MemoryStore {
    async fn record_usage(&self, record: &UsageRecord) -> Result<()> {
        let delay = *self.write_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_write()?;
        self.push_usage(record.clone());
        Ok(())
    }

    async fn query_usage(&self, date: NaiveDate) -> Result<Vec<UsageRecord>> {
        self.check_read()?;
        let mut records: Vec<UsageRecord> = self
            .usage
            .lock()
            .unwrap()
            .iter()
            .filter(|record| record.date == date)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.minutes.cmp(&a.minutes));
        Ok(records)
    }

    async fn replace_usage_for_date(
        &self,
        date: NaiveDate,
        records: Vec<UsageRecord>,
    ) -> Result<usize> {
        self.check_write()?;
        let mut usage = self.usage.lock().unwrap();
        usage.retain(|record| record.date != date);
        let written = records.len();
        usage.extend(records);
        Ok(written)
    }

    async fn record_charge(&self, record: &ChargeRecord) -> Result<()> {
        self.check_write()?;
        let mut charges = self.charges.lock().unwrap();
        let mut record = record.clone();
        record.id = Some(charges.len() as i64 + 1);
        charges.push(record);
        Ok(())
    }

    async fn query_charge(&self, date: NaiveDate) -> Result<Vec<ChargeRecord>> {
        self.check_read()?;
        Ok(self
            .charges
            .lock()
            .unwrap()
            .iter()
            .filter(|record| record.date == date)
            .cloned()
            .collect())
    }

    async fn habit_config(&self) -> Result<HashMap<String, HabitApp>> {
        self.check_read()?;
        Ok(self.habits.lock().unwrap().clone())
    }

    async fn upsert_habit_app(&self, app: &HabitApp) -> Result<()> {
        self.check_write()?;
        self.put_habit(app.clone());
        Ok(())
    }

    async fn delete_habit_app(&self, package_id: &str) -> Result<()> {
        self.check_write()?;
        self.habits.lock().unwrap().remove(package_id);
        Ok(())
    }

    async fn clear_habit_apps(&self) -> Result<()> {
        self.check_write()?;
        self.habits.lock().unwrap().clear();
        Ok(())
    }

    async fn clear_history(&self) -> Result<()> {
        self.check_write()?;
        self.usage.lock().unwrap().clear();
        self.charges.lock().unwrap().clear();
        Ok(())
    }
}

/// Hands out queued foreground events on the next query.
#[derive(Default)]
pub struct ScriptedForeground {
    pending: Mutex<Vec<UsageEvent>>,
    failures: AtomicU32,
}

impl ScriptedForeground {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn switch_to(&self, package_id: &str) {
        self.pending
            .lock()
            .unwrap()
            .push(UsageEvent::foreground(package_id, Utc::now()));
    }

    pub fn fail_next(&self, count: u32) {
        self.failures.store(count, Ordering::SeqCst);
    }
}

impl ForegroundSource for ScriptedForeground {
    fn query_events(&self, _start: DateTime<Utc>, _end: DateTime<Utc>) -> Result<Vec<UsageEvent>> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            bail!("usage stats unavailable");
        }
        Ok(std::mem::take(&mut *self.pending.lock().unwrap()))
    }
}

#[derive(Default)]
pub struct RecordingChannel {
    messages: Mutex<Vec<UserMessage>>,
    homes: AtomicU32,
    fail_home: AtomicBool,
}

impl RecordingChannel {
    pub fn messages(&self) -> Vec<UserMessage> {
        self.messages.lock().unwrap().clone()
    }

    pub fn home_count(&self) -> u32 {
        self.homes.load(Ordering::SeqCst)
    }

    pub fn fail_home(&self, fail: bool) {
        self.fail_home.store(fail, Ordering::SeqCst);
    }
}

impl BlockingChannel for RecordingChannel {
    fn go_home(&self) -> Result<()> {
        if self.fail_home.load(Ordering::SeqCst) {
            bail!("global action rejected");
        }
        self.homes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn show_message(&self, message: &UserMessage) -> Result<()> {
        self.messages.lock().unwrap().push(message.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    shown: AtomicU32,
    hidden: AtomicU32,
    status: Mutex<Vec<StatusAlert>>,
    fail_show: AtomicBool,
}

impl RecordingNotifier {
    pub fn shown_count(&self) -> u32 {
        self.shown.load(Ordering::SeqCst)
    }

    pub fn hidden_count(&self) -> u32 {
        self.hidden.load(Ordering::SeqCst)
    }

    pub fn last_status(&self) -> Option<StatusAlert> {
        self.status.lock().unwrap().last().cloned()
    }

    pub fn fail_show(&self, fail: bool) {
        self.fail_show.store(fail, Ordering::SeqCst);
    }
}

impl Notifier for RecordingNotifier {
    fn show_depleted_alert(&self, _alert: &LockedAlert) -> Result<()> {
        if self.fail_show.load(Ordering::SeqCst) {
            bail!("notification channel disabled");
        }
        self.shown.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn hide_depleted_alert(&self) -> Result<()> {
        self.hidden.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn show_status(&self, status: &StatusAlert) -> Result<()> {
        self.status.lock().unwrap().push(status.clone());
        Ok(())
    }
}

//! Boundary to the host OS: usage events, the accessibility handle used for
//! blocking, and notifications. The host implements these traits; everything
//! behind them is platform independent.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::lock::alerts::{LockedAlert, StatusAlert};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UsageEventKind {
    MovedToForeground,
    MovedToBackground,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageEvent {
    pub package_id: String,
    pub kind: UsageEventKind,
    pub timestamp: DateTime<Utc>,
}

impl UsageEvent {
    pub fn foreground(package_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            package_id: package_id.into(),
            kind: UsageEventKind::MovedToForeground,
            timestamp,
        }
    }
}

/// Source of foreground-transition events for a time window.
pub trait ForegroundSource: Send + Sync {
    fn query_events(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<UsageEvent>>;
}

/// Per-package total foreground time, used by the daily usage import.
pub trait DailyUsageSource: Send + Sync {
    fn foreground_millis_since(&self, start: DateTime<Utc>) -> Result<HashMap<String, u64>>;
}

/// Short-lived messages shown while enforcing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserMessage {
    ServiceConnected,
    ImmediateBlock,
    LowEnergy { energy: i64 },
}

impl UserMessage {
    pub fn text(&self) -> String {
        match self {
            UserMessage::ServiceConnected => "App 鎖定服務已啟動".to_string(),
            UserMessage::ImmediateBlock => "⚡ 能量歸零！\n立即阻止壞習慣 App 使用".to_string(),
            UserMessage::LowEnergy { energy } => {
                format!("⚠️ 能量偏低（{energy}分鐘）！\n建議減少壞習慣 App 使用")
            }
        }
    }

    pub fn is_long(&self) -> bool {
        matches!(self, UserMessage::ImmediateBlock)
    }
}

/// Actions available through the accessibility service.
pub trait BlockingChannel: Send + Sync {
    fn go_home(&self) -> Result<()>;
    fn show_message(&self, message: &UserMessage) -> Result<()>;
}

pub trait Notifier: Send + Sync {
    fn show_depleted_alert(&self, alert: &LockedAlert) -> Result<()>;
    fn hide_depleted_alert(&self) -> Result<()>;
    fn show_status(&self, status: &StatusAlert) -> Result<()>;
}

/// Slot for the accessibility service handle. The OS creates that service on
/// its own schedule, so it registers itself here on connect and clears the
/// slot on destroy; callers treat an empty slot as "not ready yet".
#[derive(Clone, Default)]
pub struct AccessibilityRegistry {
    handle: Arc<RwLock<Option<Arc<dyn BlockingChannel>>>>,
}

impl AccessibilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&self, channel: Arc<dyn BlockingChannel>) {
        let mut guard = self.handle.write().unwrap_or_else(|p| p.into_inner());
        *guard = Some(channel.clone());
        drop(guard);

        log::info!("Accessibility service connected");
        if let Err(err) = channel.show_message(&UserMessage::ServiceConnected) {
            log::warn!("Failed to show service-connected message: {err:?}");
        }
    }

    pub fn disconnect(&self) {
        let mut guard = self.handle.write().unwrap_or_else(|p| p.into_inner());
        if guard.take().is_some() {
            log::info!("Accessibility service disconnected");
        }
    }

    pub fn get(&self) -> Option<Arc<dyn BlockingChannel>> {
        self.handle
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn is_connected(&self) -> bool {
        self.get().is_some()
    }
}

/// Everything the host supplies at startup.
#[derive(Clone)]
pub struct Platform {
    pub foreground: Arc<dyn ForegroundSource>,
    pub notifier: Arc<dyn Notifier>,
    pub accessibility: AccessibilityRegistry,
}

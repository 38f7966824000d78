use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::{
    energy::config::EnergyConfig,
    platform::{ForegroundSource, UsageEvent, UsageEventKind},
};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_warn};

/// Result of one poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleOutcome {
    /// The package that just lost the foreground, if the foreground changed.
    pub switched_from: Option<String>,
    /// Foreground package after this poll.
    pub current: Option<String>,
}

/// Tracks the foreground package by reading usage events since the previous
/// poll. Only the tick task touches it, so it needs no synchronization.
pub struct ForegroundSampler {
    source: Arc<dyn ForegroundSource>,
    current: Option<String>,
    last_poll: Option<DateTime<Utc>>,
    first_window: ChronoDuration,
    consecutive_failures: u32,
    escalate_after: u32,
}

impl ForegroundSampler {
    pub fn new(
        source: Arc<dyn ForegroundSource>,
        current: Option<String>,
        config: &EnergyConfig,
    ) -> Self {
        let first_window = ChronoDuration::from_std(config.tick_interval)
            .unwrap_or_else(|_| ChronoDuration::seconds(1));
        Self {
            source,
            current,
            last_poll: None,
            first_window,
            consecutive_failures: 0,
            escalate_after: config.sampler_failure_escalation.max(1),
        }
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Query events in `(last_poll, now]` and adopt the latest foreground
    /// package. An empty window or a failed query leaves the foreground as is.
    pub fn poll(&mut self, now: DateTime<Utc>) -> SampleOutcome {
        let start = self.last_poll.unwrap_or(now - self.first_window);

        let events = match self.source.query_events(start, now) {
            Ok(events) => {
                self.consecutive_failures = 0;
                self.last_poll = Some(now);
                events
            }
            Err(err) => {
                self.consecutive_failures += 1;
                if self.consecutive_failures % self.escalate_after == 0 {
                    log_error!(
                        "Foreground query failed {} times in a row: {err:?}",
                        self.consecutive_failures
                    );
                } else {
                    log_warn!("Foreground query failed: {err:?}");
                }
                return self.unchanged();
            }
        };

        let Some(latest) = latest_foreground(&events) else {
            return self.unchanged();
        };

        if self.current.as_deref() == Some(latest) {
            return self.unchanged();
        }

        let switched_from = self.current.replace(latest.to_string());
        SampleOutcome {
            switched_from,
            current: self.current.clone(),
        }
    }

    fn unchanged(&self) -> SampleOutcome {
        SampleOutcome {
            switched_from: None,
            current: self.current.clone(),
        }
    }
}

/// Package of the most recent move-to-foreground event.
pub fn latest_foreground(events: &[UsageEvent]) -> Option<&str> {
    events
        .iter()
        .filter(|event| event.kind == UsageEventKind::MovedToForeground)
        .max_by_key(|event| event.timestamp)
        .map(|event| event.package_id.as_str())
}

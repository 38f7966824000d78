use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::{sync::RwLock, time::Instant};

use crate::db::{EnergyStore, HabitApp, HabitClass};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

/// Time-bounded snapshot of the habit configuration.
///
/// Reads within `ttl` of the last successful load are served from memory.
/// A failed refresh keeps serving the previous snapshot and retries on the
/// next read.
pub struct HabitCache {
    name: &'static str,
    store: Arc<dyn EnergyStore>,
    ttl: Duration,
    state: RwLock<CacheState>,
    invalidated: AtomicBool,
}

struct CacheState {
    apps: Arc<HashMap<String, HabitApp>>,
    loaded_at: Option<Instant>,
}

impl HabitCache {
    pub fn new(name: &'static str, store: Arc<dyn EnergyStore>, ttl: Duration) -> Self {
        Self {
            name,
            store,
            ttl,
            state: RwLock::new(CacheState {
                apps: Arc::new(HashMap::new()),
                loaded_at: None,
            }),
            invalidated: AtomicBool::new(false),
        }
    }

    pub async fn get(&self, package_id: &str) -> Option<HabitApp> {
        self.snapshot().await.get(package_id).cloned()
    }

    /// Unknown packages are neutral.
    pub async fn classify(&self, package_id: &str) -> HabitClass {
        self.get(package_id)
            .await
            .map(|app| app.classification())
            .unwrap_or(HabitClass::Neutral)
    }

    pub async fn is_bad_habit(&self, package_id: &str) -> bool {
        self.classify(package_id).await.is_bad()
    }

    pub async fn snapshot(&self) -> Arc<HashMap<String, HabitApp>> {
        if self.is_stale().await {
            self.reload().await;
        }
        self.state.read().await.apps.clone()
    }

    /// Force a refresh from the store. Returns whether it succeeded.
    pub async fn reload(&self) -> bool {
        self.invalidated.store(false, Ordering::SeqCst);
        match self.store.habit_config().await {
            Ok(apps) => {
                let count = apps.len();
                let mut state = self.state.write().await;
                state.apps = Arc::new(apps);
                state.loaded_at = Some(Instant::now());
                log_debug!("[{}] habit cache loaded {count} apps", self.name);
                true
            }
            Err(err) => {
                log_warn!(
                    "[{}] habit cache refresh failed, serving previous snapshot: {err:?}",
                    self.name
                );
                false
            }
        }
    }

    /// Mark the snapshot stale so the next read reloads it.
    pub fn invalidate(&self) {
        self.invalidated.store(true, Ordering::SeqCst);
    }

    async fn is_stale(&self) -> bool {
        if self.invalidated.load(Ordering::SeqCst) {
            return true;
        }
        match self.state.read().await.loaded_at {
            Some(loaded_at) => loaded_at.elapsed() > self.ttl,
            None => true,
        }
    }
}

//! Edits to the habit configuration. Every successful change invalidates
//! the registered caches so the ledger and the actuator pick it up on their
//! next read.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::{
    db::{
        models::validation::{parse_ratio, validate_package_id, validate_ratio},
        EnergyStore, HabitApp,
    },
    energy::HabitCache,
};

const ENABLE_LOGS: bool = true;

use crate::log_info;

pub struct HabitRegistry {
    store: Arc<dyn EnergyStore>,
    caches: Vec<Arc<HabitCache>>,
}

impl HabitRegistry {
    pub fn new(store: Arc<dyn EnergyStore>, caches: Vec<Arc<HabitCache>>) -> Self {
        Self { store, caches }
    }

    /// All configured apps, sorted by display name.
    pub async fn apps(&self) -> Result<Vec<HabitApp>> {
        let mut apps: Vec<HabitApp> = self.store.habit_config().await?.into_values().collect();
        apps.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        Ok(apps)
    }

    pub async fn app(&self, package_id: &str) -> Result<Option<HabitApp>> {
        Ok(self.store.habit_config().await?.remove(package_id))
    }

    /// Add a package or rename an existing one, keeping its flags and ratio.
    pub async fn register_app(&self, package_id: &str, display_name: &str) -> Result<HabitApp> {
        let mut app = self.load_or_new(package_id).await?;
        if !display_name.trim().is_empty() {
            app.display_name = display_name.trim().to_string();
        }
        self.save(app).await
    }

    pub async fn set_good_habit(&self, package_id: &str, enabled: bool) -> Result<HabitApp> {
        let mut app = self.load_or_new(package_id).await?;
        app.is_good_habit = enabled;
        self.save(app).await
    }

    pub async fn set_bad_habit(&self, package_id: &str, enabled: bool) -> Result<HabitApp> {
        let mut app = self.load_or_new(package_id).await?;
        app.is_bad_habit = enabled;
        self.save(app).await
    }

    pub async fn set_ratio(&self, package_id: &str, ratio: f32) -> Result<HabitApp> {
        validate_ratio(ratio)?;
        let mut app = self.load_or_new(package_id).await?;
        app.ratio = ratio;
        self.save(app).await
    }

    /// Parse user-typed ratio text. On error the stored ratio is unchanged.
    pub async fn set_ratio_text(&self, package_id: &str, text: &str) -> Result<HabitApp> {
        let ratio = parse_ratio(text)
            .with_context(|| format!("Rejected ratio for {package_id}"))?;
        self.set_ratio(package_id, ratio).await
    }

    pub async fn remove_app(&self, package_id: &str) -> Result<()> {
        self.store.delete_habit_app(package_id).await?;
        self.invalidate_caches();
        Ok(())
    }

    pub async fn clear_all(&self) -> Result<()> {
        self.store.clear_habit_apps().await?;
        self.invalidate_caches();
        Ok(())
    }

    pub fn invalidate_caches(&self) {
        for cache in &self.caches {
            cache.invalidate();
        }
    }

    async fn load_or_new(&self, package_id: &str) -> Result<HabitApp> {
        validate_package_id(package_id)?;
        Ok(self
            .app(package_id)
            .await?
            .unwrap_or_else(|| HabitApp::new(package_id, package_id)))
    }

    async fn save(&self, app: HabitApp) -> Result<HabitApp> {
        self.store.upsert_habit_app(&app).await?;
        self.invalidate_caches();
        log_info!(
            "Habit config for {}: good={} bad={} ratio={}",
            app.package_id,
            app.is_good_habit,
            app.is_bad_habit,
            app.ratio
        );
        Ok(app)
    }
}

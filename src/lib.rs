pub mod charge;
pub mod db;
pub mod energy;
pub mod habits;
pub mod lock;
pub mod platform;
pub mod sensing;
pub mod settings;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};

use charge::ChargeService;
use db::{Database, EnergyStore};
use energy::{EnergyConfig, EnergyLedger, EnergyView};
use habits::HabitRegistry;
use lock::{EnforcementActuator, LockCoordinator, SwitchRouter};
use platform::{AccessibilityRegistry, Platform};
use sensing::UsageImporter;
use settings::SettingsStore;

pub use utils::init_logging;

const DATABASE_FILE: &str = "habit_energy.db";
const SETTINGS_FILE: &str = "settings.json";

/// Every long-lived component, constructed once at process start and handed
/// out by reference.
pub struct EnergyRuntime {
    db: Database,
    settings: Arc<SettingsStore>,
    ledger: EnergyLedger,
    actuator: Arc<EnforcementActuator>,
    coordinator: LockCoordinator,
    router: SwitchRouter,
    habits: HabitRegistry,
    charges: ChargeService,
    view: EnergyView,
    importer: UsageImporter,
    accessibility: AccessibilityRegistry,
}

impl EnergyRuntime {
    /// Open storage under `data_dir`, load today's energy and start
    /// monitoring. A failed energy load is logged and monitoring starts from
    /// zero.
    pub async fn start(data_dir: &Path, platform: Platform, config: EnergyConfig) -> Result<Self> {
        init_logging();

        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

        let db = Database::new(data_dir.join(DATABASE_FILE))?;
        let settings = Arc::new(SettingsStore::new(data_dir.join(SETTINGS_FILE))?);
        let store: Arc<dyn EnergyStore> = Arc::new(db.clone());

        let ledger = EnergyLedger::new(
            store.clone(),
            platform.foreground.clone(),
            config.clone(),
            settings.max_energy(),
        );
        let actuator = Arc::new(EnforcementActuator::new(
            platform.accessibility.clone(),
            store.clone(),
            config.clone(),
        ));
        let coordinator = LockCoordinator::new(
            ledger.clone(),
            platform.notifier.clone(),
            actuator.clone(),
            config.clone(),
        );
        ledger.set_depletion_sink(Arc::new(coordinator.clone()));

        let router = SwitchRouter::new(ledger.clone(), coordinator.clone(), actuator.clone());
        let habits = HabitRegistry::new(
            store.clone(),
            vec![ledger.habit_cache(), actuator.habit_cache()],
        );
        let charges = ChargeService::new(store.clone(), ledger.clone(), settings.clone(), config);
        let view = EnergyView::new(ledger.clone(), Some(coordinator.clone()));
        let importer = UsageImporter::new(store, ledger.habit_cache());

        if let Err(err) = ledger.load_current_energy().await {
            log::error!("Starting with unloaded energy: {err:?}");
        }
        coordinator.start().await;
        ledger.start_monitoring().await;
        router.start().await;

        log::info!(
            "Energy runtime started at {} (energy {}/{})",
            data_dir.display(),
            ledger.current_energy(),
            ledger.max_energy().await
        );

        Ok(Self {
            db,
            settings,
            ledger,
            actuator,
            coordinator,
            router,
            habits,
            charges,
            view,
            importer,
            accessibility: platform.accessibility,
        })
    }

    /// Stop monitoring (flushing pending minutes), then the observers.
    pub async fn shutdown(&self) -> Result<()> {
        self.router.stop().await?;
        self.ledger.stop_monitoring().await?;
        self.coordinator.stop().await?;
        log::info!("Energy runtime stopped");
        Ok(())
    }

    /// Persist a new ceiling and apply it to the live value.
    pub async fn set_max_energy(&self, max_energy: i64) -> Result<i64> {
        self.settings.update_max_energy(max_energy)?;
        let transition = self.ledger.set_max_energy(max_energy).await;
        Ok(transition.current)
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn ledger(&self) -> &EnergyLedger {
        &self.ledger
    }

    pub fn actuator(&self) -> &Arc<EnforcementActuator> {
        &self.actuator
    }

    pub fn coordinator(&self) -> &LockCoordinator {
        &self.coordinator
    }

    pub fn router(&self) -> &SwitchRouter {
        &self.router
    }

    pub fn habits(&self) -> &HabitRegistry {
        &self.habits
    }

    pub fn charges(&self) -> &ChargeService {
        &self.charges
    }

    pub fn view(&self) -> &EnergyView {
        &self.view
    }

    pub fn importer(&self) -> &UsageImporter {
        &self.importer
    }

    pub fn accessibility(&self) -> &AccessibilityRegistry {
        &self.accessibility
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingChannel, RecordingNotifier, ScriptedForeground};
    use std::time::Duration;

    fn platform() -> (Platform, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::default());
        let platform = Platform {
            foreground: Arc::new(ScriptedForeground::new()),
            notifier: notifier.clone(),
            accessibility: AccessibilityRegistry::new(),
        };
        (platform, notifier)
    }

    #[tokio::test]
    async fn runtime_wires_charge_lock_and_block() {
        let dir = tempfile::tempdir().unwrap();
        let (platform, notifier) = platform();
        let runtime = EnergyRuntime::start(dir.path(), platform, EnergyConfig::default())
            .await
            .unwrap();

        assert!(runtime.ledger().is_monitoring());
        assert_eq!(runtime.ledger().current_energy(), 0);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(runtime.coordinator().is_locked());
        assert_eq!(notifier.shown_count(), 1);

        let channel = Arc::new(RecordingChannel::default());
        runtime.accessibility().connect(channel.clone());
        runtime.habits().register_app("com.video", "Video").await.unwrap();
        runtime.habits().set_bad_habit("com.video", true).await.unwrap();

        let decision = runtime.router().on_foreground_changed("com.video").await;
        assert_eq!(decision, lock::SwitchDecision::Block);
        assert_eq!(channel.home_count(), 1);

        runtime.charges().insert_charge("測試充電", 5, 2.0).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(runtime.ledger().current_energy(), 10);
        assert!(!runtime.coordinator().is_locked());
        assert_eq!(notifier.hidden_count(), 1);
        assert_eq!(runtime.view().current().await, 10);

        runtime.shutdown().await.unwrap();
        assert!(!runtime.ledger().is_monitoring());
        assert_eq!(runtime.view().current().await, 10);
    }

    #[tokio::test]
    async fn max_energy_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        {
            let (platform, _) = platform();
            let runtime = EnergyRuntime::start(dir.path(), platform, EnergyConfig::default())
                .await
                .unwrap();
            runtime.charges().insert_charge("讀書", 100, 1.0).await.unwrap();
            assert_eq!(runtime.set_max_energy(60).await.unwrap(), 60);
            runtime.shutdown().await.unwrap();
        }

        let (platform, _) = platform();
        let runtime = EnergyRuntime::start(dir.path(), platform, EnergyConfig::default())
            .await
            .unwrap();
        assert_eq!(runtime.ledger().max_energy().await, 60);
        assert_eq!(runtime.ledger().current_energy(), 60);
        runtime.shutdown().await.unwrap();
    }
}

use crate::lock::LockCoordinator;

use super::ledger::{today, EnergyLedger};

const ENABLE_LOGS: bool = true;

use crate::log_warn;

/// The energy value shown to the user. The live ledger value wins while
/// monitoring; otherwise today's records are replayed.
#[derive(Clone)]
pub struct EnergyView {
    ledger: EnergyLedger,
    coordinator: Option<LockCoordinator>,
}

impl EnergyView {
    pub fn new(ledger: EnergyLedger, coordinator: Option<LockCoordinator>) -> Self {
        Self { ledger, coordinator }
    }

    pub async fn current(&self) -> i64 {
        if self.ledger.is_monitoring() {
            return self.ledger.current_energy();
        }

        let max = self.ledger.max_energy().await;
        match self.ledger.energy_for_date(today(), max).await {
            Ok(energy) => energy,
            Err(err) => {
                log_warn!("Falling back to last live energy: {err:?}");
                self.ledger.current_energy()
            }
        }
    }

    pub async fn status_line(&self) -> String {
        let energy = self.current().await;
        let max = self.ledger.max_energy().await;
        let (locked, shown) = self
            .coordinator
            .as_ref()
            .map(|c| {
                let state = c.state();
                (state.locked, state.notification_shown)
            })
            .unwrap_or((energy <= 0, false));

        format!(
            "energy {energy}/{max}, monitoring={}, locked={locked}, notification={shown}",
            self.ledger.is_monitoring()
        )
    }
}

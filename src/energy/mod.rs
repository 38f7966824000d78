pub mod config;
pub mod habit_cache;
pub mod ledger;
pub mod state;
pub mod view;

pub use config::{EnergyConfig, PartialMinutePolicy, DEFAULT_MAX_ENERGY};
pub use habit_cache::HabitCache;
pub use ledger::{DepletionSink, EnergyLedger, LedgerSnapshot};
pub use state::{EnergyBalance, EnergyTransition};
pub use view::EnergyView;

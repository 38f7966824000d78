pub mod charge_record;
pub mod habit_app;
pub mod usage_record;

pub use charge_record::{charge_energy, ChargeRecord};
pub use habit_app::{validation, HabitApp, HabitClass};
pub use usage_record::UsageRecord;

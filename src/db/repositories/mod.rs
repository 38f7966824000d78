mod charge_records;
mod habit_apps;
mod usage_records;

//! Usage minutes settled for one package on one calendar day.
//!
//! Several rows may exist for the same package and day; readers add them up.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub id: Option<i64>,
    pub package_id: String,
    pub display_name: String,
    pub date: NaiveDate,
    pub minutes: u32,
}

impl UsageRecord {
    pub fn new(
        package_id: impl Into<String>,
        display_name: impl Into<String>,
        date: NaiveDate,
        minutes: u32,
    ) -> Self {
        Self {
            id: None,
            package_id: package_id.into(),
            display_name: display_name.into(),
            date,
            minutes,
        }
    }
}

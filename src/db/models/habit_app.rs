//! Habit app configuration.
//!
//! A `HabitApp` marks a package as a good habit (earns energy at `ratio` per
//! minute) or a bad habit (costs one energy per minute). Both flags are stored
//! independently so the settings screen can flip one without touching the
//! other; `classification` resolves the combination.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HabitApp {
    pub package_id: String,
    pub display_name: String,
    pub ratio: f32,
    pub is_good_habit: bool,
    pub is_bad_habit: bool,
}

impl HabitApp {
    pub fn new(package_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            package_id: package_id.into(),
            display_name: display_name.into(),
            ratio: 1.0,
            is_good_habit: false,
            is_bad_habit: false,
        }
    }

    pub fn good(package_id: impl Into<String>, display_name: impl Into<String>, ratio: f32) -> Self {
        Self {
            ratio,
            is_good_habit: true,
            ..Self::new(package_id, display_name)
        }
    }

    pub fn bad(package_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            is_bad_habit: true,
            ..Self::new(package_id, display_name)
        }
    }

    /// Bad habit takes precedence when both flags are set.
    pub fn classification(&self) -> HabitClass {
        if self.is_bad_habit {
            HabitClass::Bad
        } else if self.is_good_habit {
            HabitClass::Good { ratio: self.ratio }
        } else {
            HabitClass::Neutral
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HabitClass {
    Good { ratio: f32 },
    Bad,
    Neutral,
}

impl HabitClass {
    pub fn is_bad(&self) -> bool {
        matches!(self, HabitClass::Bad)
    }

    /// Energy change for `minutes` of settled usage.
    pub fn usage_delta(&self, minutes: u32) -> i64 {
        match self {
            HabitClass::Good { ratio } => (f64::from(minutes) * f64::from(*ratio)).round() as i64,
            HabitClass::Bad => -i64::from(minutes),
            HabitClass::Neutral => 0,
        }
    }
}

/// Validation for values typed into the settings and charge screens.
pub mod validation {
    use anyhow::{anyhow, bail, Result};

    const MAX_RATIO: f32 = 100.0;

    /// Accepts `"2"`, `"2.5"` or the `"1:2"` form (one minute earns two).
    pub fn parse_ratio(text: &str) -> Result<f32> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            bail!("Ratio is required");
        }

        let ratio = match trimmed.split_once(':') {
            Some((left, right)) => {
                let minutes: f32 = left
                    .trim()
                    .parse()
                    .map_err(|_| anyhow!("Invalid ratio '{trimmed}'"))?;
                let energy: f32 = right
                    .trim()
                    .parse()
                    .map_err(|_| anyhow!("Invalid ratio '{trimmed}'"))?;
                if minutes <= 0.0 {
                    bail!("Invalid ratio '{trimmed}': left side must be positive");
                }
                energy / minutes
            }
            None => trimmed
                .parse()
                .map_err(|_| anyhow!("Invalid ratio '{trimmed}'"))?,
        };

        validate_ratio(ratio)?;
        Ok(ratio)
    }

    pub fn validate_ratio(ratio: f32) -> Result<()> {
        if !ratio.is_finite() || ratio < 0.0 {
            bail!("Ratio must be a non-negative number");
        }
        if ratio > MAX_RATIO {
            bail!("Ratio too large (max {MAX_RATIO})");
        }
        Ok(())
    }

    pub fn validate_package_id(package_id: &str) -> Result<()> {
        if package_id.trim().is_empty() {
            bail!("package_id is required");
        }
        if package_id.chars().any(char::is_whitespace) {
            bail!("package_id must not contain whitespace");
        }
        Ok(())
    }
}

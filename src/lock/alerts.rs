use serde::Serialize;

pub const LOCKED_TITLE: &str = "能量已歸零！";
pub const LOCKED_TEXT: &str = "請充電後再使用壞習慣 App";

/// Ongoing alert shown for as long as bad-habit apps are locked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockedAlert {
    pub title: String,
    pub text: String,
    /// Non-dismissable while set.
    pub ongoing: bool,
}

impl Default for LockedAlert {
    fn default() -> Self {
        Self {
            title: LOCKED_TITLE.to_string(),
            text: LOCKED_TEXT.to_string(),
            ongoing: true,
        }
    }
}

/// Dismissible `current/max` energy status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusAlert {
    pub current: i64,
    pub max: i64,
}

impl StatusAlert {
    pub fn new(current: i64, max: i64) -> Self {
        let max = max.max(1);
        Self {
            current: current.clamp(0, max),
            max,
        }
    }

    pub fn title(&self) -> String {
        format!("剩餘能量: {} 分鐘", self.current)
    }

    pub fn text(&self) -> String {
        format!("{}/{}", self.current, self.max)
    }

    /// Fill level in `[0, 100]`, for a progress indicator.
    pub fn percent(&self) -> u8 {
        ((self.current * 100) / self.max) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_clamped() {
        let status = StatusAlert::new(250, 180);
        assert_eq!(status.text(), "180/180");
        assert_eq!(status.percent(), 100);

        let status = StatusAlert::new(-4, 0);
        assert_eq!((status.current, status.max), (0, 1));
        assert_eq!(status.title(), "剩餘能量: 0 分鐘");
    }

    #[test]
    fn locked_alert_is_ongoing() {
        let alert = LockedAlert::default();
        assert!(alert.ongoing);
        assert_eq!(alert.title, LOCKED_TITLE);
    }
}

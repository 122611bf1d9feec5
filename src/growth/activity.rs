use core::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Point-granting actions a family member can complete once per activity
/// day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Attendance,
    Water,
    Nutrient,
    Emotion,
    Quiz,
    Lastleaf,
    Register,
    Survey,
}

impl ActivityKind {
    pub const ALL: [ActivityKind; 8] = [
        ActivityKind::Attendance,
        ActivityKind::Water,
        ActivityKind::Nutrient,
        ActivityKind::Emotion,
        ActivityKind::Quiz,
        ActivityKind::Lastleaf,
        ActivityKind::Register,
        ActivityKind::Survey,
    ];

    /// Points granted before the nutrient multiplier is applied.
    pub fn base_points(self) -> i64 {
        match self {
            ActivityKind::Attendance => 5,
            ActivityKind::Water => 10,
            ActivityKind::Nutrient => 10,
            ActivityKind::Emotion => 10,
            ActivityKind::Quiz => 15,
            ActivityKind::Lastleaf => 15,
            ActivityKind::Register => 20,
            ActivityKind::Survey => 20,
        }
    }

    /// Watering and feeding are the actions other family members see in
    /// real time.
    pub fn is_watering(self) -> bool {
        matches!(self, ActivityKind::Water | ActivityKind::Nutrient)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActivityKind::Attendance => "attendance",
            ActivityKind::Water => "water",
            ActivityKind::Nutrient => "nutrient",
            ActivityKind::Emotion => "emotion",
            ActivityKind::Quiz => "quiz",
            ActivityKind::Lastleaf => "lastleaf",
            ActivityKind::Register => "register",
            ActivityKind::Survey => "survey",
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("unknown activity kind '{0}'")]
pub struct UnknownActivity(pub String);

impl FromStr for ActivityKind {
    type Err = UnknownActivity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActivityKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownActivity(s.to_string()))
    }
}

/// Calendar day that scopes once-per-day eligibility. Computed from the
/// service clock plus a fixed offset, so every member of a family rolls
/// over at the same instant no matter where their device thinks it is.
/// Crossing the boundary resets eligibility immediately, regardless of
/// how recently an activity was completed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActivityDay(String);

impl ActivityDay {
    pub fn from_instant(at: DateTime<Utc>, offset_minutes: i32) -> Self {
        let offset = offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| Utc.fix());

        ActivityDay(at.with_timezone(&offset).format("%Y-%m-%d").to_string())
    }

    pub fn today(offset_minutes: i32) -> Self {
        Self::from_instant(Utc::now(), offset_minutes)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActivityDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_kind_round_trips_through_str() {
        for kind in ActivityKind::ALL {
            assert_eq!(kind.as_str().parse::<ActivityKind>(), Ok(kind));
        }

        assert!("gardening".parse::<ActivityKind>().is_err());
    }

    #[test]
    fn test_watering_kinds() {
        assert!(ActivityKind::Water.is_watering());
        assert!(ActivityKind::Nutrient.is_watering());
        assert!(!ActivityKind::Quiz.is_watering());
    }

    #[test]
    fn test_day_uses_the_configured_offset() {
        // 23:30 UTC on Jan 1 is already Jan 2 in KST (+540)
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 23, 30, 0).unwrap();

        assert_eq!(ActivityDay::from_instant(at, 0).as_str(), "2024-01-01");
        assert_eq!(ActivityDay::from_instant(at, 540).as_str(), "2024-01-02");
    }

    #[test]
    fn test_boundary_crossing_resets_the_day() {
        let before = Utc.with_ymd_and_hms(2024, 1, 1, 23, 59, 59).unwrap();
        let after = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 1).unwrap();

        assert_ne!(
            ActivityDay::from_instant(before, 0),
            ActivityDay::from_instant(after, 0),
        );
    }

    #[test]
    fn test_bogus_offset_degrades_to_utc() {
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();

        assert_eq!(
            ActivityDay::from_instant(at, i32::MAX / 60),
            ActivityDay::from_instant(at, 0),
        );
    }
}

use core::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::models::family::FamilyId;
use crate::growth::engine::PlantState;
use crate::growth::level::{LevelCurve, MAX_LEVEL};

/// What a family can choose to grow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlantKind {
    Flower,
    Tree,
}

impl PlantKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PlantKind::Flower => "flower",
            PlantKind::Tree => "tree",
        }
    }
}

impl fmt::Display for PlantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("unknown plant kind '{0}'")]
pub struct UnknownPlantKind(pub String);

impl FromStr for PlantKind {
    type Err = UnknownPlantKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flower" => Ok(PlantKind::Flower),
            "tree" => Ok(PlantKind::Tree),
            other => Err(UnknownPlantKind(other.to_string())),
        }
    }
}

/// Base plant table model. One row per family while a cycle is running;
/// the row disappears when the reward is claimed.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Plant {
    pub id: i64,
    pub family_id: FamilyId,
    pub kind: String,
    pub level: i32,
    pub experience_point: i64,
    pub nutrient_count: i32,
    pub nutrient_active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Plant {
    pub fn state(&self) -> PlantState {
        PlantState {
            level: self.level,
            experience_point: self.experience_point,
            nutrient_count: self.nutrient_count,
            nutrient_active: self.nutrient_active,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.level >= MAX_LEVEL
    }
}

/// Status payload the mobile client renders on the garden screen.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlantStatus {
    pub kind: String,
    pub level: i32,
    pub experience_point: i64,
    pub exp_threshold: i64,
    pub progress_percentage: i64,
    pub remaining_exp: i64,
    pub nutrient_count: i32,
    pub nutrient_active: bool,
    pub is_completed: bool,
    pub member_count: i64,
}

impl PlantStatus {
    pub fn project(plant: &Plant, member_count: i64, curve: &LevelCurve) -> Self {
        Self {
            kind: plant.kind.clone(),
            level: plant.level,
            experience_point: plant.experience_point,
            exp_threshold: curve.threshold(member_count, plant.level),
            progress_percentage: curve.progress_percentage(
                plant.experience_point,
                member_count,
                plant.level,
            ),
            remaining_exp: curve.remaining_exp(plant.experience_point, member_count, plant.level),
            nutrient_count: plant.nutrient_count,
            nutrient_active: plant.nutrient_active,
            is_completed: plant.is_completed(),
            member_count,
        }
    }
}

#[cfg(test)]
mod test {
    use chrono::Utc;

    use super::*;

    fn plant(level: i32, exp: i64) -> Plant {
        Plant {
            id: 1,
            family_id: FamilyId(7),
            kind: "flower".to_string(),
            level,
            experience_point: exp,
            nutrient_count: 0,
            nutrient_active: false,
            created_at: Utc::now().naive_utc(),
            updated_at: Utc::now().naive_utc(),
        }
    }

    #[test]
    fn test_status_projection_mid_cycle() {
        let status = PlantStatus::project(&plant(2, 150), 3, &LevelCurve::default());

        assert_eq!(status.exp_threshold, 250);
        assert_eq!(status.progress_percentage, 60);
        assert_eq!(status.remaining_exp, 100);
        assert!(!status.is_completed);
    }

    #[test]
    fn test_status_projection_completed() {
        let status = PlantStatus::project(&plant(5, 42), 3, &LevelCurve::default());

        assert_eq!(status.progress_percentage, 100);
        assert_eq!(status.remaining_exp, 0);
        assert!(status.is_completed);
    }

    #[test]
    fn test_plant_kind_round_trip() {
        assert_eq!("flower".parse::<PlantKind>(), Ok(PlantKind::Flower));
        assert_eq!("tree".parse::<PlantKind>(), Ok(PlantKind::Tree));
        assert!("cactus".parse::<PlantKind>().is_err());
    }
}

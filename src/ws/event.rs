use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::models::family::{FamilyId, Member};
use crate::growth::activity::ActivityKind;
use crate::growth::engine::GrowthOutcome;

#[derive(Debug, Error)]
#[error("malformed event payload: {0}")]
pub struct EventParseError(#[from] serde_json::Error);

/// Envelope fanned out to connected family sessions. Tagged so consumers
/// validate the shape at the boundary instead of sniffing fields, and
/// every variant carries the family it is scoped to.
///
/// Events are at-most-once hints to refresh; authoritative state always
/// comes back through the query API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PlantEvent {
    #[serde(rename_all = "camelCase")]
    Watered {
        family_id: FamilyId,
        user_id: String,
        name: String,
        image: String,
        timestamp: DateTime<Utc>,
    },

    #[serde(rename_all = "camelCase")]
    PointsAdded {
        family_id: FamilyId,
        activity: String,
        points: i64,
        level: i32,
        experience_point: i64,
        leveled_up: bool,
    },

    #[serde(rename_all = "camelCase")]
    RewardClaimed {
        family_id: FamilyId,
        name: String,
        timestamp: DateTime<Utc>,
    },
}

impl PlantEvent {
    pub fn watered(family_id: FamilyId, member: &Member, at: DateTime<Utc>) -> Self {
        PlantEvent::Watered {
            family_id,
            user_id: member.id.to_string(),
            name: member.name.clone(),
            image: member.image.clone(),
            timestamp: at,
        }
    }

    pub fn points_added(family_id: FamilyId, kind: ActivityKind, outcome: &GrowthOutcome) -> Self {
        PlantEvent::PointsAdded {
            family_id,
            activity: kind.to_string(),
            points: outcome.points,
            level: outcome.level,
            experience_point: outcome.experience_point,
            leveled_up: outcome.leveled_up,
        }
    }

    pub fn reward_claimed(family_id: FamilyId, name: &str, at: DateTime<Utc>) -> Self {
        PlantEvent::RewardClaimed {
            family_id,
            name: name.to_string(),
            timestamp: at,
        }
    }

    /// Family the event is scoped to, used for defensive filtering on
    /// both ends of the fan-out.
    pub fn family_id(&self) -> FamilyId {
        match self {
            PlantEvent::Watered { family_id, .. }
            | PlantEvent::PointsAdded { family_id, .. }
            | PlantEvent::RewardClaimed { family_id, .. } => *family_id,
        }
    }

    pub fn is_watering(&self) -> bool {
        matches!(self, PlantEvent::Watered { .. })
    }

    pub fn parse(raw: &str) -> Result<Self, EventParseError> {
        Ok(serde_json::from_str(raw)?)
    }
}

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::db::models::family::FamilyId;

/// Immutable record of a prize granted for a finished growth cycle.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardHistory {
    pub id: i64,
    pub family_id: FamilyId,
    pub name: String,
    pub description: String,
    pub created_at: NaiveDateTime,
}

/// Prize attached to each plant kind when its cycle completes.
pub fn reward_for(kind: &str) -> (&'static str, &'static str) {
    match kind {
        "tree" => (
            "Evergreen Badge",
            "Grew a family tree all the way to its final leaf",
        ),
        _ => (
            "Full Bloom Badge",
            "Grew a family flower all the way to full bloom",
        ),
    }
}

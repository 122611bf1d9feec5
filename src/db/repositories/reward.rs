use sqlx::PgPool;
use tracing::instrument;

use crate::db::models::family::FamilyId;
use crate::db::models::plant::Plant;
use crate::db::models::reward::{RewardHistory, reward_for};
use crate::db::repositories::sql_fragment::{PLANT_FIELDS, REWARD_FIELDS};
use crate::db::{PgError, PgResult};
use crate::growth::level::MAX_LEVEL;

#[derive(Debug, Clone)]
pub struct RewardRepository {
    pool: PgPool,
}

impl RewardRepository {
    pub fn new(pool: &PgPool) -> Self {
        Self { pool: pool.clone() }
    }

    /// Claims the prize for a completed cycle. The plant row lock
    /// serializes racing claims; the first one wins and deletes the row,
    /// so any claim after it fails with `PlantMissing` until the family
    /// starts a new cycle.
    #[instrument(skip(self))]
    pub async fn claim(&self, family_id: FamilyId) -> PgResult<RewardHistory> {
        let mut tx = self.pool.begin().await?;

        let plant = sqlx::query_as::<_, Plant>(&format!(
            "SELECT {PLANT_FIELDS} FROM plant WHERE family_id = $1 FOR UPDATE"
        ))
        .bind(family_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(PgError::PlantMissing(family_id))?;

        if plant.level < MAX_LEVEL {
            return Err(PgError::NotMature(plant.level));
        }

        let (name, description) = reward_for(&plant.kind);

        let reward = sqlx::query_as::<_, RewardHistory>(&format!(
            r#"
            INSERT INTO reward_history (family_id, name, description, created_at)
            VALUES ($1, $2, $3, NOW())
            RETURNING {REWARD_FIELDS}
            "#
        ))
        .bind(family_id)
        .bind(name)
        .bind(description)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM plant WHERE id = $1")
            .bind(plant.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(%family_id, reward = reward.name, "growth cycle completed and claimed");

        Ok(reward)
    }

    #[instrument(skip(self))]
    pub async fn history(&self, family_id: FamilyId) -> PgResult<Vec<RewardHistory>> {
        let rewards = sqlx::query_as::<_, RewardHistory>(&format!(
            "SELECT {REWARD_FIELDS} FROM reward_history WHERE family_id = $1 ORDER BY created_at DESC"
        ))
        .bind(family_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rewards)
    }
}

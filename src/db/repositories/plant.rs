use sqlx::PgPool;
use tracing::instrument;

use crate::db::models::family::FamilyId;
use crate::db::models::plant::{Plant, PlantKind};
use crate::db::repositories::sql_fragment::PLANT_FIELDS;
use crate::db::{PgError, PgResult};
use crate::growth::activity::ActivityKind;
use crate::growth::engine::{self, GrowthOutcome};
use crate::growth::level::LevelCurve;

#[derive(Debug, Clone)]
pub struct PlantRepository {
    pool: PgPool,
}

impl PlantRepository {
    pub fn new(pool: &PgPool) -> Self {
        Self { pool: pool.clone() }
    }

    /// Starts a growth cycle. A family grows one plant at a time, so a
    /// live row for the family rejects the insert.
    #[instrument(skip(self))]
    pub async fn create(&self, family_id: FamilyId, kind: PlantKind) -> PgResult<Plant> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<i64> =
            sqlx::query_scalar("SELECT id FROM plant WHERE family_id = $1 FOR UPDATE")
                .bind(family_id)
                .fetch_optional(&mut *tx)
                .await?;

        if existing.is_some() {
            return Err(PgError::PlantAlreadyGrowing(family_id));
        }

        let plant = sqlx::query_as::<_, Plant>(&format!(
            r#"
            INSERT INTO plant (
                family_id,
                kind,
                level,
                experience_point,
                nutrient_count,
                nutrient_active,
                created_at,
                updated_at
            )
            VALUES ($1, $2, 1, 0, 0, false, NOW(), NOW())
            RETURNING {PLANT_FIELDS}
            "#
        ))
        .bind(family_id)
        .bind(kind.as_str())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(plant)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, family_id: FamilyId) -> PgResult<Option<Plant>> {
        let plant = sqlx::query_as::<_, Plant>(&format!(
            "SELECT {PLANT_FIELDS} FROM plant WHERE family_id = $1"
        ))
        .bind(family_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(plant)
    }

    /// Runs the growth transition under a row lock, so concurrent
    /// activities from different family members apply one at a time and
    /// each level-up is computed against a consistent snapshot.
    #[instrument(skip(self, curve))]
    pub async fn apply_activity(
        &self,
        family_id: FamilyId,
        kind: ActivityKind,
        member_count: i64,
        curve: &LevelCurve,
    ) -> PgResult<GrowthOutcome> {
        let mut tx = self.pool.begin().await?;

        let plant = sqlx::query_as::<_, Plant>(&format!(
            "SELECT {PLANT_FIELDS} FROM plant WHERE family_id = $1 FOR UPDATE"
        ))
        .bind(family_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(PgError::PlantMissing(family_id))?;

        let (next, outcome) = engine::apply(&plant.state(), kind, member_count, curve)?;

        sqlx::query(
            r#"
            UPDATE plant
            SET level = $1,
                experience_point = $2,
                nutrient_count = $3,
                nutrient_active = $4,
                updated_at = NOW()
            WHERE id = $5
            "#,
        )
        .bind(next.level)
        .bind(next.experience_point)
        .bind(next.nutrient_count)
        .bind(next.nutrient_active)
        .bind(plant.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!(
            %family_id,
            %kind,
            points = outcome.points,
            level = outcome.level,
            "applied activity to plant"
        );

        Ok(outcome)
    }
}

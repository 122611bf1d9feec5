use sqlx::PgPool;
use tracing::instrument;

use crate::db::models::family::{Family, FamilyId, FamilyOverview, Member, MemberId};
use crate::db::repositories::sql_fragment::{FAMILY_FIELDS, MEMBER_FIELDS};
use crate::db::{PgError, PgResult};
use crate::growth::level::MAX_FAMILY_SIZE;

#[derive(Debug, Clone)]
pub struct FamilyRepository {
    pool: PgPool,
}

impl FamilyRepository {
    pub fn new(pool: &PgPool) -> Self {
        Self { pool: pool.clone() }
    }

    /// Inserts the member on first login, refreshing the provider profile
    /// fields on every later one.
    #[instrument(skip(self, name, image))]
    pub async fn upsert_member(&self, id: &MemberId, name: &str, image: &str) -> PgResult<Member> {
        let member = sqlx::query_as::<_, Member>(&format!(
            r#"
            INSERT INTO member (id, family_id, name, image, created_at, updated_at)
            VALUES ($1, NULL, $2, $3, NOW(), NOW())
            ON CONFLICT (id)
            DO UPDATE SET
                name = EXCLUDED.name,
                image = EXCLUDED.image,
                updated_at = NOW()
            RETURNING {MEMBER_FIELDS}
            "#
        ))
        .bind(id)
        .bind(name)
        .bind(image)
        .fetch_one(&self.pool)
        .await?;

        Ok(member)
    }

    #[instrument(skip(self))]
    pub async fn get_member(&self, id: &MemberId) -> PgResult<Option<Member>> {
        let member = sqlx::query_as::<_, Member>(&format!(
            "SELECT {MEMBER_FIELDS} FROM member WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(member)
    }

    #[instrument(skip(self, name))]
    pub async fn create(&self, name: &str, creator: &MemberId) -> PgResult<Family> {
        let mut tx = self.pool.begin().await?;

        let family = sqlx::query_as::<_, Family>(&format!(
            r#"
            INSERT INTO family (name, created_at, updated_at)
            VALUES ($1, NOW(), NOW())
            RETURNING {FAMILY_FIELDS}
            "#
        ))
        .bind(name)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE member SET family_id = $1, updated_at = NOW() WHERE id = $2")
            .bind(family.id)
            .bind(creator)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(family)
    }

    /// Attaches the member to an existing family. The family row is
    /// locked first so the size cap holds under concurrent joins.
    #[instrument(skip(self))]
    pub async fn join(&self, family_id: FamilyId, member: &MemberId) -> PgResult<()> {
        let mut tx = self.pool.begin().await?;

        let found: Option<i64> =
            sqlx::query_scalar("SELECT id FROM family WHERE id = $1 FOR UPDATE")
                .bind(family_id)
                .fetch_optional(&mut *tx)
                .await?;

        if found.is_none() {
            return Err(PgError::FamilyMissing(family_id));
        }

        let size: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM member WHERE family_id = $1")
            .bind(family_id)
            .fetch_one(&mut *tx)
            .await?;

        if size >= MAX_FAMILY_SIZE {
            return Err(PgError::FamilyFull(family_id));
        }

        sqlx::query("UPDATE member SET family_id = $1, updated_at = NOW() WHERE id = $2")
            .bind(family_id)
            .bind(member)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn member_count(&self, family_id: FamilyId) -> PgResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM member WHERE family_id = $1")
            .bind(family_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    #[instrument(skip(self))]
    pub async fn is_member(&self, family_id: FamilyId, member: &MemberId) -> PgResult<bool> {
        let found: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM member WHERE id = $1 AND family_id = $2)",
        )
        .bind(member)
        .bind(family_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(found)
    }

    #[instrument(skip(self))]
    pub async fn overview(&self, family_id: FamilyId) -> PgResult<FamilyOverview> {
        let family = sqlx::query_as::<_, Family>(&format!(
            "SELECT {FAMILY_FIELDS} FROM family WHERE id = $1"
        ))
        .bind(family_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(PgError::FamilyMissing(family_id))?;

        let members = sqlx::query_as::<_, Member>(&format!(
            "SELECT {MEMBER_FIELDS} FROM member WHERE family_id = $1 ORDER BY created_at ASC"
        ))
        .bind(family_id)
        .fetch_all(&self.pool)
        .await?;

        let member_count = members.len() as i64;

        Ok(FamilyOverview {
            family,
            members,
            member_count,
        })
    }
}

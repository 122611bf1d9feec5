use sqlx::PgPool;
use thiserror::Error;

use crate::db::models::family::FamilyId;
use crate::growth::engine::GrowthError;

pub mod ledger;
pub mod models;
pub mod repositories;

pub mod prelude {
    pub use crate::db::PgError;
    pub use crate::db::connect_pg;

    pub use crate::db::models::family::{Family, FamilyId, FamilyOverview, Member, MemberId};
    pub use crate::db::models::plant::{Plant, PlantKind, PlantStatus};
    pub use crate::db::models::reward::RewardHistory;

    pub use crate::db::ledger::{ActivityLedger, RedisLedger};
    pub use crate::db::repositories::family::FamilyRepository;
    pub use crate::db::repositories::plant::PlantRepository;
    pub use crate::db::repositories::reward::RewardRepository;
}

/// Connects the Postgres pool once at startup; repositories borrow it
/// through `AppState` rather than a process-wide singleton.
pub async fn connect_pg(database_url: &str) -> PgResult<PgPool> {
    Ok(sqlx::PgPool::connect(database_url).await?)
}

pub type PgResult<T> = core::result::Result<T, PgError>;

#[derive(Debug, Error)]
pub enum PgError {
    #[error(transparent)]
    SqlxError(#[from] sqlx::Error),

    #[error(transparent)]
    Growth(#[from] GrowthError),

    #[error("family {0} has no plant growing")]
    PlantMissing(FamilyId),

    #[error("family {0} is already growing a plant")]
    PlantAlreadyGrowing(FamilyId),

    #[error("no family with id {0}")]
    FamilyMissing(FamilyId),

    #[error("family {0} already has the maximum number of members")]
    FamilyFull(FamilyId),

    #[error("plant is at level {0}, reward claims open at the final level")]
    NotMature(i32),
}

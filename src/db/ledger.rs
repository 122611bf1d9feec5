#[cfg(test)]
use std::collections::HashSet;
#[cfg(test)]
use std::sync::Mutex;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use thiserror::Error;
use tracing::instrument;

use crate::db::models::family::MemberId;
use crate::growth::activity::{ActivityDay, ActivityKind};

/// Day-scoped markers expire on their own well after the boundary has
/// passed; nothing ever deletes them explicitly.
const MARKER_TTL_SECS: i64 = 2 * 24 * 60 * 60;

pub type LedgerResult<T> = core::result::Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    RedisClientError(#[from] redis::RedisError),
}

/// Storage port for the once-per-day activity markers. The key is
/// (activity day, member, activity kind); a marker either exists for the
/// day or it does not.
#[async_trait]
pub trait ActivityLedger: Send + Sync {
    async fn exists(
        &self,
        day: &ActivityDay,
        member: &MemberId,
        kind: ActivityKind,
    ) -> LedgerResult<bool>;

    /// Writes the marker, returning `false` when it was already present.
    /// The write is the idempotency gate for activity completion: two
    /// racing requests for the same key see exactly one `true`.
    async fn record(
        &self,
        day: &ActivityDay,
        member: &MemberId,
        kind: ActivityKind,
    ) -> LedgerResult<bool>;

    /// Compensation for a growth transaction that failed after its marker
    /// was written.
    async fn unrecord(
        &self,
        day: &ActivityDay,
        member: &MemberId,
        kind: ActivityKind,
    ) -> LedgerResult<()>;
}

fn marker_key(day: &ActivityDay, member: &MemberId, kind: ActivityKind) -> String {
    format!("activity:{}:{}:{}", day.as_str(), member, kind)
}

pub struct RedisLedger {
    manager: ConnectionManager,
}

impl RedisLedger {
    #[instrument(skip(redis_url))]
    pub async fn connect(redis_url: &str) -> LedgerResult<Self> {
        tracing::debug!("connecting to redis server");

        let client = redis::Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;

        Ok(Self { manager })
    }
}

#[async_trait]
impl ActivityLedger for RedisLedger {
    #[instrument(skip(self))]
    async fn exists(
        &self,
        day: &ActivityDay,
        member: &MemberId,
        kind: ActivityKind,
    ) -> LedgerResult<bool> {
        let mut conn = self.manager.clone();
        let found: i64 = redis::cmd("EXISTS")
            .arg(marker_key(day, member, kind))
            .query_async(&mut conn)
            .await?;

        Ok(found > 0)
    }

    #[instrument(skip(self))]
    async fn record(
        &self,
        day: &ActivityDay,
        member: &MemberId,
        kind: ActivityKind,
    ) -> LedgerResult<bool> {
        let mut conn = self.manager.clone();
        let set: Option<String> = redis::cmd("SET")
            .arg(marker_key(day, member, kind))
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(MARKER_TTL_SECS)
            .query_async(&mut conn)
            .await?;

        Ok(set.is_some())
    }

    #[instrument(skip(self))]
    async fn unrecord(
        &self,
        day: &ActivityDay,
        member: &MemberId,
        kind: ActivityKind,
    ) -> LedgerResult<()> {
        let mut conn = self.manager.clone();
        let _: () = redis::cmd("DEL")
            .arg(marker_key(day, member, kind))
            .query_async(&mut conn)
            .await?;

        Ok(())
    }
}

/// In-memory ledger standing in for redis under test.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryLedger {
    markers: Mutex<HashSet<String>>,
}

#[cfg(test)]
#[async_trait]
impl ActivityLedger for MemoryLedger {
    async fn exists(
        &self,
        day: &ActivityDay,
        member: &MemberId,
        kind: ActivityKind,
    ) -> LedgerResult<bool> {
        let markers = self.markers.lock().unwrap();
        Ok(markers.contains(&marker_key(day, member, kind)))
    }

    async fn record(
        &self,
        day: &ActivityDay,
        member: &MemberId,
        kind: ActivityKind,
    ) -> LedgerResult<bool> {
        let mut markers = self.markers.lock().unwrap();
        Ok(markers.insert(marker_key(day, member, kind)))
    }

    async fn unrecord(
        &self,
        day: &ActivityDay,
        member: &MemberId,
        kind: ActivityKind,
    ) -> LedgerResult<()> {
        let mut markers = self.markers.lock().unwrap();
        markers.remove(&marker_key(day, member, kind));
        Ok(())
    }
}

use std::collections::HashMap;

use tokio::sync::{RwLock, broadcast};
use tracing::instrument;

use crate::db::models::family::FamilyId;
use crate::ws::event::PlantEvent;

/// Sessions that fall further behind than this start dropping events,
/// which is acceptable for at-most-once refresh hints.
const CHANNEL_CAPACITY: usize = 64;

/// Per-family broadcast channels. A publish is routed to its event's
/// family only, so fan-out can never cross a family boundary; sessions
/// additionally filter what they receive in case that ever regresses.
#[derive(Debug, Default)]
pub struct EventHub {
    channels: RwLock<HashMap<FamilyId, broadcast::Sender<PlantEvent>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    #[instrument(skip(self))]
    pub async fn subscribe(&self, family_id: FamilyId) -> broadcast::Receiver<PlantEvent> {
        let mut channels = self.channels.write().await;

        channels
            .entry(family_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Returns how many sessions the event reached. Channels nobody is
    /// listening to are pruned on the way through.
    #[instrument(skip(self, event), fields(family_id = %event.family_id()))]
    pub async fn publish(&self, event: &PlantEvent) -> usize {
        let family_id = event.family_id();
        let mut channels = self.channels.write().await;

        let Some(tx) = channels.get(&family_id) else {
            return 0;
        };

        if tx.receiver_count() == 0 {
            channels.remove(&family_id);
            return 0;
        }

        let delivered = tx.send(event.clone()).unwrap_or(0);
        tracing::debug!(delivered, "event fanned out");

        delivered
    }
}

#[cfg(test)]
impl EventHub {
    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }
}

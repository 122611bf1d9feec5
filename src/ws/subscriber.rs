use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc::UnboundedSender;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::db::models::family::FamilyId;
use crate::ws::backoff::{Backoff, BackoffPolicy};
use crate::ws::event::PlantEvent;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub type SubscriberResult<T> = core::result::Result<T, SubscriberError>;

#[derive(Debug, Error)]
pub enum SubscriberError {
    #[error("reconnect attempts exhausted after {0} tries")]
    RetriesExhausted(u32),

    #[error("event consumer dropped its receiver")]
    SinkClosed,
}

#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    /// Channel endpoint without the family segment, e.g.
    /// `wss://api.example/ws/plant`.
    pub endpoint: String,
    pub family_id: FamilyId,
    pub token: String,
    pub reconnect: BackoffPolicy,
}

impl SubscriberConfig {
    fn uri(&self) -> String {
        format!(
            "{}/{}?token={}",
            self.endpoint.trim_end_matches('/'),
            self.family_id,
            self.token,
        )
    }
}

/// Listens on one family's channel and forwards validated events to the
/// sink until cancelled or out of reconnect attempts.
///
/// Events are at-most-once refresh hints; consumers reload authoritative
/// state through the query API. Envelopes that fail validation and
/// envelopes scoped to another family are dropped without reaching the
/// sink.
#[instrument(skip(config, sink, cancel), fields(family_id = %config.family_id))]
pub async fn run(
    config: SubscriberConfig,
    sink: UnboundedSender<PlantEvent>,
    cancel: CancellationToken,
) -> SubscriberResult<()> {
    let mut backoff = Backoff::new(config.reconnect.clone());
    let uri = config.uri();

    loop {
        if cancel.is_cancelled() {
            return Ok(());
        }

        match connect_async(uri.as_str()).await {
            Ok((stream, _)) => {
                info!("subscriber connected");
                backoff.reset();

                if listen(stream, &config, &sink, &cancel).await? {
                    return Ok(());
                }
            }
            Err(e) => warn!(error = ?e, "subscriber connect failed"),
        }

        let Some(delay) = backoff.next_delay() else {
            return Err(SubscriberError::RetriesExhausted(
                config.reconnect.max_attempts,
            ));
        };

        debug!(?delay, attempt = backoff.attempt(), "reconnecting after backoff");

        tokio::select! {
            _ = tokio::time::sleep(delay) => (),
            _ = cancel.cancelled() => return Ok(()),
        }
    }
}

/// Reads one connection to completion. `Ok(true)` means the subscriber
/// was cancelled; `Ok(false)` means the transport dropped and the caller
/// should reconnect.
async fn listen(
    stream: WsStream,
    config: &SubscriberConfig,
    sink: &UnboundedSender<PlantEvent>,
    cancel: &CancellationToken,
) -> SubscriberResult<bool> {
    let (mut writer, mut reader) = stream.split();

    loop {
        tokio::select! {
            incoming = reader.next() => {
                match incoming {
                    Some(Ok(Message::Text(raw))) => {
                        match PlantEvent::parse(raw.as_str()) {
                            Ok(event) => {
                                if event.family_id() != config.family_id {
                                    warn!(
                                        received = %event.family_id(),
                                        scoped = %config.family_id,
                                        "discarding event for another family"
                                    );
                                    continue;
                                }

                                if sink.send(event).is_err() {
                                    return Err(SubscriberError::SinkClosed);
                                }
                            }
                            Err(e) => warn!(error = %e, "dropping malformed event payload"),
                        }
                    }

                    Some(Ok(Message::Close(_))) | None => {
                        info!("subscriber stream closed");
                        return Ok(false);
                    }

                    Some(Ok(_)) => continue,

                    Some(Err(e)) => {
                        warn!(error = ?e, "subscriber transport error");
                        return Ok(false);
                    }
                }
            }

            _ = cancel.cancelled() => {
                let _ = writer.close().await;
                return Ok(true);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use chrono::Utc;
    use tokio::sync::{broadcast, mpsc};

    use super::*;
    use crate::ws::session::ChannelKind;
    use crate::ws::testutil::spawn_fanout;

    fn fast_reconnect() -> BackoffPolicy {
        BackoffPolicy {
            base: Duration::from_millis(5),
            cap: Duration::from_millis(20),
            max_attempts: 2,
        }
    }

    fn config(endpoint: String) -> SubscriberConfig {
        SubscriberConfig {
            endpoint,
            family_id: FamilyId(7),
            token: "session-token".to_string(),
            reconnect: fast_reconnect(),
        }
    }

    #[test]
    fn test_uri_carries_family_and_token() {
        let config = config("ws://garden.example/ws/plant/".to_string());
        assert_eq!(config.uri(), "ws://garden.example/ws/plant/7?token=session-token");
    }

    #[tokio::test]
    async fn test_subscriber_forwards_only_scoped_events() {
        let (tx, seed_rx) = broadcast::channel(16);
        drop(seed_rx);
        let addr = spawn_fanout(tx.clone(), ChannelKind::Plant).await;

        let (sink, mut events) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(
            config(format!("ws://{addr}/ws/plant")),
            sink,
            cancel.clone(),
        ));

        // wait for the subscription to land before publishing
        while tx.receiver_count() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        tx.send(PlantEvent::reward_claimed(FamilyId(8), "Evergreen Badge", Utc::now()))
            .unwrap();
        tx.send(PlantEvent::reward_claimed(FamilyId(7), "Full Bloom Badge", Utc::now()))
            .unwrap();

        let event = events.recv().await.unwrap();
        assert_eq!(event.family_id(), FamilyId(7));

        cancel.cancel();
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_subscriber_gives_up_after_retry_budget() {
        // grab a port and release it so nothing is listening there
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (sink, _events) = mpsc::unbounded_channel();
        let result = run(
            config(format!("ws://{addr}/ws/plant")),
            sink,
            CancellationToken::new(),
        )
        .await;

        assert!(matches!(result, Err(SubscriberError::RetriesExhausted(2))));
    }

    #[tokio::test]
    async fn test_cancellation_stops_the_subscriber() {
        let (tx, _rx) = broadcast::channel(16);
        let addr = spawn_fanout(tx, ChannelKind::Plant).await;

        let (sink, _events) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(
            config(format!("ws://{addr}/ws/plant")),
            sink,
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        assert!(handle.await.unwrap().is_ok());
    }
}

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use http::StatusCode;
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

use crate::api::server::AppState;
use crate::db::models::family::FamilyId;
use crate::db::prelude::FamilyRepository;
use crate::ws::event::PlantEvent;

/// The two logical channels the mobile client listens on. The water
/// channel is a filtered view for the garden screen's splash animation;
/// the plant channel carries everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Plant,
    Water,
}

/// The socket handshake cannot carry headers from a browser, so the
/// bearer token rides in the connection URI.
#[derive(Debug, Deserialize)]
pub struct SocketAuth {
    token: String,
}

#[instrument(skip(ws, auth, state))]
pub async fn plant_channel(
    ws: WebSocketUpgrade,
    Path(family_id): Path<i64>,
    Query(auth): Query<SocketAuth>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, StatusCode> {
    upgrade(ws, FamilyId(family_id), auth, state, ChannelKind::Plant).await
}

#[instrument(skip(ws, auth, state))]
pub async fn water_channel(
    ws: WebSocketUpgrade,
    Path(family_id): Path<i64>,
    Query(auth): Query<SocketAuth>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, StatusCode> {
    upgrade(ws, FamilyId(family_id), auth, state, ChannelKind::Water).await
}

async fn upgrade(
    ws: WebSocketUpgrade,
    family_id: FamilyId,
    auth: SocketAuth,
    state: Arc<AppState>,
    kind: ChannelKind,
) -> Result<Response, StatusCode> {
    let claims = state
        .signer
        .verify(&auth.token)
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    let families = FamilyRepository::new(&state.pg);
    let joined = families
        .is_member(family_id, &claims.member_id)
        .await
        .map_err(|e| {
            error!(error = ?e, "membership lookup failed during socket upgrade");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    if !joined {
        return Err(StatusCode::FORBIDDEN);
    }

    let rx = state.hub.subscribe(family_id).await;

    Ok(ws.on_upgrade(move |socket| serve_session(socket, family_id, kind, rx)))
}

/// Forwards hub events to one connected session until either side goes
/// away. Events scoped to another family are dropped here even though the
/// hub already routes per family. Inbound frames are ignored; transport
/// errors end the session without taking anything else down.
pub async fn serve_session(
    socket: WebSocket,
    family_id: FamilyId,
    kind: ChannelKind,
    mut rx: broadcast::Receiver<PlantEvent>,
) {
    let session_id = Uuid::new_v4();
    debug!(%session_id, %family_id, ?kind, "session open");

    let (mut writer, mut reader) = socket.split();

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(event) => {
                        if event.family_id() != family_id {
                            warn!(
                                %session_id,
                                received = %event.family_id(),
                                scoped = %family_id,
                                "dropping event scoped to another family"
                            );
                            continue;
                        }

                        if kind == ChannelKind::Water && !event.is_watering() {
                            continue;
                        }

                        let payload = match serde_json::to_string(&event) {
                            Ok(payload) => payload,
                            Err(e) => {
                                error!(%session_id, error = ?e, "failed to encode event");
                                continue;
                            }
                        };

                        if writer.send(Message::Text(payload.into())).await.is_err() {
                            break;
                        }
                    }

                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(%session_id, skipped, "session lagged behind fan-out");
                        continue;
                    }

                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            incoming = reader.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        debug!(%session_id, error = ?e, "socket transport error");
                        break;
                    }
                }
            }
        }
    }

    debug!(%session_id, %family_id, "session closed");
}

#[cfg(test)]
mod test {
    use chrono::Utc;
    use futures::StreamExt;
    use tokio::net::TcpStream;
    use tokio::sync::broadcast;
    use tokio_tungstenite::tungstenite::Message as WsMessage;
    use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

    use super::*;
    use crate::ws::testutil::{spawn_fanout, test_member, watered_event};

    async fn next_text(stream: &mut WebSocketStream<MaybeTlsStream<TcpStream>>) -> String {
        loop {
            match stream.next().await.unwrap().unwrap() {
                WsMessage::Text(text) => return text.to_string(),
                _ => continue,
            }
        }
    }

    #[tokio::test]
    async fn test_session_forwards_family_events() {
        let (tx, _rx) = broadcast::channel(16);
        let addr = spawn_fanout(tx.clone(), ChannelKind::Plant).await;

        let (mut stream, _) = connect_async(format!("ws://{addr}/ws/plant/7"))
            .await
            .unwrap();

        tx.send(PlantEvent::reward_claimed(FamilyId(7), "Full Bloom Badge", Utc::now()))
            .unwrap();

        let raw = next_text(&mut stream).await;
        let event = PlantEvent::parse(&raw).unwrap();
        assert_eq!(event.family_id(), FamilyId(7));
    }

    #[tokio::test]
    async fn test_session_drops_events_for_other_families() {
        let (tx, _rx) = broadcast::channel(16);
        let addr = spawn_fanout(tx.clone(), ChannelKind::Plant).await;

        let (mut stream, _) = connect_async(format!("ws://{addr}/ws/plant/7"))
            .await
            .unwrap();

        // a mis-routed event lands in the channel first; the session must
        // swallow it and deliver only the scoped one
        tx.send(PlantEvent::reward_claimed(FamilyId(8), "Evergreen Badge", Utc::now()))
            .unwrap();
        tx.send(PlantEvent::reward_claimed(FamilyId(7), "Full Bloom Badge", Utc::now()))
            .unwrap();

        let raw = next_text(&mut stream).await;
        assert_eq!(PlantEvent::parse(&raw).unwrap().family_id(), FamilyId(7));
    }

    #[tokio::test]
    async fn test_water_channel_only_carries_watering() {
        let (tx, _rx) = broadcast::channel(16);
        let addr = spawn_fanout(tx.clone(), ChannelKind::Water).await;

        let (mut stream, _) = connect_async(format!("ws://{addr}/ws/plant/7"))
            .await
            .unwrap();

        tx.send(PlantEvent::reward_claimed(FamilyId(7), "Full Bloom Badge", Utc::now()))
            .unwrap();
        tx.send(watered_event(7, &test_member("42"))).unwrap();

        let raw = next_text(&mut stream).await;
        assert!(PlantEvent::parse(&raw).unwrap().is_watering());
    }
}

pub mod backoff;
pub mod event;
pub mod hub;
pub mod session;
pub mod subscriber;

#[cfg(test)]
pub(crate) mod testutil {
    use std::net::SocketAddr;

    use axum::Router;
    use axum::extract::{Path, State, WebSocketUpgrade};
    use axum::response::Response;
    use axum::routing::get;
    use chrono::Utc;
    use tokio::sync::broadcast;

    use crate::db::models::family::{FamilyId, Member, MemberId};
    use crate::ws::event::PlantEvent;
    use crate::ws::session::{ChannelKind, serve_session};

    #[derive(Clone)]
    struct FanoutState {
        tx: broadcast::Sender<PlantEvent>,
        kind: ChannelKind,
    }

    async fn upgrade_handler(
        ws: WebSocketUpgrade,
        Path(family_id): Path<i64>,
        State(state): State<FanoutState>,
    ) -> Response {
        let rx = state.tx.subscribe();
        ws.on_upgrade(move |socket| serve_session(socket, FamilyId(family_id), state.kind, rx))
    }

    /// Serves the real session loop on a loopback port, fed straight from
    /// the given channel. Auth and membership checks are not in play so
    /// the socket semantics can be tested on their own.
    pub async fn spawn_fanout(tx: broadcast::Sender<PlantEvent>, kind: ChannelKind) -> SocketAddr {
        let app = Router::new()
            .route("/ws/plant/{family_id}", get(upgrade_handler))
            .with_state(FanoutState { tx, kind });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        addr
    }

    pub fn test_member(id: &str) -> Member {
        Member {
            id: MemberId::from(id),
            family_id: Some(FamilyId(7)),
            name: "jiwoo".to_string(),
            image: "https://cdn.example/42.png".to_string(),
            created_at: Utc::now().naive_utc(),
            updated_at: Utc::now().naive_utc(),
        }
    }

    pub fn watered_event(family: i64, member: &Member) -> PlantEvent {
        PlantEvent::watered(FamilyId(family), member, Utc::now())
    }
}

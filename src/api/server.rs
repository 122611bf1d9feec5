use std::sync::Arc;

use axum::body::Body;
use axum::extract::{MatchedPath, Request};
use axum::middleware::{Next, from_fn, from_fn_with_state};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use http::StatusCode;
use serde::Serialize;
use sqlx::PgPool;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::instrument;

use crate::api::auth::{AuthError, TokenSigner};
use crate::api::handler::*;
use crate::api::middleware::cors;
use crate::api::middleware::verify::verify_session;
use crate::db::ledger::{ActivityLedger, LedgerError, RedisLedger};
use crate::db::models::plant::UnknownPlantKind;
use crate::db::{PgError, connect_pg};
use crate::growth::activity::{ActivityKind, UnknownActivity};
use crate::growth::engine::GrowthError;
use crate::growth::level::LevelCurve;
use crate::util::config::Config;
use crate::ws::hub::EventHub;
use crate::ws::session;

pub type JsonResult<T> = core::result::Result<Json<T>, RouteError>;

/// Everything a request needs, built once at startup and shared. No
/// module-level singletons: swapping the ledger or the curve is a matter
/// of constructing a different state.
pub struct AppState {
    pub config: Config,
    pub pg: PgPool,
    pub ledger: Arc<dyn ActivityLedger>,
    pub hub: Arc<EventHub>,
    pub signer: TokenSigner,
    pub curve: LevelCurve,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Pg(#[from] PgError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl AppState {
    #[instrument(skip(config))]
    pub async fn new(config: &Config) -> Result<Arc<Self>, StartupError> {
        let pg = connect_pg(&config.database_url).await?;
        let ledger = RedisLedger::connect(&config.redis_url).await?;

        Ok(Arc::new(Self {
            config: config.clone(),
            pg,
            ledger: Arc::new(ledger),
            hub: Arc::new(EventHub::new()),
            signer: TokenSigner::new(&config.session_secret),
            curve: LevelCurve::default(),
        }))
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let session_routes = Router::new()
        .route("/family", post(create_family).get(family_overview))
        .route("/family/join", post(join_family))
        .route("/plant", post(create_plant).get(plant_status))
        .route("/plant/activity", post(complete_activity))
        .route("/plant/activity/{kind}", get(activity_status))
        .route("/plant/nutrient", get(nutrient_status))
        .route("/plant/reward", post(claim_reward).get(reward_history))
        .route_layer(from_fn_with_state(state.clone(), verify_session));

    Router::new()
        .merge(session_routes)
        .route("/", get(|| async { Response::new(Body::empty()) }))
        .route("/auth/login", post(login))
        //
        // realtime channels authenticate through the connection URI
        .route("/ws/plant/{family_id}", get(session::plant_channel))
        .route("/ws/water/{family_id}", get(session::water_channel))
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
                let method = req.method();
                let uri = req.uri();

                let matched_path = req
                    .extensions()
                    .get::<MatchedPath>()
                    .map(|matched| matched.as_str());

                tracing::debug_span!("api_request", ?method, ?uri, ?matched_path)
            }),
        )
        .layer(from_fn(log_route_errors))
        .layer(cors(&state.config.cors_allow_origins))
        .with_state(state)
}

/// Route handlers attach their error to the response extensions; this
/// layer is where it gets traced, once, with the request context.
#[instrument(skip(request, next), fields(uri = request.uri().to_string()))]
async fn log_route_errors(request: Request, next: Next) -> Response {
    let res = next.run(request).await;
    if let Some(err) = res.extensions().get::<Arc<RouteError>>() {
        tracing::error!(error = ?err, "error occurred inside route handler");
    }

    res
}

#[derive(Debug, Error)]
pub enum RouteError {
    #[error(transparent)]
    QueryError(#[from] PgError),

    #[error(transparent)]
    LedgerError(#[from] LedgerError),

    #[error(transparent)]
    AuthError(#[from] AuthError),

    #[error(transparent)]
    UnknownActivity(#[from] UnknownActivity),

    #[error(transparent)]
    UnknownPlantKind(#[from] UnknownPlantKind),

    #[error("'{0}' already completed today, try again tomorrow")]
    ActivityAlreadyDone(ActivityKind),

    #[error("join a family before tending a plant")]
    NoFamily,
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct ErrorResponse {
            message: String,
            status_code: u16,
        }

        let (status, message) = match &self {
            RouteError::QueryError(err) => match err {
                PgError::SqlxError(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
                PgError::Growth(GrowthError::NutrientExhausted) => {
                    (StatusCode::BAD_REQUEST, err.to_string())
                }
                PgError::PlantMissing(_) | PgError::FamilyMissing(_) => {
                    (StatusCode::NOT_FOUND, err.to_string())
                }
                PgError::PlantAlreadyGrowing(_)
                | PgError::FamilyFull(_)
                | PgError::NotMature(_) => (StatusCode::CONFLICT, err.to_string()),
            },

            RouteError::LedgerError(err) => {
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }

            RouteError::AuthError(err) => match err {
                AuthError::Exchange(_) => (StatusCode::BAD_GATEWAY, err.to_string()),
                _ => (StatusCode::UNAUTHORIZED, err.to_string()),
            },

            RouteError::UnknownActivity(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            RouteError::UnknownPlantKind(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            RouteError::ActivityAlreadyDone(_) => (StatusCode::CONFLICT, self.to_string()),
            RouteError::NoFamily => (StatusCode::NOT_FOUND, self.to_string()),
        };

        let mut response = (
            status,
            Json(ErrorResponse {
                message,
                status_code: status.as_u16(),
            }),
        )
            .into_response();

        response.extensions_mut().insert(Arc::new(self));
        response
    }
}

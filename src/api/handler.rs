use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::api::auth::{self, AuthClaims};
use crate::api::server::{AppState, JsonResult, RouteError};
use crate::db::prelude::*;
use crate::growth::activity::{ActivityDay, ActivityKind};
use crate::growth::engine::GrowthOutcome;
use crate::ws::event::PlantEvent;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub code: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub member: Member,
    pub has_family: bool,
}

#[instrument(skip(state, body))]
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginRequest>,
) -> JsonResult<LoginResponse> {
    let profile = auth::exchange_code(&state.config.login_exchange_url, &body.code).await?;

    let families = FamilyRepository::new(&state.pg);
    let member = families
        .upsert_member(
            &MemberId::from(profile.id),
            &profile.nickname,
            &profile.profile_image,
        )
        .await?;

    let token = state.signer.issue(&member.id, Utc::now());

    Ok(Json(LoginResponse {
        token,
        has_family: member.family_id.is_some(),
        member,
    }))
}

#[derive(Debug, Deserialize)]
pub struct CreateFamilyRequest {
    pub name: String,
}

#[instrument(skip(state, claims, body))]
pub async fn create_family(
    State(state): State<Arc<AppState>>,
    claims: AuthClaims,
    Json(body): Json<CreateFamilyRequest>,
) -> JsonResult<FamilyOverview> {
    let families = FamilyRepository::new(&state.pg);
    let family = families.create(&body.name, &claims.member_id).await?;

    Ok(Json(families.overview(family.id).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinFamilyRequest {
    pub family_id: i64,
}

#[instrument(skip(state, claims, body))]
pub async fn join_family(
    State(state): State<Arc<AppState>>,
    claims: AuthClaims,
    Json(body): Json<JoinFamilyRequest>,
) -> JsonResult<FamilyOverview> {
    let families = FamilyRepository::new(&state.pg);
    let family_id = FamilyId(body.family_id);

    families.join(family_id, &claims.member_id).await?;

    Ok(Json(families.overview(family_id).await?))
}

#[instrument(skip(state, claims))]
pub async fn family_overview(
    State(state): State<Arc<AppState>>,
    claims: AuthClaims,
) -> JsonResult<FamilyOverview> {
    let families = FamilyRepository::new(&state.pg);
    let (_, family_id) = member_context(&families, &claims).await?;

    Ok(Json(families.overview(family_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct CreatePlantRequest {
    pub kind: String,
}

#[instrument(skip(state, claims, body))]
pub async fn create_plant(
    State(state): State<Arc<AppState>>,
    claims: AuthClaims,
    Json(body): Json<CreatePlantRequest>,
) -> JsonResult<PlantStatus> {
    let kind: PlantKind = body.kind.parse()?;

    let families = FamilyRepository::new(&state.pg);
    let (_, family_id) = member_context(&families, &claims).await?;

    let plant = PlantRepository::new(&state.pg).create(family_id, kind).await?;
    let member_count = families.member_count(family_id).await?;

    Ok(Json(PlantStatus::project(&plant, member_count, &state.curve)))
}

#[instrument(skip(state, claims))]
pub async fn plant_status(
    State(state): State<Arc<AppState>>,
    claims: AuthClaims,
) -> JsonResult<PlantStatus> {
    let families = FamilyRepository::new(&state.pg);
    let (_, family_id) = member_context(&families, &claims).await?;

    let plant = PlantRepository::new(&state.pg)
        .get(family_id)
        .await?
        .ok_or(PgError::PlantMissing(family_id))?;
    let member_count = families.member_count(family_id).await?;

    Ok(Json(PlantStatus::project(&plant, member_count, &state.curve)))
}

#[derive(Debug, Deserialize)]
pub struct CompleteActivityRequest {
    pub kind: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityResponse {
    pub kind: String,
    pub day: String,
    #[serde(flatten)]
    pub outcome: GrowthOutcome,
}

/// The whole once-per-day pipeline: the ledger write is the idempotency
/// gate, the growth transaction is the authority, and the fan-out is a
/// hint to everyone else in the family.
#[instrument(skip(state, claims, body))]
pub async fn complete_activity(
    State(state): State<Arc<AppState>>,
    claims: AuthClaims,
    Json(body): Json<CompleteActivityRequest>,
) -> JsonResult<ActivityResponse> {
    let kind: ActivityKind = body.kind.parse()?;

    let families = FamilyRepository::new(&state.pg);
    let (member, family_id) = member_context(&families, &claims).await?;

    let day = ActivityDay::today(state.config.activity_day_offset_minutes);
    if !state.ledger.record(&day, &claims.member_id, kind).await? {
        return Err(RouteError::ActivityAlreadyDone(kind));
    }

    let member_count = families.member_count(family_id).await?;
    let outcome = match PlantRepository::new(&state.pg)
        .apply_activity(family_id, kind, member_count, &state.curve)
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            // reopen the day so the member can retry once the cause clears
            if let Err(le) = state.ledger.unrecord(&day, &claims.member_id, kind).await {
                tracing::warn!(error = ?le, "failed to roll back activity marker");
            }
            return Err(e.into());
        }
    };

    state
        .hub
        .publish(&PlantEvent::points_added(family_id, kind, &outcome))
        .await;

    if kind.is_watering() {
        state
            .hub
            .publish(&PlantEvent::watered(family_id, &member, Utc::now()))
            .await;
    }

    Ok(Json(ActivityResponse {
        kind: kind.to_string(),
        day: day.to_string(),
        outcome,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityStatusResponse {
    pub kind: String,
    pub completed: bool,
}

#[instrument(skip(state, claims))]
pub async fn activity_status(
    State(state): State<Arc<AppState>>,
    claims: AuthClaims,
    Path(kind): Path<String>,
) -> JsonResult<ActivityStatusResponse> {
    let kind: ActivityKind = kind.parse()?;

    let day = ActivityDay::today(state.config.activity_day_offset_minutes);
    let completed = state.ledger.exists(&day, &claims.member_id, kind).await?;

    Ok(Json(ActivityStatusResponse {
        kind: kind.to_string(),
        completed,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NutrientStatusResponse {
    pub nutrient_count: i32,
    pub nutrient_active: bool,
}

#[instrument(skip(state, claims))]
pub async fn nutrient_status(
    State(state): State<Arc<AppState>>,
    claims: AuthClaims,
) -> JsonResult<NutrientStatusResponse> {
    let families = FamilyRepository::new(&state.pg);
    let (_, family_id) = member_context(&families, &claims).await?;

    let plant = PlantRepository::new(&state.pg)
        .get(family_id)
        .await?
        .ok_or(PgError::PlantMissing(family_id))?;

    Ok(Json(NutrientStatusResponse {
        nutrient_count: plant.nutrient_count,
        nutrient_active: plant.nutrient_active,
    }))
}

#[instrument(skip(state, claims))]
pub async fn claim_reward(
    State(state): State<Arc<AppState>>,
    claims: AuthClaims,
) -> JsonResult<RewardHistory> {
    let families = FamilyRepository::new(&state.pg);
    let (_, family_id) = member_context(&families, &claims).await?;

    let reward = RewardRepository::new(&state.pg).claim(family_id).await?;

    state
        .hub
        .publish(&PlantEvent::reward_claimed(family_id, &reward.name, Utc::now()))
        .await;

    Ok(Json(reward))
}

#[instrument(skip(state, claims))]
pub async fn reward_history(
    State(state): State<Arc<AppState>>,
    claims: AuthClaims,
) -> JsonResult<Vec<RewardHistory>> {
    let families = FamilyRepository::new(&state.pg);
    let (_, family_id) = member_context(&families, &claims).await?;

    Ok(Json(RewardRepository::new(&state.pg).history(family_id).await?))
}

/// Resolves the caller to their member row and family, the precondition
/// for every garden route.
async fn member_context(
    families: &FamilyRepository,
    claims: &AuthClaims,
) -> Result<(Member, FamilyId), RouteError> {
    let member = families
        .get_member(&claims.member_id)
        .await?
        .ok_or(RouteError::NoFamily)?;

    let family_id = member.family_id.ok_or(RouteError::NoFamily)?;

    Ok((member, family_id))
}

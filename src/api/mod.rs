// HTTP API routes (battles, characters, leaderboards, admin).

use std::sync::Arc;

use axum::{
    extract::{Json, Path, Query, State},
    http::{header, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::{AuthUser, OptionalAuthUser};
use crate::battle::{BattleService, HistoryScope};
use crate::characters::CharacterRegistry;
use crate::error::{ArenaError, ArenaResult};
use crate::metrics;
use crate::models::League;
use crate::rate_limit::{RateLimitType, RateLimiter};
use crate::store::RankingStore;

// ── Request types ─────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartBattleRequest {
    pub character_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BattleHistoryParams {
    pub character_id: Option<String>,
    pub address: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct CreateCharacterRequest {
    pub name: String,
    pub traits: String,
    pub league: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateTraitsRequest {
    pub traits: String,
}

#[derive(Deserialize)]
pub struct ListCharactersParams {
    pub address: Option<String>,
}

#[derive(Deserialize)]
pub struct LeaderboardParams {
    pub league: Option<String>,
    pub limit: Option<usize>,
}

// ── Shared application state ─────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub battles: BattleService,
    pub characters: CharacterRegistry,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    pub fn new(store: Arc<dyn RankingStore>, battles: BattleService, rate_limiter: RateLimiter) -> Self {
        Self {
            battles,
            characters: CharacterRegistry::new(store),
            rate_limiter,
        }
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        // Battles
        .route("/api/battle", get(battle_history).post(start_battle))
        // Characters
        .route("/api/characters", get(list_characters).post(create_character))
        .route(
            "/api/characters/{id}",
            get(get_character).delete(delete_character),
        )
        .route("/api/characters/{id}/traits", put(update_traits))
        // Leaderboards
        .route("/api/leaderboard", get(leaderboard))
        // Admin
        .route("/api/admin/reconcile", post(reconcile_indexes))
        .layer(middleware::from_fn(metrics::track_requests))
        .with_state(state)
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "arena-backend" }))
}

async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::gather_metrics(),
    )
}

// ── Battle handlers ───────────────────────────────────────────────────

async fn start_battle(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Json(req): Json<StartBattleRequest>,
) -> ArenaResult<impl IntoResponse> {
    let character_id = req
        .character_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ArenaError::Validation("characterId is required".into()))?;
    let owner = claims.owner();
    state
        .rate_limiter
        .check_limit(&owner, RateLimitType::Battles)
        .await?;

    let report = state.battles.start_battle(&owner, &character_id).await?;
    Ok((StatusCode::OK, Json(report)))
}

async fn battle_history(
    State(state): State<AppState>,
    Query(params): Query<BattleHistoryParams>,
) -> ArenaResult<impl IntoResponse> {
    let scope = match (params.character_id, params.address) {
        (Some(id), _) if !id.trim().is_empty() => HistoryScope::Character(id),
        (_, Some(address)) if !address.trim().is_empty() => HistoryScope::Owner(address),
        _ => {
            return Err(ArenaError::Validation(
                "characterId or address is required".into(),
            ))
        }
    };
    let battles = state.battles.battle_history(&scope, params.limit).await?;
    Ok(Json(json!({ "battles": battles })))
}

// ── Character handlers ────────────────────────────────────────────────

async fn create_character(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Json(req): Json<CreateCharacterRequest>,
) -> ArenaResult<impl IntoResponse> {
    let owner = claims.owner();
    state
        .rate_limiter
        .check_limit(&owner, RateLimitType::CharacterWrites)
        .await?;
    let character = state
        .characters
        .create_character(
            &owner,
            claims.provider,
            &req.name,
            &req.traits,
            req.league.as_deref(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(character)))
}

async fn list_characters(
    State(state): State<AppState>,
    OptionalAuthUser(claims): OptionalAuthUser,
    Query(params): Query<ListCharactersParams>,
) -> ArenaResult<impl IntoResponse> {
    let owner = params
        .address
        .filter(|a| !a.trim().is_empty())
        .or_else(|| claims.map(|c| c.owner()))
        .ok_or_else(|| ArenaError::Validation("address is required".into()))?;
    let characters = state.characters.list_characters(&owner).await?;
    Ok(Json(json!({ "characters": characters })))
}

async fn get_character(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ArenaResult<impl IntoResponse> {
    Ok(Json(state.characters.get_character(&id).await?))
}

async fn update_traits(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateTraitsRequest>,
) -> ArenaResult<impl IntoResponse> {
    let owner = claims.owner();
    state
        .rate_limiter
        .check_limit(&owner, RateLimitType::CharacterWrites)
        .await?;
    let character = state
        .characters
        .update_traits(&owner, &id, &req.traits)
        .await?;
    Ok(Json(character))
}

async fn delete_character(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(id): Path<String>,
) -> ArenaResult<impl IntoResponse> {
    state
        .characters
        .delete_character(&claims.owner(), &id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Leaderboard handlers ─────────────────────────────────────────────

async fn leaderboard(
    State(state): State<AppState>,
    Query(params): Query<LeaderboardParams>,
) -> ArenaResult<impl IntoResponse> {
    let league = params
        .league
        .filter(|l| !l.trim().is_empty() && !l.eq_ignore_ascii_case("global"))
        .map(|l| l.parse::<League>())
        .transpose()
        .map_err(ArenaError::Validation)?;
    let entries = state.characters.leaderboard(league, params.limit).await?;
    Ok(Json(json!({ "leaderboard": entries })))
}

// ── Admin handlers ───────────────────────────────────────────────────

async fn reconcile_indexes(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> ArenaResult<impl IntoResponse> {
    if !claims.is_admin() {
        return Err(ArenaError::Forbidden);
    }
    Ok(Json(state.characters.reconcile_indexes().await?))
}

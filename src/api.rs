use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::db::Db;
use crate::error::EngineError;
use crate::models::{MasteryStats, SessionRecord, StudySession};
use crate::session::{self, SessionRequest, SessionResult, SubmitRequest};
use crate::srs;

#[derive(Clone)]
pub struct ApiState {
    pub db: Db,
}

pub fn app_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/session", post(build_session))
        .route("/api/session/submit", post(submit_session))
        .route("/api/decks/:deck_id/stats", get(deck_stats))
        .route("/api/decks/:deck_id/history", get(deck_history))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = match &self {
            EngineError::InvalidQuality(_) => StatusCode::BAD_REQUEST,
            EngineError::UnknownCard { .. } => StatusCode::NOT_FOUND,
            EngineError::Conflict(_) => StatusCode::CONFLICT,
            EngineError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        let body = json!({
            "error": self.to_string(),
            "status": status.as_u16()
        });

        (status, Json(body)).into_response()
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn build_session(
    State(state): State<ApiState>,
    Json(req): Json<SessionRequest>,
) -> Result<Json<StudySession>, EngineError> {
    let mut rng = rand::rngs::StdRng::from_entropy();
    let session = session::build_session(&state.db, &req, &mut rng).await?;
    Ok(Json(session))
}

async fn submit_session(
    State(state): State<ApiState>,
    Json(req): Json<SubmitRequest>,
) -> Result<Json<SessionResult>, EngineError> {
    let result = session::submit_session(&state.db, &req).await?;
    Ok(Json(result))
}

#[derive(Deserialize)]
struct UserQuery {
    user_id: Uuid,
}

#[derive(Serialize)]
struct DeckStats {
    stats: MasteryStats,
    due_cards: usize,
    tracked_cards: usize,
}

/// Dashboard counters for one deck: mastery buckets plus how many of
/// the tracked cards are currently due.
async fn deck_stats(
    State(state): State<ApiState>,
    Path(deck_id): Path<Uuid>,
    Query(query): Query<UserQuery>,
) -> Result<Json<DeckStats>, EngineError> {
    let rows = state.db.progress_for_deck(query.user_id, deck_id).await?;
    let now = Utc::now();
    let due_cards = rows.iter().filter(|p| p.next_review_at <= now).count();

    Ok(Json(DeckStats {
        stats: srs::aggregate_stats(&rows),
        due_cards,
        tracked_cards: rows.len(),
    }))
}

async fn deck_history(
    State(state): State<ApiState>,
    Path(deck_id): Path<Uuid>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Vec<SessionRecord>>, EngineError> {
    let history = state.db.sessions_for_deck(query.user_id, deck_id).await?;
    Ok(Json(history))
}

//! Leaderboard endpoints

use axum::{
    extract::{Path, State},
    Json,
};

use crate::dto::RankingResponse;
use crate::error::ApiResult;
use crate::state::AppState;
use tap_db::RankingService;

/// Top accounts; a missing or unparseable limit means the default page size
pub async fn top(
    State(state): State<AppState>,
    limit: Option<Path<String>>,
) -> ApiResult<Json<Vec<RankingResponse>>> {
    let requested = limit.and_then(|Path(raw)| raw.parse::<usize>().ok());
    let limit = RankingService::normalize_limit(requested);

    let entries = state.ranking.top(limit).await?;
    Ok(Json(entries.into_iter().map(RankingResponse::from).collect()))
}

pub async fn rank(
    State(state): State<AppState>,
    Path(platform_id): Path<String>,
) -> ApiResult<Json<RankingResponse>> {
    let entry = state.ranking.rank_of(&platform_id).await?;
    Ok(Json(entry.into()))
}

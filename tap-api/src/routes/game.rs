//! Game progress endpoints

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use std::str::FromStr;

use crate::dto::{
    LoadResponse, PurchaseBoosterRequest, PurchaseBoosterResponse, SaveRequest, SaveResponse,
};
use crate::error::ApiResult;
use crate::state::AppState;
use tap_core::BoosterKind;

pub async fn save(
    State(state): State<AppState>,
    payload: Result<Json<SaveRequest>, JsonRejection>,
) -> ApiResult<Json<SaveResponse>> {
    let Json(request) = payload?;
    let (platform_id, update) = request.into_update();

    let account = state.accounts.find_by_platform_id(&platform_id).await?;
    let ack = state.progress.save(account.id, update).await?;

    Ok(Json(SaveResponse {
        success: true,
        saved_at: ack.saved_at,
    }))
}

pub async fn load(
    State(state): State<AppState>,
    Path(platform_id): Path<String>,
) -> ApiResult<Json<LoadResponse>> {
    let account = state.accounts.find_by_platform_id(&platform_id).await?;
    let progress = state.progress.load(account.id).await?;

    Ok(Json(LoadResponse {
        platform_id: account.platform_id,
        username: account.username,
        first_name: account.first_name,
        progress: progress.into(),
    }))
}

pub async fn purchase_booster(
    State(state): State<AppState>,
    payload: Result<Json<PurchaseBoosterRequest>, JsonRejection>,
) -> ApiResult<Json<PurchaseBoosterResponse>> {
    let Json(request) = payload?;
    let kind = BoosterKind::from_str(&request.booster_kind)?;

    let account = state.accounts.find_by_platform_id(&request.platform_id).await?;
    let receipt = state
        .progress
        .purchase_booster(account.id, kind, request.cost)
        .await?;

    Ok(Json(PurchaseBoosterResponse {
        success: true,
        booster_kind: receipt.kind,
        new_level: receipt.new_level,
        new_coins: receipt.new_coins,
        boosters: receipt.boosters,
    }))
}

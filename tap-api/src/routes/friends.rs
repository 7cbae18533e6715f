//! Referral endpoints

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};

use crate::dto::{AddFriendRequest, AddFriendResponse, FriendResponse};
use crate::error::ApiResult;
use crate::state::AppState;

/// Record that `platformId` referred `friendPlatformId`
pub async fn add(
    State(state): State<AppState>,
    payload: Result<Json<AddFriendRequest>, JsonRejection>,
) -> ApiResult<Json<AddFriendResponse>> {
    let Json(request) = payload?;
    let outcome = state
        .referrals
        .add_referral(&request.platform_id, &request.friend_platform_id)
        .await?;

    let bonus_given = outcome.bonus_granted();
    Ok(Json(AddFriendResponse {
        success: true,
        bonus_given,
        bonus: if bonus_given { state.referrals.bonus() } else { 0 },
    }))
}

pub async fn list(
    State(state): State<AppState>,
    Path(platform_id): Path<String>,
) -> ApiResult<Json<Vec<FriendResponse>>> {
    let friends = state.referrals.list_friends(&platform_id).await?;
    Ok(Json(friends.into_iter().map(FriendResponse::from).collect()))
}

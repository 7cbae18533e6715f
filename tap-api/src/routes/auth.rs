//! Login endpoint

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use tracing::{info, warn};

use crate::dto::{AccountResponse, LoginRequest, LoginResponse};
use crate::error::ApiResult;
use crate::state::AppState;
use tap_core::GameError;

/// Verify the launch payload, then find or register the account
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<LoginResponse>> {
    let Json(request) = payload?;

    let identity = match state.verifier.verify(&request.init_data) {
        Ok(identity) => identity,
        Err(e) if state.dev_mode => {
            warn!(error = %e, "Accepting unverified init data (development mode)");
            state
                .verifier
                .parse_unverified(&request.init_data)
                .map_err(GameError::from)?
        }
        Err(e) => return Err(GameError::from(e).into()),
    };

    let outcome = state.accounts.login(&identity).await?;
    let token = state.tokens.issue(&outcome.account)?;

    info!(
        platform_id = %outcome.account.platform_id,
        created = outcome.created,
        "User logged in"
    );

    Ok(Json(LoginResponse {
        account: AccountResponse::from(&outcome.account),
        progress: outcome.progress.into(),
        token,
        created: outcome.created,
    }))
}

use alloy::primitives::Address;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use std::str::FromStr;
use std::sync::Arc;

use crate::approvals::types::ApprovalKind;
use crate::db::repository::{self, FeedFilter};
use crate::scanner::backfill;

use super::queries;
use super::types::*;
use super::AppState;

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

fn api_error(status: StatusCode, msg: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse { error: msg.into() }),
    )
}

pub async fn health(State(state): State<Arc<AppState>>) -> ApiResult<HealthResponse> {
    queries::get_health(&state.pool)
        .await
        .map(Json)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

/// The approvals feed, newest on-chain position first.
pub async fn approvals_feed(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FeedParams>,
) -> ApiResult<FeedResponse> {
    let kind = match params.kind.as_deref() {
        None => None,
        Some(raw) => Some(ApprovalKind::parse(raw).ok_or_else(|| {
            api_error(
                StatusCode::BAD_REQUEST,
                format!("Unknown approval kind '{}'", raw),
            )
        })?),
    };

    let filter = FeedFilter {
        user_id: params.user_id,
        chain: params.chain,
        kind,
        min_risk_score: params.min_risk_score,
        skip: params.skip.unwrap_or(0).max(0),
        take: params.take.unwrap_or(50).clamp(1, 200),
    };

    let events = repository::find_feed(&state.pool, &filter)
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(FeedResponse {
        events,
        skip: filter.skip,
        take: filter.take,
    }))
}

/// Register a wallet for scanning. Creates the wallet and its cursor,
/// seeded at the start of the chain's backfill window.
pub async fn register_wallet(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterWalletRequest>,
) -> Result<(StatusCode, Json<RegisterWalletResponse>), (StatusCode, Json<ErrorResponse>)> {
    let address = request.address.to_lowercase();
    Address::from_str(&address)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("Invalid address: {}", e)))?;

    let config = state
        .providers
        .chain_config(&request.chain)
        .ok_or_else(|| {
            api_error(
                StatusCode::BAD_REQUEST,
                format!("Unknown chain '{}'", request.chain),
            )
        })?
        .clone();

    let height = state
        .providers
        .block_height(&request.chain)
        .await
        .map_err(|e| api_error(StatusCode::BAD_GATEWAY, e.to_string()))?;
    let safe_height = height.saturating_sub(config.confirmations);
    let start_block = backfill::initial_cursor_block(safe_height, &config);

    let wallet_id = repository::create_wallet_with_cursor(
        &state.pool,
        request.user_id,
        &request.chain,
        &address,
        start_block as i64,
    )
    .await
    .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    tracing::info!(
        wallet_id = %wallet_id,
        chain = %request.chain,
        address = %address,
        height,
        safe_height,
        start_block,
        "wallet registered for scanning"
    );

    Ok((
        StatusCode::CREATED,
        Json(RegisterWalletResponse {
            wallet_id,
            chain: request.chain,
            address,
            start_block,
        }),
    ))
}

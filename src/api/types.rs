use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::repository::FeedEvent;

// ============================================================
// Query params
// ============================================================

#[derive(Debug, Deserialize)]
pub struct FeedParams {
    pub user_id: Uuid,
    pub chain: Option<String>,
    pub kind: Option<String>,
    pub min_risk_score: Option<i32>,
    pub skip: Option<i64>,
    pub take: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterWalletRequest {
    pub user_id: Uuid,
    pub chain: String,
    pub address: String,
}

// ============================================================
// Response types
// ============================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub total_events: i64,
    pub chains: Vec<ChainCursorStatus>,
}

#[derive(Debug, Serialize)]
pub struct ChainCursorStatus {
    pub chain: String,
    pub wallets: i64,
    pub min_scanned_block: i64,
    pub max_scanned_block: i64,
}

#[derive(Debug, Serialize)]
pub struct FeedResponse {
    pub events: Vec<FeedEvent>,
    pub skip: i64,
    pub take: i64,
}

#[derive(Debug, Serialize)]
pub struct RegisterWalletResponse {
    pub wallet_id: Uuid,
    pub chain: String,
    pub address: String,
    pub start_block: u64,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

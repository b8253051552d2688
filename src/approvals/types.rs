use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// The two approval shapes the scanner monitors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApprovalKind {
    Erc20Approval,
    ApprovalForAll,
}

impl ApprovalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Erc20Approval => "ERC20_APPROVAL",
            Self::ApprovalForAll => "APPROVAL_FOR_ALL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ERC20_APPROVAL" => Some(Self::Erc20Approval),
            "APPROVAL_FOR_ALL" => Some(Self::ApprovalForAll),
            _ => None,
        }
    }
}

/// A decoded approval log for a monitored wallet, not yet deduplicated
/// or scored. Addresses are 0x-prefixed lowercase hex.
#[derive(Debug, Clone)]
pub struct CandidateEvent {
    pub wallet_id: Uuid,
    pub chain: String,
    pub kind: ApprovalKind,
    pub token_address: String,
    pub spender: String,
    /// Decimal string of the ERC-20 allowance value; None for operator events.
    pub raw_value: Option<String>,
    /// Operator flag of an ApprovalForAll event; None for ERC-20 events.
    pub approved: Option<bool>,
    pub tx_hash: String,
    pub block_number: i64,
    pub log_index: i32,
}

impl CandidateEvent {
    /// The natural uniqueness key under which an on-chain log is ingested
    /// at most once.
    pub fn natural_key(&self) -> (String, String, i32) {
        (self.chain.clone(), self.tx_hash.clone(), self.log_index)
    }
}

/// A persisted, scored approval event. Immutable once created.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalEvent {
    pub id: i64,
    pub wallet_id: Uuid,
    pub chain: String,
    pub kind: String,
    pub token_address: String,
    pub spender: String,
    pub raw_value: Option<BigDecimal>,
    pub approved: Option<bool>,
    pub tx_hash: String,
    pub block_number: i64,
    pub log_index: i32,
    pub risk_score: i32,
    pub risk_level: String,
    pub risk_meta: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl ApprovalEvent {
    /// Reason codes recorded at scoring time, in scoring order.
    pub fn reasons(&self) -> Vec<String> {
        self.risk_meta
            .get("reasons")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|r| r.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

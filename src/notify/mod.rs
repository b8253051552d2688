pub mod telegram;

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

use crate::config::NotificationConfig;

/// A bounded summary of one wallet's newly detected risky approvals for
/// a single scanned block range.
#[derive(Debug, Clone, Serialize)]
pub struct ScanDigest {
    pub chain: String,
    pub wallet_address: String,
    pub from_block: u64,
    pub to_block: u64,
    pub events: Vec<DigestEntry>,
    /// Qualifying events beyond the per-digest limit ("and N more").
    pub more_count: usize,
    pub total_events: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DigestEntry {
    pub kind: String,
    pub token_address: String,
    pub spender: String,
    pub raw_value: Option<String>,
    pub approved: Option<bool>,
    pub risk_score: i32,
    pub risk_level: String,
    pub reasons: Vec<String>,
    pub tx_hash: String,
    pub block_number: i64,
    pub tx_url: String,
}

/// Delivery boundary for scan digests. Fire-and-forget from the scanner's
/// perspective: implementations log their own failures and never propagate
/// them back into a tick.
#[async_trait]
pub trait DigestNotifier: Send + Sync {
    async fn send_digest(&self, recipient: &str, digest: &ScanDigest);
}

/// Sink used when no delivery channel is configured. Keeps the scan path
/// identical in dev setups.
pub struct LogNotifier;

#[async_trait]
impl DigestNotifier for LogNotifier {
    async fn send_digest(&self, recipient: &str, digest: &ScanDigest) {
        tracing::debug!(
            recipient,
            chain = %digest.chain,
            wallet = %digest.wallet_address,
            events = digest.events.len(),
            more = digest.more_count,
            "notifications disabled, digest skipped"
        );
    }
}

pub fn build_notifier(config: &NotificationConfig) -> Arc<dyn DigestNotifier> {
    match (
        config.telegram_enabled,
        &config.telegram_bot_token,
        &config.telegram_chat_id,
    ) {
        (true, Some(bot_token), Some(chat_id)) => Arc::new(telegram::TelegramNotifier::new(
            bot_token.clone(),
            chat_id.clone(),
        )),
        _ => Arc::new(LogNotifier),
    }
}

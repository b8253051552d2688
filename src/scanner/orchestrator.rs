use alloy::primitives::Address;
use sqlx::PgPool;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::approvals::ingest::EventIngestor;
use crate::approvals::types::ApprovalEvent;
use crate::config::{ChainConfig, Config};
use crate::db::repository::{self, ActiveWallet};
use crate::notify::{DigestEntry, DigestNotifier, ScanDigest};
use crate::scanner::classifier;
use crate::scanner::provider::ProviderRegistry;

/// Walks each active wallet's unscanned block range, classifies and
/// ingests approval logs, advances cursors, and hands digests of risky
/// events to the notification boundary.
///
/// All work inside a tick is strictly sequential: one chain at a time,
/// one wallet at a time, one chunk at a time, with an explicit delay
/// between chunks. That trades throughput for provider-rate-limit safety.
pub struct Scanner {
    pool: PgPool,
    providers: Arc<ProviderRegistry>,
    ingestor: EventIngestor,
    notifier: Arc<dyn DigestNotifier>,
    chains: HashMap<String, ChainConfig>,
    events_per_digest: usize,
    in_flight: AtomicBool,
}

impl Scanner {
    pub fn new(
        pool: PgPool,
        providers: Arc<ProviderRegistry>,
        ingestor: EventIngestor,
        notifier: Arc<dyn DigestNotifier>,
        config: &Config,
    ) -> Self {
        let chains = config
            .chains
            .iter()
            .map(|c| (c.name.clone(), c.clone()))
            .collect();

        Self {
            pool,
            providers,
            ingestor,
            notifier,
            chains,
            events_per_digest: config.scanner.events_per_digest,
            in_flight: AtomicBool::new(false),
        }
    }

    /// One full scan pass over all active wallets. A tick that begins
    /// while the previous one is still running is a no-op (single flight).
    pub async fn tick(&self) -> eyre::Result<()> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("previous scan tick still running, skipping");
            return Ok(());
        }

        let result = self.run_tick().await;
        self.in_flight.store(false, Ordering::Release);
        result
    }

    async fn run_tick(&self) -> eyre::Result<()> {
        let wallets = repository::get_active_wallets(&self.pool).await?;
        if wallets.is_empty() {
            tracing::debug!("scan tick: no active wallets");
            return Ok(());
        }

        for (chain, chain_wallets) in group_by_chain(wallets) {
            let Some(config) = self.chains.get(&chain) else {
                tracing::warn!(chain, "active wallets reference an unconfigured chain, skipping");
                continue;
            };
            self.scan_chain(config, chain_wallets).await;
        }

        Ok(())
    }

    /// Scan every wallet of one chain against a single height snapshot.
    /// A failure here is local to the chain; the tick moves on.
    async fn scan_chain(&self, config: &ChainConfig, wallets: Vec<ActiveWallet>) {
        let height = match self.providers.block_height(&config.name).await {
            Ok(h) => h,
            Err(e) => {
                tracing::error!(
                    chain = %config.name,
                    error = %e,
                    "failed to fetch block height, skipping chain this tick"
                );
                return;
            }
        };

        // Hold back the confirmation buffer so a shallow reorg cannot
        // produce events for blocks that later disappear.
        let safe_height = height.saturating_sub(config.confirmations);

        tracing::info!(
            chain = %config.name,
            wallets = wallets.len(),
            height,
            safe_height,
            "scanning chain"
        );

        if safe_height == 0 {
            return;
        }

        for wallet in &wallets {
            self.scan_wallet(config, wallet, safe_height).await;
        }
    }

    async fn scan_wallet(&self, config: &ChainConfig, wallet: &ActiveWallet, safe_height: u64) {
        let Some(last_scanned) = wallet.last_scanned_block else {
            tracing::warn!(
                wallet_id = %wallet.id,
                chain = %config.name,
                address = %wallet.address,
                "wallet has no cursor record, skipping"
            );
            return;
        };
        let status = wallet.backfill_status.as_deref().unwrap_or("pending");
        if status == "error" {
            tracing::warn!(wallet_id = %wallet.id, "wallet backfill is in error state, skipping");
            return;
        }
        if wallet.email.is_none() {
            tracing::warn!(
                wallet_id = %wallet.id,
                user_id = %wallet.user_id,
                "wallet owner has no email, scanning without notifications"
            );
        }

        let last_scanned = last_scanned.max(0) as u64;
        if safe_height <= last_scanned {
            // Already at the frontier; close out an in-progress backfill.
            if status != "done" {
                self.finish_backfill(wallet).await;
            }
            return;
        }

        if status == "pending" {
            if let Err(e) = repository::mark_backfill_running(&self.pool, wallet.id).await {
                tracing::warn!(wallet_id = %wallet.id, error = %e, "failed to mark backfill running");
            }
        }

        let from_block = last_scanned + 1;
        let to_block = safe_height;

        let (created, completed) = self
            .scan_wallet_range(config, wallet, from_block, to_block)
            .await;

        if completed && status != "done" {
            self.finish_backfill(wallet).await;
        }

        self.dispatch_digest(config, wallet, from_block, to_block, created)
            .await;
    }

    /// Walk `[from_block, to_block]` in bounded chunks, sequentially.
    /// Returns the events created so far and whether the whole range
    /// completed. On a chunk failure the cursor is left at the last fully
    /// persisted chunk and the rest of the range waits for the next tick.
    async fn scan_wallet_range(
        &self,
        config: &ChainConfig,
        wallet: &ActiveWallet,
        from_block: u64,
        to_block: u64,
    ) -> (Vec<ApprovalEvent>, bool) {
        let owner = match Address::from_str(&wallet.address) {
            Ok(a) => a,
            Err(e) => {
                tracing::error!(
                    wallet_id = %wallet.id,
                    address = %wallet.address,
                    error = %e,
                    "wallet address is not a valid EVM address, skipping"
                );
                return (Vec::new(), false);
            }
        };
        let owner_topic = owner.into_word();
        let delay = Duration::from_millis(config.rate_limit_delay_ms);

        tracing::debug!(
            wallet_id = %wallet.id,
            chain = %config.name,
            address = %wallet.address,
            from_block,
            to_block,
            "scanning wallet range"
        );

        let mut created = Vec::new();

        for (from, to) in chunk_ranges(from_block, to_block, config.batch_size_blocks) {
            let Some(logs) = self
                .providers
                .approval_logs(&config.name, from, to, owner_topic)
                .await
            else {
                tracing::error!(
                    chain = %config.name,
                    wallet_id = %wallet.id,
                    from,
                    to,
                    "log fetch failed, deferring rest of range to next tick"
                );
                return (created, false);
            };

            let candidates: Vec<_> = logs
                .iter()
                .filter_map(|log| classifier::classify_log(log, wallet.id, &config.name, &owner))
                .collect();
            let rows = candidates.len();

            match self.ingestor.ingest(&self.pool, candidates).await {
                Ok(mut events) => created.append(&mut events),
                Err(e) => {
                    tracing::error!(
                        chain = %config.name,
                        wallet_id = %wallet.id,
                        from,
                        to,
                        error = %e,
                        "ingest failed, deferring rest of range to next tick"
                    );
                    return (created, false);
                }
            }

            // The cursor moves only after the chunk is durably persisted;
            // a crash in between replays the chunk, which dedupe absorbs.
            if let Err(e) = repository::advance_cursor(&self.pool, wallet.id, to as i64).await {
                tracing::error!(
                    wallet_id = %wallet.id,
                    to,
                    error = %e,
                    "cursor advance failed, deferring rest of range to next tick"
                );
                return (created, false);
            }

            tracing::debug!(
                chain = %config.name,
                wallet_id = %wallet.id,
                from,
                to,
                logs = logs.len(),
                rows,
                created = created.len(),
                "wallet chunk done"
            );

            if to < to_block {
                tokio::time::sleep(delay).await;
            }
        }

        (created, true)
    }

    async fn finish_backfill(&self, wallet: &ActiveWallet) {
        if let Err(e) = repository::mark_backfill_done(&self.pool, wallet.id).await {
            tracing::warn!(wallet_id = %wallet.id, error = %e, "failed to mark backfill done");
        } else {
            tracing::info!(wallet_id = %wallet.id, "backfill caught up with safe head");
        }
    }

    /// Filter the wallet's newly created events against the owner's
    /// notification threshold and hand a bounded digest to the notifier.
    async fn dispatch_digest(
        &self,
        config: &ChainConfig,
        wallet: &ActiveWallet,
        from_block: u64,
        to_block: u64,
        created: Vec<ApprovalEvent>,
    ) {
        let Some(email) = wallet.email.as_deref() else {
            return;
        };
        if !wallet.email_notifications_enabled {
            return;
        }

        let min_risk = wallet.email_min_risk_score.max(1);
        let qualifying: Vec<_> = created
            .into_iter()
            .filter(|e| e.risk_score > 0 && e.risk_score >= min_risk)
            .collect();
        if qualifying.is_empty() {
            return;
        }

        let digest = build_digest(
            config,
            &wallet.address,
            from_block,
            to_block,
            qualifying,
            self.events_per_digest,
        );
        self.notifier.send_digest(email, &digest).await;
    }
}

/// Group wallets by chain, preserving the repository's wallet ordering
/// within each group and first-seen chain order across groups.
pub(crate) fn group_by_chain(wallets: Vec<ActiveWallet>) -> Vec<(String, Vec<ActiveWallet>)> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<ActiveWallet>> = HashMap::new();

    for wallet in wallets {
        if !groups.contains_key(&wallet.chain) {
            order.push(wallet.chain.clone());
        }
        groups.entry(wallet.chain.clone()).or_default().push(wallet);
    }

    order
        .into_iter()
        .map(|chain| {
            let wallets = groups.remove(&chain).unwrap_or_default();
            (chain, wallets)
        })
        .collect()
}

/// Split an inclusive block range into chunks of at most `size` blocks.
pub(crate) fn chunk_ranges(from: u64, to: u64, size: u64) -> Vec<(u64, u64)> {
    let size = size.max(1);
    let mut ranges = Vec::new();
    let mut current = from;
    while current <= to {
        let end = std::cmp::min(current + size - 1, to);
        ranges.push((current, end));
        current = end + 1;
    }
    ranges
}

/// Slice qualifying events down to the digest limit and count the overflow.
pub(crate) fn build_digest(
    config: &ChainConfig,
    wallet_address: &str,
    from_block: u64,
    to_block: u64,
    events: Vec<ApprovalEvent>,
    limit: usize,
) -> ScanDigest {
    let total_events = events.len();
    let take = limit.max(1).min(total_events);
    let more_count = total_events - take;

    let entries = events
        .into_iter()
        .take(take)
        .map(|e| DigestEntry {
            kind: e.kind.clone(),
            token_address: e.token_address.clone(),
            spender: e.spender.clone(),
            raw_value: e.raw_value.as_ref().map(|v| v.to_string()),
            approved: e.approved,
            risk_score: e.risk_score,
            risk_level: e.risk_level.clone(),
            reasons: e.reasons(),
            tx_url: format!("{}{}", config.explorer_tx_base_url, e.tx_hash),
            tx_hash: e.tx_hash,
            block_number: e.block_number,
        })
        .collect();

    ScanDigest {
        chain: config.name.clone(),
        wallet_address: wallet_address.to_string(),
        from_block,
        to_block,
        events: entries,
        more_count,
        total_events,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use chrono::Utc;
    use uuid::Uuid;

    fn wallet(chain: &str) -> ActiveWallet {
        ActiveWallet {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            chain: chain.to_string(),
            address: "0x1111111111111111111111111111111111111111".to_string(),
            last_scanned_block: Some(0),
            backfill_status: Some("pending".to_string()),
            email: Some("user@example.com".to_string()),
            email_notifications_enabled: true,
            email_min_risk_score: 1,
        }
    }

    fn event(risk_score: i32, block_number: i64) -> ApprovalEvent {
        ApprovalEvent {
            id: block_number,
            wallet_id: Uuid::nil(),
            chain: "ethereum".to_string(),
            kind: "ERC20_APPROVAL".to_string(),
            token_address: "0xaaaa".to_string(),
            spender: "0xbbbb".to_string(),
            raw_value: Some(BigDecimal::from(1)),
            approved: None,
            tx_hash: format!("0x{:02x}", block_number),
            block_number,
            log_index: 0,
            risk_score,
            risk_level: "HIGH".to_string(),
            risk_meta: serde_json::json!({"reasons": ["HUGE_ALLOWANCE"]}),
            created_at: Utc::now(),
        }
    }

    fn chain_config() -> ChainConfig {
        ChainConfig {
            name: "ethereum".to_string(),
            chain_id: 1,
            rpc_http: Some("http://localhost:8545".to_string()),
            confirmations: 12,
            batch_size_blocks: 500,
            rate_limit_delay_ms: 250,
            backfill_days: 30,
            avg_block_time_seconds: 12,
            explorer_tx_base_url: "https://etherscan.io/tx/".to_string(),
            valuable_tokens: vec![],
        }
    }

    #[test]
    fn groups_wallets_by_chain_in_first_seen_order() {
        let wallets = vec![wallet("ethereum"), wallet("polygon"), wallet("ethereum")];
        let ids: Vec<Uuid> = wallets.iter().map(|w| w.id).collect();

        let groups = group_by_chain(wallets);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "ethereum");
        assert_eq!(groups[1].0, "polygon");
        assert_eq!(
            groups[0].1.iter().map(|w| w.id).collect::<Vec<_>>(),
            vec![ids[0], ids[2]]
        );
        assert_eq!(groups[1].1.len(), 1);
    }

    #[test]
    fn chunk_ranges_cover_the_range_without_overlap() {
        assert_eq!(chunk_ranges(1, 10, 4), vec![(1, 4), (5, 8), (9, 10)]);
        assert_eq!(chunk_ranges(5, 5, 100), vec![(5, 5)]);
        assert!(chunk_ranges(10, 9, 100).is_empty());
        // a zero batch size must not loop forever
        assert_eq!(chunk_ranges(1, 3, 0), vec![(1, 1), (2, 2), (3, 3)]);
    }

    #[test]
    fn digest_slices_to_limit_and_counts_overflow() {
        let events = vec![event(105, 3), event(70, 2), event(40, 1)];
        let digest = build_digest(&chain_config(), "0x1111", 1, 100, events, 2);

        assert_eq!(digest.events.len(), 2);
        assert_eq!(digest.more_count, 1);
        assert_eq!(digest.total_events, 3);
        assert_eq!(digest.events[0].risk_score, 105);
        assert_eq!(
            digest.events[0].tx_url,
            "https://etherscan.io/tx/0x03".to_string()
        );
        assert_eq!(digest.events[0].reasons, vec!["HUGE_ALLOWANCE"]);
    }

    #[test]
    fn digest_limit_is_at_least_one() {
        let digest = build_digest(&chain_config(), "0x1111", 1, 100, vec![event(40, 1)], 0);
        assert_eq!(digest.events.len(), 1);
        assert_eq!(digest.more_count, 0);
    }
}

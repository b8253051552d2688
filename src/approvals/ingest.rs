use bigdecimal::BigDecimal;
use sqlx::PgPool;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use uuid::Uuid;

use crate::config::ChainConfig;
use crate::db::repository::{self, NewApprovalEvent};
use crate::risk::engine;

use super::types::{ApprovalEvent, CandidateEvent};

/// Idempotent sink for candidate approval events.
///
/// A batch may legitimately be re-submitted (a tick restarted after a
/// partial chunk failure replays the chunk), so ingestion first drops
/// candidates whose natural key `(chain, tx_hash, log_index)` already
/// exists, then scores and persists only the genuinely new subset.
/// Trust lookups run once per (user, chain) group over the deduplicated
/// batch, never per event.
pub struct EventIngestor {
    /// chain name -> lowercased valuable token addresses
    valuable_tokens: HashMap<String, HashSet<String>>,
}

impl EventIngestor {
    pub fn from_config(chains: &[ChainConfig]) -> Self {
        let mut valuable_tokens = HashMap::new();
        for chain in chains {
            let set: HashSet<String> = chain
                .valuable_tokens
                .iter()
                .map(|t| t.to_lowercase())
                .collect();
            valuable_tokens.insert(chain.name.clone(), set);
        }
        Self { valuable_tokens }
    }

    /// Persist a batch, returning exactly the newly created rows.
    /// Duplicates are silently absorbed, never errors.
    pub async fn ingest(
        &self,
        pool: &PgPool,
        candidates: Vec<CandidateEvent>,
    ) -> eyre::Result<Vec<ApprovalEvent>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<_> = candidates.iter().map(|c| c.natural_key()).collect();
        let existing = repository::find_existing_event_keys(pool, &keys).await?;
        let new_events = partition_new(candidates, &existing);
        if new_events.is_empty() {
            return Ok(Vec::new());
        }

        let wallet_ids: Vec<Uuid> = {
            let mut seen = HashSet::new();
            new_events
                .iter()
                .filter(|e| seen.insert(e.wallet_id))
                .map(|e| e.wallet_id)
                .collect()
        };
        let wallet_to_user = repository::get_user_ids_by_wallet_ids(pool, &wallet_ids).await?;

        let mut trusted: HashMap<(Uuid, String), HashSet<String>> = HashMap::new();
        for ((user_id, chain), spenders) in group_spenders(&new_events, &wallet_to_user) {
            let set = repository::find_trusted_spenders(pool, user_id, &chain, &spenders).await?;
            trusted.insert((user_id, chain), set);
        }

        let empty = HashSet::new();
        let rows: Vec<NewApprovalEvent> = new_events
            .iter()
            .map(|e| {
                let valuable = self.valuable_tokens.get(&e.chain).unwrap_or(&empty);
                // An event whose wallet resolves to no user carries no trust
                // context; the risk engine treats that as unresolved.
                let trusted_spender = wallet_to_user.get(&e.wallet_id).map(|user_id| {
                    trusted
                        .get(&(*user_id, e.chain.clone()))
                        .is_some_and(|set| set.contains(&e.spender.to_lowercase()))
                });
                let assessment = engine::compute_risk(e, valuable, trusted_spender);

                NewApprovalEvent {
                    wallet_id: e.wallet_id,
                    chain: e.chain.clone(),
                    kind: e.kind,
                    token_address: e.token_address.clone(),
                    spender: e.spender.clone(),
                    raw_value: e
                        .raw_value
                        .as_deref()
                        .and_then(|v| BigDecimal::from_str(v).ok()),
                    approved: e.approved,
                    tx_hash: e.tx_hash.clone(),
                    block_number: e.block_number,
                    log_index: e.log_index,
                    risk_score: assessment.score,
                    risk_level: assessment.level,
                    risk_meta: assessment.meta(e),
                }
            })
            .collect();

        repository::insert_events_batch(pool, &rows).await
    }
}

/// Drop candidates whose natural key is already persisted, preserving order.
fn partition_new(
    candidates: Vec<CandidateEvent>,
    existing: &HashSet<(String, String, i32)>,
) -> Vec<CandidateEvent> {
    candidates
        .into_iter()
        .filter(|c| !existing.contains(&c.natural_key()))
        .collect()
}

/// Distinct lowercased spenders per (user, chain) group. Candidates whose
/// wallet has no resolvable owner are left out; empty spenders are dropped
/// before lookup.
fn group_spenders(
    events: &[CandidateEvent],
    wallet_to_user: &HashMap<Uuid, Uuid>,
) -> HashMap<(Uuid, String), Vec<String>> {
    let mut sets: HashMap<(Uuid, String), HashSet<String>> = HashMap::new();
    for event in events {
        let Some(user_id) = wallet_to_user.get(&event.wallet_id) else {
            continue;
        };
        let spender = event.spender.to_lowercase();
        if spender.is_empty() {
            continue;
        }
        sets.entry((*user_id, event.chain.clone()))
            .or_default()
            .insert(spender);
    }

    sets.into_iter()
        .map(|(key, set)| (key, set.into_iter().collect()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approvals::types::ApprovalKind;

    fn candidate(wallet_id: Uuid, tx_hash: &str, log_index: i32, spender: &str) -> CandidateEvent {
        CandidateEvent {
            wallet_id,
            chain: "ethereum".to_string(),
            kind: ApprovalKind::Erc20Approval,
            token_address: "0x00000000000000000000000000000000000000aa".to_string(),
            spender: spender.to_string(),
            raw_value: Some("1".to_string()),
            approved: None,
            tx_hash: tx_hash.to_string(),
            block_number: 100,
            log_index,
        }
    }

    #[test]
    fn partition_new_drops_already_persisted_keys() {
        let wallet = Uuid::new_v4();
        let candidates = vec![
            candidate(wallet, "0x01", 0, "0xaaa"),
            candidate(wallet, "0x01", 1, "0xbbb"),
            candidate(wallet, "0x02", 0, "0xccc"),
        ];

        let existing: HashSet<_> =
            [("ethereum".to_string(), "0x01".to_string(), 1)].into();

        let fresh = partition_new(candidates, &existing);
        assert_eq!(fresh.len(), 2);
        assert_eq!(fresh[0].tx_hash, "0x01");
        assert_eq!(fresh[0].log_index, 0);
        assert_eq!(fresh[1].tx_hash, "0x02");
    }

    #[test]
    fn group_spenders_dedupes_and_normalizes() {
        let wallet = Uuid::new_v4();
        let user = Uuid::new_v4();
        let wallet_to_user: HashMap<Uuid, Uuid> = [(wallet, user)].into();

        let events = vec![
            candidate(wallet, "0x01", 0, "0xAAA"),
            candidate(wallet, "0x01", 1, "0xaaa"),
            candidate(wallet, "0x02", 0, "0xbbb"),
            candidate(wallet, "0x03", 0, ""),
        ];

        let groups = group_spenders(&events, &wallet_to_user);
        assert_eq!(groups.len(), 1);

        let mut spenders = groups[&(user, "ethereum".to_string())].clone();
        spenders.sort();
        assert_eq!(spenders, vec!["0xaaa", "0xbbb"]);
    }

    #[test]
    fn group_spenders_skips_unresolvable_wallets() {
        let events = vec![candidate(Uuid::new_v4(), "0x01", 0, "0xaaa")];
        let groups = group_spenders(&events, &HashMap::new());
        assert!(groups.is_empty());
    }

    #[test]
    fn ingestor_lowercases_configured_valuable_tokens() {
        let chain = ChainConfig {
            name: "ethereum".to_string(),
            chain_id: 1,
            rpc_http: Some("http://localhost:8545".to_string()),
            confirmations: 12,
            batch_size_blocks: 500,
            rate_limit_delay_ms: 250,
            backfill_days: 30,
            avg_block_time_seconds: 12,
            explorer_tx_base_url: "https://etherscan.io/tx/".to_string(),
            valuable_tokens: vec!["0x00000000000000000000000000000000000000AA".to_string()],
        };

        let ingestor = EventIngestor::from_config(&[chain]);
        let set = &ingestor.valuable_tokens["ethereum"];
        assert!(set.contains("0x00000000000000000000000000000000000000aa"));
    }
}

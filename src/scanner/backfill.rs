use crate::config::ChainConfig;

/// Initial cursor for a newly registered wallet: the chain's backfill
/// window converted from days to blocks, anchored below the reorg-safe
/// head. The wallet's first scans then walk forward from here.
pub fn initial_cursor_block(safe_height: u64, config: &ChainConfig) -> u64 {
    let blocks_back = config.backfill_days * 86_400 / config.avg_block_time_seconds.max(1);
    safe_height.saturating_sub(blocks_back)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(backfill_days: u64, avg_block_time_seconds: u64) -> ChainConfig {
        ChainConfig {
            name: "ethereum".to_string(),
            chain_id: 1,
            rpc_http: Some("http://localhost:8545".to_string()),
            confirmations: 12,
            batch_size_blocks: 500,
            rate_limit_delay_ms: 250,
            backfill_days,
            avg_block_time_seconds,
            explorer_tx_base_url: "https://etherscan.io/tx/".to_string(),
            valuable_tokens: vec![],
        }
    }

    #[test]
    fn window_is_days_over_block_time() {
        // 1 day at 12s blocks = 7200 blocks back
        assert_eq!(initial_cursor_block(100_000, &chain(1, 12)), 92_800);
    }

    #[test]
    fn clamps_to_genesis() {
        assert_eq!(initial_cursor_block(100, &chain(30, 12)), 0);
    }

    #[test]
    fn zero_block_time_does_not_divide_by_zero() {
        assert_eq!(initial_cursor_block(100_000, &chain(1, 0)), 100_000 - 86_400);
    }
}

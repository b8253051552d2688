use sqlx::PgPool;

use super::types::{ChainCursorStatus, HealthResponse};

/// DB liveness plus per-chain scan progress, derived from wallet cursors.
pub async fn get_health(pool: &PgPool) -> eyre::Result<HealthResponse> {
    let (total_events,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM approval_events")
        .fetch_one(pool)
        .await?;

    let rows: Vec<(String, i64, i64, i64)> = sqlx::query_as(
        "SELECT w.chain, COUNT(*),
                COALESCE(MIN(c.last_scanned_block), 0),
                COALESCE(MAX(c.last_scanned_block), 0)
         FROM wallets w
         JOIN wallet_cursors c ON c.wallet_id = w.id
         WHERE w.status = 'ACTIVE'
         GROUP BY w.chain
         ORDER BY w.chain",
    )
    .fetch_all(pool)
    .await?;

    let chains = rows
        .into_iter()
        .map(
            |(chain, wallets, min_scanned_block, max_scanned_block)| ChainCursorStatus {
                chain,
                wallets,
                min_scanned_block,
                max_scanned_block,
            },
        )
        .collect();

    Ok(HealthResponse {
        status: "ok".to_string(),
        total_events,
        chains,
    })
}

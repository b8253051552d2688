use bigdecimal::BigDecimal;
use sqlx::PgPool;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::approvals::types::{ApprovalEvent, ApprovalKind};
use crate::risk::types::RiskLevel;

/// An ACTIVE wallet joined with its scan cursor and the owner's
/// notification preferences. The cursor side is nullable so a wallet
/// whose cursor record is missing can be skipped with a diagnostic
/// instead of failing the whole tick.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ActiveWallet {
    pub id: Uuid,
    pub user_id: Uuid,
    pub chain: String,
    pub address: String,
    pub last_scanned_block: Option<i64>,
    pub backfill_status: Option<String>,
    pub email: Option<String>,
    pub email_notifications_enabled: bool,
    pub email_min_risk_score: i32,
}

/// A scored event ready for insertion.
#[derive(Debug, Clone)]
pub struct NewApprovalEvent {
    pub wallet_id: Uuid,
    pub chain: String,
    pub kind: ApprovalKind,
    pub token_address: String,
    pub spender: String,
    pub raw_value: Option<BigDecimal>,
    pub approved: Option<bool>,
    pub tx_hash: String,
    pub block_number: i64,
    pub log_index: i32,
    pub risk_score: i32,
    pub risk_level: RiskLevel,
    pub risk_meta: serde_json::Value,
}

const APPROVAL_EVENT_COLUMNS: &str = "id, wallet_id, chain, kind, token_address, spender, \
     raw_value, approved, tx_hash, block_number, log_index, risk_score, risk_level, \
     risk_meta, created_at";

/// All ACTIVE wallets with cursor state and owner preferences, oldest first.
pub async fn get_active_wallets(pool: &PgPool) -> eyre::Result<Vec<ActiveWallet>> {
    let wallets = sqlx::query_as::<_, ActiveWallet>(
        "SELECT w.id, w.user_id, w.chain, w.address,
                c.last_scanned_block, c.backfill_status,
                u.email, u.email_notifications_enabled, u.email_min_risk_score
         FROM wallets w
         LEFT JOIN wallet_cursors c ON c.wallet_id = w.id
         JOIN users u ON u.id = w.user_id
         WHERE w.status = 'ACTIVE'
         ORDER BY w.created_at ASC",
    )
    .fetch_all(pool)
    .await?;

    Ok(wallets)
}

/// Advance a wallet's cursor after a chunk has been fully persisted.
/// The guard keeps the cursor monotonically non-decreasing even if a
/// stale caller replays an old chunk.
pub async fn advance_cursor(
    pool: &PgPool,
    wallet_id: Uuid,
    last_scanned_block: i64,
) -> eyre::Result<()> {
    sqlx::query(
        "UPDATE wallet_cursors
         SET last_scanned_block = $2, updated_at = NOW()
         WHERE wallet_id = $1 AND last_scanned_block <= $2",
    )
    .bind(wallet_id)
    .bind(last_scanned_block)
    .execute(pool)
    .await?;

    Ok(())
}

/// Transition a pending cursor into the running backfill state.
pub async fn mark_backfill_running(pool: &PgPool, wallet_id: Uuid) -> eyre::Result<()> {
    sqlx::query(
        "UPDATE wallet_cursors
         SET backfill_status = 'running', backfill_started_at = NOW(), updated_at = NOW()
         WHERE wallet_id = $1 AND backfill_status = 'pending'",
    )
    .bind(wallet_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Close out a backfill once the cursor has caught up with the safe head.
pub async fn mark_backfill_done(pool: &PgPool, wallet_id: Uuid) -> eyre::Result<()> {
    sqlx::query(
        "UPDATE wallet_cursors
         SET backfill_status = 'done', backfill_finished_at = NOW(), updated_at = NOW()
         WHERE wallet_id = $1 AND backfill_status IN ('pending', 'running')",
    )
    .bind(wallet_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Create a wallet together with its cursor record, seeded at the start of
/// the backfill window. Used by the wallet registration endpoint.
pub async fn create_wallet_with_cursor(
    pool: &PgPool,
    user_id: Uuid,
    chain: &str,
    address: &str,
    start_block: i64,
) -> eyre::Result<Uuid> {
    let mut tx = pool.begin().await?;

    let (wallet_id,): (Uuid,) = sqlx::query_as(
        "INSERT INTO wallets (user_id, chain, address) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(user_id)
    .bind(chain)
    .bind(address)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO wallet_cursors (wallet_id, last_scanned_block, backfill_status)
         VALUES ($1, $2, 'pending')",
    )
    .bind(wallet_id)
    .bind(start_block)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(wallet_id)
}

/// Resolve wallet ids to their owning user ids.
pub async fn get_user_ids_by_wallet_ids(
    pool: &PgPool,
    wallet_ids: &[Uuid],
) -> eyre::Result<HashMap<Uuid, Uuid>> {
    if wallet_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows: Vec<(Uuid, Uuid)> =
        sqlx::query_as("SELECT id, user_id FROM wallets WHERE id = ANY($1)")
            .bind(wallet_ids)
            .fetch_all(pool)
            .await?;

    Ok(rows.into_iter().collect())
}

/// The subset of `spenders` present in the user's allowlist for a chain.
/// Candidates are lowercased, deduplicated, and stripped of empties before
/// lookup. Callers pass the full batch of distinct spenders for a
/// (user, chain) group so the lookup cost is bounded by distinct spenders,
/// not events.
pub async fn find_trusted_spenders(
    pool: &PgPool,
    user_id: Uuid,
    chain: &str,
    spenders: &[String],
) -> eyre::Result<HashSet<String>> {
    let mut seen = HashSet::new();
    let normalized: Vec<String> = spenders
        .iter()
        .map(|s| s.to_lowercase())
        .filter(|s| !s.is_empty() && seen.insert(s.clone()))
        .collect();
    if normalized.is_empty() {
        return Ok(HashSet::new());
    }

    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT spender FROM trusted_spenders
         WHERE user_id = $1 AND chain = $2 AND spender = ANY($3)",
    )
    .bind(user_id)
    .bind(chain)
    .bind(&normalized)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|(s,)| s).collect())
}

/// Which of the given natural keys already exist in the event ledger.
pub async fn find_existing_event_keys(
    pool: &PgPool,
    keys: &[(String, String, i32)],
) -> eyre::Result<HashSet<(String, String, i32)>> {
    if keys.is_empty() {
        return Ok(HashSet::new());
    }

    let mut existing = HashSet::new();
    for chunk in keys.chunks(1000) {
        let mut query_builder: sqlx::QueryBuilder<sqlx::Postgres> = sqlx::QueryBuilder::new(
            "SELECT chain, tx_hash, log_index FROM approval_events \
             WHERE (chain, tx_hash, log_index) IN ",
        );
        query_builder.push_tuples(chunk, |mut b, (chain, tx_hash, log_index)| {
            b.push_bind(chain).push_bind(tx_hash).push_bind(log_index);
        });

        let rows: Vec<(String, String, i32)> =
            query_builder.build_query_as().fetch_all(pool).await?;
        existing.extend(rows);
    }

    Ok(existing)
}

/// Insert a batch of scored events. Conflicts on the natural key are
/// silently absorbed; only the rows actually created are returned.
/// Chunks into groups of 1000 to stay within PostgreSQL parameter limits.
pub async fn insert_events_batch(
    pool: &PgPool,
    events: &[NewApprovalEvent],
) -> eyre::Result<Vec<ApprovalEvent>> {
    if events.is_empty() {
        return Ok(Vec::new());
    }

    let mut created = Vec::with_capacity(events.len());
    for chunk in events.chunks(1000) {
        let mut query_builder: sqlx::QueryBuilder<sqlx::Postgres> = sqlx::QueryBuilder::new(
            "INSERT INTO approval_events (wallet_id, chain, kind, token_address, spender, \
             raw_value, approved, tx_hash, block_number, log_index, risk_score, risk_level, \
             risk_meta) ",
        );

        query_builder.push_values(chunk, |mut b, e| {
            b.push_bind(e.wallet_id)
                .push_bind(&e.chain)
                .push_bind(e.kind.as_str())
                .push_bind(&e.token_address)
                .push_bind(&e.spender)
                .push_bind(&e.raw_value)
                .push_bind(e.approved)
                .push_bind(&e.tx_hash)
                .push_bind(e.block_number)
                .push_bind(e.log_index)
                .push_bind(e.risk_score)
                .push_bind(e.risk_level.as_str())
                .push_bind(&e.risk_meta);
        });

        query_builder.push(" ON CONFLICT (chain, tx_hash, log_index) DO NOTHING RETURNING ");
        query_builder.push(APPROVAL_EVENT_COLUMNS);

        let mut rows: Vec<ApprovalEvent> = query_builder.build_query_as().fetch_all(pool).await?;
        created.append(&mut rows);
    }

    Ok(created)
}

/// Filters accepted by the approvals feed.
#[derive(Debug, Clone)]
pub struct FeedFilter {
    pub user_id: Uuid,
    pub chain: Option<String>,
    pub kind: Option<ApprovalKind>,
    pub min_risk_score: Option<i32>,
    pub skip: i64,
    pub take: i64,
}

/// A feed row: the event plus the wallet it was observed on.
#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedEvent {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub event: ApprovalEvent,
    pub wallet_address: String,
}

/// The approvals feed for one user, newest on-chain position first.
/// `take` is clamped to [1, 200].
pub async fn find_feed(pool: &PgPool, filter: &FeedFilter) -> eyre::Result<Vec<FeedEvent>> {
    let take = filter.take.clamp(1, 200);
    let skip = filter.skip.max(0);

    let mut query_builder: sqlx::QueryBuilder<sqlx::Postgres> = sqlx::QueryBuilder::new(
        "SELECT e.id, e.wallet_id, e.chain, e.kind, e.token_address, e.spender, \
         e.raw_value, e.approved, e.tx_hash, e.block_number, e.log_index, e.risk_score, \
         e.risk_level, e.risk_meta, e.created_at, w.address AS wallet_address \
         FROM approval_events e \
         JOIN wallets w ON w.id = e.wallet_id \
         WHERE w.user_id = ",
    );
    query_builder.push_bind(filter.user_id);

    if let Some(chain) = &filter.chain {
        query_builder.push(" AND e.chain = ").push_bind(chain);
    }
    if let Some(kind) = filter.kind {
        query_builder.push(" AND e.kind = ").push_bind(kind.as_str());
    }
    if let Some(min_risk_score) = filter.min_risk_score {
        query_builder
            .push(" AND e.risk_score >= ")
            .push_bind(min_risk_score);
    }

    query_builder.push(" ORDER BY e.block_number DESC, e.log_index DESC");
    query_builder.push(" LIMIT ").push_bind(take);
    query_builder.push(" OFFSET ").push_bind(skip);

    let rows = query_builder.build_query_as().fetch_all(pool).await?;
    Ok(rows)
}

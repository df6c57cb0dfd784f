use chrono::NaiveDate;
use sqlx::{Executor, PgPool, Postgres, QueryBuilder};

use crate::models::*;

// ─── Balance Queries ────────────────────────────────────────────────────────

/// Create the balance row for a user if it does not exist yet.
/// Balances are created lazily on first credit, starting at zero.
pub async fn ensure_balance_row<'e, E>(executor: E, user_id: &str) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO balances (user_id, point)
        VALUES ($1, 0)
        ON CONFLICT (user_id) DO NOTHING
        "#,
    )
    .bind(user_id)
    .execute(executor)
    .await?;
    Ok(())
}

/// Apply a signed delta to a user's balance, refusing to go negative.
///
/// Returns the new balance, or `None` when the guarded UPDATE matched no row
/// (the delta would have overdrawn the balance). The row lock taken here
/// serializes concurrent mutations for the same user until commit.
pub async fn apply_balance_delta<'e, E>(
    executor: E,
    user_id: &str,
    amount: i64,
) -> Result<Option<i64>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let row: Option<(i64,)> = sqlx::query_as(
        r#"
        UPDATE balances
        SET point = point + $2, updated_at = NOW()
        WHERE user_id = $1 AND point + $2 >= 0
        RETURNING point
        "#,
    )
    .bind(user_id)
    .bind(amount)
    .fetch_optional(executor)
    .await?;
    if row.is_none() {
        tracing::debug!(user = user_id, amount = amount, "Balance delta refused, would overdraw");
    }
    Ok(row.map(|r| r.0))
}

/// Get a user's balance row, if one exists.
pub async fn get_balance(pool: &PgPool, user_id: &str) -> Result<Option<Balance>, sqlx::Error> {
    sqlx::query_as::<_, Balance>("SELECT * FROM balances WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await
}

// ─── History Queries ────────────────────────────────────────────────────────

/// Append one immutable history entry. `after_point` is the balance snapshot
/// the caller observed from the guarded UPDATE in the same transaction.
pub async fn append_history<'e, E>(
    executor: E,
    user_id: &str,
    amount: i64,
    kind: PointKind,
    description: &str,
    after_point: i64,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO point_history (user_id, amount, kind, description, after_point)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(user_id)
    .bind(amount)
    .bind(kind)
    .bind(description)
    .bind(after_point)
    .execute(executor)
    .await?;
    Ok(())
}

/// Filters for reading a user's history. All fields optional.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    /// Max rows to return (defaults to 50).
    pub limit: Option<i64>,
    /// Restrict to one entry kind.
    pub kind: Option<PointKind>,
    /// Inclusive lower bound on the entry date.
    pub from: Option<NaiveDate>,
    /// Inclusive upper bound on the entry date.
    pub to: Option<NaiveDate>,
}

/// Read a user's history, newest first, with optional kind/date filtering.
pub async fn get_history(
    pool: &PgPool,
    user_id: &str,
    filter: &HistoryFilter,
) -> Result<Vec<HistoryEntry>, sqlx::Error> {
    let mut qb = history_query(user_id, filter);
    qb.build_query_as::<HistoryEntry>().fetch_all(pool).await
}

/// Assemble the history SELECT. Split out so the clause logic is testable
/// without a database.
fn history_query<'a>(user_id: &'a str, filter: &'a HistoryFilter) -> QueryBuilder<'a, Postgres> {
    let mut qb: QueryBuilder<Postgres> =
        QueryBuilder::new("SELECT * FROM point_history WHERE user_id = ");
    qb.push_bind(user_id);

    if let Some(kind) = filter.kind {
        qb.push(" AND kind = ").push_bind(kind);
    }
    if let Some(from) = filter.from {
        if let Some(start) = from.and_hms_opt(0, 0, 0) {
            qb.push(" AND created_at >= ").push_bind(start);
        }
    }
    if let Some(to) = filter.to {
        // Inclusive upper bound: strictly before the following midnight.
        if let Some(end) = to.succ_opt().and_then(|d| d.and_hms_opt(0, 0, 0)) {
            qb.push(" AND created_at < ").push_bind(end);
        }
    }

    qb.push(" ORDER BY created_at DESC, id DESC LIMIT ");
    qb.push_bind(filter.limit.unwrap_or(50));
    qb
}

// ─── Daily Claim Queries ────────────────────────────────────────────────────

/// Optimistically insert a claim row for (user, day).
///
/// Returns `true` if this call created the row. `false` means a concurrent
/// claim won the insert race; the caller should re-read and adopt the
/// winner's amount instead of erroring.
pub async fn insert_daily_claim<'e, E>(
    executor: E,
    user_id: &str,
    claim_date: NaiveDate,
    amount: i64,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO daily_claims (user_id, claim_date, amount)
        VALUES ($1, $2, $3)
        ON CONFLICT (user_id, claim_date) DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(claim_date)
    .bind(amount)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Get the claim row for (user, day), if any.
pub async fn get_daily_claim(
    pool: &PgPool,
    user_id: &str,
    claim_date: NaiveDate,
) -> Result<Option<DailyClaim>, sqlx::Error> {
    sqlx::query_as::<_, DailyClaim>(
        "SELECT * FROM daily_claims WHERE user_id = $1 AND claim_date = $2",
    )
    .bind(user_id)
    .bind(claim_date)
    .fetch_optional(pool)
    .await
}

/// Transition `credited_at` from null to now, exactly once.
///
/// Returns `false` when the row was already credited — a concurrent call got
/// there first and the caller must not credit again. The row lock taken by a
/// successful UPDATE holds off other markers until commit.
pub async fn mark_claim_credited<'e, E>(
    executor: E,
    user_id: &str,
    claim_date: NaiveDate,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        r#"
        UPDATE daily_claims
        SET credited_at = NOW()
        WHERE user_id = $1 AND claim_date = $2 AND credited_at IS NULL
        "#,
    )
    .bind(user_id)
    .bind(claim_date)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

// ─── Streamer Totals ────────────────────────────────────────────────────────

/// Create a zero-total accumulator row for a newly registered streamer.
/// Called by the directory when a streamer account is created; idempotent.
pub async fn register_streamer(pool: &PgPool, streamer_id: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO streamer_totals (streamer_id, total)
        VALUES ($1, 0)
        ON CONFLICT (streamer_id) DO NOTHING
        "#,
    )
    .bind(streamer_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Add gifted points to a streamer's running total.
///
/// Returns the new total, or `None` when the streamer has no accumulator row
/// (not registered) — the caller rolls back the enclosing transaction.
pub async fn add_to_streamer_total<'e, E>(
    executor: E,
    streamer_id: &str,
    amount: i64,
) -> Result<Option<i64>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    let row: Option<(i64,)> = sqlx::query_as(
        r#"
        UPDATE streamer_totals
        SET total = total + $2, updated_at = NOW()
        WHERE streamer_id = $1
        RETURNING total
        "#,
    )
    .bind(streamer_id)
    .bind(amount)
    .fetch_optional(executor)
    .await?;
    Ok(row.map(|r| r.0))
}

/// Get a streamer's accumulator row, if any.
pub async fn get_streamer_total(
    pool: &PgPool,
    streamer_id: &str,
) -> Result<Option<StreamerTotal>, sqlx::Error> {
    sqlx::query_as::<_, StreamerTotal>("SELECT * FROM streamer_totals WHERE streamer_id = $1")
        .bind(streamer_id)
        .fetch_optional(pool)
        .await
}

// ─── Audit Queries ──────────────────────────────────────────────────────────

/// Users whose stored balance disagrees with the sum of their history.
/// Returns (user_id, stored_point, history_sum) per divergent user.
pub async fn find_balance_drift(pool: &PgPool) -> Result<Vec<(String, i64, i64)>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT b.user_id, b.point, COALESCE(SUM(h.amount), 0) AS history_sum
        FROM balances b
        LEFT JOIN point_history h ON h.user_id = b.user_id
        GROUP BY b.user_id, b.point
        HAVING b.point != COALESCE(SUM(h.amount), 0)
        "#,
    )
    .fetch_all(pool)
    .await
}

/// Number of balance rows (no allocation — just a scalar).
pub async fn count_balances(pool: &PgPool) -> Result<i64, sqlx::Error> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM balances")
        .fetch_one(pool)
        .await?;
    Ok(row.0)
}

/// Global gift totals: (sum of all streamer accumulators, negated sum of all
/// gift_sent history amounts). The two must match at rest.
pub async fn gift_totals(pool: &PgPool) -> Result<(i64, i64), sqlx::Error> {
    let accumulated: (i64,) = sqlx::query_as("SELECT COALESCE(SUM(total), 0) FROM streamer_totals")
        .fetch_one(pool)
        .await?;
    let debited: (i64,) = sqlx::query_as(
        "SELECT COALESCE(-SUM(amount), 0) FROM point_history WHERE kind = 'gift_sent'",
    )
    .fetch_one(pool)
    .await?;
    Ok((accumulated.0, debited.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_query_bare() {
        let filter = HistoryFilter::default();
        let sql = history_query("u1", &filter).into_sql();
        assert!(sql.starts_with("SELECT * FROM point_history WHERE user_id = "));
        assert!(sql.contains("ORDER BY created_at DESC, id DESC LIMIT "));
        assert!(!sql.contains("kind"));
        assert!(!sql.contains("created_at >="));
    }

    #[test]
    fn history_query_with_all_filters() {
        let filter = HistoryFilter {
            limit: Some(10),
            kind: Some(PointKind::GiftSent),
            from: NaiveDate::from_ymd_opt(2024, 1, 1),
            to: NaiveDate::from_ymd_opt(2024, 1, 31),
        };
        let sql = history_query("u1", &filter).into_sql();
        assert!(sql.contains(" AND kind = "));
        assert!(sql.contains(" AND created_at >= "));
        assert!(sql.contains(" AND created_at < "));
    }
}

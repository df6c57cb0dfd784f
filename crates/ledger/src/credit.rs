//! The atomic credit operation — the single choke point through which every
//! balance change flows. One database transaction covers the balance upsert,
//! the guarded delta, and the history append, so concurrent credits for the
//! same user serialize on the balance row lock and no update is ever lost.

use pointcast_core::LedgerError;
use pointcast_storage::models::PointKind;
use pointcast_storage::repos;
use sqlx::{PgPool, Postgres, Transaction};

/// Longest accepted description/note on a history entry.
pub const MAX_DESCRIPTION_LEN: usize = 200;

/// Result of a credit (or debit, for negative amounts).
#[derive(Debug, Clone, serde::Serialize)]
pub struct CreditOutcome {
    pub after_balance: i64,
}

/// Credit `amount` points (negative = debit) to a user's balance and record
/// the matching history entry, atomically.
pub async fn credit_points(
    pool: &PgPool,
    user_id: &str,
    amount: i64,
    kind: PointKind,
    description: &str,
) -> Result<CreditOutcome, LedgerError> {
    validate_credit(user_id, amount, description)?;

    let mut tx = pool.begin().await.map_err(storage_err)?;
    let after_balance = credit_in_tx(&mut tx, user_id, amount, kind, description).await?;
    commit(tx).await?;

    tracing::info!(
        user = user_id,
        amount = amount,
        kind = kind.as_str(),
        after = after_balance,
        "Points credited"
    );
    Ok(CreditOutcome { after_balance })
}

/// Run the credit statements on a caller's open transaction, so claim and
/// gift flows compose with the credit atomically. Returns the new balance.
pub(crate) async fn credit_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    user_id: &str,
    amount: i64,
    kind: PointKind,
    description: &str,
) -> Result<i64, LedgerError> {
    repos::ensure_balance_row(&mut **tx, user_id)
        .await
        .map_err(storage_err)?;

    // Zero rows from the guarded UPDATE means the debit would overdraw.
    let after_point = repos::apply_balance_delta(&mut **tx, user_id, amount)
        .await
        .map_err(storage_err)?
        .ok_or(LedgerError::InsufficientFunds(amount.abs()))?;

    repos::append_history(&mut **tx, user_id, amount, kind, description, after_point)
        .await
        .map_err(storage_err)?;

    Ok(after_point)
}

/// Current balance for a user; a missing row reads as zero.
pub(crate) async fn current_point(pool: &PgPool, user_id: &str) -> Result<i64, LedgerError> {
    let balance = repos::get_balance(pool, user_id)
        .await
        .map_err(storage_err)?;
    Ok(balance.map(|b| b.point).unwrap_or(0))
}

pub(crate) fn validate_credit(
    user_id: &str,
    amount: i64,
    description: &str,
) -> Result<(), LedgerError> {
    if user_id.trim().is_empty() {
        return Err(LedgerError::InvalidInput("user id must not be empty".into()));
    }
    if amount == 0 {
        return Err(LedgerError::InvalidInput(
            "credit amount must be non-zero".into(),
        ));
    }
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(LedgerError::InvalidInput(format!(
            "description exceeds {MAX_DESCRIPTION_LEN} characters"
        )));
    }
    Ok(())
}

pub(crate) fn storage_err(e: sqlx::Error) -> LedgerError {
    LedgerError::StorageUnavailable(e.to_string())
}

/// Commit, mapping failure to `ConsistencyRisk`: the statements succeeded, so
/// the outcome is unknown to us and operators must hear about it.
pub(crate) async fn commit(tx: Transaction<'_, Postgres>) -> Result<(), LedgerError> {
    tx.commit().await.map_err(|e| {
        tracing::error!(error = %e, "Ledger transaction commit failed — outcome unknown");
        LedgerError::ConsistencyRisk(e.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_user() {
        let err = validate_credit("  ", 10, "bonus").unwrap_err();
        assert!(matches!(err, LedgerError::InvalidInput(_)));
    }

    #[test]
    fn rejects_zero_amount() {
        let err = validate_credit("u1", 0, "bonus").unwrap_err();
        assert!(matches!(err, LedgerError::InvalidInput(_)));
    }

    #[test]
    fn rejects_oversized_description() {
        let long = "x".repeat(MAX_DESCRIPTION_LEN + 1);
        let err = validate_credit("u1", 10, &long).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidInput(_)));
    }

    #[test]
    fn accepts_debit_amounts() {
        assert!(validate_credit("u1", -25, "gift").is_ok());
    }
}

//! Gift transfer controller — moves points from a user to a streamer's
//! accumulator. The debit and the accumulator credit run in one database
//! transaction: either both land or neither does, and a failure on the
//! streamer side hands the sender their points back by rollback.

use pointcast_core::LedgerError;
use pointcast_storage::models::PointKind;
use pointcast_storage::repos;
use sqlx::PgPool;

use crate::credit::{MAX_DESCRIPTION_LEN, commit, credit_in_tx, current_point, storage_err};

/// Result of a gift: both sides' totals after the transfer.
#[derive(Debug, Clone, serde::Serialize)]
pub struct GiftOutcome {
    pub user_after_balance: i64,
    pub streamer_after_total: i64,
}

/// Transfer `amount` points from a user to a streamer.
pub async fn gift_points(
    pool: &PgPool,
    from_user_id: &str,
    to_streamer_id: &str,
    amount: i64,
    note: &str,
) -> Result<GiftOutcome, LedgerError> {
    validate_gift(from_user_id, to_streamer_id, amount, note)?;

    // Pre-flight check for a friendly early rejection. Advisory only — the
    // guarded UPDATE inside the transaction is the binding enforcement.
    let balance = current_point(pool, from_user_id).await?;
    if balance < amount {
        return Err(LedgerError::InsufficientFunds(amount));
    }

    let mut tx = pool.begin().await.map_err(storage_err)?;

    let user_after_balance =
        credit_in_tx(&mut tx, from_user_id, -amount, PointKind::GiftSent, note).await?;

    let streamer_after_total = repos::add_to_streamer_total(&mut *tx, to_streamer_id, amount)
        .await
        .map_err(storage_err)?
        .ok_or_else(|| {
            // Dropping the transaction rolls the debit back with it.
            LedgerError::InvalidInput(format!("unknown streamer: {to_streamer_id}"))
        })?;

    commit(tx).await?;

    tracing::info!(
        from = from_user_id,
        to = to_streamer_id,
        amount = amount,
        "Gift transferred"
    );
    Ok(GiftOutcome {
        user_after_balance,
        streamer_after_total,
    })
}

fn validate_gift(
    from_user_id: &str,
    to_streamer_id: &str,
    amount: i64,
    note: &str,
) -> Result<(), LedgerError> {
    if from_user_id.trim().is_empty() {
        return Err(LedgerError::InvalidInput("sender id must not be empty".into()));
    }
    if to_streamer_id.trim().is_empty() {
        return Err(LedgerError::InvalidInput(
            "streamer id must not be empty".into(),
        ));
    }
    if from_user_id == to_streamer_id {
        return Err(LedgerError::InvalidInput(
            "cannot gift points to yourself".into(),
        ));
    }
    if amount <= 0 {
        return Err(LedgerError::InvalidInput(
            "gift amount must be a positive integer".into(),
        ));
    }
    if note.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(LedgerError::InvalidInput(format!(
            "note exceeds {MAX_DESCRIPTION_LEN} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_and_negative_amounts() {
        for amount in [0, -1, -100] {
            let err = validate_gift("u1", "s1", amount, "").unwrap_err();
            assert!(matches!(err, LedgerError::InvalidInput(_)), "{amount}");
        }
    }

    #[test]
    fn rejects_empty_ids() {
        assert!(validate_gift("", "s1", 10, "").is_err());
        assert!(validate_gift("u1", "  ", 10, "").is_err());
    }

    #[test]
    fn rejects_self_gift() {
        let err = validate_gift("u1", "u1", 10, "").unwrap_err();
        assert!(matches!(err, LedgerError::InvalidInput(_)));
    }

    #[test]
    fn rejects_oversized_note() {
        let long = "x".repeat(MAX_DESCRIPTION_LEN + 1);
        let err = validate_gift("u1", "s1", 10, &long).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidInput(_)));
    }

    #[test]
    fn accepts_a_plain_gift() {
        assert!(validate_gift("u1", "s1", 10, "great stream!").is_ok());
    }
}

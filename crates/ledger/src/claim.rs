//! Daily claim controller — "claim once per calendar day".
//!
//! Race safety comes from the primary key on (user_id, claim_date): two
//! simultaneous first claims both try the insert, the constraint picks one
//! winner, and the loser re-reads and adopts the winner's amount. Crediting
//! and the `credited_at` mark share one transaction, so a crash can only
//! leave the row uncredited — which the next call repairs.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use pointcast_core::{LedgerError, Settings};
use pointcast_storage::models::PointKind;
use pointcast_storage::repos;
use rand::Rng;
use sqlx::PgPool;

use crate::credit::{commit, credit_in_tx, current_point, storage_err};

/// Day boundaries are computed in JST (UTC+9), the service's home timezone,
/// so every user shares the same calendar day regardless of client locale.
const REFERENCE_UTC_OFFSET_SECS: i64 = 9 * 3600;

/// Description recorded on the history entry for a daily reward.
const DAILY_BONUS_DESCRIPTION: &str = "Daily login bonus";

/// Result of a claim. `already_claimed_today` marks the idempotent replay
/// case; the amount is always the one fixed at the first claim of the day.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ClaimOutcome {
    pub amount: i64,
    pub after_balance: i64,
    pub already_claimed_today: bool,
}

/// Claim today's reward for a user. Safe to call any number of times per day,
/// concurrently included: exactly one credit happens, and every call reports
/// the same amount.
pub async fn claim_daily_reward(
    pool: &PgPool,
    settings: &Settings,
    user_id: &str,
) -> Result<ClaimOutcome, LedgerError> {
    if user_id.trim().is_empty() {
        return Err(LedgerError::InvalidInput("user id must not be empty".into()));
    }

    let today = reference_date(Utc::now());

    // Optimistic insert; on conflict the winner's row is adopted as-is.
    let claim = match repos::get_daily_claim(pool, user_id, today)
        .await
        .map_err(storage_err)?
    {
        Some(claim) => claim,
        None => {
            let amount = draw_reward(settings.daily_reward_min, settings.daily_reward_max);
            let inserted = repos::insert_daily_claim(pool, user_id, today, amount)
                .await
                .map_err(storage_err)?;
            if !inserted {
                tracing::debug!(user = user_id, "Lost daily claim insert race, adopting winner");
            }
            repos::get_daily_claim(pool, user_id, today)
                .await
                .map_err(storage_err)?
                .ok_or_else(|| {
                    LedgerError::StorageUnavailable("daily claim row missing after insert".into())
                })?
        }
    };

    if claim.credited_at.is_some() {
        let after_balance = current_point(pool, user_id).await?;
        return Ok(ClaimOutcome {
            amount: claim.amount,
            after_balance,
            already_claimed_today: true,
        });
    }

    // Credit and mark in one transaction. The conditional mark takes the row
    // lock first: a concurrent call that loses it reports the idempotent
    // outcome instead of crediting twice.
    let mut tx = pool.begin().await.map_err(storage_err)?;
    let marked = repos::mark_claim_credited(&mut *tx, user_id, today)
        .await
        .map_err(storage_err)?;
    if !marked {
        tx.rollback().await.map_err(storage_err)?;
        let after_balance = current_point(pool, user_id).await?;
        return Ok(ClaimOutcome {
            amount: claim.amount,
            after_balance,
            already_claimed_today: true,
        });
    }

    let after_balance = credit_in_tx(
        &mut tx,
        user_id,
        claim.amount,
        PointKind::DailyBonus,
        DAILY_BONUS_DESCRIPTION,
    )
    .await?;
    commit(tx).await?;

    tracing::info!(
        user = user_id,
        amount = claim.amount,
        after = after_balance,
        "Daily reward credited"
    );
    Ok(ClaimOutcome {
        amount: claim.amount,
        after_balance,
        already_claimed_today: false,
    })
}

/// "Today" in the fixed reference timezone.
fn reference_date(now: DateTime<Utc>) -> NaiveDate {
    (now + Duration::seconds(REFERENCE_UTC_OFFSET_SECS)).date_naive()
}

/// Uniform-random reward in the inclusive configured range.
fn draw_reward(min: i64, max: i64) -> i64 {
    rand::rng().random_range(min..=max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn reference_day_rolls_over_at_jst_midnight() {
        // 14:59 UTC is 23:59 JST — still the same day.
        let before = Utc.with_ymd_and_hms(2026, 8, 6, 14, 59, 0).unwrap();
        assert_eq!(
            reference_date(before),
            NaiveDate::from_ymd_opt(2026, 8, 6).unwrap()
        );

        // 15:00 UTC is 00:00 JST — the next day for every user at once.
        let after = Utc.with_ymd_and_hms(2026, 8, 6, 15, 0, 0).unwrap();
        assert_eq!(
            reference_date(after),
            NaiveDate::from_ymd_opt(2026, 8, 7).unwrap()
        );
    }

    #[test]
    fn reward_stays_in_bounds() {
        for _ in 0..1000 {
            let drawn = draw_reward(1, 50);
            assert!((1..=50).contains(&drawn));
        }
    }

    #[test]
    fn degenerate_range_is_fixed() {
        assert_eq!(draw_reward(7, 7), 7);
    }
}

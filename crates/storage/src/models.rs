use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ─── PointKind ──────────────────────────────────────────────────────────────

/// Category tag on a history entry, stored as TEXT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PointKind {
    /// Once-per-day login reward.
    DailyBonus,
    /// Points gifted away to a streamer (the debit side).
    GiftSent,
    /// Operator-issued grant or adjustment.
    Grant,
}

impl PointKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PointKind::DailyBonus => "daily_bonus",
            PointKind::GiftSent => "gift_sent",
            PointKind::Grant => "grant",
        }
    }
}

// ─── Balance ────────────────────────────────────────────────────────────────

/// Current point balance for one user. Created lazily on first credit.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Balance {
    pub user_id: String,
    pub point: i64,
    pub updated_at: NaiveDateTime,
}

// ─── HistoryEntry ───────────────────────────────────────────────────────────

/// An immutable ledger line recording one balance change.
///
/// `after_point` is the balance snapshot immediately after this entry;
/// summing `amount` over a user's entries always reproduces their balance.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct HistoryEntry {
    pub id: i64,
    pub user_id: String,
    pub amount: i64,
    pub kind: PointKind,
    pub description: String,
    pub after_point: i64,
    pub created_at: NaiveDateTime,
}

// ─── DailyClaim ─────────────────────────────────────────────────────────────

/// One row per (user, calendar day). The primary key on that pair is the
/// concurrency-safety primitive: two simultaneous first claims race on the
/// insert and the constraint picks a single winner amount.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DailyClaim {
    pub user_id: String,
    pub claim_date: NaiveDate,
    pub amount: i64,
    /// Null until the crediting step completes; set exactly once.
    pub credited_at: Option<NaiveDateTime>,
}

// ─── StreamerTotal ──────────────────────────────────────────────────────────

/// Running total of points a streamer has received via gifts.
/// Row lifecycle is owned by the streamer directory; the ledger only adds.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StreamerTotal {
    pub streamer_id: String,
    pub total: i64,
    pub updated_at: NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_kind_text_form() {
        assert_eq!(PointKind::DailyBonus.as_str(), "daily_bonus");
        assert_eq!(PointKind::GiftSent.as_str(), "gift_sent");
        assert_eq!(PointKind::Grant.as_str(), "grant");
    }

    #[test]
    fn point_kind_serde_roundtrip() {
        for kind in [PointKind::DailyBonus, PointKind::GiftSent, PointKind::Grant] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json.trim_matches('"'), kind.as_str());
            let back: PointKind = serde_json::from_str(&json).unwrap();
            assert_eq!(back, kind);
        }
    }
}

use thiserror::Error;

/// Shared error type used across all Pointcast crates.
///
/// "Already claimed today" is deliberately absent: a repeated daily claim is a
/// successful idempotent outcome, reported via the claim result, not an error.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Malformed amount, id, or note — rejected before any storage call.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A debit would take the balance below zero.
    #[error("insufficient funds to debit {0} points")]
    InsufficientFunds(i64),

    /// Transient storage failure; no partial state was committed.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A commit failed after its statements succeeded — outcome unknown.
    /// Must be logged for operators; never shown verbatim to end users.
    #[error("consistency risk: {0}")]
    ConsistencyRisk(String),
}

impl LedgerError {
    /// True for errors whose message is safe to show to the end user.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            LedgerError::InvalidInput(_) | LedgerError::InsufficientFunds(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_facing_split() {
        assert!(LedgerError::InvalidInput("bad amount".into()).is_user_facing());
        assert!(LedgerError::InsufficientFunds(10).is_user_facing());
        assert!(!LedgerError::StorageUnavailable("pool timeout".into()).is_user_facing());
        assert!(!LedgerError::ConsistencyRisk("commit failed".into()).is_user_facing());
    }

    #[test]
    fn messages_name_the_amount() {
        let e = LedgerError::InsufficientFunds(500);
        assert_eq!(e.to_string(), "insufficient funds to debit 500 points");
    }
}

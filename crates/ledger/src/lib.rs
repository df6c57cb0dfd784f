pub mod claim;
pub mod credit;
pub mod gift;
pub mod guard;

pub use claim::{ClaimOutcome, claim_daily_reward};
pub use credit::{CreditOutcome, credit_points};
pub use gift::{GiftOutcome, gift_points};
pub use guard::{MemoryLockStore, SubmitGuard, SubmitLock};

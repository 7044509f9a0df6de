use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Cents, UserId};

pub type TransferId = Uuid;

/// Snapshot returned to the caller after a transfer commits.
/// Receipts are not persisted: the only lasting effect of a transfer is the
/// two balance mutations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub id: TransferId,
    pub sender: UserId,
    pub recipient: UserId,
    /// Amount in cents (always positive)
    pub amount: Cents,
    /// Sender balance right after the commit
    pub sender_balance: Cents,
    /// Recipient balance right after the commit
    pub recipient_balance: Cents,
    /// Number of commit attempts, 1 when there was no contention
    pub attempts: u32,
    pub completed_at: DateTime<Utc>,
}

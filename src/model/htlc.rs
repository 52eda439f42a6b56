use super::ids::{Address, ChainId, HtlcAddress, OrderId, TokenId};
use crate::{money::Amount, secret::HashedSecret};
use chrono::{DateTime, Utc};

/// spec §3 "HTLC" status lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HtlcStatus {
    Active,
    Claimed,
    Refunded,
    Expired,
}

#[derive(Debug, Clone)]
pub struct Htlc {
    pub address: HtlcAddress,
    pub order_id: OrderId,
    pub hashed_secret: HashedSecret,
    pub amount: Amount,
    pub token: TokenId,
    pub sender: Address,
    pub receiver: Address,
    pub height_timeout: u64,
    pub time_timeout: DateTime<Utc>,
    pub status: HtlcStatus,
    pub chain_id: ChainId,
    pub created_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub revealed_secret: Option<crate::secret::Secret>,
}

impl Htlc {
    /// Whether `current_height`/`now` push this still-active HTLC past its
    /// timeout (spec §4.6 `{active HTLC} -> refunded`).
    pub fn is_timed_out(&self, current_height: u64, now: DateTime<Utc>) -> bool {
        self.status == HtlcStatus::Active
            && (current_height >= self.height_timeout || now >= self.time_timeout)
    }
}

use super::ids::{Address, ChainId, OrderId, TokenId};
use crate::{
    money::{Amount, Price},
    secret::HashedSecret,
};
use chrono::{DateTime, Utc};

/// spec §4.6 — order state machine. `PartiallyFilled` is a projection-only
/// constant (see DESIGN.md Open Question): the engine never persists it,
/// consumers derive it from `0 < executed_amount < source_amount`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderStatus {
    Pending,
    Executing,
    PartiallyFilled,
    Completed,
    Cancelled,
    Expired,
    Refunded,
    Claimed,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Completed
                | OrderStatus::Cancelled
                | OrderStatus::Expired
                | OrderStatus::Refunded
                | OrderStatus::Claimed
        )
    }

    /// Whether the scheduler may still consider this order for execution
    /// (spec §4.4 "executable order predicate").
    pub fn is_schedulable(self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Executing)
    }
}

/// The TWAP plan chosen at order creation (spec §3 "TWAP plan").
#[derive(Debug, Clone, Copy)]
pub struct TwapPlan {
    /// W, minutes, in [5, 1440].
    pub window_minutes: u32,
    /// K, in [2, 20].
    pub interval_count: u32,
    /// S, basis points, in [1, 1000].
    pub max_slippage_bps: u32,
    /// M, minimum fill size.
    pub min_fill: Amount,
    pub mev_protection: bool,
}

impl TwapPlan {
    pub fn validate(&self) -> crate::error::Result<()> {
        if !(5..=1440).contains(&self.window_minutes) {
            return Err(crate::error::Error::validation(format!(
                "window_minutes {} out of range [5, 1440]",
                self.window_minutes
            )));
        }
        if !(2..=20).contains(&self.interval_count) {
            return Err(crate::error::Error::validation(format!(
                "interval_count {} out of range [2, 20]",
                self.interval_count
            )));
        }
        if !(1..=1000).contains(&self.max_slippage_bps) {
            return Err(crate::error::Error::validation(format!(
                "max_slippage_bps {} out of range [1, 1000]",
                self.max_slippage_bps
            )));
        }
        if self.min_fill.is_zero() {
            return Err(crate::error::Error::validation("min_fill must be > 0"));
        }
        Ok(())
    }

    /// `interval_duration = (W*60)/K` seconds (spec §4.4).
    pub fn interval_duration_secs(&self) -> u64 {
        (self.window_minutes as u64 * 60) / self.interval_count as u64
    }
}

/// HTLC timeout terms captured at order creation (spec §3 "HTLC").
#[derive(Debug, Clone, Copy)]
pub struct HtlcTerms {
    pub hashed_secret: HashedSecret,
    /// H: block-height timeout on the source chain.
    pub height_timeout: u64,
    /// T: wall-clock timeout, seconds since epoch.
    pub time_timeout: DateTime<Utc>,
}

/// Minimum buffer (in blocks) required between order creation and
/// `height_timeout`, per spec §8 boundary behaviours ("reference: 100
/// blocks").
pub const MIN_TIMEOUT_HEIGHT_BUFFER: u64 = 100;

#[derive(Debug, Clone)]
pub struct Order {
    pub id: OrderId,
    pub user: Address,
    pub recipient: Address,

    pub source_chain: ChainId,
    pub source_token: TokenId,
    pub source_amount: Amount,

    pub target_chain: ChainId,
    pub target_token: TokenId,
    pub min_received: Amount,

    pub plan: TwapPlan,
    pub htlc: HtlcTerms,

    pub executed_amount: Amount,
    pub last_execution_at: Option<DateTime<Utc>>,
    pub average_price: Price,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Set when a post-trade slippage breach (spec §4.4) pauses further
    /// intervals pending operator review.
    pub paused_for_review: bool,

    /// Optimistic concurrency token bumped on every mutation (spec §4.4
    /// "serialisable... optimistic updated_at or equivalent version check").
    pub version: u64,
}

impl Order {
    pub fn new(
        id: OrderId,
        user: Address,
        recipient: Address,
        source_chain: ChainId,
        source_token: TokenId,
        source_amount: Amount,
        target_chain: ChainId,
        target_token: TokenId,
        min_received: Amount,
        plan: TwapPlan,
        htlc: HtlcTerms,
        current_height: u64,
        now: DateTime<Utc>,
    ) -> crate::error::Result<Self> {
        plan.validate()?;
        if source_amount.is_zero() {
            return Err(crate::error::Error::validation("source_amount must be > 0"));
        }
        if htlc.height_timeout < current_height + MIN_TIMEOUT_HEIGHT_BUFFER {
            return Err(crate::error::Error::validation(format!(
                "height_timeout {} must be at least {} blocks past current height {}",
                htlc.height_timeout, MIN_TIMEOUT_HEIGHT_BUFFER, current_height
            )));
        }
        Ok(Self {
            id,
            user,
            recipient,
            source_chain,
            source_token,
            source_amount,
            target_chain,
            target_token,
            min_received,
            plan,
            htlc,
            executed_amount: Amount::ZERO,
            last_execution_at: None,
            average_price: Price::ZERO,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
            paused_for_review: false,
            version: 0,
        })
    }

    /// Derived display-only projection (spec §4.6, §9 Open Question).
    pub fn display_status(&self) -> OrderStatus {
        if self.status == OrderStatus::Executing
            && !self.executed_amount.is_zero()
            && self.executed_amount < to_u128_lossy(self.source_amount)
        {
            return OrderStatus::PartiallyFilled;
        }
        self.status
    }

    pub fn remaining(&self) -> crate::error::Result<Amount> {
        self.source_amount
            .checked_sub(self.executed_amount)
            .ok_or_else(|| crate::error::Error::internal("executed_amount exceeds source_amount"))
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.htlc.time_timeout
    }
}

/// Helper used only by `display_status`'s partial-order comparison; exists
/// because `Amount`'s `PartialOrd<u128>` only handles values that fit in a
/// u128, which every practical `source_amount` does, but we fall back to a
/// full `Amount` comparison to stay correct for the 256-bit edge case.
fn to_u128_lossy(amount: Amount) -> u128 {
    // Only used as an upper bound for the `<` check in `display_status`;
    // if it doesn't fit in a u128 the comparison below degrades to "not
    // partially filled", which is acceptable for a display-only projection.
    amount.0.try_into().unwrap_or(u128::MAX)
}

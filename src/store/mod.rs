//! Order Store interface (spec §4, §6, §8 — component C5). A black box
//! whose methods may suspend (spec §5 "core code treats the Store as a
//! black box"); the engine and orchestrator only hold transient working
//! copies, never references into the Store's internal state.

pub mod memory;

use crate::model::{
    Address, ChainId, ChainStatus, ExecutionRecord, Htlc, HtlcAddress, Order, OrderId, PricePoint,
    TokenPair,
};
use crate::secret::Secret;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};

pub use memory::InMemoryStore;

/// CRUD + the serialisable, optimistically-versioned order update the
/// TWAP Engine relies on (spec §4.4 "State mutation (transactional)").
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_order(&self, order: Order) -> crate::error::Result<()>;
    async fn get_order(&self, id: &OrderId) -> crate::error::Result<Order>;

    /// Replaces the stored order with `updated` iff its current version
    /// equals `expected_version`; otherwise returns `Conflict`. The
    /// replacement's `version` is the caller's job to bump (see
    /// [`Order::version`]) — the Store only enforces the compare half of
    /// compare-and-swap (spec §4.4 "optimistic updated_at or equivalent
    /// version check is sufficient").
    async fn cas_update_order(
        &self,
        id: &OrderId,
        expected_version: u64,
        updated: Order,
    ) -> crate::error::Result<Order>;

    /// Orders with status in {pending, executing}; the engine applies the
    /// remaining executable-order predicate (height/timing) itself since
    /// it alone knows current chain heights (spec §4.4).
    async fn list_schedulable_orders(&self) -> crate::error::Result<Vec<Order>>;

    /// Orders in {pending, executing} whose `time_timeout` has passed, for
    /// the orchestrator's timeout monitor (spec §4.7).
    async fn orders_timing_out(&self, now: DateTime<Utc>) -> crate::error::Result<Vec<Order>>;

    async fn orders_by_user(&self, user: &Address) -> crate::error::Result<Vec<Order>>;

    async fn insert_execution_record(&self, record: ExecutionRecord) -> crate::error::Result<()>;
    async fn execution_records_for_order(
        &self,
        order_id: &OrderId,
    ) -> crate::error::Result<Vec<ExecutionRecord>>;

    /// Inserts `htlc` iff no HTLC exists at that address yet. Returns
    /// `false` (no-op) if one already did — this is the idempotency the
    /// `HTLCCreated` handler relies on (spec §8).
    async fn upsert_htlc(&self, htlc: Htlc) -> crate::error::Result<bool>;
    async fn get_htlc(&self, address: &HtlcAddress) -> crate::error::Result<Htlc>;
    async fn htlcs_for_order(&self, order_id: &OrderId) -> crate::error::Result<Vec<Htlc>>;

    /// All HTLCs currently `active`, across every order — feeds the
    /// orchestrator's proactive timeout-refund sweep (spec §4.6).
    async fn active_htlcs(&self) -> crate::error::Result<Vec<Htlc>>;

    /// Transitions an `active` HTLC to `claimed`, recording `secret`.
    /// Returns `false` (no-op) if the HTLC was already claimed — the
    /// idempotency the `HTLCClaimed` handler relies on (spec §8).
    async fn mark_htlc_claimed(
        &self,
        address: &HtlcAddress,
        secret: Secret,
        claimed_at: DateTime<Utc>,
    ) -> crate::error::Result<bool>;

    /// Transitions an `active` HTLC to `refunded`. Returns `false` (no-op)
    /// if it wasn't active.
    async fn mark_htlc_refunded(&self, address: &HtlcAddress) -> crate::error::Result<bool>;

    async fn insert_price_point(
        &self,
        pair: TokenPair,
        point: PricePoint,
    ) -> crate::error::Result<()>;
    async fn price_points_since(
        &self,
        pair: &TokenPair,
        window: ChronoDuration,
        now: DateTime<Utc>,
    ) -> crate::error::Result<Vec<PricePoint>>;

    async fn upsert_chain_status(&self, status: ChainStatus) -> crate::error::Result<()>;
    async fn get_chain_status(&self, chain_id: &ChainId) -> crate::error::Result<ChainStatus>;
}

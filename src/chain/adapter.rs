//! Chain Adapter capability interface (spec §4.3 — component C3).
//!
//! One trait object per chain; `AdapterRegistry` (see
//! [`super::registry`]) owns the set. A single `#[async_trait]` surface
//! that downstream chain-specific crates implement, with the core
//! depending only on the trait.

use crate::model::{Address, ChainId, HtlcAddress, OrderId, TokenId};
use crate::money::{Amount, Price};
use crate::secret::{HashedSecret, Secret};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Map as JsonMap;
use tokio::sync::mpsc;

/// Event types the core recognises (spec §4.3). Adapters may emit other
/// `event_type` strings; the core logs and ignores them (`Unknown`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEventKind {
    OrderCreated,
    OrderExecuted,
    OrderCompleted,
    OrderCancelled,
    HtlcCreated,
    HtlcClaimed,
    HtlcRefunded,
    PriceUpdate,
    BlockCreated,
    Unknown(String),
}

impl ChainEventKind {
    pub fn from_wire(kind: &str) -> Self {
        match kind {
            "order_created" => Self::OrderCreated,
            "order_executed" => Self::OrderExecuted,
            "order_completed" => Self::OrderCompleted,
            "order_cancelled" => Self::OrderCancelled,
            "htlc_created" => Self::HtlcCreated,
            "htlc_claimed" => Self::HtlcClaimed,
            "htlc_refunded" => Self::HtlcRefunded,
            "price_update" => Self::PriceUpdate,
            "block_created" => Self::BlockCreated,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// Event data dictionary (spec §6 "Event shapes"): known keys are surfaced
/// as typed fields, everything else is retained in `extra` so that
/// forward-compatible adapters can add keys without breaking the core
/// (spec §6 "Implementations must accept and ignore unknown keys").
#[derive(Debug, Clone, Default)]
pub struct ChainEventData {
    pub order_id: Option<OrderId>,
    pub htlc_address: Option<HtlcAddress>,
    pub hashed_secret: Option<HashedSecret>,
    pub secret: Option<Secret>,
    pub extra: JsonMap<String, serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct ChainEvent {
    pub chain_id: ChainId,
    pub kind: ChainEventKind,
    pub block_number: u64,
    pub tx_hash: Option<crate::model::TxHash>,
    pub timestamp: DateTime<Utc>,
    pub data: ChainEventData,
}

pub struct CreateTwapOrderParams {
    pub order_id: OrderId,
    pub token: TokenId,
    pub amount: Amount,
    pub recipient: Address,
}

pub struct ExecuteTwapIntervalParams {
    pub order_id: OrderId,
    pub interval_number: u32,
    pub target_amount: Amount,
    pub max_slippage_bps: u32,
    pub price_hint: Price,
}

/// Result of a single interval execution (spec §4.4 "successful return
/// yields (executed_amount, execution_price, tx_hash, gas_used)").
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub executed_amount: Amount,
    pub execution_price: Price,
    pub tx_hash: crate::model::TxHash,
    pub gas_used: u64,
}

pub struct CreateHtlcParams {
    pub order_id: OrderId,
    pub hashed_secret: HashedSecret,
    pub amount: Amount,
    pub token: TokenId,
    pub sender: Address,
    pub receiver: Address,
    pub height_timeout: u64,
    pub time_timeout: DateTime<Utc>,
}

#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn chain_id(&self) -> ChainId;

    // Lifecycle.
    async fn connect(&self) -> crate::error::Result<()>;
    async fn disconnect(&self) -> crate::error::Result<()>;
    async fn is_connected(&self) -> bool;

    // Identity.
    async fn address(&self) -> crate::error::Result<Address>;
    async fn balance(&self, token: &TokenId) -> crate::error::Result<Amount>;

    // TWAP plane.
    async fn create_twap_order(
        &self,
        params: CreateTwapOrderParams,
    ) -> crate::error::Result<Address>;
    async fn execute_twap_interval(
        &self,
        params: ExecuteTwapIntervalParams,
    ) -> crate::error::Result<ExecutionOutcome>;
    async fn cancel_order(&self, order_id: &OrderId) -> crate::error::Result<()>;

    // HTLC plane.
    async fn create_htlc(&self, params: CreateHtlcParams) -> crate::error::Result<HtlcAddress>;
    async fn claim_htlc(
        &self,
        address: &HtlcAddress,
        secret: &Secret,
    ) -> crate::error::Result<()>;
    async fn refund_htlc(&self, address: &HtlcAddress) -> crate::error::Result<()>;
    async fn htlc_status(
        &self,
        address: &HtlcAddress,
    ) -> crate::error::Result<crate::model::HtlcStatus>;

    // Price plane (optional — only chains with a native on-chain oracle
    // implement these; the default delegates to the Price Feed Aggregator
    // by reporting unavailability).
    async fn current_price(&self, _pair: &crate::model::TokenPair) -> crate::error::Result<Price> {
        Err(crate::error::Error::PriceUnavailable(
            "adapter has no native price oracle".into(),
        ))
    }
    async fn twap_price(
        &self,
        _pair: &crate::model::TokenPair,
        _window_minutes: u32,
    ) -> crate::error::Result<Price> {
        Err(crate::error::Error::PriceUnavailable(
            "adapter has no native price oracle".into(),
        ))
    }

    // Event plane.
    async fn subscribe(&self, sink: mpsc::Sender<ChainEvent>) -> crate::error::Result<()>;
    async fn unsubscribe(&self) -> crate::error::Result<()>;

    // Chain status, reported for the orchestrator's health view.
    async fn status(&self) -> crate::error::Result<crate::model::ChainStatus>;
}

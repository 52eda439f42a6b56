use super::ids::{ChainId, OrderId, TxHash};
use crate::money::{Amount, Price};
use chrono::{DateTime, Utc};

/// One completed TWAP interval execution against an order (spec §4.4 step
/// "record interval result").
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub order_id: OrderId,
    pub interval_index: u32,
    pub chain_id: ChainId,
    pub tx_hash: TxHash,
    pub amount: Amount,
    pub price: Price,
    pub slippage_bps: u32,
    pub executed_at: DateTime<Utc>,
}

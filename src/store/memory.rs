//! Reference in-memory `Store` (durable persistence is out of scope —
//! spec §1 Non-goals). Used by tests and as a template for a real
//! implementation backed by, e.g., `sqlx` against the tables spec §6
//! names (`orders`, `execution_history`, `htlcs`, `price_points`,
//! `chain_status`).

use super::Store;
use crate::model::{
    Address, ChainId, ChainStatus, ExecutionRecord, Htlc, HtlcAddress, HtlcStatus, Order, OrderId,
    OrderStatus, PricePoint, TokenPair,
};
use crate::secret::Secret;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
struct Inner {
    orders: HashMap<OrderId, Order>,
    execution_records: HashMap<OrderId, Vec<ExecutionRecord>>,
    htlcs: HashMap<HtlcAddress, Htlc>,
    price_points: HashMap<TokenPair, Vec<PricePoint>>,
    chain_status: HashMap<ChainId, ChainStatus>,
}

#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn create_order(&self, order: Order) -> crate::error::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.orders.contains_key(&order.id) {
            return Err(crate::error::Error::conflict(format!(
                "order {} already exists",
                order.id
            )));
        }
        inner.orders.insert(order.id.clone(), order);
        Ok(())
    }

    async fn get_order(&self, id: &OrderId) -> crate::error::Result<Order> {
        let inner = self.inner.lock().unwrap();
        inner
            .orders
            .get(id)
            .cloned()
            .ok_or_else(|| crate::error::Error::not_found(format!("order {id} not found")))
    }

    async fn cas_update_order(
        &self,
        id: &OrderId,
        expected_version: u64,
        updated: Order,
    ) -> crate::error::Result<Order> {
        let mut inner = self.inner.lock().unwrap();
        let current = inner
            .orders
            .get(id)
            .ok_or_else(|| crate::error::Error::not_found(format!("order {id} not found")))?;
        if current.version != expected_version {
            return Err(crate::error::Error::conflict(format!(
                "order {id} version mismatch: expected {expected_version}, found {}",
                current.version
            )));
        }
        // `completed -> claimed` is the one allowed transition out of a
        // terminal state (spec §4.6): the HTLC claim handler runs after
        // the TWAP Engine has already completed the order.
        let completed_to_claimed =
            current.status == OrderStatus::Completed && updated.status == OrderStatus::Claimed;
        if current.status.is_terminal() && !completed_to_claimed {
            return Err(crate::error::Error::conflict(format!(
                "order {id} is in terminal state {:?}",
                current.status
            )));
        }
        inner.orders.insert(id.clone(), updated.clone());
        Ok(updated)
    }

    async fn list_schedulable_orders(&self) -> crate::error::Result<Vec<Order>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .orders
            .values()
            .filter(|o| o.status.is_schedulable())
            .cloned()
            .collect())
    }

    async fn orders_timing_out(&self, now: DateTime<Utc>) -> crate::error::Result<Vec<Order>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .orders
            .values()
            .filter(|o| o.status.is_schedulable() && o.is_expired(now))
            .cloned()
            .collect())
    }

    async fn orders_by_user(&self, user: &Address) -> crate::error::Result<Vec<Order>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .orders
            .values()
            .filter(|o| &o.user == user)
            .cloned()
            .collect())
    }

    async fn insert_execution_record(&self, record: ExecutionRecord) -> crate::error::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .execution_records
            .entry(record.order_id.clone())
            .or_default()
            .push(record);
        Ok(())
    }

    async fn execution_records_for_order(
        &self,
        order_id: &OrderId,
    ) -> crate::error::Result<Vec<ExecutionRecord>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .execution_records
            .get(order_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn upsert_htlc(&self, htlc: Htlc) -> crate::error::Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        if inner.htlcs.contains_key(&htlc.address) {
            return Ok(false);
        }
        inner.htlcs.insert(htlc.address.clone(), htlc);
        Ok(true)
    }

    async fn get_htlc(&self, address: &HtlcAddress) -> crate::error::Result<Htlc> {
        let inner = self.inner.lock().unwrap();
        inner
            .htlcs
            .get(address)
            .cloned()
            .ok_or_else(|| crate::error::Error::not_found(format!("htlc {address} not found")))
    }

    async fn htlcs_for_order(&self, order_id: &OrderId) -> crate::error::Result<Vec<Htlc>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .htlcs
            .values()
            .filter(|h| &h.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn active_htlcs(&self) -> crate::error::Result<Vec<Htlc>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .htlcs
            .values()
            .filter(|h| h.status == HtlcStatus::Active)
            .cloned()
            .collect())
    }

    async fn mark_htlc_claimed(
        &self,
        address: &HtlcAddress,
        secret: Secret,
        claimed_at: DateTime<Utc>,
    ) -> crate::error::Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        let htlc = inner
            .htlcs
            .get_mut(address)
            .ok_or_else(|| crate::error::Error::not_found(format!("htlc {address} not found")))?;
        if htlc.status != HtlcStatus::Active {
            return Ok(false);
        }
        htlc.status = HtlcStatus::Claimed;
        htlc.claimed_at = Some(claimed_at);
        htlc.revealed_secret = Some(secret);
        Ok(true)
    }

    async fn mark_htlc_refunded(&self, address: &HtlcAddress) -> crate::error::Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        let htlc = inner
            .htlcs
            .get_mut(address)
            .ok_or_else(|| crate::error::Error::not_found(format!("htlc {address} not found")))?;
        if htlc.status != HtlcStatus::Active {
            return Ok(false);
        }
        htlc.status = HtlcStatus::Refunded;
        Ok(true)
    }

    async fn insert_price_point(
        &self,
        pair: TokenPair,
        point: PricePoint,
    ) -> crate::error::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.price_points.entry(pair).or_default().push(point);
        Ok(())
    }

    async fn price_points_since(
        &self,
        pair: &TokenPair,
        window: ChronoDuration,
        now: DateTime<Utc>,
    ) -> crate::error::Result<Vec<PricePoint>> {
        let inner = self.inner.lock().unwrap();
        let cutoff = now - window;
        Ok(inner
            .price_points
            .get(pair)
            .map(|points| {
                points
                    .iter()
                    .filter(|p| p.timestamp >= cutoff)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn upsert_chain_status(&self, status: ChainStatus) -> crate::error::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.chain_status.insert(status.chain_id.clone(), status);
        Ok(())
    }

    async fn get_chain_status(&self, chain_id: &ChainId) -> crate::error::Result<ChainStatus> {
        let inner = self.inner.lock().unwrap();
        inner
            .chain_status
            .get(chain_id)
            .cloned()
            .ok_or_else(|| crate::error::Error::not_found(format!("chain status for {chain_id}")))
    }
}

//! Orchestrator (spec §4.7 — component C7): top-level supervisor. Owns
//! the Adapter Registry, routes chain events to handlers, drives HTLC and
//! timeout transitions, aggregates statistics.

use crate::chain::{AdapterRegistry, ChainEvent, ChainEventKind, CreateHtlcParams};
use crate::model::{Htlc, HtlcStatus, Order, OrderStatus};
use crate::statistics::{Statistics, StatisticsSnapshot};
use crate::store::Store;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Timeout monitor tick (spec §4.7 "every 60s").
pub const TIMEOUT_MONITOR_INTERVAL: Duration = Duration::from_secs(60);

/// Event sink buffer per adapter subscription.
pub const EVENT_SINK_CAPACITY: usize = 256;

pub struct Orchestrator {
    registry: Arc<AdapterRegistry>,
    store: Arc<dyn Store>,
    statistics: Arc<Statistics>,
}

impl Orchestrator {
    pub fn new(registry: Arc<AdapterRegistry>, store: Arc<dyn Store>) -> Self {
        Self {
            registry,
            store,
            statistics: Arc::new(Statistics::new()),
        }
    }

    pub fn statistics(&self) -> StatisticsSnapshot {
        self.statistics.snapshot()
    }

    /// Shares this orchestrator's `Statistics` instance with other
    /// components (e.g. the TWAP Engine) so counters are aggregated in one
    /// place (spec §4.7 "Statistics").
    pub fn statistics_handle(&self) -> Arc<Statistics> {
        Arc::clone(&self.statistics)
    }

    /// Connects every adapter and registers one event sink per chain,
    /// multiplexed into a single channel dispatched by `event_loop` (spec
    /// §4.7 "registers a single event sink delegating by event_type").
    pub async fn start(self: &Arc<Self>, stop: watch::Receiver<bool>) -> Vec<tokio::task::JoinHandle<()>> {
        self.registry.connect_all().await;

        let (tx, rx) = mpsc::channel(EVENT_SINK_CAPACITY);
        for chain_id in self.registry.chain_ids() {
            if let Ok(adapter) = self.registry.get(&chain_id) {
                if let Err(err) = adapter.subscribe(tx.clone()).await {
                    warn!(%chain_id, %err, "failed to subscribe to chain events");
                }
            }
        }
        drop(tx);

        let event_loop = {
            let orchestrator = Arc::clone(self);
            tokio::spawn(async move { orchestrator.event_loop(rx).await })
        };
        let timeout_monitor = {
            let orchestrator = Arc::clone(self);
            let mut stop = stop.clone();
            tokio::spawn(async move { orchestrator.timeout_monitor_loop(&mut stop).await })
        };
        vec![event_loop, timeout_monitor]
    }

    pub async fn stop(&self) {
        for chain_id in self.registry.chain_ids() {
            if let Ok(adapter) = self.registry.get(&chain_id) {
                if let Err(err) = adapter.unsubscribe().await {
                    warn!(%chain_id, %err, "failed to unsubscribe cleanly");
                }
            }
        }
        self.registry.disconnect_all().await;
    }

    async fn event_loop(&self, mut events: mpsc::Receiver<ChainEvent>) {
        while let Some(event) = events.recv().await {
            if let Err(err) = self.dispatch(event.clone()).await {
                warn!(chain_id = %event.chain_id, kind = ?event.kind, %err, "event handler failed");
            }
        }
    }

    async fn timeout_monitor_loop(&self, stop: &mut watch::Receiver<bool>) {
        let mut tick = tokio::time::interval(TIMEOUT_MONITOR_INTERVAL);
        loop {
            tokio::select! {
                _ = stop.changed() => {
                    if *stop.borrow() {
                        break;
                    }
                }
                _ = tick.tick() => {
                    self.sweep_timeouts().await;
                    self.sweep_htlc_timeouts().await;
                }
            }
        }
    }

    /// Runs one timeout-monitor pass immediately, outside the 60s tick —
    /// used by tests and by an operator-triggered manual sweep.
    pub async fn run_timeout_sweep_once(&self) {
        self.sweep_timeouts().await;
        self.sweep_htlc_timeouts().await;
    }

    /// Proactively refunds `active` HTLCs past their timeout (spec §4.6
    /// `{active HTLC} -> refunded`), rather than waiting for a chain
    /// `HTLCRefunded` event that may never arrive — e.g. a source HTLC
    /// whose paired target HTLC failed to create (see
    /// `create_cross_chain_htlc_pair`).
    async fn sweep_htlc_timeouts(&self) {
        let htlcs = match self.store.active_htlcs().await {
            Ok(htlcs) => htlcs,
            Err(err) => {
                warn!(%err, "failed to list active htlcs");
                return;
            }
        };
        let now = Utc::now();
        for htlc in htlcs {
            let adapter = match self.registry.get(&htlc.chain_id) {
                Ok(adapter) => adapter,
                Err(err) => {
                    warn!(%err, chain_id = %htlc.chain_id, "no adapter for htlc's chain, cannot sweep");
                    continue;
                }
            };
            let current_height = match adapter.status().await {
                Ok(status) => status.last_block_height,
                Err(err) => {
                    warn!(%err, chain_id = %htlc.chain_id, "failed to read chain status for htlc sweep");
                    continue;
                }
            };
            if !htlc.is_timed_out(current_height, now) {
                continue;
            }
            if let Err(err) = adapter.refund_htlc(&htlc.address).await {
                warn!(%err, address = %htlc.address, "failed to submit htlc refund");
                continue;
            }
            if let Err(err) = self.finalize_htlc_refund(&htlc.address, &htlc.order_id, now).await {
                warn!(%err, address = %htlc.address, "failed to record htlc refund");
            }
        }
    }

    /// Marks `address` refunded and, if its order isn't already terminal,
    /// transitions it to `refunded` too. Shared by the reactive
    /// `HTLCRefunded` event handler and the proactive timeout sweep.
    async fn finalize_htlc_refund(
        &self,
        address: &crate::model::HtlcAddress,
        order_id: &crate::model::OrderId,
        now: chrono::DateTime<Utc>,
    ) -> crate::error::Result<()> {
        let refunded = self.store.mark_htlc_refunded(address).await?;
        if !refunded {
            debug!(%address, "htlc refund replay ignored");
            return Ok(());
        }
        let order = self.store.get_order(order_id).await?;
        if !order.status.is_terminal() {
            let expected_version = order.version;
            let mut updated = order.clone();
            updated.status = OrderStatus::Refunded;
            updated.updated_at = now;
            updated.version = expected_version + 1;
            self.store
                .cas_update_order(order_id, expected_version, updated)
                .await?;
            self.statistics.record_order_failed();
        }
        Ok(())
    }

    async fn sweep_timeouts(&self) {
        let now = Utc::now();
        let orders = match self.store.orders_timing_out(now).await {
            Ok(orders) => orders,
            Err(err) => {
                warn!(%err, "failed to list timing-out orders");
                return;
            }
        };
        for order in orders {
            if let Err(err) = self.expire_order(order, now).await {
                warn!(%err, "failed to expire order");
            }
        }
    }

    async fn expire_order(&self, order: Order, now: chrono::DateTime<Utc>) -> crate::error::Result<()> {
        let expected_version = order.version;
        let mut updated = order.clone();
        updated.status = OrderStatus::Expired;
        updated.updated_at = now;
        updated.version = expected_version + 1;
        self.store
            .cas_update_order(&order.id, expected_version, updated)
            .await?;
        self.statistics.record_order_failed();
        info!(order_id = %order.id, "order expired by timeout monitor");
        Ok(())
    }

    /// Public entry point for feeding a single chain event through the
    /// same dispatch path `event_loop` uses; exposed for adapters/tests
    /// that want to drive the orchestrator without a live subscription.
    pub async fn handle_event(&self, event: ChainEvent) -> crate::error::Result<()> {
        self.dispatch(event).await
    }

    /// Delegates by `event.kind`; unknown kinds are logged and ignored
    /// (spec §4.3 "Unknown types are ignored after logging").
    async fn dispatch(&self, event: ChainEvent) -> crate::error::Result<()> {
        match event.kind {
            ChainEventKind::OrderCreated => self.handle_order_created(event).await,
            ChainEventKind::OrderExecuted => self.handle_order_executed(event).await,
            ChainEventKind::OrderCompleted => self.handle_order_completed(event).await,
            ChainEventKind::OrderCancelled => self.handle_order_cancelled(event).await,
            ChainEventKind::HtlcCreated => self.handle_htlc_created(event).await,
            ChainEventKind::HtlcClaimed => self.handle_htlc_claimed(event).await,
            ChainEventKind::HtlcRefunded => self.handle_htlc_refunded(event).await,
            ChainEventKind::PriceUpdate => self.handle_price_update(event).await,
            ChainEventKind::BlockCreated => self.handle_block_created(event).await,
            ChainEventKind::Unknown(kind) => {
                debug!(%kind, "ignoring unrecognised event type");
                Ok(())
            }
        }
    }

    async fn handle_order_created(&self, _event: ChainEvent) -> crate::error::Result<()> {
        self.statistics.record_order_created();
        Ok(())
    }

    /// Adapter-confirmed interval execution. The TWAP Engine's own
    /// transactional mutation (spec §4.4) is authoritative for order
    /// state; this handler exists for swap accounting only.
    async fn handle_order_executed(&self, _event: ChainEvent) -> crate::error::Result<()> {
        self.statistics.record_swap_attempted();
        Ok(())
    }

    async fn handle_order_completed(&self, _event: ChainEvent) -> crate::error::Result<()> {
        Ok(())
    }

    async fn handle_order_cancelled(&self, event: ChainEvent) -> crate::error::Result<()> {
        let Some(order_id) = event.data.order_id else {
            warn!("order_cancelled event missing order_id");
            return Ok(());
        };
        let order = self.store.get_order(&order_id).await?;
        if order.status.is_terminal() {
            // Idempotent no-op (spec §8 "cancel(O) after any cancel(O) that
            // returned success is a no-op").
            return Ok(());
        }
        let expected_version = order.version;
        let mut updated = order.clone();
        updated.status = OrderStatus::Cancelled;
        updated.updated_at = Utc::now();
        updated.version = expected_version + 1;
        self.store
            .cas_update_order(&order_id, expected_version, updated)
            .await?;
        self.statistics.record_order_failed();
        Ok(())
    }

    async fn handle_htlc_created(&self, event: ChainEvent) -> crate::error::Result<()> {
        let (Some(order_id), Some(htlc_address), Some(hashed_secret)) = (
            event.data.order_id.clone(),
            event.data.htlc_address.clone(),
            event.data.hashed_secret,
        ) else {
            warn!("htlc_created event missing required fields");
            return Ok(());
        };
        let order = self.store.get_order(&order_id).await?;
        let htlc = Htlc {
            address: htlc_address,
            order_id: order.id.clone(),
            hashed_secret,
            amount: order.source_amount,
            token: order.source_token.clone(),
            sender: order.user.clone(),
            receiver: order.recipient.clone(),
            height_timeout: order.htlc.height_timeout,
            time_timeout: order.htlc.time_timeout,
            status: HtlcStatus::Active,
            chain_id: event.chain_id,
            created_at: event.timestamp,
            claimed_at: None,
            revealed_secret: None,
        };
        let inserted = self.store.upsert_htlc(htlc).await?;
        if !inserted {
            debug!(%order_id, "htlc_created replay ignored");
        }
        Ok(())
    }

    async fn handle_htlc_claimed(&self, event: ChainEvent) -> crate::error::Result<()> {
        let (Some(htlc_address), Some(secret)) =
            (event.data.htlc_address.clone(), event.data.secret)
        else {
            warn!("htlc_claimed event missing required fields");
            return Ok(());
        };
        let htlc = self.store.get_htlc(&htlc_address).await?;
        if !crate::secret::verify(&secret, &htlc.hashed_secret) {
            warn!(%htlc_address, "htlc_claimed secret does not match hashed_secret, ignoring");
            return Ok(());
        }
        let claimed = self
            .store
            .mark_htlc_claimed(&htlc_address, secret, event.timestamp)
            .await?;
        if !claimed {
            debug!(%htlc_address, "htlc_claimed replay ignored");
            return Ok(());
        }

        let order = self.store.get_order(&htlc.order_id).await?;
        if order.status == OrderStatus::Completed {
            let expected_version = order.version;
            let mut updated = order.clone();
            updated.status = OrderStatus::Claimed;
            updated.updated_at = event.timestamp;
            updated.version = expected_version + 1;
            self.store
                .cas_update_order(&htlc.order_id, expected_version, updated)
                .await?;
            self.statistics.record_swap_succeeded();
        }
        Ok(())
    }

    async fn handle_htlc_refunded(&self, event: ChainEvent) -> crate::error::Result<()> {
        let Some(htlc_address) = event.data.htlc_address.clone() else {
            warn!("htlc_refunded event missing htlc_address");
            return Ok(());
        };
        let htlc = self.store.get_htlc(&htlc_address).await?;
        self.finalize_htlc_refund(&htlc_address, &htlc.order_id, event.timestamp)
            .await
    }

    /// Native on-chain price updates are observability-only: the TWAP
    /// Engine consults the Price Cache/Aggregator, not chain events, for
    /// execution decisions (spec §4.3).
    async fn handle_price_update(&self, event: ChainEvent) -> crate::error::Result<()> {
        debug!(chain_id = %event.chain_id, "price_update event observed");
        Ok(())
    }

    async fn handle_block_created(&self, event: ChainEvent) -> crate::error::Result<()> {
        let mut status = self
            .store
            .get_chain_status(&event.chain_id)
            .await
            .unwrap_or_else(|_| crate::model::ChainStatus::unknown(event.chain_id.clone()));
        status.last_block_height = event.block_number;
        status.last_block_time = Some(event.timestamp);
        self.store.upsert_chain_status(status).await
    }

    /// Brokers a cross-chain HTLC pair for a new order (spec §4.7): creates
    /// the source leg and persists it as `active` *before* attempting the
    /// target leg, so a target failure still leaves the source HTLC
    /// durable and subject to `sweep_htlc_timeouts`'s proactive refund
    /// rather than orphaned only in the adapter's own state.
    pub async fn create_cross_chain_htlc_pair(
        &self,
        order: &Order,
        source_chain: &crate::model::ChainId,
        target_chain: &crate::model::ChainId,
        source_params: CreateHtlcParams,
        target_params: CreateHtlcParams,
    ) -> crate::error::Result<(crate::model::HtlcAddress, crate::model::HtlcAddress)> {
        let target_params = self
            .registry
            .validate_htlc_pair_margin(target_params, &source_params)?;

        let source_adapter = self.registry.get(source_chain)?;
        let source_hashed_secret = source_params.hashed_secret;
        let source_amount = source_params.amount;
        let source_token = source_params.token.clone();
        let source_sender = source_params.sender.clone();
        let source_receiver = source_params.receiver.clone();
        let source_height_timeout = source_params.height_timeout;
        let source_time_timeout = source_params.time_timeout;
        let source_address = source_adapter.create_htlc(source_params).await?;

        let now = Utc::now();
        let source_htlc = Htlc {
            address: source_address.clone(),
            order_id: order.id.clone(),
            hashed_secret: source_hashed_secret,
            amount: source_amount,
            token: source_token,
            sender: source_sender,
            receiver: source_receiver,
            height_timeout: source_height_timeout,
            time_timeout: source_time_timeout,
            status: HtlcStatus::Active,
            chain_id: source_chain.clone(),
            created_at: now,
            claimed_at: None,
            revealed_secret: None,
        };
        self.store.upsert_htlc(source_htlc).await?;

        let target_adapter = self.registry.get(target_chain)?;
        match target_adapter.create_htlc(target_params).await {
            Ok(target_address) => Ok((source_address, target_address)),
            Err(err) => {
                error!(
                    %source_chain, %target_chain, %err,
                    "target HTLC creation failed; source HTLC is persisted active and will be \
                     refunded by the timeout sweep once it expires"
                );
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ChainAdapter, ChainEventData};
    use crate::model::{
        Address, ChainHealth, ChainId, ChainStatus, HtlcAddress, HtlcTerms, OrderId, TokenId,
        TwapPlan,
    };
    use crate::money::Amount;
    use crate::secret::{commit, Secret};
    use crate::store::InMemoryStore;
    use async_trait::async_trait;

    struct NullAdapter(ChainId);

    #[async_trait]
    impl ChainAdapter for NullAdapter {
        fn chain_id(&self) -> ChainId {
            self.0.clone()
        }
        async fn connect(&self) -> crate::error::Result<()> {
            Ok(())
        }
        async fn disconnect(&self) -> crate::error::Result<()> {
            Ok(())
        }
        async fn is_connected(&self) -> bool {
            true
        }
        async fn address(&self) -> crate::error::Result<Address> {
            Ok(Address("a".into()))
        }
        async fn balance(&self, _token: &TokenId) -> crate::error::Result<Amount> {
            Ok(Amount::ZERO)
        }
        async fn create_twap_order(
            &self,
            _params: crate::chain::CreateTwapOrderParams,
        ) -> crate::error::Result<Address> {
            Ok(Address("a".into()))
        }
        async fn execute_twap_interval(
            &self,
            _params: crate::chain::ExecuteTwapIntervalParams,
        ) -> crate::error::Result<crate::chain::ExecutionOutcome> {
            unimplemented!()
        }
        async fn cancel_order(&self, _order_id: &OrderId) -> crate::error::Result<()> {
            Ok(())
        }
        async fn create_htlc(
            &self,
            _params: CreateHtlcParams,
        ) -> crate::error::Result<HtlcAddress> {
            Ok(HtlcAddress("h".into()))
        }
        async fn claim_htlc(&self, _address: &HtlcAddress, _secret: &Secret) -> crate::error::Result<()> {
            Ok(())
        }
        async fn refund_htlc(&self, _address: &HtlcAddress) -> crate::error::Result<()> {
            Ok(())
        }
        async fn htlc_status(&self, _address: &HtlcAddress) -> crate::error::Result<HtlcStatus> {
            Ok(HtlcStatus::Active)
        }
        async fn subscribe(&self, _sink: mpsc::Sender<ChainEvent>) -> crate::error::Result<()> {
            Ok(())
        }
        async fn unsubscribe(&self) -> crate::error::Result<()> {
            Ok(())
        }
        async fn status(&self) -> crate::error::Result<ChainStatus> {
            Ok(ChainStatus {
                chain_id: self.0.clone(),
                enabled: true,
                last_block_height: 0,
                last_block_time: None,
                avg_block_time_secs: None,
                gas_price: None,
                health: ChainHealth::Healthy,
                last_health_check: None,
            })
        }
    }

    fn orchestrator_with_order(order: Order) -> (Orchestrator, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(NullAdapter(order.source_chain.clone())));
        let orchestrator = Orchestrator::new(Arc::new(registry), Arc::clone(&store) as Arc<dyn Store>);
        (orchestrator, store)
    }

    fn completed_order(secret: &Secret) -> Order {
        let now = Utc::now();
        let mut order = Order::new(
            OrderId("o1".into()),
            Address("user".into()),
            Address("recipient".into()),
            ChainId("eth".into()),
            TokenId("usdc".into()),
            Amount::from_u128(1000),
            ChainId("cosmos".into()),
            TokenId("atom".into()),
            Amount::from_u128(1),
            TwapPlan {
                window_minutes: 20,
                interval_count: 4,
                max_slippage_bps: 100,
                min_fill: Amount::from_u128(100),
                mev_protection: false,
            },
            HtlcTerms {
                hashed_secret: commit(secret),
                height_timeout: 10_000,
                time_timeout: now + chrono::Duration::hours(2),
            },
            100,
            now,
        )
        .unwrap();
        order.executed_amount = order.source_amount;
        order.status = OrderStatus::Completed;
        order
    }

    fn htlc_claimed_event(htlc_address: HtlcAddress, secret: Secret, chain_id: ChainId) -> ChainEvent {
        ChainEvent {
            chain_id,
            kind: ChainEventKind::HtlcClaimed,
            block_number: 1,
            tx_hash: None,
            timestamp: Utc::now(),
            data: ChainEventData {
                order_id: None,
                htlc_address: Some(htlc_address),
                hashed_secret: None,
                secret: Some(secret),
                extra: Default::default(),
            },
        }
    }

    #[tokio::test]
    async fn htlc_claim_transitions_order_and_is_idempotent() {
        let secret = Secret([9u8; 32]);
        let order = completed_order(&secret);
        let (orchestrator, store) = orchestrator_with_order(order.clone());
        store.create_order(order.clone()).await.unwrap();

        let htlc = Htlc {
            address: HtlcAddress("htlc1".into()),
            order_id: order.id.clone(),
            hashed_secret: order.htlc.hashed_secret,
            amount: order.source_amount,
            token: order.source_token.clone(),
            sender: order.user.clone(),
            receiver: order.recipient.clone(),
            height_timeout: order.htlc.height_timeout,
            time_timeout: order.htlc.time_timeout,
            status: HtlcStatus::Active,
            chain_id: order.source_chain.clone(),
            created_at: Utc::now(),
            claimed_at: None,
            revealed_secret: None,
        };
        store.upsert_htlc(htlc.clone()).await.unwrap();

        let event = htlc_claimed_event(htlc.address.clone(), secret, order.source_chain.clone());
        orchestrator.dispatch(event.clone()).await.unwrap();

        let updated = store.get_order(&order.id).await.unwrap();
        assert_eq!(updated.status, OrderStatus::Claimed);
        assert_eq!(orchestrator.statistics().successful_swaps, 1);

        // Replaying the same event is a no-op (spec §8).
        orchestrator.dispatch(event).await.unwrap();
        assert_eq!(orchestrator.statistics().successful_swaps, 1);
    }

    #[tokio::test]
    async fn htlc_claim_with_wrong_secret_is_ignored() {
        let secret = Secret([9u8; 32]);
        let wrong = Secret([1u8; 32]);
        let order = completed_order(&secret);
        let (orchestrator, store) = orchestrator_with_order(order.clone());
        store.create_order(order.clone()).await.unwrap();

        let htlc = Htlc {
            address: HtlcAddress("htlc1".into()),
            order_id: order.id.clone(),
            hashed_secret: order.htlc.hashed_secret,
            amount: order.source_amount,
            token: order.source_token.clone(),
            sender: order.user.clone(),
            receiver: order.recipient.clone(),
            height_timeout: order.htlc.height_timeout,
            time_timeout: order.htlc.time_timeout,
            status: HtlcStatus::Active,
            chain_id: order.source_chain.clone(),
            created_at: Utc::now(),
            claimed_at: None,
            revealed_secret: None,
        };
        store.upsert_htlc(htlc.clone()).await.unwrap();

        let event = htlc_claimed_event(htlc.address.clone(), wrong, order.source_chain.clone());
        orchestrator.dispatch(event).await.unwrap();

        let unchanged = store.get_order(&order.id).await.unwrap();
        assert_eq!(unchanged.status, OrderStatus::Completed);
        assert_eq!(orchestrator.statistics().successful_swaps, 0);
    }
}

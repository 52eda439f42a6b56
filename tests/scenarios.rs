//! End-to-end scenarios mirroring the reference behaviours: a clean full
//! TWAP execution, timeout expiry, an HTLC claim, and price-source
//! failure isolation.

use async_trait::async_trait;
use bridge_twap_core::chain::{
    AdapterRegistry, ChainAdapter, ChainEvent, ChainEventData, ChainEventKind, CreateHtlcParams,
    CreateTwapOrderParams, ExecuteTwapIntervalParams, ExecutionOutcome,
};
use bridge_twap_core::config::TwapConfig;
use bridge_twap_core::engine::TwapEngine;
use bridge_twap_core::model::{
    Address, ChainHealth, ChainId, ChainStatus, Htlc, HtlcAddress, HtlcStatus, HtlcTerms, Order,
    OrderId, OrderStatus, PricePoint, SourceId, TokenId, TokenPair, TwapPlan, TxHash,
};
use bridge_twap_core::money::{Amount, Price};
use bridge_twap_core::orchestrator::Orchestrator;
use bridge_twap_core::price::{PriceCache, PriceFeedAggregator};
use bridge_twap_core::secret::{commit, HashedSecret, Secret};
use bridge_twap_core::statistics::Statistics;
use bridge_twap_core::store::{InMemoryStore, Store};
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

struct FixedAdapter {
    chain_id: ChainId,
    height: u64,
    fill_price: Price,
    calls: Arc<AtomicU64>,
}

#[async_trait]
impl ChainAdapter for FixedAdapter {
    fn chain_id(&self) -> ChainId {
        self.chain_id.clone()
    }
    async fn connect(&self) -> bridge_twap_core::Result<()> {
        Ok(())
    }
    async fn disconnect(&self) -> bridge_twap_core::Result<()> {
        Ok(())
    }
    async fn is_connected(&self) -> bool {
        true
    }
    async fn address(&self) -> bridge_twap_core::Result<Address> {
        Ok(Address("adapter".into()))
    }
    async fn balance(&self, _token: &TokenId) -> bridge_twap_core::Result<Amount> {
        Ok(Amount::ZERO)
    }
    async fn create_twap_order(
        &self,
        _params: CreateTwapOrderParams,
    ) -> bridge_twap_core::Result<Address> {
        Ok(Address("onchain-order".into()))
    }
    async fn execute_twap_interval(
        &self,
        params: ExecuteTwapIntervalParams,
    ) -> bridge_twap_core::Result<ExecutionOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ExecutionOutcome {
            executed_amount: params.target_amount,
            execution_price: self.fill_price,
            tx_hash: TxHash(format!("tx-{}", params.interval_number)),
            gas_used: 21_000,
        })
    }
    async fn cancel_order(&self, _order_id: &OrderId) -> bridge_twap_core::Result<()> {
        Ok(())
    }
    async fn create_htlc(&self, _params: CreateHtlcParams) -> bridge_twap_core::Result<HtlcAddress> {
        Ok(HtlcAddress("htlc".into()))
    }
    async fn claim_htlc(&self, _address: &HtlcAddress, _secret: &Secret) -> bridge_twap_core::Result<()> {
        Ok(())
    }
    async fn refund_htlc(&self, _address: &HtlcAddress) -> bridge_twap_core::Result<()> {
        Ok(())
    }
    async fn htlc_status(&self, _address: &HtlcAddress) -> bridge_twap_core::Result<HtlcStatus> {
        Ok(HtlcStatus::Active)
    }
    async fn subscribe(&self, _sink: mpsc::Sender<ChainEvent>) -> bridge_twap_core::Result<()> {
        Ok(())
    }
    async fn unsubscribe(&self) -> bridge_twap_core::Result<()> {
        Ok(())
    }
    async fn status(&self) -> bridge_twap_core::Result<ChainStatus> {
        Ok(ChainStatus {
            chain_id: self.chain_id.clone(),
            enabled: true,
            last_block_height: self.height,
            last_block_time: None,
            avg_block_time_secs: None,
            gas_price: None,
            health: ChainHealth::Healthy,
            last_health_check: None,
        })
    }
}

fn build_order(source_amount: u128, k: u32, min_fill: u128, max_slippage_bps: u32) -> Order {
    let now = Utc::now();
    Order::new(
        OrderId("o1".into()),
        Address("user".into()),
        Address("recipient".into()),
        ChainId("eth".into()),
        TokenId("usdc".into()),
        Amount::from_u128(source_amount),
        ChainId("cosmos".into()),
        TokenId("atom".into()),
        Amount::from_u128(1),
        TwapPlan {
            window_minutes: 20,
            interval_count: k,
            max_slippage_bps,
            min_fill: Amount::from_u128(min_fill),
            mev_protection: false,
        },
        HtlcTerms {
            hashed_secret: HashedSecret([0u8; 32]),
            height_timeout: 10_000,
            time_timeout: now + chrono::Duration::hours(2),
        },
        100,
        now,
    )
    .unwrap()
}

fn pair_for(order: &Order) -> TokenPair {
    TokenPair(format!("{}/{}", order.source_token, order.target_token))
}

/// S1 — Clean full execution: four intervals of 250 each at price 2000,
/// ending completed with average_price = 2000.
#[tokio::test]
async fn s1_clean_full_execution() {
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let cache = Arc::new(PriceCache::default());
    let mut registry = AdapterRegistry::new();
    let calls = Arc::new(AtomicU64::new(0));
    registry.register(Arc::new(FixedAdapter {
        chain_id: ChainId("eth".into()),
        height: 1,
        fill_price: Price::from_whole(2000),
        calls: Arc::clone(&calls),
    }));
    let registry = Arc::new(registry);
    let aggregator = Arc::new(PriceFeedAggregator::new(vec![]));
    let engine = Arc::new(TwapEngine::new(
        Arc::clone(&store),
        Arc::clone(&cache),
        registry,
        aggregator,
        TwapConfig::default(),
        Arc::new(Statistics::new()),
    ));

    let order = build_order(1000, 4, 100, 100);
    store.create_order(order.clone()).await.unwrap();
    let pair = pair_for(&order);
    let now = Utc::now();
    cache.record(
        pair.clone(),
        PricePoint {
            token_pair: pair,
            source: SourceId("dex".into()),
            price: Price::from_whole(2000),
            volume: None,
            timestamp: now,
            chain_id: None,
        },
        now,
    );

    for _ in 0..4 {
        engine.run_interval_once(&order.id).await.unwrap();
    }

    let final_order = store.get_order(&order.id).await.unwrap();
    assert_eq!(final_order.executed_amount, 1000u128);
    assert_eq!(final_order.average_price, Price::from_whole(2000));
    assert_eq!(final_order.status, OrderStatus::Completed);

    let records = store.execution_records_for_order(&order.id).await.unwrap();
    assert_eq!(records.len(), 4);
    for (i, record) in records.iter().enumerate() {
        assert_eq!(record.interval_index, i as u32);
        assert_eq!(record.amount, 250u128);
        assert_eq!(record.price, Price::from_whole(2000));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

/// S3 — Timeout expiry: an order past its wall-clock timeout transitions
/// to `expired` on the next timeout-monitor sweep; it stays expired.
#[tokio::test]
async fn s3_timeout_expiry() {
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let mut order = build_order(1000, 10, 1, 100);
    order.htlc.time_timeout = Utc::now() - chrono::Duration::seconds(1);
    store.create_order(order.clone()).await.unwrap();

    let registry = Arc::new(AdapterRegistry::new());
    let orchestrator = Orchestrator::new(registry, Arc::clone(&store));
    orchestrator.run_timeout_sweep_once().await;

    let expired = store.get_order(&order.id).await.unwrap();
    assert_eq!(expired.status, OrderStatus::Expired);

    // A second sweep finds nothing further to do (order is no longer
    // schedulable, hence no longer returned by `orders_timing_out`).
    orchestrator.run_timeout_sweep_once().await;
    let still_expired = store.get_order(&order.id).await.unwrap();
    assert_eq!(still_expired.status, OrderStatus::Expired);
}

/// S5 — HTLC claim: a completed order transitions to `claimed` on a
/// correctly-hashed `HTLCClaimed` event; a replay is a no-op.
#[tokio::test]
async fn s5_htlc_claim() {
    let secret = Secret([42u8; 32]);
    let mut order = build_order(1000, 4, 100, 100);
    order.htlc.hashed_secret = commit(&secret);
    order.executed_amount = order.source_amount;
    order.status = OrderStatus::Completed;

    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    store.create_order(order.clone()).await.unwrap();

    let htlc_address = HtlcAddress("htlc1".into());
    let htlc = Htlc {
        address: htlc_address.clone(),
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
    store.upsert_htlc(htlc).await.unwrap();

    let mut registry = AdapterRegistry::new();
    registry.register(Arc::new(FixedAdapter {
        chain_id: order.source_chain.clone(),
        height: 1,
        fill_price: Price::from_whole(2000),
        calls: Arc::new(AtomicU64::new(0)),
    }));
    let orchestrator = Orchestrator::new(Arc::new(registry), Arc::clone(&store));

    let event = ChainEvent {
        chain_id: order.source_chain.clone(),
        kind: ChainEventKind::HtlcClaimed,
        block_number: 1,
        tx_hash: None,
        timestamp: Utc::now(),
        data: ChainEventData {
            order_id: None,
            htlc_address: Some(htlc_address.clone()),
            hashed_secret: None,
            secret: Some(secret),
            extra: Default::default(),
        },
    };

    orchestrator.handle_event(event.clone()).await.unwrap();
    let claimed = store.get_order(&order.id).await.unwrap();
    assert_eq!(claimed.status, OrderStatus::Claimed);
    assert_eq!(orchestrator.statistics().successful_swaps, 1);

    orchestrator.handle_event(event).await.unwrap();
    assert_eq!(orchestrator.statistics().successful_swaps, 1);
}

/// Target HTLC creation failing must not strand the source HTLC: it is
/// persisted `active` and the proactive timeout sweep refunds and
/// transitions the order once its timeout passes (spec §4.7 "On target
/// creation failure, schedule source HTLC refund after source timeout").
#[tokio::test]
async fn source_htlc_is_refunded_after_target_creation_fails() {
    struct RejectingAdapter(ChainId);

    #[async_trait]
    impl ChainAdapter for RejectingAdapter {
        fn chain_id(&self) -> ChainId {
            self.0.clone()
        }
        async fn connect(&self) -> bridge_twap_core::Result<()> {
            Ok(())
        }
        async fn disconnect(&self) -> bridge_twap_core::Result<()> {
            Ok(())
        }
        async fn is_connected(&self) -> bool {
            true
        }
        async fn address(&self) -> bridge_twap_core::Result<Address> {
            Ok(Address("a".into()))
        }
        async fn balance(&self, _token: &TokenId) -> bridge_twap_core::Result<Amount> {
            Ok(Amount::ZERO)
        }
        async fn create_twap_order(
            &self,
            _params: CreateTwapOrderParams,
        ) -> bridge_twap_core::Result<Address> {
            Ok(Address("a".into()))
        }
        async fn execute_twap_interval(
            &self,
            _params: ExecuteTwapIntervalParams,
        ) -> bridge_twap_core::Result<ExecutionOutcome> {
            unimplemented!()
        }
        async fn cancel_order(&self, _order_id: &OrderId) -> bridge_twap_core::Result<()> {
            Ok(())
        }
        async fn create_htlc(
            &self,
            _params: CreateHtlcParams,
        ) -> bridge_twap_core::Result<HtlcAddress> {
            Err(bridge_twap_core::Error::internal("target chain unreachable"))
        }
        async fn claim_htlc(&self, _address: &HtlcAddress, _secret: &Secret) -> bridge_twap_core::Result<()> {
            Ok(())
        }
        async fn refund_htlc(&self, _address: &HtlcAddress) -> bridge_twap_core::Result<()> {
            Ok(())
        }
        async fn htlc_status(&self, _address: &HtlcAddress) -> bridge_twap_core::Result<HtlcStatus> {
            Ok(HtlcStatus::Active)
        }
        async fn subscribe(&self, _sink: mpsc::Sender<ChainEvent>) -> bridge_twap_core::Result<()> {
            Ok(())
        }
        async fn unsubscribe(&self) -> bridge_twap_core::Result<()> {
            Ok(())
        }
        async fn status(&self) -> bridge_twap_core::Result<ChainStatus> {
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

    let order = build_order(1000, 4, 100, 100);
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    store.create_order(order.clone()).await.unwrap();

    let mut registry = AdapterRegistry::new();
    let source_calls = Arc::new(AtomicU64::new(0));
    registry.register(Arc::new(FixedAdapter {
        chain_id: order.source_chain.clone(),
        height: 1,
        fill_price: Price::from_whole(2000),
        calls: source_calls,
    }));
    registry.register(Arc::new(RejectingAdapter(order.target_chain.clone())));
    let orchestrator = Orchestrator::new(Arc::new(registry), Arc::clone(&store));

    let now = Utc::now();
    // The HTLC's own timeout (independent of the order's) is already past,
    // so the sweep refunds it without the order-level timeout monitor
    // (driven by `order.htlc.time_timeout`, still in the future) expiring
    // the order first.
    let source_params = CreateHtlcParams {
        order_id: order.id.clone(),
        hashed_secret: order.htlc.hashed_secret,
        amount: order.source_amount,
        token: order.source_token.clone(),
        sender: order.user.clone(),
        receiver: order.recipient.clone(),
        height_timeout: order.htlc.height_timeout,
        time_timeout: now - chrono::Duration::hours(1),
    };
    let target_params = CreateHtlcParams {
        order_id: order.id.clone(),
        hashed_secret: order.htlc.hashed_secret,
        amount: order.min_received,
        token: order.target_token.clone(),
        sender: order.recipient.clone(),
        receiver: order.user.clone(),
        // Must satisfy the >= 1h/100 block safety margin ahead of source.
        height_timeout: order.htlc.height_timeout - 200,
        time_timeout: now - chrono::Duration::hours(3),
    };

    let err = orchestrator
        .create_cross_chain_htlc_pair(
            &order,
            &order.source_chain,
            &order.target_chain,
            source_params,
            target_params,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, bridge_twap_core::Error::Internal(_)));

    // The source HTLC is durable (active) even though target creation failed.
    let active = store.active_htlcs().await.unwrap();
    assert_eq!(active.len(), 1);

    // current_height (1) is nowhere near height_timeout, but time_timeout
    // has already passed, so the sweep still refunds it.
    orchestrator.run_timeout_sweep_once().await;

    let after_sweep = store.active_htlcs().await.unwrap();
    assert!(after_sweep.is_empty());

    let refunded_order = store.get_order(&order.id).await.unwrap();
    assert_eq!(refunded_order.status, OrderStatus::Refunded);
}

/// S6 — Source failure isolation: chainlink times out, coingecko errors,
/// dex succeeds. Exactly one point (dex) is written; `latest` returns it.
#[tokio::test]
async fn s6_source_failure_isolation() {
    use bridge_twap_core::price::PriceSource;

    struct TimeoutSource;
    #[async_trait]
    impl PriceSource for TimeoutSource {
        fn id(&self) -> SourceId {
            SourceId("chainlink".into())
        }
        async fn fetch(&self, _pair: &TokenPair) -> anyhow::Result<Price> {
            tokio::time::sleep(std::time::Duration::from_secs(120)).await;
            unreachable!()
        }
    }

    struct ErroringSource;
    #[async_trait]
    impl PriceSource for ErroringSource {
        fn id(&self) -> SourceId {
            SourceId("coingecko".into())
        }
        async fn fetch(&self, _pair: &TokenPair) -> anyhow::Result<Price> {
            Err(anyhow::anyhow!("HTTP 500"))
        }
    }

    struct DexSource;
    #[async_trait]
    impl PriceSource for DexSource {
        fn id(&self) -> SourceId {
            SourceId("dex".into())
        }
        async fn fetch(&self, _pair: &TokenPair) -> anyhow::Result<Price> {
            Ok(Price::from_whole(1999))
        }
    }

    let pair = TokenPair("ETH/USDC".into());
    let aggregator = PriceFeedAggregator::new(vec![
        (pair.clone(), Arc::new(TimeoutSource)),
        (pair.clone(), Arc::new(ErroringSource)),
        (pair.clone(), Arc::new(DexSource)),
    ])
    .with_tick_deadline(std::time::Duration::from_millis(200))
    .with_inter_call_sleep(std::time::Duration::from_millis(0));

    let cache = PriceCache::default();
    let points = aggregator.tick(&cache).await.unwrap();

    assert_eq!(points.len(), 1);
    assert_eq!(points[0].source, SourceId("dex".into()));
    let latest = cache.latest(&pair).unwrap();
    assert_eq!(latest.source, SourceId("dex".into()));
    assert_eq!(latest.price, Price::from_whole(1999));
}

//! TWAP Engine (spec §4.4 — component C6, the core algorithm).
//!
//! Four cooperating loops, cancellable through a single `watch` stop
//! signal, grounded in `autopilot::run_loop::RunLoop::run_forever`'s
//! tick-and-sleep shape. Back-pressure follows spec §5: the execution
//! queue is a bounded `mpsc` channel; the scheduler uses `try_send` and
//! drops-and-logs on a full queue rather than retrying.

use crate::chain::{AdapterRegistry, ExecuteTwapIntervalParams};
use crate::config::TwapConfig;
use crate::model::{ExecutionRecord, Order, OrderId, OrderStatus, TokenPair};
use crate::money::{slippage_bps, Amount, Price};
use crate::price::PriceCache;
use crate::statistics::Statistics;
use crate::store::Store;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, instrument, warn, Instrument};

/// Default bound on the execution queue (spec §5 "default capacity 100").
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// One unit of work for an executor worker: "run the next due interval
/// for this order".
#[derive(Debug, Clone)]
pub struct ExecutionTask {
    pub order_id: OrderId,
}

#[derive(Default)]
pub struct TwapEngineMetrics {
    pub ticks_scheduled: AtomicU64,
    pub intervals_enqueued: AtomicU64,
    pub intervals_dropped: AtomicU64,
    pub intervals_executed: AtomicU64,
    pub intervals_skipped_dust: AtomicU64,
    pub slippage_rejections: AtomicU64,
    pub post_trade_breaches: AtomicU64,
}

impl TwapEngineMetrics {
    fn log_snapshot(&self) {
        info!(
            ticks_scheduled = self.ticks_scheduled.load(Ordering::Relaxed),
            intervals_enqueued = self.intervals_enqueued.load(Ordering::Relaxed),
            intervals_dropped = self.intervals_dropped.load(Ordering::Relaxed),
            intervals_executed = self.intervals_executed.load(Ordering::Relaxed),
            intervals_skipped_dust = self.intervals_skipped_dust.load(Ordering::Relaxed),
            slippage_rejections = self.slippage_rejections.load(Ordering::Relaxed),
            post_trade_breaches = self.post_trade_breaches.load(Ordering::Relaxed),
            "twap engine metrics"
        );
    }
}

pub struct TwapEngine {
    store: Arc<dyn Store>,
    cache: Arc<PriceCache>,
    registry: Arc<AdapterRegistry>,
    aggregator: Arc<crate::price::PriceFeedAggregator>,
    config: TwapConfig,
    metrics: Arc<TwapEngineMetrics>,
    statistics: Arc<Statistics>,
    queue_capacity: usize,
}

impl TwapEngine {
    pub fn new(
        store: Arc<dyn Store>,
        cache: Arc<PriceCache>,
        registry: Arc<AdapterRegistry>,
        aggregator: Arc<crate::price::PriceFeedAggregator>,
        config: TwapConfig,
        statistics: Arc<Statistics>,
    ) -> Self {
        Self {
            store,
            cache,
            registry,
            aggregator,
            config,
            metrics: Arc::new(TwapEngineMetrics::default()),
            statistics,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    pub fn metrics(&self) -> Arc<TwapEngineMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn statistics(&self) -> Arc<Statistics> {
        Arc::clone(&self.statistics)
    }

    /// Spawns the four loops and returns their join handles. Callers keep
    /// `stop` (or a clone's sender) to drive cooperative shutdown; dropping
    /// all senders also stops the loops since `watch::Receiver::changed`
    /// then errors.
    pub fn spawn(self: &Arc<Self>, stop: watch::Receiver<bool>) -> Vec<tokio::task::JoinHandle<()>> {
        let (tx, rx) = mpsc::channel(self.queue_capacity);

        let price_feed = {
            let engine = Arc::clone(self);
            let mut stop = stop.clone();
            tokio::spawn(async move { engine.price_feed_loop(&mut stop).await })
        };
        let scheduler = {
            let engine = Arc::clone(self);
            let mut stop = stop.clone();
            tokio::spawn(async move { engine.scheduler_loop(&mut stop, tx).await })
        };
        let executor = {
            let engine = Arc::clone(self);
            let stop = stop.clone();
            tokio::spawn(async move { engine.executor_loop(rx, stop).await })
        };
        let metrics = {
            let engine = Arc::clone(self);
            let mut stop = stop.clone();
            tokio::spawn(async move { engine.metrics_loop(&mut stop).await })
        };
        vec![price_feed, scheduler, executor, metrics]
    }

    #[instrument(skip_all, name = "price_feed_loop")]
    async fn price_feed_loop(&self, stop: &mut watch::Receiver<bool>) {
        let mut tick = tokio::time::interval(self.config.price_update_interval);
        loop {
            tokio::select! {
                _ = stop.changed() => {
                    if *stop.borrow() {
                        break;
                    }
                }
                _ = tick.tick() => {
                    match self.aggregator.tick(&self.cache).await {
                        Ok(points) => {
                            for point in points {
                                let pair = point.token_pair.clone();
                                if let Err(err) = self.store.insert_price_point(pair, point).await {
                                    warn!(%err, "failed to persist price point");
                                }
                            }
                        }
                        Err(err) => warn!(%err, "price feed tick produced no usable points"),
                    }
                }
            }
        }
    }

    #[instrument(skip_all, name = "scheduler_loop")]
    async fn scheduler_loop(&self, stop: &mut watch::Receiver<bool>, queue: mpsc::Sender<ExecutionTask>) {
        let mut tick = tokio::time::interval(self.config.update_interval);
        loop {
            tokio::select! {
                _ = stop.changed() => {
                    if *stop.borrow() {
                        break;
                    }
                }
                _ = tick.tick() => {
                    self.metrics.ticks_scheduled.fetch_add(1, Ordering::Relaxed);
                    self.schedule_tick(&queue).await;
                }
            }
        }
    }

    async fn schedule_tick(&self, queue: &mpsc::Sender<ExecutionTask>) {
        let orders = match self.store.list_schedulable_orders().await {
            Ok(orders) => orders,
            Err(err) => {
                warn!(%err, "failed to list schedulable orders");
                return;
            }
        };
        let now = Utc::now();
        for order in orders {
            match self.is_executable(&order, now).await {
                Ok(true) => {
                    let task = ExecutionTask {
                        order_id: order.id.clone(),
                    };
                    match queue.try_send(task) {
                        Ok(()) => {
                            self.metrics.intervals_enqueued.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(_) => {
                            self.metrics.intervals_dropped.fetch_add(1, Ordering::Relaxed);
                            debug!(order_id = %order.id, "execution queue full, dropping enqueue for this tick");
                        }
                    }
                }
                Ok(false) => {}
                Err(err) => warn!(order_id = %order.id, %err, "failed to evaluate executable predicate"),
            }
        }
    }

    /// Spec §4.4 "Executable order predicate".
    async fn is_executable(&self, order: &Order, now: chrono::DateTime<Utc>) -> crate::error::Result<bool> {
        if !order.status.is_schedulable() {
            return Ok(false);
        }
        let adapter = self.registry.get(&order.source_chain)?;
        let status = adapter.status().await?;
        if status.last_block_height >= order.htlc.height_timeout {
            return Ok(false);
        }
        let interval_duration = Duration::from_secs(order.plan.interval_duration_secs());
        let due = match order.last_execution_at {
            None => true,
            Some(last) => {
                let elapsed = now.signed_duration_since(last);
                elapsed >= chrono::Duration::from_std(interval_duration).unwrap_or_else(|_| chrono::Duration::zero())
            }
        };
        Ok(due)
    }

    #[instrument(skip_all, name = "executor_loop")]
    async fn executor_loop(&self, mut queue: mpsc::Receiver<ExecutionTask>, mut stop: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = stop.changed() => {
                    if *stop.borrow() {
                        break;
                    }
                }
                task = queue.recv() => {
                    match task {
                        Some(task) => {
                            let order_id = task.order_id.clone();
                            if let Err(err) = self
                                .execute_interval(&task)
                                .instrument(tracing::info_span!("execute_interval", %order_id))
                                .await
                            {
                                warn!(%order_id, %err, "interval execution failed");
                            }
                        }
                        None => break,
                    }
                }
            }
        }
    }

    /// Runs one due interval for `order_id` immediately, bypassing the
    /// scheduler's timing predicate (the predicate only gates
    /// *enqueueing*; it is not part of `execute_interval`'s own
    /// invariants). Exposed for tests and for an operator-triggered
    /// manual retry.
    pub async fn run_interval_once(&self, order_id: &OrderId) -> crate::error::Result<()> {
        self.execute_interval(&ExecutionTask {
            order_id: order_id.clone(),
        })
        .await
    }

    /// Runs one TWAP interval end to end: interval sizing, price
    /// validation, submission, and the transactional state mutation (spec
    /// §4.4 steps "Interval sizing" through "State mutation").
    async fn execute_interval(&self, task: &ExecutionTask) -> crate::error::Result<()> {
        let order = self.store.get_order(&task.order_id).await?;
        if !order.status.is_schedulable() {
            return Ok(());
        }

        let remaining = order.remaining()?;
        if remaining.is_zero() {
            return Ok(());
        }
        let records = self.store.execution_records_for_order(&order.id).await?;
        let remaining_intervals = order.plan.interval_count.saturating_sub(records.len() as u32);
        if remaining_intervals == 0 {
            return Ok(());
        }

        let target = remaining
            .checked_div_u64(remaining_intervals as u64)
            .ok_or_else(|| crate::error::Error::internal("interval division overflow"))?;

        let is_closing_interval = remaining_intervals == 1;
        let target = if is_closing_interval {
            remaining
        } else if target < order.plan.min_fill {
            self.metrics
                .intervals_skipped_dust
                .fetch_add(1, Ordering::Relaxed);
            debug!(order_id = %order.id, "target below min_fill, skipping this tick");
            return Ok(());
        } else {
            target
        };

        let pair = token_pair(&order);
        let now = Utc::now();
        let twap = self.cache.twap(&pair, order.plan.window_minutes, now);

        if !twap.is_zero() {
            let current = self.current_price(&pair, &order, now).await;
            if let Some(current) = current {
                let bps = slippage_bps(twap, current);
                if bps > order.plan.max_slippage_bps {
                    self.metrics
                        .slippage_rejections
                        .fetch_add(1, Ordering::Relaxed);
                    return Err(crate::error::Error::SlippageExceeded {
                        expected: twap.to_string(),
                        actual: current.to_string(),
                        actual_bps: bps,
                        limit_bps: order.plan.max_slippage_bps,
                    });
                }
            }
        }

        let adapter = self.registry.get(&order.source_chain)?;
        let outcome = adapter
            .execute_twap_interval(ExecuteTwapIntervalParams {
                order_id: order.id.clone(),
                interval_number: records.len() as u32,
                target_amount: target,
                max_slippage_bps: order.plan.max_slippage_bps,
                price_hint: twap,
            })
            .await?;

        self.metrics
            .intervals_executed
            .fetch_add(1, Ordering::Relaxed);

        let post_trade_bps = slippage_bps(twap, outcome.execution_price);
        let post_trade_breach = !twap.is_zero() && post_trade_bps > order.plan.max_slippage_bps;
        if post_trade_breach {
            self.metrics
                .post_trade_breaches
                .fetch_add(1, Ordering::Relaxed);
            warn!(
                order_id = %order.id,
                post_trade_bps,
                limit_bps = order.plan.max_slippage_bps,
                "post-trade slippage breach; pausing order for operator review"
            );
        }

        self.apply_execution(order, records.len() as u32, outcome, post_trade_breach, now)
            .await
    }

    /// `adapter.current_price` when the chain exposes a native oracle,
    /// falling back to the Price Cache's last-hour `current()` query
    /// (spec §4.3 "used only where a chain natively exposes an on-chain
    /// oracle; otherwise delegated to the Aggregator").
    async fn current_price(
        &self,
        pair: &TokenPair,
        order: &Order,
        now: chrono::DateTime<Utc>,
    ) -> Option<Price> {
        if let Ok(adapter) = self.registry.get(&order.source_chain) {
            if let Ok(price) = adapter.current_price(pair).await {
                return Some(price);
            }
        }
        self.cache.current(pair, now).ok()
    }

    async fn apply_execution(
        &self,
        order: Order,
        interval_index: u32,
        outcome: crate::chain::ExecutionOutcome,
        post_trade_breach: bool,
        now: chrono::DateTime<Utc>,
    ) -> crate::error::Result<()> {
        let expected_version = order.version;
        let mut updated = order.clone();
        updated.executed_amount = order
            .executed_amount
            .checked_add(outcome.executed_amount)
            .ok_or_else(|| crate::error::Error::internal("executed_amount overflow"))?;
        updated.last_execution_at = Some(now);
        updated.average_price = Price::weighted_average(
            order.average_price,
            order.executed_amount,
            outcome.execution_price,
            outcome.executed_amount,
        )
        .ok_or_else(|| crate::error::Error::internal("weighted average overflow"))?;
        let newly_completed = updated.executed_amount >= to_u128_lossy(order.source_amount);
        updated.status = if newly_completed {
            OrderStatus::Completed
        } else {
            OrderStatus::Executing
        };
        updated.paused_for_review = order.paused_for_review || post_trade_breach;
        updated.updated_at = now;
        updated.version = expected_version + 1;

        let record = ExecutionRecord {
            order_id: order.id.clone(),
            interval_index,
            chain_id: order.source_chain.clone(),
            tx_hash: outcome.tx_hash,
            amount: outcome.executed_amount,
            price: outcome.execution_price,
            slippage_bps: slippage_bps(order.average_price, outcome.execution_price),
            executed_at: now,
        };

        self.store.insert_execution_record(record).await?;
        self.store
            .cas_update_order(&order.id, expected_version, updated)
            .await?;
        if newly_completed {
            let process_time_ms = now
                .signed_duration_since(order.created_at)
                .num_milliseconds()
                .max(0) as u64;
            self.statistics.record_order_completed(process_time_ms);
        }
        Ok(())
    }

    #[instrument(skip_all, name = "metrics_loop")]
    async fn metrics_loop(&self, stop: &mut watch::Receiver<bool>) {
        let mut tick = tokio::time::interval(Duration::from_secs(60));
        loop {
            tokio::select! {
                _ = stop.changed() => {
                    if *stop.borrow() {
                        break;
                    }
                }
                _ = tick.tick() => {
                    self.metrics.log_snapshot();
                }
            }
        }
    }
}

fn token_pair(order: &Order) -> TokenPair {
    TokenPair(format!("{}/{}", order.source_token, order.target_token))
}

/// See [`crate::model::order`]'s identical helper: `Amount`'s
/// `PartialOrd<u128>` only covers values fitting in a u128.
fn to_u128_lossy(amount: Amount) -> u128 {
    amount.0.try_into().unwrap_or(u128::MAX)
}

//! Price Feed Aggregator (spec §4.2 — component C2).
//!
//! Per-source fan-out with a shared tick deadline is grounded in
//! `autopilot::run_loop::RunLoop::solve`'s `tokio::time::timeout` +
//! `futures::future::join_all` shape; per-source failure isolation is
//! grounded in `gnosis-dex-services`' `ThreadedPriceSource` /
//! `PriorityPriceSource`, reworked onto async tasks instead of OS threads.

use super::cache::PriceCache;
use crate::model::{PricePoint, SourceId, TokenPair};
use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{instrument, warn};

/// One independent price source (e.g. an HTTP oracle client or a chain RPC
/// client). Implementations own their own retry policy; the aggregator
/// never retries a source within a tick (spec §4.3 "adapters are
/// responsible for their own network retries").
#[async_trait]
pub trait PriceSource: Send + Sync {
    fn id(&self) -> SourceId;

    /// Fetches the current price for `pair`. Returning `price <= 0` is
    /// treated the same as an error by the aggregator's rejection
    /// predicate (spec §4.2).
    async fn fetch(&self, pair: &TokenPair) -> anyhow::Result<crate::money::Price>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceSourceOutcome {
    Recorded,
    Rejected,
    Failed,
}

/// Default per-tick deadline shared across all `(pair, source)` calls
/// (spec §4.2 "default 60s").
pub const DEFAULT_TICK_DEADLINE: Duration = Duration::from_secs(60);

/// Upper bound on the jittered inter-call sleep used to avoid bursting a
/// single source with back-to-back requests for different pairs (spec §4.2
/// "small inter-call sleep to avoid bursts"). Each `(pair, source)` call
/// sleeps a uniformly random duration in `[0, DEFAULT_INTER_CALL_SLEEP]` so
/// concurrent ticks don't all hammer a source at the same instant.
pub const DEFAULT_INTER_CALL_SLEEP: Duration = Duration::from_millis(50);

/// Picks a uniformly random duration in `[0, max]`. Computed synchronously,
/// before the caller's `.await`, so the `!Send` `ThreadRng` never has to
/// live across an await point in a `tokio::spawn`ed future.
fn jittered_sleep(max: Duration) -> Duration {
    let max_millis = max.as_millis() as u64;
    if max_millis == 0 {
        return Duration::from_millis(0);
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_millis))
}

pub struct PriceFeedAggregator {
    /// Fixed list of `(pair, source)` combinations polled every tick.
    sources: Vec<(TokenPair, Arc<dyn PriceSource>)>,
    tick_deadline: Duration,
    inter_call_sleep: Duration,
}

impl PriceFeedAggregator {
    pub fn new(sources: Vec<(TokenPair, Arc<dyn PriceSource>)>) -> Self {
        Self {
            sources,
            tick_deadline: DEFAULT_TICK_DEADLINE,
            inter_call_sleep: DEFAULT_INTER_CALL_SLEEP,
        }
    }

    pub fn with_tick_deadline(mut self, deadline: Duration) -> Self {
        self.tick_deadline = deadline;
        self
    }

    pub fn with_inter_call_sleep(mut self, sleep: Duration) -> Self {
        self.inter_call_sleep = sleep;
        self
    }

    /// Runs one polling tick: calls every `(pair, source)` concurrently
    /// under a single shared deadline, rejects non-positive prices without
    /// side effects, and writes every accepted point into `cache` (the
    /// Store write is the caller's responsibility — see
    /// [`crate::store::Store::insert_price_point`]).
    ///
    /// Returns the accepted points and an outcome per `(pair, source)`.
    /// Errors only when every source on every pair failed.
    #[instrument(skip(self, cache))]
    pub async fn tick(
        &self,
        cache: &PriceCache,
    ) -> crate::error::Result<Vec<PricePoint>> {
        let deadline = self.tick_deadline;
        let futures = self.sources.iter().map(|(pair, source)| {
            let pair = pair.clone();
            let source = Arc::clone(source);
            let sleep = jittered_sleep(self.inter_call_sleep);
            async move {
                tokio::time::sleep(sleep).await;
                let result = tokio::time::timeout(deadline, source.fetch(&pair)).await;
                let outcome = match result {
                    Ok(Ok(price)) if !price.is_zero() => Some(Ok(price)),
                    Ok(Ok(_price)) => Some(Err(anyhow::anyhow!("non-positive price"))),
                    Ok(Err(err)) => Some(Err(err)),
                    Err(_) => Some(Err(anyhow::anyhow!("source timed out after tick deadline"))),
                };
                (pair, source.id(), outcome)
            }
        });

        let results = futures::future::join_all(futures).await;
        let now = Utc::now();
        let mut accepted = Vec::new();
        let mut any_success = false;

        for (pair, source_id, outcome) in results {
            match outcome {
                Some(Ok(price)) => {
                    any_success = true;
                    let point = PricePoint {
                        token_pair: pair.clone(),
                        source: source_id,
                        price,
                        volume: None,
                        timestamp: now,
                        chain_id: None,
                    };
                    cache.record(pair, point.clone(), now);
                    accepted.push(point);
                }
                Some(Err(err)) => {
                    warn!(%pair, %source_id, %err, "price source failed this tick");
                }
                None => unreachable!("every branch above produces Some"),
            }
        }

        if !any_success && !self.sources.is_empty() {
            return Err(crate::error::Error::PriceUnavailable(
                "every source failed on every pair this tick".into(),
            ));
        }
        Ok(accepted)
    }
}

//! Adapter Registry (spec §4.3/§4.7 — component C4).
//!
//! Owns the set of per-chain adapters and fans connect/disconnect out to
//! all of them, the way `autopilot::run_loop::RunLoop` fans a single
//! request out across `self.drivers`. The actual cross-chain HTLC pair
//! *orchestration* (create source, persist it, then attempt target) lives
//! in [`crate::orchestrator::Orchestrator`], which alone has `Store`
//! access to make the source leg durable before the target is attempted;
//! this module only validates the safety margin between the two legs.

use super::adapter::{ChainAdapter, CreateHtlcParams};
use crate::model::ChainId;
use chrono::Duration as ChronoDuration;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Safety margin the target HTLC's timeout must be short of the source's
/// (spec §4.7 "safety margin >= 1h wall-clock and >= 100 blocks").
pub const MIN_SAFETY_MARGIN_WALLCLOCK: ChronoDuration = ChronoDuration::hours(1);
pub const MIN_SAFETY_MARGIN_BLOCKS: u64 = 100;

pub struct AdapterRegistry {
    adapters: HashMap<ChainId, Arc<dyn ChainAdapter>>,
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    pub fn register(&mut self, adapter: Arc<dyn ChainAdapter>) {
        self.adapters.insert(adapter.chain_id(), adapter);
    }

    pub fn get(&self, chain_id: &ChainId) -> crate::error::Result<Arc<dyn ChainAdapter>> {
        self.adapters
            .get(chain_id)
            .cloned()
            .ok_or_else(|| crate::error::Error::not_found(format!("no adapter for chain {chain_id}")))
    }

    pub fn chain_ids(&self) -> Vec<ChainId> {
        self.adapters.keys().cloned().collect()
    }

    /// Connects every registered adapter, logging (not failing) on a
    /// per-adapter error so one misconfigured chain doesn't block startup
    /// of the rest (spec §4.7 "connects all on start").
    pub async fn connect_all(&self) {
        let futures = self.adapters.values().map(|adapter| {
            let adapter = Arc::clone(adapter);
            async move {
                let chain_id = adapter.chain_id();
                match adapter.connect().await {
                    Ok(()) => info!(%chain_id, "adapter connected"),
                    Err(err) => error!(%chain_id, %err, "adapter failed to connect"),
                }
            }
        });
        join_all(futures).await;
    }

    pub async fn disconnect_all(&self) {
        let futures = self.adapters.values().map(|adapter| {
            let adapter = Arc::clone(adapter);
            async move {
                let chain_id = adapter.chain_id();
                match adapter.disconnect().await {
                    Ok(()) => info!(%chain_id, "adapter disconnected"),
                    Err(err) => warn!(%chain_id, %err, "adapter failed to disconnect cleanly"),
                }
            }
        });
        join_all(futures).await;
    }

    /// Validates the wall-clock/block safety margin between a cross-chain
    /// HTLC pair's legs (spec §4.7 "Cross-chain HTLC pairing") and, on
    /// success, forces the target leg to commit to the source's secret
    /// hash. Pure — makes no adapter calls; the caller does that itself
    /// with the adjusted params.
    pub fn validate_htlc_pair_margin(
        &self,
        mut target_params: CreateHtlcParams,
        source_params: &CreateHtlcParams,
    ) -> crate::error::Result<CreateHtlcParams> {
        if source_params.time_timeout - target_params.time_timeout < MIN_SAFETY_MARGIN_WALLCLOCK {
            return Err(crate::error::Error::validation(
                "target HTLC wall-clock timeout must be >= 1h shorter than source",
            ));
        }
        if source_params.height_timeout < target_params.height_timeout + MIN_SAFETY_MARGIN_BLOCKS {
            return Err(crate::error::Error::validation(
                "target HTLC height timeout must be >= 100 blocks shorter than source",
            ));
        }
        target_params.hashed_secret = source_params.hashed_secret;
        Ok(target_params)
    }
}

use super::ids::ChainId;
use crate::money::Amount;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainHealth {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

/// spec §3 "Chain Status".
#[derive(Debug, Clone)]
pub struct ChainStatus {
    pub chain_id: ChainId,
    pub enabled: bool,
    pub last_block_height: u64,
    pub last_block_time: Option<DateTime<Utc>>,
    pub avg_block_time_secs: Option<f64>,
    pub gas_price: Option<Amount>,
    pub health: ChainHealth,
    pub last_health_check: Option<DateTime<Utc>>,
}

impl ChainStatus {
    pub fn unknown(chain_id: ChainId) -> Self {
        Self {
            chain_id,
            enabled: false,
            last_block_height: 0,
            last_block_time: None,
            avg_block_time_secs: None,
            gas_price: None,
            health: ChainHealth::Unknown,
            last_health_check: None,
        }
    }
}

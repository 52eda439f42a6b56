use super::ids::{ChainId, SourceId, TokenPair};
use crate::money::Price;
use chrono::{DateTime, Utc};

/// One (timestamp, price) observation from one source for one pair (spec
/// GLOSSARY "Price point", §3 "Price Point").
#[derive(Debug, Clone)]
pub struct PricePoint {
    pub token_pair: TokenPair,
    pub source: SourceId,
    pub price: Price,
    pub volume: Option<Price>,
    pub timestamp: DateTime<Utc>,
    pub chain_id: Option<ChainId>,
}

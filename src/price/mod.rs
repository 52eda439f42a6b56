//! Price Cache (C1) and Price Feed Aggregator (C2) — spec §4.1, §4.2, §4.5.

pub mod aggregator;
pub mod cache;

pub use aggregator::{PriceFeedAggregator, PriceSource, PriceSourceOutcome};
pub use cache::PriceCache;

use crate::model::PricePoint;
use crate::money::Price;
use ruint::aliases::U256;

/// The §4.4 weighted-average TWAP formula, shared by the cache's `twap()`
/// query and any other caller that already has a point slice in hand.
/// Points MUST be in ascending timestamp order.
pub(crate) fn twap_from_points(points: &[PricePoint]) -> Price {
    match points.len() {
        0 => Price::ZERO,
        1 => points[0].price,
        _ => {
            let mut numerator = U256::ZERO;
            let mut total_weight: u64 = 0;
            for (i, p) in points.iter().enumerate() {
                let weight: u64 = if i == 0 {
                    1
                } else {
                    let delta = p.timestamp - points[i - 1].timestamp;
                    delta.num_seconds().max(0) as u64
                };
                if let Some(term) = p.price.checked_mul_weight(weight) {
                    numerator = numerator.saturating_add(term);
                }
                total_weight = total_weight.saturating_add(weight);
            }
            if total_weight == 0 {
                Price::ZERO
            } else {
                Price::from_weighted_ratio(numerator, total_weight)
            }
        }
    }
}

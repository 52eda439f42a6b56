//! In-memory time-indexed price cache (spec §4.1, §4.5 — component C1).
//!
//! Grounded in the `Mutex<Inner>` shape of
//! `autopilot::solvable_orders::SolvableOrdersCache`: a single short-lived
//! critical section guards a plain map, never held across an `.await`.

use crate::model::{PricePoint, TokenPair};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Default retention horizon for price points (spec §4.1 "default 24h").
pub const DEFAULT_MAX_AGE: ChronoDuration = ChronoDuration::hours(24);

struct Inner {
    points: HashMap<TokenPair, VecDeque<PricePoint>>,
}

pub struct PriceCache {
    max_age: ChronoDuration,
    inner: Mutex<Inner>,
}

impl Default for PriceCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_AGE)
    }
}

impl PriceCache {
    pub fn new(max_age: ChronoDuration) -> Self {
        Self {
            max_age,
            inner: Mutex::new(Inner {
                points: HashMap::new(),
            }),
        }
    }

    /// Inserts `point`, keeping the pair's points in ascending timestamp
    /// order, then trims entries older than `now - max_age`.
    pub fn record(&self, pair: TokenPair, point: PricePoint, now: DateTime<Utc>) {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner.points.entry(pair).or_default();
        let insert_at = entry
            .iter()
            .position(|p| p.timestamp > point.timestamp)
            .unwrap_or(entry.len());
        entry.insert(insert_at, point);

        let cutoff = now - self.max_age;
        while matches!(entry.front(), Some(p) if p.timestamp < cutoff) {
            entry.pop_front();
        }
    }

    /// Points with timestamp >= `now - window`, ascending timestamp.
    pub fn points_since(
        &self,
        pair: &TokenPair,
        window: ChronoDuration,
        now: DateTime<Utc>,
    ) -> Vec<PricePoint> {
        let inner = self.inner.lock().unwrap();
        let cutoff = now - window;
        inner
            .points
            .get(pair)
            .map(|points| {
                points
                    .iter()
                    .filter(|p| p.timestamp >= cutoff)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Most recent point for `pair`, or `NotFound` if the pair has none.
    pub fn latest(&self, pair: &TokenPair) -> crate::error::Result<PricePoint> {
        let inner = self.inner.lock().unwrap();
        inner
            .points
            .get(pair)
            .and_then(|points| points.back())
            .cloned()
            .ok_or_else(|| crate::error::Error::not_found(format!("no price points for {pair}")))
    }

    /// `twap(pair, window_minutes)` per spec §4.5: 0 points -> 0; 1 point ->
    /// that point's price; otherwise the §4.4 weighted-average formula.
    pub fn twap(
        &self,
        pair: &TokenPair,
        window_minutes: u32,
        now: DateTime<Utc>,
    ) -> crate::money::Price {
        let window = ChronoDuration::seconds(window_minutes as i64 * 60);
        let points = self.points_since(pair, window, now);
        super::twap_from_points(&points)
    }

    /// `current(pair)`: last point in the last-hour window, or `NotFound`.
    pub fn current(
        &self,
        pair: &TokenPair,
        now: DateTime<Utc>,
    ) -> crate::error::Result<crate::money::Price> {
        let points = self.points_since(pair, ChronoDuration::hours(1), now);
        points
            .last()
            .map(|p| p.price)
            .ok_or_else(|| crate::error::Error::not_found(format!("no recent price for {pair}")))
    }
}

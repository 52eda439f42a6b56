//! Fixed-width, explicit-scale money types. Never floating point for
//! amounts or prices (spec §6, §9 "Money arithmetic").
//!
//! [`Amount`] is a raw 256-bit unscaled integer ("78-digit unscaled
//! integer units" per spec §6). [`Price`] is the same backing integer
//! interpreted as a fixed-point number with 18 fractional digits
//! (scale = 10^18), also per spec §6.

use derive_more::{Add, From, Into, Sub};
use ruint::aliases::U256;
use std::fmt;

/// Fixed-point scale for [`Price`]: 18 fractional digits.
pub const PRICE_SCALE: u128 = 1_000_000_000_000_000_000;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into)]
pub struct Amount(pub U256);

impl Amount {
    pub const ZERO: Amount = Amount(U256::ZERO);

    pub fn from_u128(value: u128) -> Self {
        Self(U256::from(value))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    /// Integer division used for TWAP interval sizing (spec §4.4: "target =
    /// R / J (integer division in fixed-point)").
    pub fn checked_div_u64(self, divisor: u64) -> Option<Self> {
        if divisor == 0 {
            return None;
        }
        Some(Self(self.0 / U256::from(divisor)))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PartialEq<u128> for Amount {
    fn eq(&self, other: &u128) -> bool {
        self.0 == U256::from(*other)
    }
}

impl PartialOrd<u128> for Amount {
    fn partial_cmp(&self, other: &u128) -> Option<std::cmp::Ordering> {
        self.0.partial_cmp(&U256::from(*other))
    }
}

/// A price, fixed-point with [`PRICE_SCALE`] fractional digits.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into, Add, Sub)]
pub struct Price(pub U256);

impl Price {
    pub const ZERO: Price = Price(U256::ZERO);

    /// Constructs a price from an integer "whole units" value, e.g.
    /// `Price::from_whole(2000)` is 2000.0 in fixed point.
    pub fn from_whole(value: u128) -> Self {
        Self(U256::from(value) * U256::from(PRICE_SCALE))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// `self * weight`, used by the weighted-average TWAP formula. Weight is
    /// a plain (non-fixed-point) integer (a duration in seconds, or 1 for
    /// the sentinel first weight).
    pub fn checked_mul_weight(self, weight: u64) -> Option<U256> {
        self.0.checked_mul(U256::from(weight))
    }

    /// `numerator / denominator`, used to finish the weighted average.
    /// `numerator` is expressed in `price * weight` units; dividing by the
    /// total weight yields a `Price` again.
    pub fn from_weighted_ratio(numerator: U256, denominator: u64) -> Self {
        if denominator == 0 {
            return Price::ZERO;
        }
        Self(numerator / U256::from(denominator))
    }

    /// Amount-weighted running average used by §4.4 step 4:
    /// `new_avg = (old_avg*old_executed + exec_price*exec_amount) / (old_executed + exec_amount)`.
    pub fn weighted_average(
        old_avg: Price,
        old_executed: Amount,
        exec_price: Price,
        exec_amount: Amount,
    ) -> Option<Price> {
        let total_executed = old_executed.checked_add(exec_amount)?;
        if total_executed.is_zero() {
            return Some(Price::ZERO);
        }
        // old_avg and exec_price already carry PRICE_SCALE; multiplying by an
        // Amount and dividing by the (unscaled) total amount preserves scale.
        let lhs = old_avg.0.checked_mul(old_executed.0)?;
        let rhs = exec_price.0.checked_mul(exec_amount.0)?;
        let numerator = lhs.checked_add(rhs)?;
        Some(Price(numerator / total_executed.0))
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `slippage_bps = floor(|expected - actual| * 10000 / expected)`; 0 when
/// `expected` is 0 (spec §4.4 "Slippage").
pub fn slippage_bps(expected: Price, actual: Price) -> u32 {
    if expected.is_zero() {
        return 0;
    }
    let diff = if expected.0 > actual.0 {
        expected.0 - actual.0
    } else {
        actual.0 - expected.0
    };
    let bps = diff.saturating_mul(U256::from(10_000u32)) / expected.0;
    bps.try_into().unwrap_or(u32::MAX)
}

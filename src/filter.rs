//! Consistency filtering of hypotheses against recorded prices.
//!
//! A hypothesis survives iff every recorded sell price falls inside the
//! absolute range it implies for that slot. Checks are per slot and
//! independent, so adding observations can only remove survivors.

use std::borrow::Borrow;

use serde::{Deserialize, Serialize};

use crate::hypothesis::Hypothesis;
use crate::model::SlotBounds;
use crate::record::{BuyPrice, Slot, WeeklyRecord};
use crate::{ForecastError, Result};

/// Absorbs float error in `buy * multiplier` before rounding.
const ROUNDING_EPSILON: f64 = 1e-9;

/// Inclusive integer price range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PriceRange {
    pub low: u32,
    pub high: u32,
}

impl PriceRange {
    pub const fn new(low: u32, high: u32) -> Self {
        Self { low, high }
    }

    /// Degenerate range for a known price.
    pub const fn exact(price: u32) -> Self {
        Self { low: price, high: price }
    }

    #[inline]
    pub fn contains(&self, price: u32) -> bool {
        (self.low..=self.high).contains(&price)
    }

    #[inline]
    pub fn is_exact(&self) -> bool {
        self.low == self.high
    }

    /// Smallest range covering both.
    pub fn union(self, other: PriceRange) -> PriceRange {
        PriceRange {
            low: self.low.min(other.low),
            high: self.high.max(other.high),
        }
    }
}

/// Checks hypotheses against a buy price and the recorded sell prices.
#[derive(Debug, Clone)]
pub struct ConsistencyFilter {
    buy_price: BuyPrice,
    observations: Vec<(Slot, u32)>,
}

impl ConsistencyFilter {
    /// Fails with `InsufficientData` when no buy price is recorded.
    pub fn new(
        buy_price: Option<BuyPrice>,
        observations: impl IntoIterator<Item = (Slot, u32)>,
    ) -> Result<Self> {
        let buy_price = buy_price.ok_or(ForecastError::InsufficientData(
            "buy price is required to evaluate hypotheses",
        ))?;
        Ok(Self {
            buy_price,
            observations: observations.into_iter().collect(),
        })
    }

    pub fn from_record(record: &WeeklyRecord) -> Result<Self> {
        Self::new(record.buy_price, record.observations())
    }

    #[inline]
    pub fn buy_price(&self) -> BuyPrice {
        self.buy_price
    }

    pub fn observations(&self) -> &[(Slot, u32)] {
        &self.observations
    }

    /// Absolute price range implied by multiplier bounds.
    ///
    /// Low bound is floored, high bound ceiled, then shifted by the offset.
    pub fn price_range(&self, bounds: &SlotBounds) -> PriceRange {
        let base = self.buy_price.get() as f64;
        let offset = bounds.offset as i64;
        let low = (base * bounds.low + ROUNDING_EPSILON).floor() as i64 + offset;
        let high = (base * bounds.high - ROUNDING_EPSILON).ceil() as i64 + offset;
        let low = low.clamp(0, u32::MAX as i64) as u32;
        let high = high.clamp(low as i64, u32::MAX as i64) as u32;
        PriceRange { low, high }
    }

    /// True if every observed price fits the hypothesis.
    pub fn is_consistent(&self, hypothesis: &Hypothesis) -> bool {
        self.observations.iter().all(|&(slot, price)| {
            self.price_range(hypothesis.bounds_at(slot)).contains(price)
        })
    }

    /// Lazily keep the consistent hypotheses.
    pub fn apply<'f, I, H>(&'f self, hypotheses: I) -> impl Iterator<Item = H> + 'f
    where
        I: IntoIterator<Item = H>,
        I::IntoIter: 'f,
        H: Borrow<Hypothesis>,
    {
        hypotheses
            .into_iter()
            .filter(move |h| self.is_consistent(h.borrow()))
    }
}

// ============================================================
// TESTS
// ============================================================

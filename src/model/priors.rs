//! Pattern probabilities and the week-to-week transition table.

use serde::{Deserialize, Serialize};

use crate::{ForecastError, Pattern, Result};

/// Tolerance for a probability row summing to one.
pub const SUM_TOLERANCE: f64 = 1e-6;

/// Probability (or unnormalized weight) per concrete pattern.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternDistribution {
    #[serde(default)]
    pub fluctuating: f64,
    #[serde(default)]
    pub large_spike: f64,
    #[serde(default)]
    pub decreasing: f64,
    #[serde(default)]
    pub small_spike: f64,
}

impl PatternDistribution {
    pub const fn new(fluctuating: f64, large_spike: f64, decreasing: f64, small_spike: f64) -> Self {
        Self {
            fluctuating,
            large_spike,
            decreasing,
            small_spike,
        }
    }

    /// Weight of `pattern`; `Unknown` always has zero weight.
    #[inline]
    pub fn get(&self, pattern: Pattern) -> f64 {
        match pattern {
            Pattern::Fluctuating => self.fluctuating,
            Pattern::LargeSpike => self.large_spike,
            Pattern::Decreasing => self.decreasing,
            Pattern::SmallSpike => self.small_spike,
            Pattern::Unknown => 0.0,
        }
    }

    /// Set the weight of a concrete pattern. `Unknown` is ignored.
    pub fn set(&mut self, pattern: Pattern, weight: f64) {
        match pattern {
            Pattern::Fluctuating => self.fluctuating = weight,
            Pattern::LargeSpike => self.large_spike = weight,
            Pattern::Decreasing => self.decreasing = weight,
            Pattern::SmallSpike => self.small_spike = weight,
            Pattern::Unknown => {},
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Pattern, f64)> + '_ {
        Pattern::CONCRETE.into_iter().map(move |p| (p, self.get(p)))
    }

    pub fn total(&self) -> f64 {
        self.iter().map(|(_, w)| w).sum()
    }

    /// Scale to sum to one. An all-zero distribution stays all zero.
    pub fn normalized(&self) -> Self {
        let total = self.total();
        if total <= 0.0 {
            return Self::default();
        }
        let mut out = Self::default();
        for (pattern, weight) in self.iter() {
            out.set(pattern, weight / total);
        }
        out
    }

    /// Most probable pattern, ties broken by `Pattern::CONCRETE` order.
    pub fn most_likely(&self) -> Option<(Pattern, f64)> {
        self.iter()
            .filter(|&(_, w)| w > 0.0)
            .fold(None, |best: Option<(Pattern, f64)>, (p, w)| match best {
                Some((_, bw)) if bw >= w => best,
                _ => Some((p, w)),
            })
    }

    fn validate(&self, row: &str) -> Result<()> {
        for (pattern, weight) in self.iter() {
            if !weight.is_finite() || weight < 0.0 {
                return Err(ForecastError::InvalidConfig(format!(
                    "prior row {row}: {pattern} weight {weight} is not a probability"
                )));
            }
        }
        let total = self.total();
        if (total - 1.0).abs() > SUM_TOLERANCE {
            return Err(ForecastError::InvalidConfig(format!(
                "prior row {row} sums to {total}, expected 1"
            )));
        }
        Ok(())
    }
}

/// Transition priors keyed by last week's pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorTable {
    /// Used when last week's pattern is unknown
    pub unknown: PatternDistribution,
    /// Used for a participant's first week; never lands on `Decreasing`
    pub first_participation: PatternDistribution,
    pub after_fluctuating: PatternDistribution,
    pub after_large_spike: PatternDistribution,
    pub after_decreasing: PatternDistribution,
    pub after_small_spike: PatternDistribution,
}

impl PriorTable {
    /// Row for the given participant history.
    ///
    /// A first-time participant has no meaningful previous week, so the flag
    /// takes precedence over `previous`.
    pub fn row(&self, first_participation: bool, previous: Option<Pattern>) -> &PatternDistribution {
        if first_participation {
            return &self.first_participation;
        }
        match previous {
            Some(Pattern::Fluctuating) => &self.after_fluctuating,
            Some(Pattern::LargeSpike) => &self.after_large_spike,
            Some(Pattern::Decreasing) => &self.after_decreasing,
            Some(Pattern::SmallSpike) => &self.after_small_spike,
            Some(Pattern::Unknown) | None => &self.unknown,
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        self.unknown.validate("unknown")?;
        self.first_participation.validate("first_participation")?;
        self.after_fluctuating.validate("after_fluctuating")?;
        self.after_large_spike.validate("after_large_spike")?;
        self.after_decreasing.validate("after_decreasing")?;
        self.after_small_spike.validate("after_small_spike")?;

        if self.first_participation.decreasing != 0.0 {
            return Err(ForecastError::InvalidConfig(
                "prior row first_participation must give Decreasing zero weight".into(),
            ));
        }
        Ok(())
    }
}

// ============================================================
// TESTS
// ============================================================

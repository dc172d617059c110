//! Pattern model: static knowledge about how weekly prices are generated.
//!
//! # Contents
//!
//! - **Phases**: for each concrete pattern, the ordered trend segments, their
//!   length domains and multiplier bands
//! - **Priors**: the transition table from last week's pattern (or a first
//!   week) to this week's pattern
//! - **Defaults**: the builtin table, shared process-wide
//!
//! A [`PatternModel`] is plain data. It is checked once by
//! [`PatternModel::validate`] when an engine is built, never per forecast.

mod defaults;
pub mod phases;
pub mod priors;

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

pub use phases::{Decay, LengthConstraint, LengthDomain, PatternSpec, PhaseSpec, SlotBounds};
pub use priors::{PatternDistribution, PriorTable};

use crate::hypothesis::Compositions;
use crate::{ForecastError, Pattern, Result};

/// Phase structures for all concrete patterns plus their priors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternModel {
    pub patterns: Vec<PatternSpec>,
    pub priors: PriorTable,
}

static BUILTIN: OnceLock<PatternModel> = OnceLock::new();

impl PatternModel {
    /// Build and validate a model.
    pub fn new(patterns: Vec<PatternSpec>, priors: PriorTable) -> Result<Self> {
        let model = Self { patterns, priors };
        model.validate()?;
        Ok(model)
    }

    /// The builtin model, created on first use.
    pub fn builtin() -> &'static PatternModel {
        BUILTIN.get_or_init(|| PatternModel {
            patterns: defaults::builtin_patterns(),
            priors: defaults::builtin_priors(),
        })
    }

    /// Full phase structure of a concrete pattern.
    pub fn spec_for(&self, pattern: Pattern) -> Result<&PatternSpec> {
        if !pattern.is_concrete() {
            return Err(ForecastError::InvalidPattern(pattern));
        }
        self.patterns
            .iter()
            .find(|spec| spec.pattern == pattern)
            .ok_or_else(|| ForecastError::InvalidConfig(format!("no phases defined for {pattern}")))
    }

    /// Ordered phases of a concrete pattern.
    pub fn phases_for(&self, pattern: Pattern) -> Result<&[PhaseSpec]> {
        self.spec_for(pattern).map(|spec| spec.phases.as_slice())
    }

    /// Prior over this week's pattern.
    pub fn pattern_prior(
        &self,
        first_participation: bool,
        previous_pattern: Option<Pattern>,
    ) -> PatternDistribution {
        *self.priors.row(first_participation, previous_pattern)
    }

    /// Check the whole model.
    ///
    /// Every concrete pattern needs exactly one valid phase structure with at
    /// least one composition covering the week; every prior row must be a
    /// probability distribution.
    pub fn validate(&self) -> Result<()> {
        for pattern in Pattern::CONCRETE {
            let count = self.patterns.iter().filter(|s| s.pattern == pattern).count();
            if count != 1 {
                return Err(ForecastError::InvalidConfig(format!(
                    "{pattern} must be defined exactly once, found {count}"
                )));
            }
        }

        for spec in &self.patterns {
            spec.validate()?;
            if Compositions::new(spec).next().is_none() {
                return Err(ForecastError::InvalidConfig(format!(
                    "{} phase lengths cannot cover {} slots",
                    spec.pattern,
                    crate::SLOTS
                )));
            }
        }

        self.priors.validate()
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_is_valid() {
        assert!(PatternModel::builtin().validate().is_ok());
    }

    #[test]
    fn test_builtin_is_shared() {
        let a = PatternModel::builtin() as *const PatternModel;
        let b = PatternModel::builtin() as *const PatternModel;
        assert_eq!(a, b);
    }

    #[test]
    fn test_phases_for_unknown_fails() {
        let model = PatternModel::builtin();
        assert!(matches!(
            model.phases_for(Pattern::Unknown),
            Err(ForecastError::InvalidPattern(Pattern::Unknown))
        ));
    }

    #[test]
    fn test_phases_for_concrete() {
        let model = PatternModel::builtin();
        assert_eq!(model.phases_for(Pattern::Decreasing).unwrap().len(), 1);
        assert_eq!(model.phases_for(Pattern::LargeSpike).unwrap().len(), 7);
        assert_eq!(model.phases_for(Pattern::SmallSpike).unwrap().len(), 6);
        assert_eq!(model.phases_for(Pattern::Fluctuating).unwrap().len(), 5);
    }

    #[test]
    fn test_priors_sum_to_one() {
        let model = PatternModel::builtin();
        let histories = [
            (false, None),
            (false, Some(Pattern::Unknown)),
            (false, Some(Pattern::Fluctuating)),
            (false, Some(Pattern::LargeSpike)),
            (false, Some(Pattern::Decreasing)),
            (false, Some(Pattern::SmallSpike)),
            (true, None),
        ];
        for (first, previous) in histories {
            let prior = model.pattern_prior(first, previous);
            assert!((prior.total() - 1.0).abs() < 1e-9, "{first} {previous:?}");
        }
    }

    #[test]
    fn test_first_participation_excludes_decreasing() {
        let model = PatternModel::builtin();
        for previous in [None, Some(Pattern::Decreasing), Some(Pattern::LargeSpike)] {
            assert_eq!(model.pattern_prior(true, previous).decreasing, 0.0);
        }
    }

    #[test]
    fn test_missing_pattern_rejected() {
        let mut patterns = defaults::builtin_patterns();
        patterns.retain(|spec| spec.pattern != Pattern::SmallSpike);
        let result = PatternModel::new(patterns, defaults::builtin_priors());
        assert!(matches!(result, Err(ForecastError::InvalidConfig(_))));
    }

    #[test]
    fn test_uncoverable_week_rejected() {
        let mut patterns = defaults::builtin_patterns();
        patterns.retain(|spec| spec.pattern != Pattern::Decreasing);
        patterns.push(PatternSpec::new(
            Pattern::Decreasing,
            [PhaseSpec::new(LengthDomain::range(1, 5), 0.85, 0.9)],
        ));
        let err = PatternModel::new(patterns, defaults::builtin_priors()).unwrap_err();
        assert!(err.to_string().contains("cannot cover"));
    }
}

//! Hypothesis generation
//!
//! A hypothesis fixes the length of every phase of one pattern. The generator
//! walks all phase-length combinations in lexicographic order and keeps the
//! ones that cover the week exactly. Spaces are tiny (dozens of combinations
//! per pattern), so the search is exhaustive and pruning is left to the
//! consistency filter.

use serde::Serialize;

use crate::model::{PatternModel, PatternSpec, SlotBounds};
use crate::record::Slot;
use crate::{Pattern, Result, SLOTS};

/// One concrete phase layout of a pattern.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hypothesis {
    pub pattern: Pattern,
    pub phase_lengths: Vec<usize>,
    pub bounds: [SlotBounds; SLOTS],
    /// Phase-length prior within the pattern
    pub prior: f64,
}

impl Hypothesis {
    #[inline]
    pub fn bounds_at(&self, slot: Slot) -> &SlotBounds {
        &self.bounds[slot.index()]
    }
}

// ============================================================
// COMPOSITIONS
// ============================================================

/// Admissible phase-length vectors of a pattern, in lexicographic order.
#[derive(Debug, Clone)]
pub struct Compositions<'a> {
    spec: &'a PatternSpec,
    lengths: Vec<usize>,
    exhausted: bool,
}

impl<'a> Compositions<'a> {
    pub fn new(spec: &'a PatternSpec) -> Self {
        let exhausted =
            spec.phases.is_empty() || spec.phases.iter().any(|p| p.length.min > p.length.max);
        Self {
            spec,
            lengths: spec.phases.iter().map(|p| p.length.min).collect(),
            exhausted,
        }
    }

    // odometer step, last phase fastest
    fn advance(&mut self) {
        for (len, phase) in self.lengths.iter_mut().zip(&self.spec.phases).rev() {
            if *len < phase.length.max {
                *len += 1;
                return;
            }
            *len = phase.length.min;
        }
        self.exhausted = true;
    }
}

impl Iterator for Compositions<'_> {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.exhausted {
            let candidate = self.lengths.clone();
            self.advance();
            if self.spec.admits(&candidate) {
                return Some(candidate);
            }
        }
        None
    }
}

// ============================================================
// GENERATOR
// ============================================================

/// Lazy sequence of every hypothesis of one pattern.
///
/// Phase-length priors are uniform over the admissible combinations.
#[derive(Debug, Clone)]
pub struct HypothesisGenerator<'a> {
    spec: &'a PatternSpec,
    compositions: Compositions<'a>,
    total: usize,
    remaining: usize,
    prior: f64,
}

impl<'a> HypothesisGenerator<'a> {
    pub fn new(spec: &'a PatternSpec) -> Self {
        let total = Compositions::new(spec).count();
        let prior = if total == 0 { 0.0 } else { 1.0 / total as f64 };
        Self {
            spec,
            compositions: Compositions::new(spec),
            total,
            remaining: total,
            prior,
        }
    }

    /// Generator for a pattern of `model`. Fails for `Unknown`.
    pub fn for_pattern(model: &'a PatternModel, pattern: Pattern) -> Result<Self> {
        model.spec_for(pattern).map(Self::new)
    }

    /// Number of admissible combinations, independent of iteration progress.
    #[inline]
    pub fn total(&self) -> usize {
        self.total
    }

    #[inline]
    pub fn pattern(&self) -> Pattern {
        self.spec.pattern
    }
}

impl Iterator for HypothesisGenerator<'_> {
    type Item = Hypothesis;

    fn next(&mut self) -> Option<Hypothesis> {
        let lengths = self.compositions.next()?;
        self.remaining = self.remaining.saturating_sub(1);
        Some(Hypothesis {
            pattern: self.spec.pattern,
            bounds: self.spec.slot_bounds(&lengths),
            phase_lengths: lengths,
            prior: self.prior,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for HypothesisGenerator<'_> {}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LengthDomain, PhaseSpec};

    fn generator(pattern: Pattern) -> HypothesisGenerator<'static> {
        HypothesisGenerator::for_pattern(PatternModel::builtin(), pattern).unwrap()
    }

    #[test]
    fn test_builtin_counts() {
        assert_eq!(generator(Pattern::Decreasing).total(), 1);
        assert_eq!(generator(Pattern::LargeSpike).total(), 7);
        assert_eq!(generator(Pattern::SmallSpike).total(), 8);
        assert_eq!(generator(Pattern::Fluctuating).total(), 56);
    }

    #[test]
    fn test_unknown_rejected() {
        assert!(HypothesisGenerator::for_pattern(PatternModel::builtin(), Pattern::Unknown).is_err());
    }

    #[test]
    fn test_every_hypothesis_covers_week() {
        for pattern in Pattern::CONCRETE {
            for h in generator(pattern) {
                assert_eq!(h.phase_lengths.iter().sum::<usize>(), SLOTS);
                assert_eq!(h.pattern, pattern);
                assert!(h.bounds.iter().all(|b| b.low <= b.high));
            }
        }
    }

    #[test]
    fn test_priors_uniform_and_sum_to_one() {
        for pattern in Pattern::CONCRETE {
            let g = generator(pattern);
            let expected = 1.0 / g.total() as f64;
            let hypotheses: Vec<Hypothesis> = g.collect();
            assert!(hypotheses.iter().all(|h| h.prior == expected));
            let sum: f64 = hypotheses.iter().map(|h| h.prior).sum();
            assert!((sum - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_exact_size() {
        let mut g = generator(Pattern::SmallSpike);
        assert_eq!(g.len(), 8);
        g.next();
        assert_eq!(g.len(), 7);
        assert_eq!(g.total(), 8);
        assert_eq!(g.count(), 7);
    }

    #[test]
    fn test_lexicographic_order() {
        let lengths: Vec<Vec<usize>> = generator(Pattern::LargeSpike)
            .map(|h| h.phase_lengths)
            .collect();
        assert_eq!(lengths.first().unwrap(), &vec![1, 1, 1, 1, 1, 1, 6]);
        assert_eq!(lengths.last().unwrap(), &vec![7, 1, 1, 1, 1, 1, 0]);
        assert!(lengths.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_large_spike_peak_position() {
        // run-up of 3 puts the 6x peak on Wednesday afternoon
        let h = generator(Pattern::LargeSpike)
            .find(|h| h.phase_lengths[0] == 3)
            .unwrap();
        assert_eq!(h.bounds[5].high, 6.0);
        assert_eq!(h.bounds[2].low, 0.85 - 2.0 * 0.05);
    }

    #[test]
    fn test_fluctuating_dips_total_five() {
        for h in generator(Pattern::Fluctuating) {
            assert_eq!(h.phase_lengths[1] + h.phase_lengths[3], 5);
            assert!(h.phase_lengths[2] >= 1);
        }
    }

    #[test]
    fn test_generation_is_deterministic() {
        let a: Vec<Hypothesis> = generator(Pattern::Fluctuating).collect();
        let b: Vec<Hypothesis> = generator(Pattern::Fluctuating).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_space() {
        let spec = PatternSpec::new(
            Pattern::Decreasing,
            [PhaseSpec::new(LengthDomain::range(1, 5), 0.85, 0.9)],
        );
        let g = HypothesisGenerator::new(&spec);
        assert_eq!(g.total(), 0);
        assert_eq!(g.count(), 0);
    }
}

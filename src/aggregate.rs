//! Range aggregation over surviving hypotheses.
//!
//! Each pattern is tallied separately: how much of its phase-length prior
//! survived filtering, and the price envelope of its survivors per slot. The
//! tallies are then weighted by the pattern prior into a posterior and a
//! combined cross-pattern envelope.

use serde::{Deserialize, Serialize};

use crate::filter::{ConsistencyFilter, PriceRange};
use crate::hypothesis::Hypothesis;
use crate::model::PatternDistribution;
use crate::record::{Slot, WeeklyRecord};
use crate::{Pattern, SLOTS};

// ============================================================
// SLOT FORECAST
// ============================================================

/// Forecast for one half-day slot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlotForecast {
    pub slot: Slot,
    /// `None` when no pattern is left to forecast from
    pub range: Option<PriceRange>,
    pub most_likely: Option<f64>,
    /// Recorded rather than predicted
    pub observed: bool,
}

impl SlotForecast {
    pub fn observed(slot: Slot, price: u32) -> Self {
        Self {
            slot,
            range: Some(PriceRange::exact(price)),
            most_likely: Some(price as f64),
            observed: true,
        }
    }

    /// The recorded price, for observed slots.
    pub fn observed_price(&self) -> Option<u32> {
        if self.observed {
            self.range.map(|r| r.low)
        } else {
            None
        }
    }
}

/// Forecast restricted to one pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternForecast {
    pub pattern: Pattern,
    pub prior: f64,
    pub posterior: f64,
    /// Hypotheses generated for the pattern
    pub total: usize,
    /// Hypotheses consistent with the observations
    pub surviving: usize,
    /// Per-slot ranges; empty when the posterior is zero
    pub slots: Vec<SlotForecast>,
}

impl PatternForecast {
    #[inline]
    pub fn is_possible(&self) -> bool {
        self.posterior > 0.0
    }
}

// ============================================================
// TALLY
// ============================================================

/// Running totals for one pattern's hypotheses.
#[derive(Debug, Clone)]
pub struct PatternTally {
    pattern: Pattern,
    total: usize,
    surviving: usize,
    total_weight: f64,
    surviving_weight: f64,
    ranges: [Option<PriceRange>; SLOTS],
    weighted_mid: [f64; SLOTS],
}

impl PatternTally {
    pub fn new(pattern: Pattern) -> Self {
        Self {
            pattern,
            total: 0,
            surviving: 0,
            total_weight: 0.0,
            surviving_weight: 0.0,
            ranges: [None; SLOTS],
            weighted_mid: [0.0; SLOTS],
        }
    }

    /// Tally every hypothesis of a pattern through `filter`.
    pub fn from_hypotheses<'h>(
        pattern: Pattern,
        hypotheses: impl IntoIterator<Item = &'h Hypothesis>,
        filter: &ConsistencyFilter,
    ) -> Self {
        let mut tally = Self::new(pattern);
        for hypothesis in hypotheses {
            tally.add(hypothesis, filter);
        }
        tally
    }

    /// Count a hypothesis; survivors also extend the slot envelope.
    ///
    /// Returns whether the hypothesis survived.
    pub fn add(&mut self, hypothesis: &Hypothesis, filter: &ConsistencyFilter) -> bool {
        self.total += 1;
        self.total_weight += hypothesis.prior;

        if !filter.is_consistent(hypothesis) {
            return false;
        }

        self.surviving += 1;
        self.surviving_weight += hypothesis.prior;
        for slot in Slot::all() {
            let i = slot.index();
            let range = filter.price_range(hypothesis.bounds_at(slot));
            self.ranges[i] = Some(match self.ranges[i] {
                Some(existing) => existing.union(range),
                None => range,
            });
            self.weighted_mid[i] += hypothesis.prior * (range.low as f64 + range.high as f64) / 2.0;
        }
        true
    }

    #[inline]
    pub fn pattern(&self) -> Pattern {
        self.pattern
    }

    #[inline]
    pub fn total(&self) -> usize {
        self.total
    }

    #[inline]
    pub fn surviving(&self) -> usize {
        self.surviving
    }

    /// Surviving share of the pattern's phase-length prior, measured against
    /// everything generated rather than just the survivors.
    pub fn surviving_share(&self) -> f64 {
        if self.total_weight > 0.0 {
            self.surviving_weight / self.total_weight
        } else {
            0.0
        }
    }

    fn slot_forecast(&self, slot: Slot, observed: Option<u32>) -> SlotForecast {
        if let Some(price) = observed {
            return SlotForecast::observed(slot, price);
        }
        let i = slot.index();
        SlotForecast {
            slot,
            range: self.ranges[i],
            most_likely: (self.surviving_weight > 0.0)
                .then(|| self.weighted_mid[i] / self.surviving_weight),
            observed: false,
        }
    }
}

// ============================================================
// AGGREGATOR
// ============================================================

/// Posterior plus per-pattern forecasts.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub posterior: PatternDistribution,
    pub patterns: Vec<PatternForecast>,
}

/// Combines pattern tallies into forecasts.
#[derive(Debug, Clone, Copy)]
pub struct RangeAggregator {
    observed: [Option<u32>; SLOTS],
}

impl RangeAggregator {
    pub fn new(observed: [Option<u32>; SLOTS]) -> Self {
        Self { observed }
    }

    pub fn from_record(record: &WeeklyRecord) -> Self {
        Self::new(record.sell_prices)
    }

    /// Weight each tally by its prior and normalize over the candidates.
    ///
    /// Patterns absent from `tallies` get zero posterior. A pattern with no
    /// survivors, or with zero prior, gets exactly zero and no slot ranges.
    pub fn aggregate(&self, tallies: &[PatternTally], prior: &PatternDistribution) -> Aggregate {
        let mut weights = PatternDistribution::default();
        for tally in tallies {
            weights.set(tally.pattern, prior.get(tally.pattern) * tally.surviving_share());
        }
        let posterior = weights.normalized();

        let patterns = tallies
            .iter()
            .map(|tally| {
                let p = posterior.get(tally.pattern);
                let slots = if p > 0.0 {
                    Slot::all()
                        .map(|slot| tally.slot_forecast(slot, self.observed[slot.index()]))
                        .collect()
                } else {
                    Vec::new()
                };
                PatternForecast {
                    pattern: tally.pattern,
                    prior: prior.get(tally.pattern),
                    posterior: p,
                    total: tally.total,
                    surviving: tally.surviving,
                    slots,
                }
            })
            .collect();

        Aggregate { posterior, patterns }
    }

    /// Cross-pattern envelope over patterns with posterior >= `min_probability`.
    ///
    /// Ranges are the union of the included patterns' ranges; the most likely
    /// price is their posterior-weighted mean. Observed slots stay exact. When
    /// no possible pattern clears the threshold the most probable one is kept,
    /// so a consistent week always gets a range for every slot.
    pub fn envelope(&self, patterns: &[PatternForecast], min_probability: f64) -> [SlotForecast; SLOTS] {
        let mut included: Vec<&PatternForecast> = patterns
            .iter()
            .filter(|p| p.is_possible() && p.posterior >= min_probability)
            .collect();
        if included.is_empty() {
            included.extend(
                patterns
                    .iter()
                    .filter(|p| p.is_possible())
                    .max_by(|a, b| a.posterior.total_cmp(&b.posterior)),
            );
        }
        let mass: f64 = included.iter().map(|p| p.posterior).sum();

        std::array::from_fn(|i| {
            let slot = Slot::ALL[i];
            if let Some(price) = self.observed[i] {
                return SlotForecast::observed(slot, price);
            }

            let mut range: Option<PriceRange> = None;
            let mut weighted = 0.0;
            for pattern in &included {
                let Some(forecast) = pattern.slots.get(i) else {
                    continue;
                };
                if let Some(r) = forecast.range {
                    range = Some(range.map_or(r, |acc| acc.union(r)));
                }
                if let Some(ml) = forecast.most_likely {
                    weighted += pattern.posterior * ml;
                }
            }

            SlotForecast {
                slot,
                range,
                most_likely: (range.is_some() && mass > 0.0).then(|| weighted / mass),
                observed: false,
            }
        })
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hypothesis::HypothesisGenerator;
    use crate::model::PatternModel;
    use crate::record::BuyPrice;

    fn hypotheses(pattern: Pattern) -> Vec<Hypothesis> {
        HypothesisGenerator::for_pattern(PatternModel::builtin(), pattern)
            .unwrap()
            .collect()
    }

    fn filter(obs: &[(usize, u32)]) -> ConsistencyFilter {
        ConsistencyFilter::new(
            Some(BuyPrice::new(100).unwrap()),
            obs.iter().map(|&(i, p)| (Slot::new(i).unwrap(), p)),
        )
        .unwrap()
    }

    fn tallies(f: &ConsistencyFilter) -> Vec<PatternTally> {
        Pattern::CONCRETE
            .into_iter()
            .map(|p| PatternTally::from_hypotheses(p, &hypotheses(p), f))
            .collect()
    }

    fn observed(obs: &[(usize, u32)]) -> [Option<u32>; SLOTS] {
        let mut out = [None; SLOTS];
        for &(i, p) in obs {
            out[i] = Some(p);
        }
        out
    }

    #[test]
    fn test_tally_counts() {
        let f = filter(&[]);
        let tally = PatternTally::from_hypotheses(Pattern::Fluctuating, &hypotheses(Pattern::Fluctuating), &f);
        assert_eq!(tally.total(), 56);
        assert_eq!(tally.surviving(), 56);
        assert!((tally.surviving_share() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_posterior_equals_prior_without_observations() {
        let f = filter(&[]);
        let prior = PatternModel::builtin().pattern_prior(false, None);
        let agg = RangeAggregator::new([None; SLOTS]).aggregate(&tallies(&f), &prior);
        for pattern in Pattern::CONCRETE {
            assert!((agg.posterior.get(pattern) - prior.get(pattern)).abs() < 1e-9);
        }
    }

    #[test]
    fn test_eliminated_pattern_has_zero_posterior() {
        let obs = [(0, 88), (1, 130)];
        let f = filter(&obs);
        let prior = PatternModel::builtin().pattern_prior(false, None);
        let agg = RangeAggregator::new(observed(&obs)).aggregate(&tallies(&f), &prior);

        assert_eq!(agg.posterior.decreasing, 0.0);
        assert!((agg.posterior.total() - 1.0).abs() < 1e-9);
        let decreasing = agg
            .patterns
            .iter()
            .find(|p| p.pattern == Pattern::Decreasing)
            .unwrap();
        assert_eq!(decreasing.surviving, 0);
        assert!(decreasing.slots.is_empty());
    }

    #[test]
    fn test_nothing_survives() {
        // no pattern reaches 10x
        let obs = [(4, 1000)];
        let f = filter(&obs);
        let prior = PatternModel::builtin().pattern_prior(false, None);
        let aggregator = RangeAggregator::new(observed(&obs));
        let agg = aggregator.aggregate(&tallies(&f), &prior);
        assert_eq!(agg.posterior.total(), 0.0);

        let envelope = aggregator.envelope(&agg.patterns, 0.0);
        assert_eq!(envelope[4].range, Some(PriceRange::exact(1000)));
        assert_eq!(envelope[5].range, None);
        assert_eq!(envelope[5].most_likely, None);
    }

    #[test]
    fn test_envelope_covers_pattern_ranges() {
        let obs = [(0, 87)];
        let f = filter(&obs);
        let prior = PatternModel::builtin().pattern_prior(false, None);
        let aggregator = RangeAggregator::new(observed(&obs));
        let agg = aggregator.aggregate(&tallies(&f), &prior);
        let envelope = aggregator.envelope(&agg.patterns, 0.0);

        assert_eq!(envelope[0], SlotForecast::observed(Slot::new(0).unwrap(), 87));
        for pattern in agg.patterns.iter().filter(|p| p.is_possible()) {
            for (i, slot) in pattern.slots.iter().enumerate().skip(1) {
                let env = envelope[i].range.unwrap();
                let own = slot.range.unwrap();
                assert!(env.low <= own.low && env.high >= own.high);
            }
        }
        for slot in &envelope[1..] {
            let range = slot.range.unwrap();
            let ml = slot.most_likely.unwrap();
            assert!(range.low as f64 <= ml && ml <= range.high as f64);
        }
    }

    #[test]
    fn test_threshold_drops_unlikely_patterns() {
        let f = filter(&[]);
        let prior = PatternModel::builtin().pattern_prior(false, None);
        let aggregator = RangeAggregator::new([None; SLOTS]);
        let agg = aggregator.aggregate(&tallies(&f), &prior);

        let all = aggregator.envelope(&agg.patterns, 0.0);
        let likely = aggregator.envelope(&agg.patterns, 0.2);
        // the 6x peak belongs to LargeSpike alone, which stays above 0.2
        assert_eq!(all[6].range, likely[6].range);
        // dropping Decreasing (prior ~0.15) can only narrow the envelope
        assert!(likely[11].range.unwrap().high <= all[11].range.unwrap().high);

        // nothing clears 0.5, so only the most probable pattern is kept
        let top = aggregator.envelope(&agg.patterns, 0.5);
        let fluctuating = agg
            .patterns
            .iter()
            .find(|p| p.pattern == Pattern::Fluctuating)
            .unwrap();
        for (i, slot) in top.iter().enumerate() {
            assert_eq!(slot.range, fluctuating.slots[i].range);
            let own = fluctuating.slots[i].most_likely.unwrap();
            assert!((slot.most_likely.unwrap() - own).abs() < 1e-9);
        }
    }
}

//! Builtin pattern table
//!
//! Multipliers, phase lengths and transition odds follow the game's documented
//! price generator. Prices inside a decreasing run fall by a random step per
//! half-day; the first slot of the run carries the widest band.

use super::phases::{LengthConstraint, LengthDomain, PatternSpec, PhaseSpec};
use super::priors::{PatternDistribution, PriorTable};
use crate::Pattern;

// ============================================================
// MULTIPLIER BANDS
// ============================================================

/// Steady decline used by `Decreasing` and the run-up to a large spike
const SLIDE: PhaseSpec = PhaseSpec::new(LengthDomain::fixed(1), 0.85, 0.90).with_decay(0.03, 0.05);
/// Low decline around a small spike
const SAG: PhaseSpec = PhaseSpec::new(LengthDomain::fixed(1), 0.40, 0.90).with_decay(0.03, 0.05);
/// Fluctuating dips
const DIP: PhaseSpec = PhaseSpec::new(LengthDomain::range(2, 3), 0.60, 0.80).with_decay(0.04, 0.10);
/// Fluctuating highs, also the edges of both spikes
const HIGH: PhaseSpec = PhaseSpec::new(LengthDomain::fixed(1), 0.90, 1.40);

const fn sized(phase: PhaseSpec, length: LengthDomain) -> PhaseSpec {
    PhaseSpec { length, ..phase }
}

fn decreasing() -> PatternSpec {
    PatternSpec::new(Pattern::Decreasing, [sized(SLIDE, LengthDomain::fixed(12))])
}

fn large_spike() -> PatternSpec {
    PatternSpec::new(
        Pattern::LargeSpike,
        [
            sized(SLIDE, LengthDomain::range(1, 7)),
            HIGH,
            PhaseSpec::new(LengthDomain::fixed(1), 1.4, 2.0),
            PhaseSpec::new(LengthDomain::fixed(1), 2.0, 6.0),
            PhaseSpec::new(LengthDomain::fixed(1), 1.4, 2.0),
            HIGH,
            PhaseSpec::new(LengthDomain::range(0, 6), 0.4, 0.9),
        ],
    )
}

fn small_spike() -> PatternSpec {
    PatternSpec::new(
        Pattern::SmallSpike,
        [
            sized(SAG, LengthDomain::range(0, 7)),
            sized(HIGH, LengthDomain::fixed(2)),
            // shoulders sell one bell under the peak rate
            PhaseSpec::new(LengthDomain::fixed(1), 1.4, 2.0).with_offset(-1),
            PhaseSpec::new(LengthDomain::fixed(1), 1.4, 2.0),
            PhaseSpec::new(LengthDomain::fixed(1), 1.4, 2.0).with_offset(-1),
            sized(SAG, LengthDomain::range(0, 7)),
        ],
    )
}

fn fluctuating() -> PatternSpec {
    PatternSpec::new(
        Pattern::Fluctuating,
        [
            sized(HIGH, LengthDomain::range(0, 6)),
            DIP,
            sized(HIGH, LengthDomain::range(1, 7)),
            DIP,
            sized(HIGH, LengthDomain::range(0, 6)),
        ],
    )
    .with_constraint(LengthConstraint::new([1, 3], 5))
}

// ============================================================
// TRANSITIONS
// ============================================================

/// Stationary weights of the transition chain, out of 13082
const STATIONARY: [f64; 4] = [4530.0, 3236.0, 1931.0, 3385.0];

fn prior_table() -> PriorTable {
    let [fluctuating, large, decreasing, small] = STATIONARY;
    let total = fluctuating + large + decreasing + small;
    let fresh = total - decreasing;

    PriorTable {
        unknown: PatternDistribution::new(
            fluctuating / total,
            large / total,
            decreasing / total,
            small / total,
        ),
        first_participation: PatternDistribution::new(
            fluctuating / fresh,
            large / fresh,
            0.0,
            small / fresh,
        ),
        after_fluctuating: PatternDistribution::new(0.20, 0.30, 0.15, 0.35),
        after_large_spike: PatternDistribution::new(0.50, 0.05, 0.20, 0.25),
        after_decreasing: PatternDistribution::new(0.25, 0.45, 0.05, 0.25),
        after_small_spike: PatternDistribution::new(0.45, 0.25, 0.15, 0.15),
    }
}

pub(crate) fn builtin_patterns() -> Vec<PatternSpec> {
    vec![fluctuating(), large_spike(), decreasing(), small_spike()]
}

pub(crate) fn builtin_priors() -> PriorTable {
    prior_table()
}

//! Phase structure of a price pattern.
//!
//! A pattern is an ordered run of phases that together cover the twelve sell
//! slots. Each phase has a length domain and a multiplier band applied to the
//! buy price; decreasing phases additionally lose a bounded step per slot.

use serde::{Deserialize, Serialize};

use crate::{ForecastError, Pattern, Result, SLOTS};

/// Upper bound on the phase-length vectors a pattern may ask the generator to
/// walk (the product of its phases' domain sizes).
pub const MAX_LENGTH_COMBINATIONS: usize = 1_000_000;

/// Allowed number of slots a phase may occupy (inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LengthDomain {
    pub min: usize,
    pub max: usize,
}

impl LengthDomain {
    pub const fn fixed(len: usize) -> Self {
        Self { min: len, max: len }
    }

    pub const fn range(min: usize, max: usize) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn contains(&self, len: usize) -> bool {
        (self.min..=self.max).contains(&len)
    }

    #[inline]
    pub fn is_fixed(&self) -> bool {
        self.min == self.max
    }
}

/// Per-slot decline inside a decreasing phase.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Decay {
    pub min_step: f64,
    pub max_step: f64,
}

/// Multiplier bounds for one slot of one hypothesis.
///
/// Absolute prices are `[floor(buy * low) + offset, ceil(buy * high) + offset]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SlotBounds {
    pub low: f64,
    pub high: f64,
    pub offset: i32,
}

/// One trend segment of a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseSpec {
    pub length: LengthDomain,
    /// Multiplier band at the first slot of the phase
    pub low: f64,
    pub high: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decay: Option<Decay>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub offset: i32,
}

fn is_zero(v: &i32) -> bool {
    *v == 0
}

impl PhaseSpec {
    pub const fn new(length: LengthDomain, low: f64, high: f64) -> Self {
        Self {
            length,
            low,
            high,
            decay: None,
            offset: 0,
        }
    }

    pub const fn with_decay(self, min_step: f64, max_step: f64) -> Self {
        Self {
            decay: Some(Decay { min_step, max_step }),
            ..self
        }
    }

    pub const fn with_offset(self, offset: i32) -> Self {
        Self { offset, ..self }
    }

    /// Multiplier bounds for the `k`-th slot (0-based) inside this phase.
    pub fn bounds_at(&self, k: usize) -> SlotBounds {
        let (low, high) = match self.decay {
            Some(decay) => (
                self.low - k as f64 * decay.max_step,
                self.high - k as f64 * decay.min_step,
            ),
            None => (self.low, self.high),
        };
        SlotBounds {
            low: low.max(0.0),
            high: high.max(0.0),
            offset: self.offset,
        }
    }

    fn validate(&self, pattern: Pattern, index: usize) -> Result<()> {
        let invalid = |reason: &str| {
            Err(ForecastError::InvalidConfig(format!(
                "{pattern} phase {index}: {reason}"
            )))
        };

        if self.length.min > self.length.max {
            return invalid("length min exceeds max");
        }
        if self.length.max > SLOTS {
            return invalid("length exceeds the weekly slot count");
        }
        if !self.low.is_finite() || !self.high.is_finite() {
            return invalid("multiplier is NaN or infinite");
        }
        if self.low < 0.0 || self.low > self.high {
            return invalid("multiplier band must satisfy 0 <= low <= high");
        }
        if let Some(decay) = self.decay {
            if !decay.min_step.is_finite() || !decay.max_step.is_finite() {
                return invalid("decay step is NaN or infinite");
            }
            if decay.min_step < 0.0 || decay.min_step > decay.max_step {
                return invalid("decay must satisfy 0 <= min_step <= max_step");
            }
        }
        Ok(())
    }
}

/// Couples the lengths of several phases to a fixed total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LengthConstraint {
    pub phases: Vec<usize>,
    pub total: usize,
}

impl LengthConstraint {
    pub fn new(phases: impl Into<Vec<usize>>, total: usize) -> Self {
        Self {
            phases: phases.into(),
            total,
        }
    }

    #[inline]
    pub fn holds(&self, lengths: &[usize]) -> bool {
        self.phases
            .iter()
            .map(|&i| lengths.get(i).copied())
            .sum::<Option<usize>>()
            == Some(self.total)
    }
}

/// Full phase structure of one concrete pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternSpec {
    pub pattern: Pattern,
    pub phases: Vec<PhaseSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<LengthConstraint>,
}

impl PatternSpec {
    pub fn new(pattern: Pattern, phases: impl Into<Vec<PhaseSpec>>) -> Self {
        Self {
            pattern,
            phases: phases.into(),
            constraints: Vec::new(),
        }
    }

    pub fn with_constraint(mut self, constraint: LengthConstraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// True if `lengths` fits every phase domain, every constraint and the week.
    pub fn admits(&self, lengths: &[usize]) -> bool {
        lengths.len() == self.phases.len()
            && lengths.iter().sum::<usize>() == SLOTS
            && self
                .phases
                .iter()
                .zip(lengths)
                .all(|(phase, &len)| phase.length.contains(len))
            && self.constraints.iter().all(|c| c.holds(lengths))
    }

    /// Expand phase lengths into per-slot multiplier bounds.
    ///
    /// Callers must pass lengths accepted by [`PatternSpec::admits`].
    pub fn slot_bounds(&self, lengths: &[usize]) -> [SlotBounds; SLOTS] {
        let mut bounds = [SlotBounds::default(); SLOTS];
        let mut slot = 0;
        for (phase, &len) in self.phases.iter().zip(lengths) {
            for k in 0..len {
                if let Some(b) = bounds.get_mut(slot) {
                    *b = phase.bounds_at(k);
                }
                slot += 1;
            }
        }
        bounds
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if !self.pattern.is_concrete() {
            return Err(ForecastError::InvalidConfig(format!(
                "{} cannot carry a phase structure",
                self.pattern
            )));
        }
        if self.phases.is_empty() {
            return Err(ForecastError::InvalidConfig(format!(
                "{} has no phases",
                self.pattern
            )));
        }
        for (i, phase) in self.phases.iter().enumerate() {
            phase.validate(self.pattern, i)?;
        }
        let combinations = self.phases.iter().fold(1usize, |acc, phase| {
            acc.saturating_mul(phase.length.max - phase.length.min + 1)
        });
        if combinations > MAX_LENGTH_COMBINATIONS {
            return Err(ForecastError::InvalidConfig(format!(
                "{} spans {combinations} phase-length combinations, limit is {MAX_LENGTH_COMBINATIONS}",
                self.pattern
            )));
        }
        for constraint in &self.constraints {
            if let Some(&bad) = constraint.phases.iter().find(|&&i| i >= self.phases.len()) {
                return Err(ForecastError::InvalidConfig(format!(
                    "{} constraint references missing phase {bad}",
                    self.pattern
                )));
            }
        }
        Ok(())
    }
}

// ============================================================
// TESTS
// ============================================================

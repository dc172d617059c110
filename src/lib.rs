//! # Stalk - weekly turnip price forecaster
//!
//! Infers which of the four weekly price patterns a participant's market is
//! following and predicts a price range for every half-day slot not yet
//! observed.
//!
//! ## Quick Start
//!
//! ```rust
//! use stalk::prelude::*;
//!
//! let mut record = WeeklyRecord::new();
//! record.set_buy_price(100).unwrap();
//! record.set_sell_price(Slot::at(Weekday::Monday, HalfDay::Morning), 87);
//!
//! let engine = EngineBuilder::new().build().unwrap();
//! let forecast = engine.forecast(&record).unwrap();
//!
//! assert!(forecast.any_pattern_consistent);
//! assert!((forecast.posterior.total() - 1.0).abs() < 1e-9);
//! for slot in &forecast.slots {
//!     println!("{}: {:?}", slot.slot, slot.range);
//! }
//! ```
//!
//! ## Pipeline
//!
//! record → hypothesis generation → consistency filter → range aggregation.
//! Hypotheses are generated once when the engine is built; every forecast is
//! a pure function of the record it is given.

pub mod aggregate;
pub mod config;
pub mod filter;
pub mod hypothesis;
pub mod model;
pub mod record;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use aggregate::{Aggregate, PatternForecast, PatternTally, RangeAggregator, SlotForecast};
use filter::ConsistencyFilter;
use hypothesis::{Hypothesis, HypothesisGenerator};
use model::{PatternDistribution, PatternModel};
use record::{ParticipantId, RecordSource, WeekKey, WeeklyRecord};

pub mod prelude {
    pub use crate::{
        // Aggregation
        aggregate::{PatternForecast, SlotForecast},
        // Parallel
        forecast_parallel,
        // Filtering
        filter::{ConsistencyFilter, PriceRange},
        // Hypotheses
        hypothesis::{Hypothesis, HypothesisGenerator},
        // Model
        model::{PatternDistribution, PatternModel, PatternSpec, PhaseSpec},
        // Records
        record::{
            BuyPrice, HalfDay, InMemoryRecords, ParticipantId, RecordSource, Slot, WeekKey,
            WeeklyRecord, Weekday,
        },
        // Engine
        EngineBuilder,
        EngineConfig,
        // Errors
        ForecastError,
        ForecastEngine,
        ForecastFailure,
        ForecastReport,
        ForecastResult,
        ForecastStatus,
        // Types
        Pattern,
        Probability,
        Result,
        SLOTS,
    };
}

/// Number of half-day sell slots in a week (Monday morning to Saturday afternoon)
pub const SLOTS: usize = 12;

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, ForecastError>;

/// Errors that can occur while configuring or running forecasts
#[derive(Debug, Clone, thiserror::Error)]
pub enum ForecastError {
    #[error("Invalid pattern: {0} has no phase structure")]
    InvalidPattern(Pattern),

    #[error("Insufficient data: {0}")]
    InsufficientData(&'static str),

    #[error("Impossible: recorded prices contradict the declared {declared} pattern")]
    Impossible { declared: Pattern },

    #[error("No pattern is consistent with the recorded prices")]
    NoConsistentPattern,

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Unknown pattern name: {0:?}")]
    UnknownPatternName(String),

    #[error("No record for {participant} in week {week}")]
    RecordNotFound {
        participant: ParticipantId,
        week: WeekKey,
    },

    #[error("Failed to read model file: {0}")]
    ConfigRead(String),

    #[error("Failed to parse model: {0}")]
    ConfigParse(String),
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Probability in range 0.0..=1.0
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd)]
pub struct Probability(f64);

impl Probability {
    /// Create a new Probability, validating the value is in [0.0, 1.0]
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(ForecastError::InvalidValue(
                "Probability cannot be NaN or infinite",
            ));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(ForecastError::OutOfRange {
                field: "Probability",
                value,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(Self(value))
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl Serialize for Probability {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> Deserialize<'de> for Probability {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Probability::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// PATTERN
// ============================================================

/// Weekly price pattern
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Pattern {
    /// Not declared. Has no phase structure of its own.
    #[default]
    Unknown,
    Decreasing,
    LargeSpike,
    SmallSpike,
    Fluctuating,
}

impl Pattern {
    /// The four real patterns, in the game's internal order
    pub const CONCRETE: [Pattern; 4] = [
        Pattern::Fluctuating,
        Pattern::LargeSpike,
        Pattern::Decreasing,
        Pattern::SmallSpike,
    ];

    #[inline]
    pub fn is_concrete(self) -> bool {
        !matches!(self, Pattern::Unknown)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Pattern::Unknown => "Unknown",
            Pattern::Decreasing => "Decreasing",
            Pattern::LargeSpike => "LargeSpike",
            Pattern::SmallSpike => "SmallSpike",
            Pattern::Fluctuating => "Fluctuating",
        }
    }

    /// Position in [`Pattern::CONCRETE`]
    fn index(self) -> Option<usize> {
        Pattern::CONCRETE.iter().position(|&p| p == self)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Pattern {
    type Err = ForecastError;

    /// Case-insensitive; `_`, `-` and spaces are ignored (`large_spike` works).
    fn from_str(s: &str) -> Result<Self> {
        let key: String = s
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .collect::<String>()
            .to_ascii_lowercase();
        [
            Pattern::Unknown,
            Pattern::Decreasing,
            Pattern::LargeSpike,
            Pattern::SmallSpike,
            Pattern::Fluctuating,
        ]
        .into_iter()
        .find(|p| p.as_str().to_ascii_lowercase() == key)
        .ok_or_else(|| ForecastError::UnknownPatternName(s.to_string()))
    }
}

// ============================================================
// FORECAST RESULT
// ============================================================

/// Whether the observations fit any candidate pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForecastStatus {
    Consistent,
    /// The declared pattern has no hypothesis matching the observations
    Impossible { declared: Pattern },
    /// No pattern at all matches the observations
    NoConsistentPattern,
}

/// Output of [`ForecastEngine::forecast`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub posterior: PatternDistribution,
    /// Combined envelope at the engine's probability threshold
    pub slots: [SlotForecast; SLOTS],
    /// One entry per candidate pattern
    pub patterns: Vec<PatternForecast>,
    pub any_pattern_consistent: bool,
    pub status: ForecastStatus,
}

impl ForecastResult {
    /// Recompute the combined envelope, ignoring patterns below `min_probability`.
    pub fn envelope(&self, min_probability: f64) -> [SlotForecast; SLOTS] {
        let observed = std::array::from_fn(|i| self.slots[i].observed_price());
        RangeAggregator::new(observed).envelope(&self.patterns, min_probability)
    }

    pub fn pattern(&self, pattern: Pattern) -> Option<&PatternForecast> {
        self.patterns.iter().find(|p| p.pattern == pattern)
    }

    pub fn most_likely_pattern(&self) -> Option<(Pattern, f64)> {
        self.posterior.most_likely()
    }

    /// Turn a contradiction into an error.
    pub fn into_consistent(self) -> Result<Self> {
        match self.status {
            ForecastStatus::Consistent => Ok(self),
            ForecastStatus::Impossible { declared } => Err(ForecastError::Impossible { declared }),
            ForecastStatus::NoConsistentPattern => Err(ForecastError::NoConsistentPattern),
        }
    }
}

// ============================================================
// FORECAST ENGINE
// ============================================================

/// Engine configuration
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Patterns below this posterior are left out of the combined envelope
    pub min_probability: Probability,
}

/// Main forecasting engine
///
/// Holds the validated model and every pattern's hypotheses. Immutable after
/// [`EngineBuilder::build`], so it can be shared freely across threads.
#[derive(Debug, Clone)]
pub struct ForecastEngine {
    model: PatternModel,
    hypotheses: Vec<Vec<Hypothesis>>,
    config: EngineConfig,
}

impl ForecastEngine {
    #[inline]
    pub fn model(&self) -> &PatternModel {
        &self.model
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Every hypothesis generated for a concrete pattern.
    pub fn hypotheses(&self, pattern: Pattern) -> Result<&[Hypothesis]> {
        pattern
            .index()
            .and_then(|i| self.hypotheses.get(i))
            .map(Vec::as_slice)
            .ok_or(ForecastError::InvalidPattern(pattern))
    }

    /// Forecast the rest of the week.
    ///
    /// A declared pattern restricts the search to that pattern; if none of its
    /// hypotheses fit, the result is flagged `Impossible` instead of falling
    /// back to the others.
    pub fn forecast(&self, record: &WeeklyRecord) -> Result<ForecastResult> {
        let filter = ConsistencyFilter::from_record(record)?;
        let prior = self
            .model
            .pattern_prior(record.first_participation, record.previous_pattern);

        let declared = record.pattern.is_concrete().then_some(record.pattern);
        let candidates: Vec<Pattern> = match declared {
            Some(pattern) => vec![pattern],
            None => Pattern::CONCRETE.to_vec(),
        };

        let tallies = candidates
            .iter()
            .map(|&pattern| {
                Ok(PatternTally::from_hypotheses(
                    pattern,
                    self.hypotheses(pattern)?,
                    &filter,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        let aggregator = RangeAggregator::from_record(record);
        let Aggregate { posterior, patterns } = aggregator.aggregate(&tallies, &prior);
        let slots = aggregator.envelope(&patterns, self.config.min_probability.get());
        let any_pattern_consistent = posterior.total() > 0.0;

        let status = match (any_pattern_consistent, declared) {
            (true, _) => ForecastStatus::Consistent,
            (false, Some(declared)) => {
                warn!(%declared, observed = record.observed_count(), "declared pattern contradicted by observations");
                ForecastStatus::Impossible { declared }
            },
            (false, None) => ForecastStatus::NoConsistentPattern,
        };

        debug!(
            buy_price = filter.buy_price().get(),
            observed = record.observed_count(),
            candidates = candidates.len(),
            surviving = tallies.iter().map(PatternTally::surviving).sum::<usize>(),
            ?status,
            "forecast computed"
        );

        Ok(ForecastResult {
            posterior,
            slots,
            patterns,
            any_pattern_consistent,
            status,
        })
    }

    /// Fetch a record from `source` and forecast it.
    pub fn forecast_source<S: RecordSource + ?Sized>(
        &self,
        source: &S,
        participant: &ParticipantId,
        week: WeekKey,
    ) -> Result<ForecastResult> {
        let record = source.weekly_record(participant, week)?.ok_or_else(|| {
            ForecastError::RecordNotFound {
                participant: participant.clone(),
                week,
            }
        })?;
        self.forecast(&record)
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for creating ForecastEngine instances
#[derive(Debug, Clone, Default)]
pub struct EngineBuilder {
    model: Option<PatternModel>,
    min_probability: f64,
}

impl EngineBuilder {
    /// Builder using the builtin pattern model
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom pattern model
    pub fn model(mut self, model: PatternModel) -> Self {
        self.model = Some(model);
        self
    }

    /// Drop patterns below this posterior from the combined envelope
    pub fn min_probability(mut self, probability: f64) -> Self {
        self.min_probability = probability;
        self
    }

    /// Validate the model and generate every hypothesis
    pub fn build(self) -> Result<ForecastEngine> {
        let config = EngineConfig {
            min_probability: Probability::new(self.min_probability)?,
        };
        let model = self
            .model
            .unwrap_or_else(|| PatternModel::builtin().clone());
        model.validate()?;

        let hypotheses = Pattern::CONCRETE
            .iter()
            .map(|&pattern| HypothesisGenerator::for_pattern(&model, pattern).map(Iterator::collect))
            .collect::<Result<Vec<Vec<Hypothesis>>>>()?;

        info!(
            fluctuating = hypotheses[0].len(),
            large_spike = hypotheses[1].len(),
            decreasing = hypotheses[2].len(),
            small_spike = hypotheses[3].len(),
            min_probability = config.min_probability.get(),
            "forecast engine built"
        );

        Ok(ForecastEngine {
            model,
            hypotheses,
            config,
        })
    }
}

// ============================================================
// PARALLEL FORECASTING
// ============================================================

use rayon::prelude::*;

/// Forecast for a single participant
#[derive(Debug)]
pub struct ForecastReport {
    pub participant: ParticipantId,
    pub result: ForecastResult,
}

/// Error from forecasting a single participant
#[derive(Debug)]
pub struct ForecastFailure {
    pub participant: ParticipantId,
    pub error: ForecastError,
}

/// Parallel forecasting of many participants' records
pub fn forecast_parallel<'a, I>(
    engine: &ForecastEngine,
    records: I,
) -> (Vec<ForecastReport>, Vec<ForecastFailure>)
where
    I: IntoParallelIterator<Item = (&'a ParticipantId, &'a WeeklyRecord)>,
{
    let results: Vec<_> = records
        .into_par_iter()
        .map(|(participant, record)| {
            engine
                .forecast(record)
                .map(|result| ForecastReport {
                    participant: participant.clone(),
                    result,
                })
                .map_err(|error| ForecastFailure {
                    participant: participant.clone(),
                    error,
                })
        })
        .collect();

    let mut successes = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(r) => successes.push(r),
            Err(e) => errors.push(e),
        }
    }

    (successes, errors)
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::PriceRange;
    use crate::record::{InMemoryRecords, Slot};

    fn record(buy: u32, sells: &[(usize, u32)]) -> WeeklyRecord {
        let mut record = WeeklyRecord::new();
        record.set_buy_price(buy).unwrap();
        for &(i, price) in sells {
            record.set_sell_price(Slot::new(i).unwrap(), price);
        }
        record
    }

    fn engine() -> ForecastEngine {
        EngineBuilder::new().build().unwrap()
    }

    #[test]
    fn test_probability_validation() {
        assert!(Probability::new(0.0).is_ok());
        assert!(Probability::new(1.0).is_ok());
        assert!(Probability::new(0.01).is_ok());
        assert!(Probability::new(-0.1).is_err());
        assert!(Probability::new(1.1).is_err());
        assert!(Probability::new(f64::NAN).is_err());
        assert!(Probability::new(f64::INFINITY).is_err());
    }

    #[test]
    fn test_pattern_parsing() {
        assert_eq!("largespike".parse::<Pattern>().unwrap(), Pattern::LargeSpike);
        assert_eq!("Small_Spike".parse::<Pattern>().unwrap(), Pattern::SmallSpike);
        assert_eq!("DECREASING".parse::<Pattern>().unwrap(), Pattern::Decreasing);
        assert_eq!("unknown".parse::<Pattern>().unwrap(), Pattern::Unknown);
        assert!(matches!(
            "spiky".parse::<Pattern>(),
            Err(ForecastError::UnknownPatternName(_))
        ));
    }

    #[test]
    fn test_pattern_display_round_trips() {
        for pattern in Pattern::CONCRETE {
            assert_eq!(pattern.to_string().parse::<Pattern>().unwrap(), pattern);
        }
        assert!(!Pattern::Unknown.is_concrete());
    }

    #[test]
    fn test_engine_builder() {
        assert!(EngineBuilder::new().build().is_ok());
        assert!(EngineBuilder::new().min_probability(0.01).build().is_ok());
        assert!(matches!(
            EngineBuilder::new().min_probability(2.0).build(),
            Err(ForecastError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_hypotheses_lookup() {
        let engine = engine();
        assert_eq!(engine.hypotheses(Pattern::Fluctuating).unwrap().len(), 56);
        assert!(matches!(
            engine.hypotheses(Pattern::Unknown),
            Err(ForecastError::InvalidPattern(Pattern::Unknown))
        ));
    }

    #[test]
    fn test_forecast_requires_buy_price() {
        let result = engine().forecast(&WeeklyRecord::new());
        assert!(matches!(result, Err(ForecastError::InsufficientData(_))));
    }

    #[test]
    fn test_forecast_blank_week() {
        let forecast = engine().forecast(&record(100, &[])).unwrap();
        assert!(forecast.any_pattern_consistent);
        assert_eq!(forecast.status, ForecastStatus::Consistent);
        assert_eq!(forecast.patterns.len(), 4);
        for slot in &forecast.slots {
            let range = slot.range.unwrap();
            assert!(range.low < range.high);
            assert!(!slot.observed);
        }
    }

    #[test]
    fn test_observed_slots_are_exact() {
        let forecast = engine().forecast(&record(100, &[(0, 87), (1, 83)])).unwrap();
        assert_eq!(forecast.slots[0].range, Some(PriceRange::exact(87)));
        assert_eq!(forecast.slots[1].range, Some(PriceRange::exact(83)));
        assert!(forecast.slots[1].observed);
        assert!(!forecast.slots[2].observed);
    }

    #[test]
    fn test_declared_pattern_restricts_search() {
        let mut r = record(100, &[(0, 87)]);
        r.set_pattern(Pattern::LargeSpike);
        let forecast = engine().forecast(&r).unwrap();
        assert_eq!(forecast.posterior.large_spike, 1.0);
        assert_eq!(forecast.patterns.len(), 1);
    }

    #[test]
    fn test_declared_pattern_contradiction() {
        let mut r = record(100, &[(0, 87), (1, 130)]);
        r.set_pattern(Pattern::Decreasing);
        let forecast = engine().forecast(&r).unwrap();
        assert!(!forecast.any_pattern_consistent);
        assert_eq!(
            forecast.status,
            ForecastStatus::Impossible {
                declared: Pattern::Decreasing
            }
        );
        assert!(matches!(
            forecast.into_consistent(),
            Err(ForecastError::Impossible {
                declared: Pattern::Decreasing
            })
        ));
    }

    #[test]
    fn test_no_pattern_fits() {
        let forecast = engine().forecast(&record(100, &[(3, 900)])).unwrap();
        assert_eq!(forecast.status, ForecastStatus::NoConsistentPattern);
        assert_eq!(forecast.posterior.total(), 0.0);
        assert!(matches!(
            forecast.into_consistent(),
            Err(ForecastError::NoConsistentPattern)
        ));
    }

    #[test]
    fn test_forecast_source() {
        let mut source = InMemoryRecords::new();
        let id = ParticipantId::new("tom");
        let week = WeekKey::new(2026, 16);
        source.insert(id.clone(), week, record(104, &[(0, 120)]));

        let engine = engine();
        assert!(engine.forecast_source(&source, &id, week).is_ok());
        assert!(matches!(
            engine.forecast_source(&source, &id, WeekKey::new(2026, 17)),
            Err(ForecastError::RecordNotFound { .. })
        ));
    }

    #[test]
    fn test_parallel_forecast() {
        let engine = engine();
        let ids: Vec<ParticipantId> = (0..8).map(|i| ParticipantId::new(format!("p{i}"))).collect();
        let mut records: Vec<WeeklyRecord> = ids.iter().map(|_| record(95, &[(0, 85)])).collect();
        records[3] = WeeklyRecord::new();

        let pairs: Vec<(&ParticipantId, &WeeklyRecord)> = ids.iter().zip(records.iter()).collect();
        let (ok, failed) = forecast_parallel(&engine, pairs);
        assert_eq!(ok.len(), 7);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].participant.as_str(), "p3");
    }
}

//! Weekly observation records and the read-only store contract.
//!
//! A [`WeeklyRecord`] holds one participant's week: the Sunday buy price, up to
//! twelve half-day sell prices (Monday morning through Saturday afternoon), the
//! declared pattern and the first-participation flag. The engine only ever
//! reads records; mutation helpers exist for the command layer that owns them.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{ForecastError, Pattern, Result, SLOTS};

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Sunday purchase price (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BuyPrice(u32);

impl BuyPrice {
    /// Create a new BuyPrice, validating value is > 0
    pub fn new(value: u32) -> Result<Self> {
        if value == 0 {
            return Err(ForecastError::InvalidValue("Buy price must be > 0"));
        }
        Ok(Self(value))
    }

    #[inline]
    pub fn get(self) -> u32 {
        self.0
    }
}

impl Serialize for BuyPrice {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> Deserialize<'de> for BuyPrice {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = u32::deserialize(d)?;
        BuyPrice::new(value).map_err(serde::de::Error::custom)
    }
}

/// Half-day sell slot, 0 (Monday morning) through 11 (Saturday afternoon)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Slot(u8);

impl Slot {
    /// All twelve slots in chronological order.
    pub const ALL: [Slot; SLOTS] = [
        Slot(0),
        Slot(1),
        Slot(2),
        Slot(3),
        Slot(4),
        Slot(5),
        Slot(6),
        Slot(7),
        Slot(8),
        Slot(9),
        Slot(10),
        Slot(11),
    ];

    /// Create a new Slot, validating index < 12
    pub fn new(index: usize) -> Result<Self> {
        if index >= SLOTS {
            return Err(ForecastError::OutOfRange {
                field: "Slot",
                value: index as f64,
                min: 0.0,
                max: (SLOTS - 1) as f64,
            });
        }
        Ok(Self(index as u8))
    }

    /// Slot for a given day and half of day.
    pub fn at(day: Weekday, half: HalfDay) -> Self {
        let base = day as u8 * 2;
        match half {
            HalfDay::Morning => Self(base),
            HalfDay::Afternoon => Self(base + 1),
        }
    }

    pub fn all() -> impl Iterator<Item = Slot> + Clone {
        Self::ALL.into_iter()
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn weekday(self) -> Weekday {
        Weekday::ALL[self.index() / 2]
    }

    pub fn half(self) -> HalfDay {
        if self.0 % 2 == 0 {
            HalfDay::Morning
        } else {
            HalfDay::Afternoon
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.weekday(), self.half())
    }
}

impl Serialize for Slot {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> Deserialize<'de> for Slot {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Slot::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// CALENDAR VOCABULARY
// ============================================================

/// Selling days. Sunday is the buying day and has no sell slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
}

impl Weekday {
    pub const ALL: [Weekday; 6] = [
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
        Weekday::Saturday,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Weekday::Monday => "Monday",
            Weekday::Tuesday => "Tuesday",
            Weekday::Wednesday => "Wednesday",
            Weekday::Thursday => "Thursday",
            Weekday::Friday => "Friday",
            Weekday::Saturday => "Saturday",
        }
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Weekday {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        Weekday::ALL
            .into_iter()
            .find(|day| {
                let name = day.as_str().to_ascii_lowercase();
                lower == name || (lower.len() == 3 && name.starts_with(&lower))
            })
            .ok_or(ForecastError::InvalidValue("Unrecognized selling day"))
    }
}

/// Morning or afternoon price window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HalfDay {
    Morning,
    Afternoon,
}

impl fmt::Display for HalfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HalfDay::Morning => f.write_str("morning"),
            HalfDay::Afternoon => f.write_str("afternoon"),
        }
    }
}

impl FromStr for HalfDay {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "morning" | "morn" | "m" => Ok(HalfDay::Morning),
            "afternoon" | "after" | "a" | "evening" | "eve" | "e" => Ok(HalfDay::Afternoon),
            _ => Err(ForecastError::InvalidValue("Unrecognized half of day")),
        }
    }
}

// ============================================================
// WEEKLY RECORD
// ============================================================

/// One participant's observations for one week.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyRecord {
    pub buy_price: Option<BuyPrice>,
    pub sell_prices: [Option<u32>; SLOTS],
    /// Declared pattern. `Unknown` means nothing was declared.
    #[serde(default)]
    pub pattern: Pattern,
    #[serde(default)]
    pub first_participation: bool,
    /// Last week's realized pattern, if known.
    #[serde(default)]
    pub previous_pattern: Option<Pattern>,
}

impl WeeklyRecord {
    /// Empty record for the start of a week.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_buy_price(&mut self, price: u32) -> Result<()> {
        self.buy_price = Some(BuyPrice::new(price)?);
        Ok(())
    }

    pub fn set_sell_price(&mut self, slot: Slot, price: u32) {
        self.sell_prices[slot.index()] = Some(price);
    }

    /// Record a sell price as of `now`. Slots after `now` have not happened
    /// yet and fail with `OutOfRange`.
    pub fn set_sell_price_at(&mut self, slot: Slot, price: u32, now: Slot) -> Result<()> {
        if slot > now {
            return Err(ForecastError::OutOfRange {
                field: "Slot",
                value: slot.index() as f64,
                min: 0.0,
                max: now.index() as f64,
            });
        }
        self.set_sell_price(slot, price);
        Ok(())
    }

    pub fn clear_sell_price(&mut self, slot: Slot) {
        self.sell_prices[slot.index()] = None;
    }

    pub fn set_pattern(&mut self, pattern: Pattern) {
        self.pattern = pattern;
    }

    pub fn set_first_participation(&mut self, first: bool) {
        self.first_participation = first;
    }

    #[inline]
    pub fn sell_price(&self, slot: Slot) -> Option<u32> {
        self.sell_prices[slot.index()]
    }

    /// Recorded sell prices in slot order.
    pub fn observations(&self) -> impl Iterator<Item = (Slot, u32)> + '_ {
        Slot::all().filter_map(move |slot| self.sell_price(slot).map(|price| (slot, price)))
    }

    pub fn observed_count(&self) -> usize {
        self.sell_prices.iter().flatten().count()
    }

    /// Fresh record for the following week.
    ///
    /// This week's declared pattern becomes `previous_pattern`; an undeclared
    /// week leaves the next one without transition information.
    pub fn roll_over(&self) -> WeeklyRecord {
        WeeklyRecord {
            previous_pattern: self.pattern.is_concrete().then_some(self.pattern),
            ..WeeklyRecord::default()
        }
    }
}

// ============================================================
// RECORD SOURCE
// ============================================================

/// Participant identity as known to the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParticipantId(pub String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// ISO-style week key (`2026-W42`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WeekKey {
    pub year: i32,
    pub week: u32,
}

impl WeekKey {
    pub const fn new(year: i32, week: u32) -> Self {
        Self { year, week }
    }
}

impl fmt::Display for WeekKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-W{:02}", self.year, self.week)
    }
}

/// Read side of the record store.
///
/// Implementations must hand out a consistent snapshot.
pub trait RecordSource: Send + Sync {
    fn weekly_record(
        &self,
        participant: &ParticipantId,
        week: WeekKey,
    ) -> Result<Option<WeeklyRecord>>;
}

/// HashMap-backed record source
#[derive(Debug, Clone, Default)]
pub struct InMemoryRecords {
    records: HashMap<(ParticipantId, WeekKey), WeeklyRecord>,
}

impl InMemoryRecords {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record, returning the previous one.
    pub fn insert(
        &mut self,
        participant: ParticipantId,
        week: WeekKey,
        record: WeeklyRecord,
    ) -> Option<WeeklyRecord> {
        self.records.insert((participant, week), record)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Every stored record, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&ParticipantId, WeekKey, &WeeklyRecord)> + '_ {
        self.records
            .iter()
            .map(|((participant, week), record)| (participant, *week, record))
    }

    /// One week's records ordered by participant, ready for
    /// [`forecast_parallel`](crate::forecast_parallel).
    pub fn week(&self, week: WeekKey) -> Vec<(&ParticipantId, &WeeklyRecord)> {
        let mut records: Vec<_> = self
            .iter()
            .filter(|&(_, w, _)| w == week)
            .map(|(participant, _, record)| (participant, record))
            .collect();
        records.sort_by(|a, b| a.0.cmp(b.0));
        records
    }

    /// Drop every record.
    pub fn clear(&mut self) {
        self.records.clear();
    }
}

impl RecordSource for InMemoryRecords {
    fn weekly_record(
        &self,
        participant: &ParticipantId,
        week: WeekKey,
    ) -> Result<Option<WeeklyRecord>> {
        Ok(self.records.get(&(participant.clone(), week)).cloned())
    }
}

// ============================================================
// TESTS
// ============================================================

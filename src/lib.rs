//! # YASD - Yet Another Sequential Detector
//!
//! Streaming detection of the three-stage Sequential exhaustion pattern:
//! a **Flip** arms a **Setup**, a completed Setup arms a **Countdown**.
//! Every detector is driven one bar at a time and keeps only a bounded
//! trailing window per instrument.
//!
//! ## Quick Start
//!
//! ```rust
//! use yasd::prelude::*;
//!
//! let mut engine = SequentialMap::<Bar>::with_config(SequentialConfig::default()).unwrap();
//!
//! let bars = vec![Bar::new("AAPL", 0, 100.0, 101.0, 99.0, 100.5, 1_000.0)];
//! for bar in &bars {
//!     if let Some(countdown) = engine.update(bar).unwrap() {
//!         println!("{:?} countdown over {} bars", countdown.direction, countdown.bars.len());
//!     }
//! }
//! ```

pub mod config;
pub mod detectors;
pub mod params;
pub mod window;

pub mod prelude {
    pub use crate::{
        // Configuration
        config::SequentialConfig,
        // Detectors
        detectors::*,
        // Parameters
        params::{
            get_flag, get_period, validate_params, ParamMeta, ParamType, ParameterizedDetector,
        },
        // Parallel
        scan_parallel,
        // Windows
        window::SlidingWindow,
        // Types
        Bar,
        FlipDirection,
        Indexed,
        InstrumentMap,
        OHLCVExt,
        Period,
        PriceField,
        // Errors
        Result,
        ScanError,
        ScanResult,
        SequenceError,
        SequentialMap,
        SignalDirection,
        // Core traits
        StreamDetector,
        OHLCV,
    };
}

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use detectors::{CountdownSignal, Sequential};
use tracing::warn;

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, SequenceError>;

/// Errors that can occur while feeding bars through the detectors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SequenceError {
    #[error("Malformed bar: {field} = {value} is not a finite number")]
    MalformedBar { field: PriceField, value: f64 },

    #[error("Invariant violation: {0}")]
    InvariantViolation(&'static str),

    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Instrument {0} halted after a malformed bar")]
    InstrumentHalted(String),

    #[error("Config error: {0}")]
    Config(String),
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Period or lookback length (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period(usize);

impl Period {
    /// Create a new Period, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(SequenceError::InvalidValue("Period must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl serde::Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Period::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// PRICE FIELDS
// ============================================================

/// Bar field a detector compares on
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PriceField {
    Open,
    High,
    Low,
    #[default]
    #[serde(alias = "price", alias = "close_price")]
    Close,
    Volume,
}

impl PriceField {
    #[inline]
    pub fn value<T: OHLCV + ?Sized>(self, bar: &T) -> f64 {
        match self {
            PriceField::Open => bar.open(),
            PriceField::High => bar.high(),
            PriceField::Low => bar.low(),
            PriceField::Close => bar.close(),
            PriceField::Volume => bar.volume(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PriceField::Open => "open",
            PriceField::High => "high",
            PriceField::Low => "low",
            PriceField::Close => "close",
            PriceField::Volume => "volume",
        }
    }
}

impl fmt::Display for PriceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PriceField {
    type Err = SequenceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "open" => Ok(PriceField::Open),
            "high" => Ok(PriceField::High),
            "low" => Ok(PriceField::Low),
            "close" | "price" | "close_price" => Ok(PriceField::Close),
            "volume" => Ok(PriceField::Volume),
            _ => Err(SequenceError::InvalidValue("unknown price field")),
        }
    }
}

// ============================================================
// OHLCV TRAITS
// ============================================================

/// Core OHLCV data trait
pub trait OHLCV {
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;

    fn timestamp(&self) -> Option<i64> {
        None
    }

    /// Identity under which per-instrument state is isolated
    fn instrument(&self) -> &str {
        ""
    }
}

/// Extension trait with computed properties for OHLCV data
pub trait OHLCVExt: OHLCV {
    #[inline]
    fn range(&self) -> f64 {
        self.high() - self.low()
    }

    /// Check that the compared field plus `high` and `low` are usable numbers.
    fn validate_for(&self, field: PriceField) -> Result<()> {
        for field in [field, PriceField::High, PriceField::Low] {
            let value = field.value(self);
            if !value.is_finite() {
                return Err(SequenceError::MalformedBar { field, value });
            }
        }
        Ok(())
    }
}

impl<T: OHLCV + ?Sized> OHLCVExt for T {}

/// One OHLCV observation for an instrument
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Bar {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
    #[serde(default, alias = "sid")]
    pub instrument: String,
}

impl Bar {
    pub fn new(
        instrument: impl Into<String>,
        timestamp: i64,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
            instrument: instrument.into(),
        }
    }
}

impl OHLCV for Bar {
    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> f64 {
        self.volume
    }

    fn timestamp(&self) -> Option<i64> {
        Some(self.timestamp)
    }

    fn instrument(&self) -> &str {
        &self.instrument
    }
}

// ============================================================
// DIRECTIONS
// ============================================================

/// Direction of a Flip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum FlipDirection {
    Bull,
    Bear,
}

impl FlipDirection {
    /// Setup direction armed by this flip: a bear flip arms a buy setup.
    #[inline]
    pub fn setup_direction(self) -> SignalDirection {
        match self {
            FlipDirection::Bear => SignalDirection::Buy,
            FlipDirection::Bull => SignalDirection::Sell,
        }
    }
}

/// Direction of a Setup or Countdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum SignalDirection {
    Buy,
    Sell,
}

impl SignalDirection {
    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            SignalDirection::Buy => SignalDirection::Sell,
            SignalDirection::Sell => SignalDirection::Buy,
        }
    }
}

// ============================================================
// STREAM DETECTOR TRAIT
// ============================================================

/// Signal tagged with the index of the bar that produced it
#[derive(Debug, Clone)]
pub struct Indexed<S> {
    pub index: usize,
    pub signal: S,
}

/// A stateful detector fed one bar at a time
pub trait StreamDetector<B: OHLCV> {
    type Signal;

    /// Accept one bar and return the signal it completes, if any.
    fn update(&mut self, bar: &B) -> Result<Option<Self::Signal>>;

    /// Feed a whole slice in order, stopping at the first malformed bar.
    fn scan(&mut self, bars: &[B]) -> Result<Vec<Indexed<Self::Signal>>> {
        let mut signals = Vec::new();
        for (index, bar) in bars.iter().enumerate() {
            if let Some(signal) = self.update(bar)? {
                signals.push(Indexed { index, signal });
            }
        }
        Ok(signals)
    }
}

// ============================================================
// PER-INSTRUMENT STATE
// ============================================================

/// Routes bars to one detector per instrument, creating each on first sight.
///
/// A malformed bar halts its instrument: the detector state is dropped and
/// every later bar for that instrument is refused with
/// [`SequenceError::InstrumentHalted`]. Other instruments keep running.
pub struct InstrumentMap<D, F> {
    factory: F,
    states: HashMap<String, D>,
    halted: HashSet<String>,
}

impl<D, F: Fn() -> D> InstrumentMap<D, F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            states: HashMap::new(),
            halted: HashSet::new(),
        }
    }

    pub fn update<B>(&mut self, bar: &B) -> Result<Option<D::Signal>>
    where
        B: OHLCV,
        D: StreamDetector<B>,
    {
        let instrument = bar.instrument();
        if self.halted.contains(instrument) {
            return Err(SequenceError::InstrumentHalted(instrument.to_owned()));
        }

        let state = self
            .states
            .entry(instrument.to_owned())
            .or_insert_with(&self.factory);

        match state.update(bar) {
            Err(err @ SequenceError::MalformedBar { .. }) => {
                warn!(instrument, error = %err, "halting instrument stream");
                self.states.remove(instrument);
                self.halted.insert(instrument.to_owned());
                Err(err)
            }
            other => other,
        }
    }

    pub fn get(&self, instrument: &str) -> Option<&D> {
        self.states.get(instrument)
    }

    pub fn is_halted(&self, instrument: &str) -> bool {
        self.halted.contains(instrument)
    }

    /// Number of live (non-halted) instruments
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn instruments(&self) -> impl Iterator<Item = &str> {
        self.states.keys().map(String::as_str)
    }
}

/// Per-instrument Sequential coordinators built from one prototype
pub type SequentialMap<B = Bar> =
    InstrumentMap<Sequential<B>, Box<dyn Fn() -> Sequential<B> + Send + Sync>>;

impl<B> SequentialMap<B>
where
    B: OHLCV + Clone + Send + Sync + 'static,
{
    /// Validate `config` once and clone a fresh coordinator per new instrument.
    pub fn with_config(config: config::SequentialConfig) -> Result<Self> {
        let prototype = Sequential::new(config)?;
        Ok(Self::new(Box::new(move || prototype.clone())))
    }
}

// ============================================================
// PARALLEL SCANNING
// ============================================================

use rayon::prelude::*;

/// Result of scanning a single instrument
#[derive(Debug)]
pub struct ScanResult<B = Bar> {
    pub instrument: String,
    pub signals: Vec<Indexed<CountdownSignal<B>>>,
}

/// Error from scanning a single instrument
#[derive(Debug)]
pub struct ScanError {
    pub instrument: String,
    pub error: SequenceError,
}

/// Run a fresh Sequential coordinator over each instrument's bars in parallel.
///
/// Instruments share no state, so each one is an independent rayon task.
pub fn scan_parallel<'a, B, I>(
    config: &config::SequentialConfig,
    instruments: I,
) -> Result<(Vec<ScanResult<B>>, Vec<ScanError>)>
where
    B: OHLCV + Clone + Send + Sync + 'a,
    I: IntoParallelIterator<Item = (&'a str, &'a [B])>,
{
    let prototype = Sequential::<B>::new(config.clone())?;

    let results: Vec<_> = instruments
        .into_par_iter()
        .map(|(instrument, bars)| {
            let mut detector = prototype.clone();
            detector
                .scan(bars)
                .map(|signals| ScanResult {
                    instrument: instrument.to_string(),
                    signals,
                })
                .map_err(|error| ScanError {
                    instrument: instrument.to_string(),
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

    Ok((successes, errors))
}

// ============================================================
// TESTS
// ============================================================

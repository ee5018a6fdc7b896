//! Common comparisons and extremes shared by the Setup and Countdown detectors.

use crate::{OHLCVExt, Period, Result, SequenceError, SignalDirection, OHLCV};

// ============================================================
// CONSTANTS
// ============================================================

/// Ordinal of the Countdown qualifier bar (1-based), fixed regardless of period
pub const QUALIFIER_ORDINAL: usize = 8;

/// Trailing bars a Setup needs for its perfection level (`[-4:-2]`)
pub const PERFECTION_SPAN: usize = 4;

/// Longest period or lookback a detector accepts
pub const MAX_PERIOD: usize = 1_000;

/// Reject a period or lookback above [`MAX_PERIOD`].
pub fn check_max_period(name: &str, period: Period) -> Result<()> {
    if period.get() > MAX_PERIOD {
        return Err(SequenceError::InvalidConfig(format!(
            "{name} {} exceeds the maximum of {MAX_PERIOD}",
            period.get()
        )));
    }
    Ok(())
}

// ============================================================
// LOW EXTREME
// ============================================================

/// How the `low` of a Setup or Countdown signal is summarised over its bars.
///
/// `Max` keeps the historical behaviour (the highest low). `Min` is the
/// conventional lowest low.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LowExtreme {
    #[default]
    Max,
    Min,
}

impl LowExtreme {
    pub fn of<B: OHLCV>(self, bars: &[B]) -> f64 {
        match self {
            LowExtreme::Max => max_low(bars),
            LowExtreme::Min => min_low(bars),
        }
    }
}

// ============================================================
// EXTREMES
// ============================================================

#[inline]
pub fn max_high<B: OHLCV>(bars: &[B]) -> f64 {
    bars.iter().map(|b| b.high()).fold(f64::NEG_INFINITY, f64::max)
}

#[inline]
pub fn max_low<B: OHLCV>(bars: &[B]) -> f64 {
    bars.iter().map(|b| b.low()).fold(f64::NEG_INFINITY, f64::max)
}

#[inline]
pub fn min_low<B: OHLCV>(bars: &[B]) -> f64 {
    bars.iter().map(|b| b.low()).fold(f64::INFINITY, f64::min)
}

// ============================================================
// DIRECTIONAL COMPARISONS
// ============================================================

/// Setup rule: buy bars close strictly below, sell bars strictly above.
#[inline]
pub fn setup_holds(direction: SignalDirection, value: f64, prior: f64) -> bool {
    match direction {
        SignalDirection::Buy => value < prior,
        SignalDirection::Sell => value > prior,
    }
}

/// Countdown rule: buy at or below the reference, sell at or above.
#[inline]
pub fn countdown_holds(direction: SignalDirection, value: f64, reference: f64) -> bool {
    match direction {
        SignalDirection::Buy => value <= reference,
        SignalDirection::Sell => value >= reference,
    }
}

/// Extreme a Countdown compares against: `low` for buy, `high` for sell.
#[inline]
pub fn countdown_extreme<B: OHLCV>(direction: SignalDirection, bar: &B) -> f64 {
    match direction {
        SignalDirection::Buy => bar.low(),
        SignalDirection::Sell => bar.high(),
    }
}

// ============================================================
// RISK LEVEL
// ============================================================

/// Risk level of a signal: the bar holding the signal extreme, extended by
/// its own range (below the low for buy, above the high for sell).
pub fn risk_level<B: OHLCV>(
    direction: SignalDirection,
    high: f64,
    low: f64,
    bars: &[B],
) -> Result<f64> {
    let level = match direction {
        SignalDirection::Buy => bars
            .iter()
            .find(|b| b.low() == low)
            .map(|b| low - b.range()),
        SignalDirection::Sell => bars
            .iter()
            .find(|b| b.high() == high)
            .map(|b| high + b.range()),
    };
    level.ok_or(SequenceError::InvariantViolation(
        "signal extreme not found in bars",
    ))
}

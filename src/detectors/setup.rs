//! Setup detector
//!
//! A Setup is armed by a Flip. A bear flip arms a buy setup, a bull flip a
//! sell setup. The setup completes when every one of the trailing `period`
//! bars compares beyond the bar `lookback` earlier: strictly below for buy,
//! strictly above for sell. The window holds `period + lookback` bars.
//!
//! [`SetupWindow`] is one armed candidate seeded from a [`FlipSignal`].
//! [`SetupDetector`] owns its own [`FlipDetector`] and at most one candidate
//! per direction.

use std::collections::HashMap;
use std::sync::OnceLock;

use tracing::debug;

use super::flip::{FlipDetector, FlipSignal};
use super::helpers::{
    check_max_period, max_high, min_low, risk_level, setup_holds, LowExtreme, PERFECTION_SPAN,
};
use crate::{
    params::{get_flag, get_period, validate_params, ParamMeta, ParamType, ParameterizedDetector},
    window::SlidingWindow,
    Bar, OHLCVExt, Period, PriceField, Result, SequenceError, SignalDirection, StreamDetector,
    OHLCV,
};

impl_with_defaults!(SetupDetector);

// ============================================================
// PURE EVALUATION
// ============================================================

/// Evaluate a setup over the trailing `period + lookback` bars of `bars`.
///
/// Returns `None` when there are too few bars, when any of the `period`
/// lagged comparisons fails, or when `period` is too short to place the
/// perfection bars.
pub fn setup<B: OHLCV + Clone>(
    bars: &[B],
    field: PriceField,
    period: usize,
    lookback: usize,
    flip: &FlipSignal<B>,
    low_extreme: LowExtreme,
) -> Option<SetupSignal<B>> {
    let span = period + lookback;
    if period == 0 || bars.len() < span {
        return None;
    }

    let window = &bars[bars.len() - span..];
    let direction = flip.direction.setup_direction();

    let qualified = window[lookback..]
        .iter()
        .zip(window.iter())
        .all(|(bar, prior)| setup_holds(direction, field.value(bar), field.value(prior)));
    if !qualified {
        return None;
    }

    let counted = &window[lookback..];
    let perfection = perfection_level(direction, counted)?;

    Some(SetupSignal {
        direction,
        high: max_high(counted),
        low: low_extreme.of(counted),
        bars: counted.to_vec(),
        perfection,
        flip: flip.clone(),
        perfected: false,
        risk: OnceLock::new(),
    })
}

/// Lowest low (buy) or highest high (sell) of the bars at `[-4:-2]`.
fn perfection_level<B: OHLCV>(direction: SignalDirection, bars: &[B]) -> Option<f64> {
    let start = bars.len().checked_sub(PERFECTION_SPAN)?;
    let pair = &bars[start..bars.len() - 2];
    Some(match direction {
        SignalDirection::Buy => min_low(pair),
        SignalDirection::Sell => max_high(pair),
    })
}

// ============================================================
// SIGNAL
// ============================================================

/// A completed setup
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SetupSignal<B = Bar> {
    pub direction: SignalDirection,
    pub high: f64,
    pub low: f64,
    /// Trailing `period` bars of the completed window
    pub bars: Vec<B>,
    pub perfection: f64,
    pub flip: FlipSignal<B>,
    #[serde(default)]
    perfected: bool,
    #[serde(skip)]
    risk: OnceLock<f64>,
}

impl<B: OHLCV> SetupSignal<B> {
    fn meets_perfection(&self, bar: &B) -> bool {
        match self.direction {
            SignalDirection::Buy => bar.low() <= self.perfection,
            SignalDirection::Sell => bar.high() >= self.perfection,
        }
    }

    /// Test a later bar against the perfection level. A passing bar latches
    /// the signal as perfect; a failing bar never clears the latch.
    pub fn check_perfection(&mut self, bar: &B) -> bool {
        let met = self.meets_perfection(bar);
        if met {
            self.perfected = true;
        }
        met
    }

    /// Perfect if either of the last two setup bars, or any bar passed to
    /// [`check_perfection`](Self::check_perfection), reached the level.
    pub fn is_perfect(&self) -> bool {
        self.perfected || self.bars.iter().rev().take(2).any(|b| self.meets_perfection(b))
    }

    /// Computed on first call, then cached.
    pub fn risk_level(&self) -> Result<f64> {
        if let Some(level) = self.risk.get() {
            return Ok(*level);
        }
        let level = risk_level(self.direction, self.high, self.low, &self.bars)?;
        Ok(*self.risk.get_or_init(|| level))
    }
}

// ============================================================
// ARMED CANDIDATE
// ============================================================

/// Setup window armed by one flip
#[derive(Debug, Clone)]
pub struct SetupWindow<B = Bar> {
    period: usize,
    lookback: usize,
    low_extreme: LowExtreme,
    flip: FlipSignal<B>,
    window: SlidingWindow<B>,
}

impl<B: OHLCV + Clone> SetupWindow<B> {
    /// Arm a candidate, priming the window with the flip's last
    /// `lookback + 1` bars so the flip bar is the first one counted.
    pub fn arm(
        period: Period,
        lookback: Period,
        field: PriceField,
        low_extreme: LowExtreme,
        flip: FlipSignal<B>,
    ) -> Result<Self> {
        let (period, lookback) = (period.get(), lookback.get());
        let mut window = SlidingWindow::new(period.saturating_add(lookback), field);

        let start = flip.bars.len().saturating_sub(lookback.saturating_add(1));
        for bar in &flip.bars[start..] {
            window.accept(bar.clone())?;
        }

        Ok(Self {
            period,
            lookback,
            low_extreme,
            flip,
            window,
        })
    }

    pub fn direction(&self) -> SignalDirection {
        self.flip.direction.setup_direction()
    }

    pub fn flip(&self) -> &FlipSignal<B> {
        &self.flip
    }

    pub fn window(&self) -> &SlidingWindow<B> {
        &self.window
    }
}

impl<B: OHLCV + Clone> StreamDetector<B> for SetupWindow<B> {
    type Signal = SetupSignal<B>;

    fn update(&mut self, bar: &B) -> Result<Option<SetupSignal<B>>> {
        self.window.accept(bar.clone())?;
        if !self.window.is_ready() {
            return Ok(None);
        }

        let field = self.window.field();
        Ok(setup(
            self.window.as_slice(),
            field,
            self.period,
            self.lookback,
            &self.flip,
            self.low_extreme,
        ))
    }
}

// ============================================================
// STANDALONE DETECTOR (embedded flip)
// ============================================================

/// Setup detector configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetupParams {
    pub period: Period,
    pub lookback: Period,
    pub field: PriceField,
    pub flip_period: Period,
    pub flip_field: PriceField,
    /// Discard an in-flight opposite candidate when a new flip arrives
    pub reverse_cancel: bool,
    pub low_extreme: LowExtreme,
}

impl Default for SetupParams {
    fn default() -> Self {
        Self {
            period: Period::new_const(9),
            lookback: Period::new_const(4),
            field: PriceField::Close,
            flip_period: Period::new_const(4),
            flip_field: PriceField::Close,
            reverse_cancel: true,
            low_extreme: LowExtreme::Max,
        }
    }
}

impl SetupParams {
    pub fn validate(&self) -> Result<()> {
        check_max_period("setup period", self.period)?;
        check_max_period("setup lookback", self.lookback)?;
        check_max_period("flip period", self.flip_period)?;
        if self.period.get() < PERFECTION_SPAN {
            return Err(SequenceError::InvalidConfig(format!(
                "setup period {} is shorter than the {PERFECTION_SPAN} bars perfection needs",
                self.period.get()
            )));
        }
        // the flip window must cover lookback + 1 bars for the flip bar to be setup bar 1
        if self.flip_period.get() + 1 < self.lookback.get() {
            return Err(SequenceError::InvalidConfig(format!(
                "flip period {} is too short to prime a setup lookback of {}",
                self.flip_period.get(),
                self.lookback.get()
            )));
        }
        Ok(())
    }
}

/// Flip detector plus one setup candidate slot per direction
#[derive(Debug, Clone)]
pub struct SetupDetector<B = Bar> {
    params: SetupParams,
    flip: FlipDetector<B>,
    buy: Option<SetupWindow<B>>,
    sell: Option<SetupWindow<B>>,
}

impl<B: OHLCV + Clone> Default for SetupDetector<B> {
    fn default() -> Self {
        Self {
            params: SetupParams::default(),
            flip: FlipDetector::default(),
            buy: None,
            sell: None,
        }
    }
}

impl<B: OHLCV + Clone> SetupDetector<B> {
    pub fn new(params: SetupParams) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            flip: FlipDetector::new(params.flip_period, params.flip_field),
            buy: None,
            sell: None,
        })
    }

    pub fn params(&self) -> &SetupParams {
        &self.params
    }

    pub fn flip_detector(&self) -> &FlipDetector<B> {
        &self.flip
    }

    pub fn candidate(&self, direction: SignalDirection) -> Option<&SetupWindow<B>> {
        match direction {
            SignalDirection::Buy => self.buy.as_ref(),
            SignalDirection::Sell => self.sell.as_ref(),
        }
    }

    pub fn has_candidates(&self) -> bool {
        self.buy.is_some() || self.sell.is_some()
    }

    fn slot_mut(&mut self, direction: SignalDirection) -> &mut Option<SetupWindow<B>> {
        match direction {
            SignalDirection::Buy => &mut self.buy,
            SignalDirection::Sell => &mut self.sell,
        }
    }

    fn arm(&mut self, flip: FlipSignal<B>, instrument: &str) -> Result<()> {
        let direction = flip.direction.setup_direction();

        if self.params.reverse_cancel && self.slot_mut(direction.opposite()).take().is_some() {
            debug!(instrument, cancelled = ?direction.opposite(), "setup candidate cancelled by reversal");
        }

        let params = self.params;
        let slot = self.slot_mut(direction);
        if slot.is_some() {
            return Ok(());
        }

        *slot = Some(SetupWindow::arm(
            params.period,
            params.lookback,
            params.field,
            params.low_extreme,
            flip,
        )?);
        debug!(instrument, ?direction, "setup candidate armed");
        Ok(())
    }
}

impl<B: OHLCV + Clone> StreamDetector<B> for SetupDetector<B> {
    type Signal = SetupSignal<B>;

    fn update(&mut self, bar: &B) -> Result<Option<SetupSignal<B>>> {
        bar.validate_for(self.params.field)?;
        bar.validate_for(self.params.flip_field)?;

        let mut completed = None;
        for direction in [SignalDirection::Buy, SignalDirection::Sell] {
            let slot = self.slot_mut(direction);
            let signal = match slot.as_mut() {
                Some(candidate) => candidate.update(bar)?,
                None => None,
            };
            if let Some(signal) = signal {
                *slot = None;
                debug!(instrument = bar.instrument(), ?direction, perfection = signal.perfection, "setup completed");
                completed = Some(signal);
            }
        }

        if let Some(flip) = self.flip.update(bar)? {
            self.arm(flip, bar.instrument())?;
        }

        Ok(completed)
    }
}

// ============================================================
// PARAMETERS
// ============================================================

static SETUP_PARAMS: &[ParamMeta] = &[
    ParamMeta {
        name: "setup_period",
        param_type: ParamType::Period,
        default: 9.0,
        range: (4.0, 13.0, 1.0),
        description: "Consecutive qualifying bars to complete a setup",
    },
    ParamMeta {
        name: "setup_lookback",
        param_type: ParamType::Period,
        default: 4.0,
        range: (1.0, 6.0, 1.0),
        description: "Offset of the bar each setup bar is compared against",
    },
    ParamMeta {
        name: "flip_period",
        param_type: ParamType::Period,
        default: 4.0,
        range: (2.0, 8.0, 1.0),
        description: "Flip window length minus two (defaults to the lookback)",
    },
    ParamMeta {
        name: "setup_reverse_cancel",
        param_type: ParamType::Flag,
        default: 1.0,
        range: (0.0, 1.0, 1.0),
        description: "Cancel the opposite candidate when a reversing flip arrives",
    },
];

impl<B: OHLCV + Clone> ParameterizedDetector for SetupDetector<B> {
    fn param_meta() -> &'static [ParamMeta] {
        SETUP_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        validate_params(SETUP_PARAMS, params)?;
        let lookback = get_period(params, "setup_lookback", 4)?;
        Self::new(SetupParams {
            period: get_period(params, "setup_period", 9)?,
            lookback,
            flip_period: get_period(params, "flip_period", lookback.get())?,
            reverse_cancel: get_flag(params, "setup_reverse_cancel", true)?,
            ..SetupParams::default()
        })
    }

    fn detector_name() -> &'static str {
        "SETUP"
    }
}

//! Countdown detector
//!
//! Seeded by a completed setup, a buy countdown counts bars whose field is at
//! or below the `low` of the bar `lookback` earlier (sell: at or above the
//! `high`). Once `period` bars qualify, the last qualifying bar must itself
//! reach the field value of the 8th qualifying bar before the countdown is
//! emitted. Until then the window grows by one bar each time it fills, so the
//! count only ever accumulates.

use std::collections::HashMap;
use std::sync::OnceLock;

use tracing::debug;

use super::helpers::{
    check_max_period, countdown_extreme, countdown_holds, max_high, risk_level, LowExtreme,
    QUALIFIER_ORDINAL,
};
use super::setup::SetupSignal;
use crate::{
    params::{get_period, validate_params, ParamMeta, ParamType, ParameterizedDetector},
    window::SlidingWindow,
    Bar, Period, PriceField, Result, SequenceError, SignalDirection, StreamDetector, OHLCV,
};

impl_with_defaults!(CountdownDetector);

// ============================================================
// PURE EVALUATION
// ============================================================

/// Evaluate a countdown in `direction` over the whole of `bars`.
///
/// Bar `i + lookback` is compared with bar `i`; qualifying positions are
/// indices into `bars[lookback..]`.
pub fn countdown<B: OHLCV + Clone>(
    direction: SignalDirection,
    bars: &[B],
    period: usize,
    lookback: usize,
    field: PriceField,
    low_extreme: LowExtreme,
) -> Option<CountdownSignal<B>> {
    if bars.len() <= lookback {
        return None;
    }

    let counted = &bars[lookback..];
    let positions: Vec<usize> = counted
        .iter()
        .zip(bars.iter())
        .enumerate()
        .filter(|(_, (bar, prior))| {
            countdown_holds(direction, field.value(*bar), countdown_extreme(direction, *prior))
        })
        .map(|(position, _)| position)
        .collect();

    if positions.len() < period {
        return None;
    }

    let qualifier = &counted[*positions.get(QUALIFIER_ORDINAL - 1)?];
    let ending = &counted[*positions.last()?];
    if !countdown_holds(
        direction,
        countdown_extreme(direction, ending),
        field.value(qualifier),
    ) {
        debug!(?direction, count = positions.len(), "countdown held back by qualifier bar");
        return None;
    }

    Some(CountdownSignal {
        direction,
        high: max_high(counted),
        low: low_extreme.of(counted),
        bars: counted.to_vec(),
        qualifying_positions: positions,
        setup: None,
        risk: OnceLock::new(),
    })
}

// ============================================================
// SIGNAL
// ============================================================

/// A completed countdown
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CountdownSignal<B = Bar> {
    pub direction: SignalDirection,
    pub high: f64,
    pub low: f64,
    pub bars: Vec<B>,
    /// Indices into `bars` where the countdown comparison held
    pub qualifying_positions: Vec<usize>,
    /// Setup that armed this countdown, with perfection tracked up to emission
    pub setup: Option<SetupSignal<B>>,
    #[serde(skip)]
    risk: OnceLock<f64>,
}

impl<B: OHLCV> CountdownSignal<B> {
    /// Computed on first call, then cached.
    pub fn risk_level(&self) -> Result<f64> {
        if let Some(level) = self.risk.get() {
            return Ok(*level);
        }
        let level = risk_level(self.direction, self.high, self.low, &self.bars)?;
        Ok(*self.risk.get_or_init(|| level))
    }

    /// The 8th qualifying bar
    pub fn qualifier(&self) -> Option<&B> {
        self.qualifying_positions
            .get(QUALIFIER_ORDINAL - 1)
            .and_then(|&p| self.bars.get(p))
    }
}

// ============================================================
// DETECTOR
// ============================================================

/// Countdown detector configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CountdownParams {
    pub period: Period,
    pub lookback: Period,
    pub field: PriceField,
    pub low_extreme: LowExtreme,
}

impl Default for CountdownParams {
    fn default() -> Self {
        Self {
            period: Period::new_const(13),
            lookback: Period::new_const(2),
            field: PriceField::Close,
            low_extreme: LowExtreme::Max,
        }
    }
}

impl CountdownParams {
    /// Base window length, `period + lookback`
    pub fn window_len(&self) -> usize {
        self.period.get().saturating_add(self.lookback.get())
    }

    pub fn validate(&self) -> Result<()> {
        check_max_period("countdown period", self.period)?;
        check_max_period("countdown lookback", self.lookback)?;
        if self.period.get() < QUALIFIER_ORDINAL {
            return Err(SequenceError::InvalidConfig(format!(
                "countdown period {} is shorter than the qualifier bar {QUALIFIER_ORDINAL}",
                self.period.get()
            )));
        }
        Ok(())
    }
}

/// Streaming countdown over a growable `period + lookback` window.
///
/// Seeded with a [`SetupSignal`], it counts in the setup's direction and is
/// spent after one emission. Unseeded, it tries buy then sell each time the
/// window fills and starts over after an emission.
#[derive(Debug, Clone)]
pub struct CountdownDetector<B = Bar> {
    params: CountdownParams,
    window: SlidingWindow<B>,
    direction: Option<SignalDirection>,
    setup: Option<SetupSignal<B>>,
    spent: bool,
}

impl<B: OHLCV + Clone> Default for CountdownDetector<B> {
    fn default() -> Self {
        let params = CountdownParams::default();
        Self {
            window: SlidingWindow::new(params.window_len(), params.field),
            params,
            direction: None,
            setup: None,
            spent: false,
        }
    }
}

impl<B: OHLCV + Clone> CountdownDetector<B> {
    /// Unseeded countdown
    pub fn new(params: CountdownParams) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            window: SlidingWindow::new(params.window_len(), params.field),
            params,
            direction: None,
            setup: None,
            spent: false,
        })
    }

    /// Countdown armed by `setup`, primed with its last `lookback + 1` bars.
    pub fn seeded(params: CountdownParams, setup: SetupSignal<B>) -> Result<Self> {
        let mut detector = Self::new(params)?;

        let start = setup.bars.len().saturating_sub(params.lookback.get().saturating_add(1));
        for bar in &setup.bars[start..] {
            detector.window.accept(bar.clone())?;
        }

        detector.direction = Some(setup.direction);
        detector.setup = Some(setup);
        Ok(detector)
    }

    pub fn params(&self) -> &CountdownParams {
        &self.params
    }

    /// Direction being counted, `None` when unseeded
    pub fn direction(&self) -> Option<SignalDirection> {
        self.direction
    }

    pub fn setup(&self) -> Option<&SetupSignal<B>> {
        self.setup.as_ref()
    }

    pub fn window(&self) -> &SlidingWindow<B> {
        &self.window
    }

    /// A seeded countdown stops counting once it has emitted.
    pub fn is_spent(&self) -> bool {
        self.spent
    }

    fn evaluate(&mut self, direction: SignalDirection) -> Option<CountdownSignal<B>> {
        let (period, lookback) = (self.params.period.get(), self.params.lookback.get());
        let (field, low_extreme) = (self.params.field, self.params.low_extreme);
        countdown(
            direction,
            self.window.as_slice(),
            period,
            lookback,
            field,
            low_extreme,
        )
    }
}

impl<B: OHLCV + Clone> StreamDetector<B> for CountdownDetector<B> {
    type Signal = CountdownSignal<B>;

    fn update(&mut self, bar: &B) -> Result<Option<CountdownSignal<B>>> {
        if self.spent {
            return Ok(None);
        }

        self.window.accept(bar.clone())?;
        if let Some(setup) = self.setup.as_mut() {
            setup.check_perfection(bar);
        }
        if !self.window.is_ready() {
            return Ok(None);
        }

        let signal = match self.direction {
            Some(direction) => self.evaluate(direction),
            None => self
                .evaluate(SignalDirection::Buy)
                .or_else(|| self.evaluate(SignalDirection::Sell)),
        };

        let Some(mut signal) = signal else {
            self.window.grow(1);
            return Ok(None);
        };

        debug!(
            instrument = bar.instrument(),
            direction = ?signal.direction,
            bars = signal.bars.len(),
            qualifying = signal.qualifying_positions.len(),
            "countdown completed"
        );

        match self.setup.take() {
            Some(setup) => {
                signal.setup = Some(setup);
                self.spent = true;
            }
            None => self.window.clear(),
        }
        self.window.reset_target();

        Ok(Some(signal))
    }
}

// ============================================================
// PARAMETERS
// ============================================================

static COUNTDOWN_PARAMS: &[ParamMeta] = &[
    ParamMeta {
        name: "countdown_period",
        param_type: ParamType::Period,
        default: 13.0,
        range: (8.0, 21.0, 1.0),
        description: "Qualifying bars needed to complete a countdown",
    },
    ParamMeta {
        name: "countdown_lookback",
        param_type: ParamType::Period,
        default: 2.0,
        range: (1.0, 4.0, 1.0),
        description: "Offset of the bar whose extreme each bar is compared against",
    },
];

impl<B: OHLCV + Clone> ParameterizedDetector for CountdownDetector<B> {
    fn param_meta() -> &'static [ParamMeta] {
        COUNTDOWN_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        validate_params(COUNTDOWN_PARAMS, params)?;
        Self::new(CountdownParams {
            period: get_period(params, "countdown_period", 13)?,
            lookback: get_period(params, "countdown_lookback", 2)?,
            ..CountdownParams::default()
        })
    }

    fn detector_name() -> &'static str {
        "COUNTDOWN"
    }
}

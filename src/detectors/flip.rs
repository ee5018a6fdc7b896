//! Flip detector
//!
//! Compares the first two bars of a `period + 2` window (`X`, `Y`) with the
//! last two (`X'`, `Y'`):
//!
//! - `X' > X` and `Y' < Y` => [`FlipDirection::Bear`]
//! - `X' < X` and `Y' > Y` => [`FlipDirection::Bull`]
//!
//! The result is a pure function of the trailing window; overlapping windows
//! may each emit a flip.

use std::collections::HashMap;

use tracing::debug;

use crate::{
    params::{get_period, validate_params, ParamMeta, ParamType, ParameterizedDetector},
    window::SlidingWindow,
    Bar, FlipDirection, Period, PriceField, Result, StreamDetector, OHLCV,
};

impl_with_defaults!(FlipDetector);

/// Evaluate a flip over a full window, oldest bar first.
pub fn flip<B: OHLCV>(bars: &[B], field: PriceField) -> Option<FlipDirection> {
    let n = bars.len();
    if n < 3 {
        return None;
    }

    let x = field.value(&bars[0]);
    let y = field.value(&bars[1]);
    let x_prime = field.value(&bars[n - 2]);
    let y_prime = field.value(&bars[n - 1]);

    if x_prime > x && y_prime < y {
        Some(FlipDirection::Bear)
    } else if x_prime < x && y_prime > y {
        Some(FlipDirection::Bull)
    } else {
        None
    }
}

/// A detected flip and the window it was detected on
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FlipSignal<B = Bar> {
    pub direction: FlipDirection,
    pub bars: Vec<B>,
}

/// Streaming flip detector over a `period + 2` window
#[derive(Debug, Clone)]
pub struct FlipDetector<B = Bar> {
    period: Period,
    window: SlidingWindow<B>,
}

impl<B: OHLCV + Clone> Default for FlipDetector<B> {
    fn default() -> Self {
        Self::new(Period::new_const(4), PriceField::Close)
    }
}

impl<B: OHLCV + Clone> FlipDetector<B> {
    pub fn new(period: Period, field: PriceField) -> Self {
        Self {
            period,
            window: SlidingWindow::new(period.get().saturating_add(2), field),
        }
    }

    pub fn period(&self) -> Period {
        self.period
    }

    pub fn field(&self) -> PriceField {
        self.window.field()
    }

    pub fn window(&self) -> &SlidingWindow<B> {
        &self.window
    }
}

impl<B: OHLCV + Clone> StreamDetector<B> for FlipDetector<B> {
    type Signal = FlipSignal<B>;

    fn update(&mut self, bar: &B) -> Result<Option<FlipSignal<B>>> {
        self.window.accept(bar.clone())?;
        if !self.window.is_ready() {
            return Ok(None);
        }

        let field = self.window.field();
        let bars = self.window.as_slice();
        Ok(flip(bars, field).map(|direction| {
            debug!(instrument = bar.instrument(), ?direction, "flip detected");
            FlipSignal {
                direction,
                bars: bars.to_vec(),
            }
        }))
    }
}

// ============================================================
// PARAMETERS
// ============================================================

static FLIP_PARAMS: &[ParamMeta] = &[ParamMeta {
    name: "flip_period",
    param_type: ParamType::Period,
    default: 4.0,
    range: (2.0, 8.0, 1.0),
    description: "Bars between the two compared pairs",
}];

impl<B: OHLCV + Clone> ParameterizedDetector for FlipDetector<B> {
    fn param_meta() -> &'static [ParamMeta] {
        FLIP_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        validate_params(FLIP_PARAMS, params)?;
        Ok(Self::new(
            get_period(params, "flip_period", 4)?,
            PriceField::Close,
        ))
    }

    fn detector_name() -> &'static str {
        "FLIP"
    }
}

//! Sequential coordinator
//!
//! Chains the three detectors for one instrument:
//!
//! ```text
//! AwaitingFlip -> AwaitingSetup -> AwaitingCountdown -> (emit) -> AwaitingFlip
//! ```
//!
//! Every bar goes to the armed countdown (if any), then to the setup
//! candidates and the flip window. A completed setup arms a countdown only
//! while none is armed; the other setup candidate keeps running.

use std::collections::HashMap;

use tracing::{debug, info};

use super::countdown::{CountdownDetector, CountdownSignal};
use super::setup::SetupDetector;
use crate::{
    config::SequentialConfig,
    params::{ParamMeta, ParameterizedDetector},
    Bar, OHLCVExt, Result, StreamDetector, OHLCV,
};

/// Where an instrument stands in the Flip -> Setup -> Countdown chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    AwaitingFlip,
    AwaitingSetup,
    AwaitingCountdown,
}

/// Per-instrument Sequential state machine. Emits only completed countdowns.
#[derive(Debug, Clone)]
pub struct Sequential<B = Bar> {
    config: SequentialConfig,
    setup: SetupDetector<B>,
    countdown: Option<CountdownDetector<B>>,
}

impl<B: OHLCV + Clone> Sequential<B> {
    pub fn new(config: SequentialConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            setup: SetupDetector::new(config.setup_params())?,
            countdown: None,
            config,
        })
    }

    pub fn config(&self) -> &SequentialConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        if self.countdown.is_some() {
            Phase::AwaitingCountdown
        } else if self.setup.has_candidates() {
            Phase::AwaitingSetup
        } else {
            Phase::AwaitingFlip
        }
    }

    pub fn setup_detector(&self) -> &SetupDetector<B> {
        &self.setup
    }

    pub fn countdown_detector(&self) -> Option<&CountdownDetector<B>> {
        self.countdown.as_ref()
    }

    fn validate_bar(&self, bar: &B) -> Result<()> {
        bar.validate_for(self.config.flip_field)?;
        bar.validate_for(self.config.resolved_setup_field())?;
        bar.validate_for(self.config.resolved_countdown_field())
    }
}

impl<B: OHLCV + Clone> StreamDetector<B> for Sequential<B> {
    type Signal = CountdownSignal<B>;

    fn update(&mut self, bar: &B) -> Result<Option<CountdownSignal<B>>> {
        self.validate_bar(bar)?;
        let instrument = bar.instrument();

        let emitted = match self.countdown.as_mut() {
            Some(countdown) => countdown.update(bar)?,
            None => None,
        };
        if let Some(signal) = &emitted {
            info!(
                instrument,
                direction = ?signal.direction,
                timestamp = ?bar.timestamp(),
                perfect = signal.setup.as_ref().is_some_and(|s| s.is_perfect()),
                "sequential countdown"
            );
            self.countdown = None;
        }

        if let Some(setup) = self.setup.update(bar)? {
            if self.countdown.is_none() {
                debug!(instrument, direction = ?setup.direction, "countdown armed");
                self.countdown = Some(CountdownDetector::seeded(
                    self.config.countdown_params(),
                    setup,
                )?);
            } else {
                debug!(instrument, direction = ?setup.direction, "setup ignored while countdown armed");
            }
        }

        Ok(emitted)
    }
}

impl<B: OHLCV + Clone> ParameterizedDetector for Sequential<B> {
    fn param_meta() -> &'static [ParamMeta] {
        SequentialConfig::param_meta()
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Self::new(SequentialConfig::from_params(params)?)
    }

    fn detector_name() -> &'static str {
        "SEQUENTIAL"
    }
}

//! Sequential configuration
//!
//! One [`SequentialConfig`] drives every instrument's coordinator. It is
//! fixed at construction; detectors only expose read-only views of it.
//!
//! ```toml
//! flip_period = 4
//! flip_field = "close"
//! setup_period = 9
//! setup_lookback = 4
//! setup_reverse_cancel = true
//! countdown_period = 13
//! countdown_lookback = 2
//! low_extreme = "max"
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    detectors::{helpers::LowExtreme, CountdownParams, SetupParams},
    params::{get_flag, get_period, validate_params, ParamMeta},
    Period, PriceField, Result, SequenceError,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequentialConfig {
    pub flip_period: Period,
    pub flip_field: PriceField,
    pub setup_period: Period,
    pub setup_lookback: Period,
    /// Falls back to `flip_field`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setup_field: Option<PriceField>,
    pub setup_reverse_cancel: bool,
    pub countdown_period: Period,
    pub countdown_lookback: Period,
    /// Falls back to the resolved setup field
    #[serde(skip_serializing_if = "Option::is_none")]
    pub countdown_field: Option<PriceField>,
    pub low_extreme: LowExtreme,
}

impl Default for SequentialConfig {
    fn default() -> Self {
        Self {
            flip_period: Period::new_const(4),
            flip_field: PriceField::Close,
            setup_period: Period::new_const(9),
            setup_lookback: Period::new_const(4),
            setup_field: None,
            setup_reverse_cancel: true,
            countdown_period: Period::new_const(13),
            countdown_lookback: Period::new_const(2),
            countdown_field: None,
            low_extreme: LowExtreme::Max,
        }
    }
}

static SEQUENTIAL_PARAMS: &[ParamMeta] = &[
    ParamMeta::period("flip_period", 4.0, (2.0, 8.0, 1.0), "Flip window length minus two"),
    ParamMeta::period("setup_period", 9.0, (4.0, 13.0, 1.0), "Consecutive qualifying setup bars"),
    ParamMeta::period("setup_lookback", 4.0, (1.0, 6.0, 1.0), "Setup comparison offset"),
    ParamMeta::flag(
        "setup_reverse_cancel",
        true,
        "Cancel the opposite setup candidate on a reversing flip",
    ),
    ParamMeta::period("countdown_period", 13.0, (8.0, 21.0, 1.0), "Qualifying countdown bars"),
    ParamMeta::period("countdown_lookback", 2.0, (1.0, 4.0, 1.0), "Countdown comparison offset"),
];

impl SequentialConfig {
    pub fn resolved_setup_field(&self) -> PriceField {
        self.setup_field.unwrap_or(self.flip_field)
    }

    pub fn resolved_countdown_field(&self) -> PriceField {
        self.countdown_field.unwrap_or_else(|| self.resolved_setup_field())
    }

    pub fn setup_params(&self) -> SetupParams {
        SetupParams {
            period: self.setup_period,
            lookback: self.setup_lookback,
            field: self.resolved_setup_field(),
            flip_period: self.flip_period,
            flip_field: self.flip_field,
            reverse_cancel: self.setup_reverse_cancel,
            low_extreme: self.low_extreme,
        }
    }

    pub fn countdown_params(&self) -> CountdownParams {
        CountdownParams {
            period: self.countdown_period,
            lookback: self.countdown_lookback,
            field: self.resolved_countdown_field(),
            low_extreme: self.low_extreme,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.setup_params().validate()?;
        self.countdown_params().validate()
    }

    pub fn param_meta() -> &'static [ParamMeta] {
        SEQUENTIAL_PARAMS
    }

    /// Build from a flat parameter map. Supplied values must lie in their
    /// declared ranges; missing keys keep their defaults.
    pub fn from_params(params: &HashMap<&str, f64>) -> Result<Self> {
        validate_params(SEQUENTIAL_PARAMS, params)?;
        let defaults = Self::default();
        let config = Self {
            flip_period: get_period(params, "flip_period", defaults.flip_period.get())?,
            setup_period: get_period(params, "setup_period", defaults.setup_period.get())?,
            setup_lookback: get_period(params, "setup_lookback", defaults.setup_lookback.get())?,
            setup_reverse_cancel: get_flag(
                params,
                "setup_reverse_cancel",
                defaults.setup_reverse_cancel,
            )?,
            countdown_period: get_period(
                params,
                "countdown_period",
                defaults.countdown_period.get(),
            )?,
            countdown_lookback: get_period(
                params,
                "countdown_lookback",
                defaults.countdown_lookback.get(),
            )?,
            ..defaults
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SequenceError::Config(format!("read {}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML document. Missing keys take their defaults.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| SequenceError::Config(format!("parse config TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| SequenceError::Config(format!("serialize config: {e}")))
    }
}

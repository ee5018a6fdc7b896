//! Parameter metadata for the Sequential detectors
//!
//! This module describes each detector's tunable parameters, enabling:
//! - Grid search over periods and lookbacks
//! - Construction from a flat `name -> value` map
//!
//! # Example
//!
//! ```rust
//! use yasd::params::ParameterizedDetector;
//! use yasd::prelude::*;
//!
//! for param in SetupDetector::<Bar>::param_meta() {
//!     println!("{}: {:?} (default: {})", param.name, param.param_type, param.default);
//! }
//! ```

use std::collections::HashMap;

use crate::{Period, Result, SequenceError};

// ============================================================
// PARAMETER TYPES
// ============================================================

/// Type of parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
  /// Period or lookback (positive integer)
  Period,
  /// On/off switch encoded as 0.0 or 1.0
  Flag,
}

/// Metadata for a single detector parameter
#[derive(Debug, Clone)]
pub struct ParamMeta {
  /// Parameter name (e.g., "setup_period")
  pub name: &'static str,
  pub param_type: ParamType,
  pub default: f64,
  /// Range for optimization: (min, max, step)
  pub range: (f64, f64, f64),
  pub description: &'static str,
}

impl ParamMeta {
  pub const fn period(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Period, default, range, description }
  }

  pub const fn flag(name: &'static str, default: bool, description: &'static str) -> Self {
    Self {
      name,
      param_type: ParamType::Flag,
      default: if default { 1.0 } else { 0.0 },
      range: (0.0, 1.0, 1.0),
      description,
    }
  }

  /// Generate all values for grid search
  pub fn generate_grid(&self) -> Vec<f64> {
    let (min, max, step) = self.range;
    let mut values = Vec::new();
    let mut v = min;
    while v <= max + f64::EPSILON {
      values.push(v);
      v += step;
    }
    values
  }

  /// Validate a value for this parameter
  pub fn validate(&self, value: f64) -> Result<()> {
    let (min, max, _) = self.range;
    if value < min || value > max {
      return Err(SequenceError::OutOfRange { field: self.name, value, min, max });
    }
    match self.param_type {
      ParamType::Period => {
        if value < 1.0 || value.fract() != 0.0 {
          return Err(SequenceError::InvalidValue("Period must be a positive integer"));
        }
        Ok(())
      },
      ParamType::Flag => {
        if value != 0.0 && value != 1.0 {
          return Err(SequenceError::InvalidValue("Flag must be 0 or 1"));
        }
        Ok(())
      },
    }
  }
}

// ============================================================
// PARAMETERIZED DETECTOR TRAIT
// ============================================================

/// Detectors that can be built from a flat parameter map
pub trait ParameterizedDetector: Sized {
  /// Returns metadata for all configurable parameters
  fn param_meta() -> &'static [ParamMeta];

  /// Creates a detector with parameters from a HashMap
  ///
  /// Missing parameters use their default values.
  fn with_params(params: &HashMap<&str, f64>) -> Result<Self>;

  fn detector_name() -> &'static str;
}

// ============================================================
// PARAMETER VALUE HELPERS
// ============================================================

/// Check every supplied value against its parameter's declared range and type.
///
/// Keys with no matching metadata are ignored.
pub fn validate_params(metas: &[ParamMeta], params: &HashMap<&str, f64>) -> Result<()> {
  for meta in metas {
    if let Some(&value) = params.get(meta.name) {
      meta.validate(value)?;
    }
  }
  Ok(())
}

/// Get a Period from params with default fallback
pub fn get_period(params: &HashMap<&str, f64>, key: &str, default: usize) -> Result<Period> {
  match params.get(key).copied() {
    None => Period::new(default),
    Some(value) if value.is_finite() && value >= 1.0 && value.fract() == 0.0 => {
      Period::new(value as usize)
    },
    Some(_) => Err(SequenceError::InvalidValue("Period must be a positive integer")),
  }
}

/// Get a flag from params with default fallback (0.0 = off, 1.0 = on)
pub fn get_flag(params: &HashMap<&str, f64>, key: &str, default: bool) -> Result<bool> {
  match params.get(key).copied() {
    None => Ok(default),
    Some(value) if value == 0.0 => Ok(false),
    Some(value) if value == 1.0 => Ok(true),
    Some(_) => Err(SequenceError::InvalidValue("Flag must be 0 or 1")),
  }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_param_meta_period() {
    let meta = ParamMeta::period("test_period", 13.0, (8.0, 21.0, 1.0), "Test period parameter");

    assert_eq!(meta.name, "test_period");
    assert_eq!(meta.param_type, ParamType::Period);
    assert_eq!(meta.default, 13.0);
  }

  #[test]
  fn test_param_meta_flag() {
    let meta = ParamMeta::flag("test_flag", true, "Test flag");
    assert_eq!(meta.param_type, ParamType::Flag);
    assert_eq!(meta.default, 1.0);
    assert_eq!(meta.generate_grid(), vec![0.0, 1.0]);
  }

  #[test]
  fn test_generate_grid() {
    let meta = ParamMeta::period("test", 9.0, (6.0, 12.0, 3.0), "Test");
    assert_eq!(meta.generate_grid(), vec![6.0, 9.0, 12.0]);
  }

  #[test]
  fn test_validate_period() {
    let meta = ParamMeta::period("test", 14.0, (10.0, 20.0, 2.0), "Test");

    assert!(meta.validate(14.0).is_ok());
    assert!(meta.validate(10.0).is_ok());
    assert!(meta.validate(20.0).is_ok());
    assert!(meta.validate(8.0).is_err());
    assert!(meta.validate(22.0).is_err());
    assert!(matches!(meta.validate(12.5), Err(SequenceError::InvalidValue(_))));
  }

  #[test]
  fn test_validate_flag() {
    let meta = ParamMeta::flag("test", false, "Test");
    assert!(meta.validate(0.0).is_ok());
    assert!(meta.validate(1.0).is_ok());
    assert!(meta.validate(0.5).is_err());
  }

  #[test]
  fn test_validate_params_checks_supplied_keys() {
    let metas = [
      ParamMeta::period("period", 13.0, (8.0, 21.0, 1.0), "Test"),
      ParamMeta::flag("flag", true, "Test"),
    ];
    let mut params = HashMap::new();
    params.insert("period", 13.0);
    params.insert("unrelated", -5.0);
    assert!(validate_params(&metas, &params).is_ok());

    params.insert("period", 50.0);
    assert!(matches!(
      validate_params(&metas, &params),
      Err(SequenceError::OutOfRange { field: "period", .. })
    ));

    params.insert("period", 13.0);
    params.insert("flag", 0.5);
    assert!(validate_params(&metas, &params).is_err());
  }

  #[test]
  fn test_get_period_helper() {
    let mut params = HashMap::new();
    params.insert("key1", 20.0);
    params.insert("bad", 2.5);
    params.insert("zero", 0.0);

    assert_eq!(get_period(&params, "key1", 14).unwrap().get(), 20);
    assert_eq!(get_period(&params, "key2", 14).unwrap().get(), 14);
    assert!(get_period(&params, "bad", 14).is_err());
    assert!(get_period(&params, "zero", 14).is_err());
  }

  #[test]
  fn test_get_flag_helper() {
    let mut params = HashMap::new();
    params.insert("on", 1.0);
    params.insert("off", 0.0);
    params.insert("bad", 3.0);

    assert!(get_flag(&params, "on", false).unwrap());
    assert!(!get_flag(&params, "off", true).unwrap());
    assert!(get_flag(&params, "missing", true).unwrap());
    assert!(get_flag(&params, "bad", true).is_err());
  }
}

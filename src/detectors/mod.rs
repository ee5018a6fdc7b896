//! Sequential pattern detectors
//!
//! # Stages
//!
//! - **Flip**: two bar pairs at the ends of a short window reverse direction.
//! - **Setup**: a run of bars each beyond the bar `lookback` earlier, armed by a Flip.
//! - **Countdown**: qualifying bars counted against a lagged extreme, gated by bar 8.
//! - **Sequential**: per-instrument chain of the three above.

pub mod helpers;

/// Generate `with_defaults()` -> `Self::default()` for multiple detector types.
macro_rules! impl_with_defaults {
  ($($detector:ident),* $(,)?) => {
    $(impl<B: $crate::OHLCV + Clone> $detector<B> {
      pub fn with_defaults() -> Self { Self::default() }
    })*
  };
}

pub mod countdown;
pub mod flip;
pub mod sequential;
pub mod setup;

// Re-export all detectors for convenience
pub use countdown::*;
pub use flip::*;
pub use helpers::*;
pub use sequential::*;
pub use setup::*;

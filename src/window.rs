//! Bounded, growable trailing window of bars
//!
//! Every detector keeps its history in a [`SlidingWindow`]. Bars are kept in
//! arrival order and the oldest are evicted once the window holds more than
//! its target length. The Countdown grows its target one bar at a time while
//! armed so no history needed for the qualifier check is lost.

use std::collections::VecDeque;

use tracing::trace;

use crate::{OHLCVExt, PriceField, Result, OHLCV};

/// Upper bound on the buffer reserved up front; longer windows allocate as they fill.
const MAX_PREALLOC: usize = 64;

/// Ordered trailing buffer, oldest bar first
#[derive(Debug, Clone)]
pub struct SlidingWindow<B> {
    bars: VecDeque<B>,
    base_len: usize,
    target_len: usize,
    field: PriceField,
}

impl<B: OHLCV> SlidingWindow<B> {
    pub fn new(target_len: usize, field: PriceField) -> Self {
        Self {
            bars: VecDeque::with_capacity(target_len.saturating_add(1).min(MAX_PREALLOC)),
            base_len: target_len,
            target_len,
            field,
        }
    }

    /// Append a bar, rejecting it if the compared field, `high` or `low` is
    /// not a finite number. Evicts from the front down to the target length.
    pub fn accept(&mut self, bar: B) -> Result<()> {
        bar.validate_for(self.field)?;
        self.bars.push_back(bar);
        self.evict();
        Ok(())
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.bars.len() >= self.target_len
    }

    /// Raise the target length so the next accepted bars are kept in full.
    pub fn grow(&mut self, by: usize) {
        self.target_len = self.target_len.saturating_add(by);
        trace!(target_len = self.target_len, len = self.bars.len(), "window grown");
    }

    /// Shrink back to the construction-time length, evicting surplus bars.
    pub fn reset_target(&mut self) {
        self.target_len = self.base_len;
        self.evict();
    }

    pub fn clear(&mut self) {
        self.bars.clear();
    }

    fn evict(&mut self) {
        while self.bars.len() > self.target_len {
            self.bars.pop_front();
        }
    }

    /// Contiguous view of the window, oldest first.
    pub fn as_slice(&mut self) -> &[B] {
        self.bars.make_contiguous()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &B> + ExactSizeIterator {
        self.bars.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    #[inline]
    pub fn target_len(&self) -> usize {
        self.target_len
    }

    #[inline]
    pub fn base_len(&self) -> usize {
        self.base_len
    }

    #[inline]
    pub fn field(&self) -> PriceField {
        self.field
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Bar, SequenceError};

    fn bar(close: f64) -> Bar {
        Bar::new("X", 0, close, close + 1.0, close - 1.0, close, 0.0)
    }

    fn closes(window: &SlidingWindow<Bar>) -> Vec<f64> {
        window.iter().map(|b| b.close).collect()
    }

    #[test]
    fn test_fills_then_evicts_oldest() {
        let mut window = SlidingWindow::new(3, PriceField::Close);
        for c in [1.0, 2.0] {
            window.accept(bar(c)).unwrap();
        }
        assert!(!window.is_ready());

        window.accept(bar(3.0)).unwrap();
        assert!(window.is_ready());
        assert_eq!(closes(&window), vec![1.0, 2.0, 3.0]);

        window.accept(bar(4.0)).unwrap();
        assert_eq!(closes(&window), vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_grow_keeps_history() {
        let mut window = SlidingWindow::new(2, PriceField::Close);
        window.accept(bar(1.0)).unwrap();
        window.accept(bar(2.0)).unwrap();
        window.grow(1);
        assert!(!window.is_ready());

        window.accept(bar(3.0)).unwrap();
        assert!(window.is_ready());
        assert_eq!(window.target_len(), 3);
        assert_eq!(closes(&window), vec![1.0, 2.0, 3.0]);

        window.reset_target();
        assert_eq!(window.target_len(), window.base_len());
        assert_eq!(closes(&window), vec![2.0, 3.0]);
    }

    #[test]
    fn test_rejects_malformed_bar_without_storing_it() {
        let mut window = SlidingWindow::new(3, PriceField::Close);
        window.accept(bar(1.0)).unwrap();

        let mut broken = bar(2.0);
        broken.high = f64::NAN;
        let err = window.accept(broken).unwrap_err();
        assert!(matches!(
            err,
            SequenceError::MalformedBar {
                field: PriceField::High,
                ..
            }
        ));
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn test_huge_target_does_not_reserve_up_front() {
        let mut window = SlidingWindow::new(usize::MAX, PriceField::Close);
        window.accept(bar(1.0)).unwrap();
        assert!(!window.is_ready());

        window.grow(1);
        assert_eq!(window.target_len(), usize::MAX);
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn test_as_slice_is_oldest_first() {
        let mut window = SlidingWindow::new(2, PriceField::Close);
        for c in [1.0, 2.0, 3.0] {
            window.accept(bar(c)).unwrap();
        }
        let slice = window.as_slice();
        assert_eq!(slice[0].close, 2.0);
        assert_eq!(slice[1].close, 3.0);
    }
}

//! Overlap-save accumulation window

use crate::runtime::sample::{self, Sample};

/// Sliding window of `fft_size` samples.
///
/// Each step keeps the newest `overlap` samples at the front and makes room
/// for `fft_size - overlap` fresh ones at the back, so consecutive windows
/// share exactly `overlap` samples.
#[derive(Debug, Clone)]
pub struct OverlapWindow {
    buf: Vec<Sample>,
    overlap: usize,
}

impl OverlapWindow {
    /// Zeroed window
    ///
    /// # Panics
    /// Panics if `overlap >= fft_size`.
    pub fn new(fft_size: usize, overlap: usize) -> Self {
        assert!(
            overlap < fft_size,
            "Overlap of {} leaves no room in a window of {}",
            overlap,
            fft_size
        );
        Self {
            buf: sample::zeroed(fft_size),
            overlap,
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Fresh samples per step
    pub fn input_size(&self) -> usize {
        self.buf.len() - self.overlap
    }

    /// Shift the tail to the front and return the region to refill.
    ///
    /// The returned slice is `input_size` samples long and still holds the
    /// previous step's data until it is overwritten.
    pub fn advance(&mut self) -> &mut [Sample] {
        let input_size = self.input_size();
        self.buf.copy_within(input_size.., 0);
        &mut self.buf[self.overlap..]
    }

    /// Advance by one step with `fresh` samples.
    ///
    /// # Panics
    /// Panics if `fresh.len()` differs from [`input_size`](Self::input_size).
    pub fn push(&mut self, fresh: &[Sample]) {
        self.advance().copy_from_slice(fresh);
    }

    pub fn as_slice(&self) -> &[Sample] {
        &self.buf
    }

    /// Zero the window, forgetting all history
    pub fn reset(&mut self) {
        self.buf.fill(sample::ZERO);
    }
}

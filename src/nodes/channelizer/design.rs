//! Overlap-save geometry for the channelizer
//!
//! Maps a decimation factor and a normalized transition bandwidth to the
//! FFT size, the number of fresh samples consumed per frame and the overlap
//! carried between frames:
//!
//! 1. `taps = floor(4 / transition_bw)`, bumped to the next odd number
//! 2. `overlap_length = ceil((taps - 1) / decimation) * decimation`
//! 3. `fft_size = 2 * next_pow2(taps)` rounded up to a multiple of
//!    `decimation`, and at least `overlap_length + decimation`
//! 4. `input_size = fft_size - overlap_length`
//!
//! Overlap and input are both multiples of the decimation, so the overlap
//! only depends on `taps` and never shrinks as the transition narrows.

use std::fmt;
use thiserror::Error;

/// Largest FFT the channelizer will plan
pub const MAX_FFT_SIZE: usize = 1 << 22;

/// Infeasible channelizer parameters
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DesignError {
    #[error("Decimation must be positive, got {0}")]
    InvalidDecimation(i32),

    #[error("Transition bandwidth must be in (0, 1), got {0}")]
    InvalidTransitionBandwidth(f32),

    #[error("Design needs an FFT of {required} samples, limit is {limit}")]
    FftTooLarge { required: usize, limit: usize },
}

/// Frame geometry of an overlap-save channelizer.
///
/// Always satisfies `fft_size == input_size + overlap_length` with
/// `input_size` a positive multiple of `decimation`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelizerConfig {
    decimation: usize,
    transition_bandwidth: f32,
    fft_size: usize,
    input_size: usize,
    overlap_length: usize,
}

impl ChannelizerConfig {
    /// Derive the frame geometry from the decimation factor and the
    /// transition bandwidth (as a fraction of the output sample rate).
    pub fn design(decimation: i32, transition_bw: f32) -> Result<Self, DesignError> {
        if decimation <= 0 {
            return Err(DesignError::InvalidDecimation(decimation));
        }
        if !transition_bw.is_finite() || transition_bw <= 0.0 || transition_bw >= 1.0 {
            return Err(DesignError::InvalidTransitionBandwidth(transition_bw));
        }
        let decimation = decimation as usize;
        if decimation > MAX_FFT_SIZE / 2 {
            return Err(DesignError::FftTooLarge {
                required: decimation * 2,
                limit: MAX_FFT_SIZE,
            });
        }

        let taps = (4.0 / f64::from(transition_bw)).floor();
        if taps >= MAX_FFT_SIZE as f64 {
            return Err(DesignError::FftTooLarge {
                required: (taps as usize).saturating_mul(2),
                limit: MAX_FFT_SIZE,
            });
        }
        let taps = (taps as usize) | 1;
        let overlap_length = (taps - 1).div_ceil(decimation) * decimation;

        let fft_size = (2 * taps.next_power_of_two())
            .next_multiple_of(decimation)
            .max(overlap_length + decimation);
        if fft_size > MAX_FFT_SIZE {
            return Err(DesignError::FftTooLarge {
                required: fft_size,
                limit: MAX_FFT_SIZE,
            });
        }

        Ok(Self {
            decimation,
            transition_bandwidth: transition_bw,
            fft_size,
            input_size: fft_size - overlap_length,
            overlap_length,
        })
    }

    pub fn decimation(&self) -> usize {
        self.decimation
    }

    pub fn transition_bandwidth(&self) -> f32 {
        self.transition_bandwidth
    }

    /// Samples per transform (and per fan-out frame)
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Fresh samples consumed per frame
    pub fn input_size(&self) -> usize {
        self.input_size
    }

    /// Samples carried over from the previous frame
    pub fn overlap_length(&self) -> usize {
        self.overlap_length
    }

    /// Longest filter the overlap can accommodate
    pub fn taps_length(&self) -> usize {
        self.overlap_length + 1
    }

    /// Output samples per frame after decimation
    pub fn output_size(&self) -> usize {
        self.input_size / self.decimation
    }
}

impl fmt::Display for ChannelizerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "decimation: {} transition bw: {} fft size: {} input size: {} overlap: {} taps: {}",
            self.decimation,
            self.transition_bandwidth,
            self.fft_size,
            self.input_size,
            self.overlap_length,
            self.taps_length()
        )
    }
}

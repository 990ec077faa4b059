//! Core data types for signal processing

use num_complex::Complex;

/// A complex baseband sample
pub type Sample = Complex<f32>;

/// The all-zero sample
pub const ZERO: Sample = Complex::new(0.0, 0.0);

/// Allocate a zero-initialized sample buffer.
pub fn zeroed(len: usize) -> Vec<Sample> {
    vec![ZERO; len]
}

//! Spectrum bin ordering
//!
//! A forward FFT leaves DC in bin 0 with negative frequencies in the upper
//! half. The channelizer publishes spectra with the two halves swapped so
//! that bins run from the most negative frequency to the most positive.

use crate::runtime::sample::Sample;

/// Reorder FFT output so that DC lands in the middle.
///
/// For even lengths this swaps the two halves in place; odd lengths are
/// rotated so that DC ends up at index `len / 2`.
pub fn swap_sides(bins: &mut [Sample]) {
    let half = bins.len() / 2;
    if bins.len() % 2 == 0 {
        let (low, high) = bins.split_at_mut(half);
        low.swap_with_slice(high);
    } else {
        bins.rotate_left(half + 1);
    }
}

/// Undo [`swap_sides`], bringing DC back to bin 0
pub fn restore_sides(bins: &mut [Sample]) {
    let half = bins.len() / 2;
    bins.rotate_left(half);
}

/// Index of the bin with the largest magnitude
pub fn peak_bin(bins: &[Sample]) -> Option<usize> {
    bins.iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.norm_sqr().total_cmp(&b.norm_sqr()))
        .map(|(index, _)| index)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bins(len: usize) -> Vec<Sample> {
        (0..len).map(|i| Sample::new(i as f32, 0.0)).collect()
    }

    #[test]
    fn test_swap_even() {
        let mut spectrum = bins(8);
        swap_sides(&mut spectrum);
        let re: Vec<f32> = spectrum.iter().map(|s| s.re).collect();
        assert_eq!(re, vec![4.0, 5.0, 6.0, 7.0, 0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_swap_odd_centers_dc() {
        let mut spectrum = bins(5);
        swap_sides(&mut spectrum);
        let re: Vec<f32> = spectrum.iter().map(|s| s.re).collect();
        assert_eq!(re, vec![3.0, 4.0, 0.0, 1.0, 2.0]);
        assert_eq!(spectrum[5 / 2].re, 0.0);
    }

    #[test]
    fn test_restore_undoes_swap() {
        for len in [1, 2, 7, 8, 128] {
            let mut spectrum = bins(len);
            swap_sides(&mut spectrum);
            restore_sides(&mut spectrum);
            assert_eq!(spectrum, bins(len));
        }
    }

    #[test]
    fn test_peak_bin() {
        let mut spectrum = vec![Sample::new(0.0, 0.0); 16];
        spectrum[11] = Sample::new(0.0, -3.0);
        spectrum[2] = Sample::new(1.0, 1.0);
        assert_eq!(peak_bin(&spectrum), Some(11));
        assert_eq!(peak_bin(&[]), None);
    }
}

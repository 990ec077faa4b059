use chanpipe::{ChannelizerConfig, DesignError, MAX_FFT_SIZE};
use proptest::prelude::*;

proptest! {
    #[test]
    fn design_is_deterministic(decimation in 1i32..=512, bw in 0.001f32..0.999) {
        let first = ChannelizerConfig::design(decimation, bw);
        let second = ChannelizerConfig::design(decimation, bw);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn frame_geometry_adds_up(decimation in 1i32..=512, bw in 0.001f32..0.999) {
        let config = ChannelizerConfig::design(decimation, bw).unwrap();
        prop_assert_eq!(config.fft_size(), config.input_size() + config.overlap_length());
        prop_assert!(config.input_size() > 0);
        prop_assert!(config.overlap_length() > 0);
        prop_assert_eq!(config.input_size() % decimation as usize, 0);
        prop_assert!(config.output_size() >= 1);
        prop_assert!(config.fft_size() <= MAX_FFT_SIZE);
    }

    #[test]
    fn narrower_transition_needs_more_overlap(
        decimation in 1i32..=64,
        bw in 0.002f32..0.999,
        shrink in 0.05f32..0.95,
    ) {
        let wide = ChannelizerConfig::design(decimation, bw).unwrap();
        let narrow = ChannelizerConfig::design(decimation, bw * shrink).unwrap();
        prop_assert!(
            narrow.overlap_length() >= wide.overlap_length(),
            "wide: {} narrow: {}",
            wide,
            narrow
        );
        prop_assert_eq!(narrow.overlap_length() % decimation as usize, 0);
    }

    #[test]
    fn nonpositive_decimation_rejected(decimation in i32::MIN..=0, bw in 0.001f32..0.999) {
        prop_assert_eq!(
            ChannelizerConfig::design(decimation, bw),
            Err(DesignError::InvalidDecimation(decimation))
        );
    }
}

#[test]
fn overlap_grows_across_widely_spaced_bandwidths() {
    let overlaps: Vec<usize> = [0.5, 0.2, 0.1, 0.05, 0.01]
        .iter()
        .map(|&bw| ChannelizerConfig::design(8, bw).unwrap().overlap_length())
        .collect();
    assert!(overlaps.windows(2).all(|pair| pair[0] < pair[1]), "{:?}", overlaps);
}

/// Loudness estimation
///
/// Maps one frame of 16-bit PCM samples to a single non-negative scalar:
/// the root-mean-square of the raw sample values (no normalization), so a
/// full-scale square wave reads ~32767.

use crate::audio::AudioSample;

/// Loudness of one frame, in raw sample units.
pub type Loudness = f64;

/// Root-mean-square of a frame.
///
/// Empty frames and NaN results both resolve to `0.0`.
pub fn compute_rms(samples: &[AudioSample]) -> Loudness {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f64 = samples
        .iter()
        .map(|&s| {
            let f = s as f64;
            f * f
        })
        .sum();

    let rms = (sum_squares / samples.len() as f64).sqrt();

    if rms.is_nan() {
        0.0
    } else {
        rms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_empty_frame_is_silent() {
        assert_eq!(compute_rms(&[]), 0.0);
    }

    #[test]
    fn test_all_zero_frame() {
        assert_eq!(compute_rms(&[0; 1024]), 0.0);
    }

    #[test]
    fn test_exact_value() {
        // sqrt((1 + 4 + 9) / 3)
        let rms = compute_rms(&[1, 2, 3]);
        assert_relative_eq!(rms, (14.0f64 / 3.0).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_sign_does_not_matter() {
        assert_relative_eq!(compute_rms(&[-100, 100, -100, 100]), 100.0, epsilon = 1e-12);
        assert_relative_eq!(compute_rms(&[-300; 64]), 300.0, epsilon = 1e-12);
    }

    #[test]
    fn test_full_scale_does_not_overflow() {
        let frame = vec![i16::MIN; 4096];
        assert_relative_eq!(compute_rms(&frame), 32768.0, epsilon = 1e-9);
    }

    #[test]
    fn test_matches_textbook_formula() {
        let frame: Vec<i16> = (0..1000).map(|i| ((i * 37) % 2001 - 1000) as i16).collect();

        let expected = (frame.iter().map(|&s| (s as f64).powi(2)).sum::<f64>()
            / frame.len() as f64)
            .sqrt();

        let rms = compute_rms(&frame);
        assert!(rms >= 0.0);
        assert_relative_eq!(rms, expected, max_relative = 1e-12);
    }

    #[test]
    fn test_identical_frames_identical_loudness() {
        let frame: Vec<i16> = (0..512).map(|i| (i * 7) as i16).collect();
        assert_eq!(compute_rms(&frame), compute_rms(&frame.clone()));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(256))]

            #[test]
            fn rms_matches_formula(frame in prop::collection::vec(any::<i16>(), 1..2048)) {
                let expected = (frame.iter().map(|&s| (s as f64).powi(2)).sum::<f64>()
                    / frame.len() as f64)
                    .sqrt();

                let rms = compute_rms(&frame);
                prop_assert!(rms >= 0.0);
                prop_assert!((rms - expected).abs() <= expected * 1e-12);
            }

            #[test]
            fn rms_bounded_by_peak(frame in prop::collection::vec(any::<i16>(), 1..2048)) {
                let peak = frame.iter().map(|&s| (s as f64).abs()).fold(0.0, f64::max);
                prop_assert!(compute_rms(&frame) <= peak + 1e-9);
            }

            #[test]
            fn rms_ignores_sign(frame in prop::collection::vec(-32767i16..=32767, 1..512)) {
                let flipped: Vec<i16> = frame.iter().map(|&s| -s).collect();
                prop_assert_eq!(compute_rms(&frame), compute_rms(&flipped));
            }
        }
    }
}

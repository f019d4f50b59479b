use crate::segmentation::SegmentError;
use log::{debug, warn};
use ndarray::{Array2, Axis};

/// Per-sample amplitude: mean absolute value across all channels.
///
/// Rows are samples and columns are channels. A matrix without channels
/// yields zeros.
pub fn amplitude(channels: &Array2<f64>) -> Vec<f64> {
    let n_channels = channels.ncols();
    if n_channels == 0 {
        return vec![0.0; channels.nrows()];
    }
    channels
        .axis_iter(Axis(0))
        .map(|row| row.iter().map(|v| v.abs()).sum::<f64>() / n_channels as f64)
        .collect()
}

/// Seconds since the first timestamp, for nanosecond log times.
pub fn relative_seconds_ns(timestamps: &[i64]) -> Vec<f64> {
    let Some(&t0) = timestamps.first() else {
        return Vec::new();
    };
    timestamps
        .iter()
        .map(|&t| (t - t0) as f64 / 1e9)
        .collect()
}

/// Seconds since the earliest timestamp, for millisecond clocks.
pub fn relative_seconds_ms(timestamps: &[f64]) -> Vec<f64> {
    let t0 = timestamps.iter().copied().fold(f64::INFINITY, f64::min);
    timestamps.iter().map(|&t| (t - t0) / 1000.0).collect()
}

/// Estimate the sampling rate in Hz from the mean sample interval.
pub fn sampling_rate(times: &[f64]) -> Result<f64, SegmentError> {
    if times.len() < 2 {
        return Err(SegmentError::InvalidSamplingRate);
    }
    let mean_interval = (times[times.len() - 1] - times[0]) / (times.len() - 1) as f64;
    if !(mean_interval > 0.0) || !mean_interval.is_finite() {
        return Err(SegmentError::InvalidSamplingRate);
    }
    Ok(1.0 / mean_interval)
}

/// Resting offset of a channel: the mean of all values recorded after
/// `after` seconds.
pub fn baseline_offset(times: &[f64], values: &[f64], after: f64) -> Option<f64> {
    let (sum, count) = times
        .iter()
        .zip(values)
        .filter(|&(&t, _)| t > after)
        .fold((0.0, 0usize), |(sum, count), (_, &v)| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Subtract the resting offset in place and return it.
///
/// When nothing was recorded after `after` the channel is left untouched.
pub fn remove_offset(times: &[f64], values: &mut [f64], after: f64) -> Option<f64> {
    match baseline_offset(times, values, after) {
        Some(offset) => {
            values.iter_mut().for_each(|v| *v -= offset);
            Some(offset)
        }
        None => {
            warn!(
                "no samples after {:.1}s to estimate the offset, leaving channel unbalanced",
                after
            );
            None
        }
    }
}

/// Mask of samples whose magnitude exceeds `threshold`.
pub fn near_zero_mask(values: &[f64], threshold: f64) -> Vec<bool> {
    values.iter().map(|v| v.abs() > threshold).collect()
}

/// Select the elements whose mask entry is set.
pub fn apply_mask(values: &[f64], mask: &[bool]) -> Vec<f64> {
    values
        .iter()
        .zip(mask)
        .filter_map(|(&v, &keep)| keep.then_some(v))
        .collect()
}

fn gaussian_kernel(sigma: f64, truncate: f64) -> Vec<f64> {
    let radius = (truncate * sigma + 0.5) as usize;
    let weights: Vec<f64> = (0..=2 * radius)
        .map(|i| {
            let x = i as f64 - radius as f64;
            (-0.5 * x * x / (sigma * sigma)).exp()
        })
        .collect();
    let total: f64 = weights.iter().sum();
    weights.into_iter().map(|w| w / total).collect()
}

/// Mirror an out-of-range index back into `0..len`, repeating the edge
/// sample (`d c b a | a b c d | d c b a`).
fn reflect_index(mut idx: isize, len: usize) -> usize {
    let len = len as isize;
    let period = 2 * len;
    idx = idx.rem_euclid(period);
    if idx >= len {
        idx = period - idx - 1;
    }
    idx as usize
}

/// 1-D Gaussian smoothing with a kernel truncated at four standard
/// deviations and mirrored borders.
pub fn gaussian_smooth(values: &[f64], sigma: f64) -> Vec<f64> {
    if values.is_empty() || !(sigma > 0.0) {
        return values.to_vec();
    }
    let kernel = gaussian_kernel(sigma, 4.0);
    let radius = (kernel.len() / 2) as isize;
    debug!("gaussian kernel sigma {} radius {}", sigma, radius);

    (0..values.len() as isize)
        .map(|i| {
            kernel
                .iter()
                .enumerate()
                .map(|(k, w)| w * values[reflect_index(i + k as isize - radius, values.len())])
                .sum()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_amplitude_mean_absolute() {
        let channels = array![[1.0, -3.0], [0.0, 0.0], [-2.0, -2.0]];
        assert_eq!(amplitude(&channels), vec![2.0, 0.0, 2.0]);
    }

    #[test]
    fn test_relative_seconds() {
        let ns = [1_730_000_000_000_000_000i64, 1_730_000_000_500_000_000];
        assert_eq!(relative_seconds_ns(&ns), vec![0.0, 0.5]);

        let ms = [2000.0, 1000.0, 3500.0];
        assert_eq!(relative_seconds_ms(&ms), vec![1.0, 0.0, 2.5]);
    }

    #[test]
    fn test_sampling_rate() {
        let times: Vec<f64> = (0..11).map(|i| i as f64 * 0.01).collect();
        let rate = sampling_rate(&times).unwrap();
        assert!((rate - 100.0).abs() < 1e-6);
        assert_eq!(sampling_rate(&[1.0]), Err(SegmentError::InvalidSamplingRate));
        assert_eq!(
            sampling_rate(&[1.0, 1.0]),
            Err(SegmentError::InvalidSamplingRate)
        );
    }

    #[test]
    fn test_remove_offset() {
        let times = [0.0, 30.0, 61.0, 62.0];
        let mut values = [10.0, 12.0, 4.0, 6.0];
        assert_eq!(remove_offset(&times, &mut values, 60.0), Some(5.0));
        assert_eq!(values, [5.0, 7.0, -1.0, 1.0]);

        let mut values = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(remove_offset(&times, &mut values, 100.0), None);
        assert_eq!(values, [1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_near_zero_mask() {
        let values = [0.05, -0.2, 0.1, 3.0];
        let mask = near_zero_mask(&values, 0.1);
        assert_eq!(mask, vec![false, true, false, true]);
        assert_eq!(apply_mask(&values, &mask), vec![-0.2, 3.0]);
    }

    #[test]
    fn test_gaussian_preserves_constant_signal() {
        let values = vec![7.0; 5];
        for v in gaussian_smooth(&values, 2.0) {
            assert!((v - 7.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_gaussian_spreads_impulse() {
        let mut values = vec![0.0; 41];
        values[20] = 1.0;
        let smoothed = gaussian_smooth(&values, 2.0);
        let total: f64 = smoothed.iter().sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert!(smoothed[20] < 0.25 && smoothed[20] > 0.19);
        assert!((smoothed[18] - smoothed[22]).abs() < 1e-15);
        // radius is 8 samples
        assert_eq!(smoothed[11], 0.0);
        assert!(smoothed[12] > 0.0);
    }

    #[test]
    fn test_reflect_index() {
        assert_eq!(reflect_index(-1, 4), 0);
        assert_eq!(reflect_index(-2, 4), 1);
        assert_eq!(reflect_index(4, 4), 3);
        assert_eq!(reflect_index(5, 4), 2);
        assert_eq!(reflect_index(9, 4), 1);
    }
}

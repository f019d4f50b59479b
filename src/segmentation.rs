//! Peak-window segmentation.
//!
//! A recording is split into four equal-duration segments and, inside each
//! segment, a narrow window is placed around the sample of highest amplitude.
//! The right edge of every window gets an extra extension because the
//! activity bursts decay more slowly than they rise.

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::window_indices;

/// Number of segments (and windows) a trial is divided into.
pub const SEGMENT_COUNT: usize = 4;

#[derive(Debug, Error, PartialEq)]
pub enum SegmentError {
    #[error("signal is empty")]
    Empty,
    #[error("time axis has {times} samples but amplitude has {values}")]
    LengthMismatch { times: usize, values: usize },
    #[error("no sample exceeds the activity threshold")]
    NoActivity,
    #[error("segment {0} contains no samples")]
    EmptySegment(usize),
    #[error("found {found} peaks, {required} are required")]
    InsufficientPeaks { found: usize, required: usize },
    #[error("cannot estimate a sampling rate from the time axis")]
    InvalidSamplingRate,
    #[error("unknown sensor {0}")]
    UnknownSensor(String),
}

/// A time interval in seconds relative to the start of the recording.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    #[serde(rename = "start_time")]
    pub start: f64,
    #[serde(rename = "end_time")]
    pub end: f64,
}

impl TimeWindow {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t <= self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowParams {
    /// Window width as a fraction of the segment duration.
    pub width_fraction: f64,
    /// Extra seconds added to the right side of each window.
    pub right_extension: f64,
    /// Trim quiet leading/trailing samples below `factor * max(amplitude)`.
    pub trim_factor: Option<f64>,
}

impl Default for WindowParams {
    fn default() -> Self {
        Self {
            width_fraction: 0.3,
            right_extension: 0.4,
            trim_factor: None,
        }
    }
}

fn check_lengths(times: &[f64], values: &[f64]) -> Result<(), SegmentError> {
    if times.len() != values.len() {
        return Err(SegmentError::LengthMismatch {
            times: times.len(),
            values: values.len(),
        });
    }
    if times.is_empty() {
        return Err(SegmentError::Empty);
    }
    Ok(())
}

/// Time span of the active part of a recording.
///
/// The span runs from the first to the last sample (in recorded order) whose
/// amplitude is strictly above `factor * max(amplitude)`.
pub fn trim_to_activity(
    times: &[f64],
    amplitude: &[f64],
    factor: f64,
) -> Result<TimeWindow, SegmentError> {
    check_lengths(times, amplitude)?;

    let max_amp = amplitude
        .iter()
        .copied()
        .filter(|a| !a.is_nan())
        .fold(f64::NEG_INFINITY, f64::max);
    let threshold = factor * max_amp;

    let first = amplitude.iter().position(|&a| a > threshold);
    let last = amplitude.iter().rposition(|&a| a > threshold);
    let (first, last) = match (first, last) {
        (Some(f), Some(l)) => (f, l),
        _ => return Err(SegmentError::NoActivity),
    };

    let active = TimeWindow {
        start: times[first],
        end: times[last],
    };
    debug!(
        "activity threshold {:.3} keeps {:.3}s..{:.3}s",
        threshold, active.start, active.end
    );
    Ok(active)
}

/// Locate the four peak windows of a recording.
///
/// `times` are seconds and `amplitude` the per-sample amplitude (see
/// [`crate::preprocessing::amplitude`]). Every one of the four segments must
/// contain at least one sample.
pub fn peak_windows(
    times: &[f64],
    amplitude: &[f64],
    params: &WindowParams,
) -> Result<[TimeWindow; SEGMENT_COUNT], SegmentError> {
    check_lengths(times, amplitude)?;

    let trimmed: (Vec<f64>, Vec<f64>);
    let (times, amplitude) = match params.trim_factor {
        Some(factor) => {
            let active = trim_to_activity(times, amplitude, factor)?;
            let rows = window_indices(times, &active);
            trimmed = (
                rows.iter().map(|&i| times[i]).collect(),
                rows.iter().map(|&i| amplitude[i]).collect(),
            );
            (trimmed.0.as_slice(), trimmed.1.as_slice())
        }
        None => (times, amplitude),
    };

    let t_min = times.iter().copied().fold(f64::INFINITY, f64::min);
    let t_max = times.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let segment_duration = (t_max - t_min) / SEGMENT_COUNT as f64;
    let window_size = segment_duration * params.width_fraction;

    let mut windows = [TimeWindow { start: 0.0, end: 0.0 }; SEGMENT_COUNT];
    for (i, window) in windows.iter_mut().enumerate() {
        let seg_start = t_min + i as f64 * segment_duration;
        let seg_end = seg_start + segment_duration;

        let mut peak: Option<(f64, f64)> = None;
        for (&t, &a) in times.iter().zip(amplitude) {
            if t < seg_start || t >= seg_end || a.is_nan() {
                continue;
            }
            match peak {
                Some((_, best)) if a <= best => {}
                _ => peak = Some((t, a)),
            }
        }
        let (peak_time, peak_amp) = peak.ok_or(SegmentError::EmptySegment(i))?;

        *window = TimeWindow {
            start: seg_start.max(peak_time - window_size / 2.0),
            end: seg_end.min(peak_time + window_size / 2.0 + params.right_extension),
        };
        debug!(
            "segment {}: [{:.3}, {:.3}) peak {:.3} at {:.3}s -> window [{:.3}, {:.3}]",
            i, seg_start, seg_end, peak_amp, peak_time, window.start, window.end
        );
    }

    Ok(windows)
}

/// A contiguous run of samples assigned to one peak.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub time: Vec<f64>,
    pub values: Vec<f64>,
}

impl Segment {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn truncate(&mut self, len: usize) {
        self.time.truncate(len);
        self.values.truncate(len);
    }
}

/// Split a signal into one segment per peak, using the first four peaks.
///
/// Segment boundaries sit at the midpoints between neighbouring peaks; the
/// first segment starts at the beginning of the data and the last one runs
/// to its end.
pub fn segment_by_peaks(
    times: &[f64],
    values: &[f64],
    peaks: &[usize],
) -> Result<Vec<Segment>, SegmentError> {
    check_lengths(times, values)?;
    if peaks.len() < SEGMENT_COUNT {
        return Err(SegmentError::InsufficientPeaks {
            found: peaks.len(),
            required: SEGMENT_COUNT,
        });
    }
    let peaks = &peaks[..SEGMENT_COUNT];

    let segments = peaks
        .iter()
        .enumerate()
        .map(|(i, &peak)| {
            let start = if i == 0 { 0 } else { (peaks[i - 1] + peak) / 2 };
            let end = if i == peaks.len() - 1 {
                values.len()
            } else {
                (peak + peaks[i + 1]) / 2
            };
            let end = end.min(values.len());
            let start = start.min(end);
            Segment {
                time: times[start..end].to_vec(),
                values: values[start..end].to_vec(),
            }
        })
        .collect();

    Ok(segments)
}

/// First index from which `window` consecutive values stay inside
/// `[lower, upper]`, or `values.len()` if the signal never settles.
///
/// Only start positions in `0..values.len() - window` are considered.
pub fn stabilization_cutoff(values: &[f64], lower: f64, upper: f64, window: usize) -> usize {
    if window == 0 || values.len() <= window {
        return values.len();
    }
    let in_band = |v: f64| v >= lower && v <= upper;

    // Length of the in-band run starting at each index, computed backwards.
    let mut run = vec![0usize; values.len() + 1];
    for i in (0..values.len()).rev() {
        run[i] = if in_band(values[i]) { run[i + 1] + 1 } else { 0 };
    }

    (0..values.len() - window)
        .find(|&idx| run[idx] >= window)
        .unwrap_or(values.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 40 s at 10 Hz with a low floor and one burst per 10 s segment.
    fn burst_signal(peaks_at: [f64; 4]) -> (Vec<f64>, Vec<f64>) {
        let times: Vec<f64> = (0..=400).map(|i| i as f64 * 0.1).collect();
        let amp = times
            .iter()
            .map(|&t| {
                let burst: f64 = peaks_at
                    .iter()
                    .map(|&p| 100.0 * (-(t - p).powi(2) / 0.5).exp())
                    .sum();
                1.0 + burst
            })
            .collect();
        (times, amp)
    }

    #[test]
    fn test_four_windows_centered_on_peaks() {
        let (times, amp) = burst_signal([5.0, 15.0, 25.0, 35.0]);
        let windows = peak_windows(&times, &amp, &WindowParams::default()).unwrap();

        // segment duration 10 s, window 3 s, right extension 0.4 s
        for (i, w) in windows.iter().enumerate() {
            let peak = 5.0 + 10.0 * i as f64;
            assert!((w.start - (peak - 1.5)).abs() < 1e-9, "window {}: {:?}", i, w);
            assert!((w.end - (peak + 1.9)).abs() < 1e-9, "window {}: {:?}", i, w);
        }
    }

    #[test]
    fn test_windows_clipped_to_segment() {
        let (times, amp) = burst_signal([0.2, 19.9, 20.1, 39.8]);
        let windows = peak_windows(&times, &amp, &WindowParams::default()).unwrap();

        assert!((windows[0].start - 0.0).abs() < 1e-9);
        assert!((windows[1].end - 20.0).abs() < 1e-9);
        assert!((windows[2].start - 20.0).abs() < 1e-9);
        assert!((windows[3].end - 40.0).abs() < 1e-9);
        for (i, w) in windows.iter().enumerate() {
            let seg_start = 10.0 * i as f64;
            assert!(w.start >= seg_start - 1e-9 && w.end <= seg_start + 10.0 + 1e-9);
            assert!(w.start <= w.end);
        }
    }

    #[test]
    fn test_ties_pick_earliest_sample() {
        let times: Vec<f64> = (0..8).map(|i| i as f64).collect();
        let amp = vec![5.0, 5.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0];
        let params = WindowParams {
            width_fraction: 0.0,
            right_extension: 0.0,
            trim_factor: None,
        };
        let windows = peak_windows(&times, &amp, &params).unwrap();
        assert_eq!(windows[0], TimeWindow { start: 0.0, end: 0.0 });
    }

    #[test]
    fn test_nan_amplitude_ignored() {
        let times: Vec<f64> = (0..9).map(|i| i as f64).collect();
        let amp = vec![f64::NAN, 2.0, 3.0, 1.0, 1.0, 4.0, 1.0, 9.0, 1.0];
        let params = WindowParams {
            width_fraction: 0.0,
            right_extension: 0.0,
            trim_factor: None,
        };
        let windows = peak_windows(&times, &amp, &params).unwrap();
        assert_eq!(windows[0].start, 1.0);
    }

    #[test]
    fn test_empty_segment_is_an_error() {
        // Samples only at the edges leave the middle segments empty.
        let times = vec![0.0, 0.1, 9.9, 10.0];
        let amp = vec![1.0, 2.0, 3.0, 4.0];
        assert_eq!(
            peak_windows(&times, &amp, &WindowParams::default()),
            Err(SegmentError::EmptySegment(1))
        );
    }

    #[test]
    fn test_empty_and_mismatched_input() {
        let params = WindowParams::default();
        assert_eq!(peak_windows(&[], &[], &params), Err(SegmentError::Empty));
        assert_eq!(
            peak_windows(&[0.0, 1.0], &[1.0], &params),
            Err(SegmentError::LengthMismatch { times: 2, values: 1 })
        );
    }

    #[test]
    fn test_single_sample_has_no_duration() {
        assert_eq!(
            peak_windows(&[3.0], &[1.0], &WindowParams::default()),
            Err(SegmentError::EmptySegment(0))
        );
    }

    #[test]
    fn test_trim_to_activity() {
        let times: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let amp = vec![0.0, 0.1, 5.0, 1.0, 10.0, 0.5, 3.0, 0.2, 0.1, 0.0];
        // threshold 2.0
        assert_eq!(
            trim_to_activity(&times, &amp, 0.2),
            Ok(TimeWindow { start: 2.0, end: 6.0 })
        );
        assert_eq!(
            trim_to_activity(&times, &vec![0.0; 10], 0.2),
            Err(SegmentError::NoActivity)
        );
    }

    #[test]
    fn test_sample_at_end_time_belongs_to_no_segment() {
        // The loudest sample sits exactly at t_max and must not win segment 3.
        let times: Vec<f64> = (0..=8).map(|i| i as f64).collect();
        let amp = vec![1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 5.0, 1.0, 100.0];
        let params = WindowParams {
            width_fraction: 0.0,
            right_extension: 0.0,
            trim_factor: None,
        };
        let windows = peak_windows(&times, &amp, &params).unwrap();
        assert_eq!(windows[3], TimeWindow { start: 6.0, end: 6.0 });
        assert_eq!(windows[3].duration(), 0.0);
    }

    #[test]
    fn test_trimming_selects_by_time_not_position() {
        // A stray log time (0.5 s) sits between active samples in recorded
        // order but before the active span, so it must not be kept.
        let times = vec![0.0, 1.0, 2.0, 3.0, 0.5, 5.0, 6.0, 7.0, 8.0, 9.0];
        let amp = vec![0.0, 10.0, 10.0, 10.0, 50.0, 10.0, 10.0, 10.0, 10.0, 0.0];
        let params = WindowParams {
            width_fraction: 0.0,
            right_extension: 0.0,
            trim_factor: Some(0.1),
        };
        assert_eq!(
            trim_to_activity(&times, &amp, 0.1),
            Ok(TimeWindow { start: 1.0, end: 8.0 })
        );
        let windows = peak_windows(&times, &amp, &params).unwrap();
        assert_eq!(windows[0], TimeWindow { start: 1.0, end: 1.0 });
    }

    #[test]
    fn test_trimmed_windows_span_active_region() {
        // Silence for 10 s on either side of the bursts.
        let (mut times, mut amp) = burst_signal([5.0, 15.0, 25.0, 35.0]);
        times.iter_mut().for_each(|t| *t += 10.0);
        let mut lead: Vec<f64> = (0..100).map(|i| i as f64 * 0.1).collect();
        lead.append(&mut times);
        let mut lead_amp = vec![0.0; 100];
        lead_amp.append(&mut amp);

        let params = WindowParams {
            trim_factor: Some(0.2),
            ..Default::default()
        };
        let windows = peak_windows(&lead, &lead_amp, &params).unwrap();
        // Active region is roughly 14.2 s..45.8 s; each window holds one burst.
        for (w, peak) in windows.iter().zip([15.0, 25.0, 35.0, 45.0]) {
            assert!(w.contains(peak), "{:?} should contain {}", w, peak);
        }
    }

    #[test]
    fn test_segment_by_peaks_midpoints() {
        let times: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let values: Vec<f64> = (0..20).map(|i| i as f64 * 10.0).collect();
        let segments = segment_by_peaks(&times, &values, &[2, 6, 11, 15, 18]).unwrap();

        assert_eq!(segments.len(), 4);
        assert_eq!(segments[0].time.first(), Some(&0.0));
        assert_eq!(segments[0].len(), 4);
        assert_eq!(segments[1].time.first(), Some(&4.0));
        assert_eq!(segments[2].time.first(), Some(&8.0));
        assert_eq!(segments[3].time.first(), Some(&13.0));
        // the fifth peak is ignored and the last segment runs to the end
        assert_eq!(segments[3].time.last(), Some(&19.0));
    }

    #[test]
    fn test_segment_by_peaks_requires_four() {
        let times = vec![0.0, 1.0, 2.0];
        let values = vec![0.0, 1.0, 0.0];
        assert_eq!(
            segment_by_peaks(&times, &values, &[1]),
            Err(SegmentError::InsufficientPeaks { found: 1, required: 4 })
        );
    }

    #[test]
    fn test_stabilization_cutoff() {
        let values = vec![900.0, 800.0, 10.0, 500.0, 20.0, -30.0, 5.0, 1.0, 2.0];
        assert_eq!(stabilization_cutoff(&values, -300.0, 300.0, 3), 4);
        // a band that is never reached keeps the full length
        assert_eq!(stabilization_cutoff(&values, -1.0, 0.0, 3), values.len());
        // too short to hold a full window
        assert_eq!(stabilization_cutoff(&values[..3], -300.0, 300.0, 3), 3);
    }

    #[test]
    fn test_stabilization_cutoff_excludes_final_position() {
        // The only settled run starts exactly at len - window.
        let values = vec![1000.0, 1000.0, 0.0, 0.0];
        assert_eq!(stabilization_cutoff(&values, -300.0, 300.0, 2), 4);
    }
}

//! Peak segmentation of the arm-cube force sensors.
//!
//! Each sensor is balanced against its resting offset, near-zero samples are
//! dropped, the remainder is smoothed and the first four activity peaks
//! split it into segments. The last segment is cut where the signal settles
//! back into the resting band.

use crate::data_loading::{ForceRecording, FORCE_SENSORS};
use crate::peaks::{find_peaks, PeakCriteria};
use crate::preprocessing::{apply_mask, gaussian_smooth, near_zero_mask, remove_offset, sampling_rate};
use crate::segmentation::{segment_by_peaks, stabilization_cutoff, Segment, SegmentError, SEGMENT_COUNT};
use log::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct ForcePeakParams {
    /// Samples recorded after this many seconds define the resting offset.
    pub baseline_after: f64,
    /// Samples with `|x| <= near_zero_threshold` are dropped before peak search.
    pub near_zero_threshold: f64,
    pub smoothing_sigma: f64,
    pub min_peak_height: f64,
    pub min_prominence: f64,
    /// Minimum spacing between peaks in seconds.
    pub min_peak_spacing: f64,
    pub stable_lower: f64,
    pub stable_upper: f64,
    /// How long the signal must stay in the resting band, in seconds.
    pub stable_duration: f64,
}

impl Default for ForcePeakParams {
    fn default() -> Self {
        Self {
            baseline_after: 60.0,
            near_zero_threshold: 0.1,
            smoothing_sigma: 2.0,
            min_peak_height: 50000.0,
            min_prominence: 0.5,
            min_peak_spacing: 4.0,
            stable_lower: -300.0,
            stable_upper: 300.0,
            stable_duration: 20.0,
        }
    }
}

/// A force sensor with its resting offset removed.
#[derive(Debug, Clone, PartialEq)]
pub struct BalancedSensor {
    pub name: String,
    pub values: Vec<f64>,
    /// `None` when nothing was recorded after the baseline start.
    pub offset: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SensorSegmentation {
    /// Peak positions within the near-zero filtered signal.
    pub peaks: Vec<usize>,
    pub segments: Vec<Segment>,
}

#[derive(Debug)]
pub struct ForceAnalysis {
    pub sampling_rate: f64,
    pub balanced: Vec<BalancedSensor>,
    pub sensors: Vec<(String, Result<SensorSegmentation, SegmentError>)>,
}

/// Remove the resting offset from every force sensor.
pub fn balance_sensors(recording: &ForceRecording, baseline_after: f64) -> Vec<BalancedSensor> {
    FORCE_SENSORS
        .iter()
        .filter_map(|&name| {
            let mut values = recording.channel(name)?;
            let offset = remove_offset(&recording.time, &mut values, baseline_after);
            Some(BalancedSensor {
                name: name.to_string(),
                values,
                offset,
            })
        })
        .collect()
}

/// Segment one balanced sensor around its first four peaks.
pub fn segment_sensor(
    time: &[f64],
    values: &[f64],
    sampling_rate: f64,
    params: &ForcePeakParams,
) -> Result<SensorSegmentation, SegmentError> {
    if time.len() != values.len() {
        return Err(SegmentError::LengthMismatch {
            times: time.len(),
            values: values.len(),
        });
    }

    let mask = near_zero_mask(values, params.near_zero_threshold);
    let filtered_time = apply_mask(time, &mask);
    let filtered = apply_mask(values, &mask);
    if filtered.is_empty() {
        return Err(SegmentError::Empty);
    }

    let smoothed = gaussian_smooth(&filtered, params.smoothing_sigma);
    let criteria = PeakCriteria {
        height: Some(params.min_peak_height),
        distance: Some((params.min_peak_spacing * sampling_rate) as usize),
        prominence: Some(params.min_prominence),
    };
    let mut peaks = find_peaks(&smoothed, &criteria);
    debug!(
        "{} of {} samples kept, {} peaks",
        filtered.len(),
        values.len(),
        peaks.len()
    );

    let mut segments = segment_by_peaks(&filtered_time, &filtered, &peaks)?;
    peaks.truncate(SEGMENT_COUNT);

    if let Some(last) = segments.last_mut() {
        let window = (params.stable_duration * sampling_rate) as usize;
        let cutoff = stabilization_cutoff(
            &last.values,
            params.stable_lower,
            params.stable_upper,
            window,
        );
        debug!("last segment settles at {} of {}", cutoff, last.len());
        last.truncate(cutoff);
    }

    Ok(SensorSegmentation { peaks, segments })
}

/// Balance a recording and segment the requested sensors.
pub fn analyze_recording(
    recording: &ForceRecording,
    sensors: &[String],
    params: &ForcePeakParams,
) -> Result<ForceAnalysis, SegmentError> {
    let fs = sampling_rate(&recording.time)?;
    let balanced = balance_sensors(recording, params.baseline_after);

    let sensors = sensors
        .iter()
        .map(|name| {
            let result = match balanced.iter().find(|b| &b.name == name) {
                Some(sensor) => segment_sensor(&recording.time, &sensor.values, fs, params),
                None => Err(SegmentError::UnknownSensor(name.clone())),
            };
            (name.clone(), result)
        })
        .collect();

    Ok(ForceAnalysis {
        sampling_rate: fs,
        balanced,
        sensors,
    })
}

use crate::data_loading::{EmgRecording, ForceRecording, ImuRecording, FORCE_COLUMNS};
use crate::force_analysis::BalancedSensor;
use crate::segmentation::{Segment, TimeWindow};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Path of an output file inside `dir`, creating the directory if needed.
pub fn output_file(dir: &Path, file_name: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    Ok(dir.join(file_name))
}

fn create_writer(path: &Path) -> Result<csv::Writer<File>> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    Ok(csv::Writer::from_writer(file))
}

/// A writer that leaves the header to the caller, so it is present even
/// when no rows follow.
fn create_headed_writer(path: &Path, header: &[&str]) -> Result<csv::Writer<File>> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    writer.write_record(header)?;
    Ok(writer)
}

/// Write `start_time,end_time` rows.
pub fn write_windows_csv(path: &Path, windows: &[TimeWindow]) -> Result<()> {
    let mut writer = create_headed_writer(path, &["start_time", "end_time"])?;
    for window in windows {
        writer.serialize(window)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write the windows of several recordings keyed by file name.
pub fn write_windows_json(path: &Path, windows: &BTreeMap<String, Vec<TimeWindow>>) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(file, windows)?;
    Ok(())
}

fn format_value(v: f64) -> String {
    v.to_string()
}

/// Write selected EMG rows: time, wall-clock time and one column per channel.
pub fn write_emg_rows(path: &Path, recording: &EmgRecording, rows: &[usize]) -> Result<()> {
    let mut writer = create_writer(path)?;

    let mut header = vec!["time".to_string(), "recorded_at".to_string()];
    header.extend((0..recording.channel_count()).map(|i| format!("channel_{}", i)));
    writer.write_record(&header)?;

    for &idx in rows {
        let mut record = vec![
            format_value(recording.time[idx]),
            recording
                .recorded_at(idx)
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
        ];
        record.extend(recording.channels.row(idx).iter().map(|&v| format_value(v)));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

const IMU_HEADER: [&str; 12] = [
    "time",
    "recorded_at",
    "orientation_x",
    "orientation_y",
    "orientation_z",
    "orientation_w",
    "angular_velocity_x",
    "angular_velocity_y",
    "angular_velocity_z",
    "linear_acceleration_x",
    "linear_acceleration_y",
    "linear_acceleration_z",
];

#[derive(Serialize)]
struct ImuRow {
    time: f64,
    recorded_at: String,
    orientation_x: f64,
    orientation_y: f64,
    orientation_z: f64,
    orientation_w: f64,
    angular_velocity_x: f64,
    angular_velocity_y: f64,
    angular_velocity_z: f64,
    linear_acceleration_x: f64,
    linear_acceleration_y: f64,
    linear_acceleration_z: f64,
}

/// Write selected IMU rows with the decoded message fields.
pub fn write_imu_rows(path: &Path, recording: &ImuRecording, rows: &[usize]) -> Result<()> {
    let mut writer = create_headed_writer(path, &IMU_HEADER)?;
    for &idx in rows {
        let s = &recording.samples[idx];
        writer.serialize(ImuRow {
            time: recording.time[idx],
            recorded_at: recording
                .recorded_at(idx)
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
            orientation_x: s.orientation[0],
            orientation_y: s.orientation[1],
            orientation_z: s.orientation[2],
            orientation_w: s.orientation[3],
            angular_velocity_x: s.angular_velocity[0],
            angular_velocity_y: s.angular_velocity[1],
            angular_velocity_z: s.angular_velocity[2],
            linear_acceleration_x: s.linear_acceleration[0],
            linear_acceleration_y: s.linear_acceleration[1],
            linear_acceleration_z: s.linear_acceleration[2],
        })?;
    }
    writer.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct SegmentRow {
    segment: usize,
    time: f64,
    value: f64,
}

/// Write `segment,time,value` rows, numbering segments from 1.
pub fn write_segments_csv(path: &Path, segments: &[Segment]) -> Result<()> {
    let mut writer = create_headed_writer(path, &["segment", "time", "value"])?;
    for (i, segment) in segments.iter().enumerate() {
        for (&time, &value) in segment.time.iter().zip(&segment.values) {
            writer.serialize(SegmentRow {
                segment: i + 1,
                time,
                value,
            })?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// Write a force recording with seconds in the first column.
///
/// When `balanced` is given, the force sensor columns hold the offset-free
/// values instead of the raw ones.
pub fn write_force_export(
    path: &Path,
    recording: &ForceRecording,
    balanced: Option<&[BalancedSensor]>,
) -> Result<()> {
    let mut writer = create_writer(path)?;
    let channel_names = &FORCE_COLUMNS[..FORCE_COLUMNS.len() - 1];

    let mut header = vec!["time"];
    header.extend_from_slice(channel_names);
    writer.write_record(&header)?;

    for (idx, &t) in recording.time.iter().enumerate() {
        let mut record = vec![format_value(t)];
        for (col, name) in channel_names.iter().enumerate() {
            let value = balanced
                .and_then(|sensors| sensors.iter().find(|s| s.name == *name))
                .map(|s| s.values[idx])
                .unwrap_or(recording.channels[[idx, col]]);
            record.push(format_value(value));
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct ClusterRow {
    sample_index: usize,
    value: f64,
    cluster: usize,
}

/// Write one row per sample with its assigned cluster.
pub fn write_clusters_csv(path: &Path, values: &[f64], labels: &[usize]) -> Result<()> {
    let mut writer = create_headed_writer(path, &["sample_index", "value", "cluster"])?;
    for (sample_index, (&value, &cluster)) in values.iter().zip(labels).enumerate() {
        writer.serialize(ClusterRow {
            sample_index,
            value,
            cluster,
        })?;
    }
    writer.flush()?;
    Ok(())
}

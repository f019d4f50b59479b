//! Directory-level runs behind the CLI commands.
//!
//! A failure on one recording is reported and the run moves on to the next
//! one; only problems with the output directory abort a run.

use anyhow::{bail, Context, Result};
use log::{debug, warn};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::clustering::kmeans_1d;
use crate::data_loading::{
    find_arm_pairs, find_emg_imu_pairs, find_files, read_emg_csv, read_force_csv, read_imu_csv,
    EmgRecording, RecordingKind,
};
use crate::force_analysis::{analyze_recording, balance_sensors, ForcePeakParams};
use crate::output;
use crate::plot::{self, ImuField};
use crate::segmentation::{peak_windows, SegmentError, TimeWindow, WindowParams, SEGMENT_COUNT};
use crate::window_indices;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct BatchSummary {
    pub processed: usize,
    pub skipped: usize,
    pub written: Vec<PathBuf>,
}

impl BatchSummary {
    fn skip(&mut self, path: &Path, reason: &anyhow::Error) {
        println!("Skipping {}: {:#}", path.display(), reason);
        self.skipped += 1;
    }

    fn wrote(&mut self, path: PathBuf) {
        println!("Saved {}", path.display());
        self.written.push(path);
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("recording")
        .to_string()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("recording")
        .to_string()
}

/// The four peak windows of an EMG recording.
pub fn emg_windows(
    recording: &EmgRecording,
    params: &WindowParams,
) -> Result<[TimeWindow; SEGMENT_COUNT], SegmentError> {
    peak_windows(&recording.time, &recording.amplitude(), params)
}

fn load_emg_windows(
    path: &Path,
    params: &WindowParams,
) -> Result<(EmgRecording, [TimeWindow; SEGMENT_COUNT])> {
    let recording = read_emg_csv(path)?;
    let windows = emg_windows(&recording, params)
        .with_context(|| format!("segmenting {}", path.display()))?;
    Ok((recording, windows))
}

/// Draw a whole EMG recording with its windows shaded into
/// `<stem>_windows_plot.png`.
fn plot_emg_windows(
    output_dir: &Path,
    recording: &EmgRecording,
    windows: &[TimeWindow],
    summary: &mut BatchSummary,
) -> Result<()> {
    let name = file_name(&recording.path);
    let out = output::output_file(
        output_dir,
        &format!("{}_windows_plot.png", file_stem(&recording.path)),
    )?;
    let rows: Vec<usize> = (0..recording.len()).collect();
    plot::plot_emg(
        &out,
        recording,
        &rows,
        windows,
        &format!("EMG Windows Highlighted - {}", name),
    )?;
    summary.wrote(out);
    Ok(())
}

/// Write `<stem>_windows.csv` for every EMG recording below `input_dir`,
/// and with `draw` set a chart of the recording with its windows.
pub fn run_windows(
    input_dir: &Path,
    output_dir: &Path,
    params: &WindowParams,
    draw: bool,
) -> Result<BatchSummary> {
    let mut summary = BatchSummary::default();

    for path in find_files(input_dir, ".csv", true)? {
        println!("Processing EMG file: {}", path.display());
        let (recording, windows) = match load_emg_windows(&path, params) {
            Ok(loaded) => loaded,
            Err(e) => {
                summary.skip(&path, &e);
                continue;
            }
        };

        let out = output::output_file(output_dir, &format!("{}_windows.csv", file_stem(&path)))?;
        output::write_windows_csv(&out, &windows)?;
        summary.wrote(out);
        if draw {
            plot_emg_windows(output_dir, &recording, &windows, &mut summary)?;
        }
        summary.processed += 1;
    }

    Ok(summary)
}

/// Derive windows from each lower-arm recording after trimming its quiet
/// ends, and cut both arms' recordings with them.
pub fn run_pair(
    input_dir: &Path,
    output_dir: &Path,
    params: &WindowParams,
    draw: bool,
) -> Result<BatchSummary> {
    let mut summary = BatchSummary::default();
    let mut windows_by_file = BTreeMap::new();

    for pair in find_arm_pairs(input_dir)? {
        println!("Processing RL EMG file: {}", pair.lower.display());
        println!("Processing RU EMG file: {}", pair.upper.display());

        let (lower, windows) = match load_emg_windows(&pair.lower, params) {
            Ok(loaded) => loaded,
            Err(e) => {
                summary.skip(&pair.lower, &e);
                continue;
            }
        };
        let upper = match read_emg_csv(&pair.upper) {
            Ok(upper) => upper,
            Err(e) => {
                summary.skip(&pair.upper, &e);
                continue;
            }
        };

        let lower_stem = file_stem(&pair.lower);
        let upper_stem = file_stem(&pair.upper);
        let out = output::output_file(output_dir, &format!("{}_windows.csv", lower_stem))?;
        output::write_windows_csv(&out, &windows)?;
        summary.wrote(out);

        for (k, window) in windows.iter().enumerate() {
            for (recording, stem) in [(&lower, &lower_stem), (&upper, &upper_stem)] {
                let rows = window_indices(&recording.time, window);
                if rows.is_empty() {
                    warn!("window {} holds no samples of {}", k + 1, stem);
                }
                let out =
                    output::output_file(output_dir, &format!("{}_window_{}.csv", stem, k + 1))?;
                output::write_emg_rows(&out, recording, &rows)?;
                summary.wrote(out);
            }
        }

        if draw {
            plot_emg_windows(output_dir, &lower, &windows, &mut summary)?;
            plot_emg_windows(output_dir, &upper, &windows, &mut summary)?;
        }

        windows_by_file.insert(file_name(&pair.lower), windows.to_vec());
        summary.processed += 1;
    }

    if !windows_by_file.is_empty() {
        let out = output::output_file(output_dir, "windows.json")?;
        output::write_windows_json(&out, &windows_by_file)?;
        summary.wrote(out);
    }

    Ok(summary)
}

/// Cut every EMG recording and its IMU companion with the EMG windows.
///
/// With `draw` set, each window also gets an EMG chart and an IMU linear
/// acceleration chart.
pub fn run_slices(
    input_dir: &Path,
    output_dir: &Path,
    params: &WindowParams,
    draw: bool,
) -> Result<BatchSummary> {
    let mut summary = BatchSummary::default();

    for pair in find_emg_imu_pairs(input_dir)? {
        println!("Processing EMG file: {}", pair.emg.display());
        println!("Processing IMU file: {}", pair.imu.display());

        let (emg, windows) = match load_emg_windows(&pair.emg, params) {
            Ok(loaded) => loaded,
            Err(e) => {
                summary.skip(&pair.emg, &e);
                continue;
            }
        };
        let imu = match read_imu_csv(&pair.imu) {
            Ok(imu) => imu,
            Err(e) => {
                summary.skip(&pair.imu, &e);
                continue;
            }
        };

        let emg_stem = file_stem(&pair.emg);
        let imu_stem = file_stem(&pair.imu);
        for (k, window) in windows.iter().enumerate() {
            debug!(
                "window {}: {:.2}s to {:.2}s ({:.2}s)",
                k + 1,
                window.start,
                window.end,
                window.duration()
            );

            let emg_rows = window_indices(&emg.time, window);
            let out = output::output_file(output_dir, &format!("{}_window_{}.csv", emg_stem, k + 1))?;
            output::write_emg_rows(&out, &emg, &emg_rows)?;
            summary.wrote(out);

            let imu_rows = window_indices(&imu.time, window);
            if imu_rows.is_empty() {
                warn!("window {} holds no samples of {}", k + 1, imu_stem);
            }
            let out = output::output_file(output_dir, &format!("{}_window_{}.csv", imu_stem, k + 1))?;
            output::write_imu_rows(&out, &imu, &imu_rows)?;
            summary.wrote(out);

            if draw {
                let span = format!(
                    "Window {} (Time: {:.2}s to {:.2}s)",
                    k + 1,
                    window.start,
                    window.end
                );
                let out = output::output_file(
                    output_dir,
                    &format!("{}_window_{}_plot.png", emg_stem, k + 1),
                )?;
                plot::plot_emg(&out, &emg, &emg_rows, &[], &format!("EMG Data - {}", span))?;
                summary.wrote(out);

                let out = output::output_file(
                    output_dir,
                    &format!("{}_window_{}_plot.png", imu_stem, k + 1),
                )?;
                plot::plot_imu(
                    &out,
                    &imu,
                    &imu_rows,
                    ImuField::LinearAcceleration,
                    &format!("IMU Data - {}", span),
                )?;
                summary.wrote(out);
            }
        }
        summary.processed += 1;
    }

    Ok(summary)
}

/// Segment the requested force sensors of every recording in `input_dir`.
pub fn run_force_peaks(
    input_dir: &Path,
    output_dir: &Path,
    sensors: &[String],
    params: &ForcePeakParams,
    draw: bool,
) -> Result<BatchSummary> {
    let mut summary = BatchSummary::default();

    for path in find_files(input_dir, ".csv", false)? {
        println!("Processing file: {}", path.display());

        let analysis = match read_force_csv(&path)
            .and_then(|rec| analyze_recording(&rec, sensors, params).map_err(Into::into))
        {
            Ok(analysis) => analysis,
            Err(e) => {
                summary.skip(&path, &e);
                continue;
            }
        };

        println!("Estimated Sampling Rate: {:.2} Hz", analysis.sampling_rate);
        for sensor in &analysis.balanced {
            match sensor.offset {
                Some(offset) => println!("Offset for {}: {}", sensor.name, offset),
                None => println!("Offset for {}: unavailable", sensor.name),
            }
        }

        let stem = file_stem(&path);
        for (sensor, result) in &analysis.sensors {
            match result {
                Ok(segmentation) => {
                    let out = output::output_file(
                        output_dir,
                        &format!("{}_{}_segments.csv", stem, sensor),
                    )?;
                    output::write_segments_csv(&out, &segmentation.segments)?;
                    summary.wrote(out);

                    if draw {
                        let out = output::output_file(
                            output_dir,
                            &format!("{}_{}_segments_plot.png", stem, sensor),
                        )?;
                        plot::plot_segments(
                            &out,
                            &segmentation.segments,
                            &format!("{} - Segmented by Peaks - {}", sensor, file_name(&path)),
                        )?;
                        summary.wrote(out);
                    }
                }
                Err(SegmentError::InsufficientPeaks { .. }) => {
                    println!("Insufficient peaks found in {} for segmentation.", sensor);
                }
                Err(e) => println!("Cannot segment {}: {}", sensor, e),
            }
        }
        summary.processed += 1;
    }

    Ok(summary)
}

/// Write decoded channel tables for every recording below `input_dir`.
///
/// With `force` set, the directory holds force recordings; `balance`
/// subtracts their resting offsets.
pub fn run_export(
    input_dir: &Path,
    output_dir: &Path,
    force: bool,
    balance: Option<f64>,
) -> Result<BatchSummary> {
    let mut summary = BatchSummary::default();

    for path in find_files(input_dir, ".csv", !force)? {
        let stem = file_stem(&path);
        let result = if force {
            read_force_csv(&path).and_then(|rec| {
                let balanced = balance.map(|after| balance_sensors(&rec, after));
                if let Some(sensors) = &balanced {
                    for sensor in sensors {
                        debug!("{} offset {:?}", sensor.name, sensor.offset);
                    }
                }
                let out = output::output_file(output_dir, &format!("{}_channels.csv", stem))?;
                output::write_force_export(&out, &rec, balanced.as_deref())?;
                Ok(out)
            })
        } else {
            match RecordingKind::from_path(&path) {
                RecordingKind::Emg => read_emg_csv(&path).and_then(|rec| {
                    let out = output::output_file(output_dir, &format!("{}_channels.csv", stem))?;
                    let rows: Vec<usize> = (0..rec.len()).collect();
                    output::write_emg_rows(&out, &rec, &rows)?;
                    Ok(out)
                }),
                RecordingKind::Imu => read_imu_csv(&path).and_then(|rec| {
                    let out = output::output_file(output_dir, &format!("{}_channels.csv", stem))?;
                    let rows: Vec<usize> = (0..rec.len()).collect();
                    output::write_imu_rows(&out, &rec, &rows)?;
                    Ok(out)
                }),
                RecordingKind::Other => {
                    println!(
                        "Skipping file {} as it doesn't match EMG or IMU data patterns.",
                        path.display()
                    );
                    summary.skipped += 1;
                    continue;
                }
            }
        };

        match result {
            Ok(out) => {
                summary.processed += 1;
                summary.wrote(out);
            }
            Err(e) => summary.skip(&path, &e),
        }
    }

    Ok(summary)
}

/// Cluster one channel of an EMG recording by sample index.
pub fn run_clusters(
    input_file: &Path,
    output_dir: &Path,
    channel: usize,
    clusters: usize,
    max_iter: usize,
    draw: bool,
) -> Result<BatchSummary> {
    let recording = read_emg_csv(input_file)?;
    if channel >= recording.channel_count() {
        bail!(
            "channel {} out of range, {} has {} channels",
            channel,
            input_file.display(),
            recording.channel_count()
        );
    }

    let values = recording.channels.column(channel).to_vec();
    let sample_index: Vec<f64> = (0..values.len()).map(|i| i as f64).collect();
    let clustering = kmeans_1d(&sample_index, clusters, max_iter)?;
    debug!("cluster centroids {:?}", clustering.centroids);

    let stem = format!("{}_channel_{}_clusters", file_stem(input_file), channel);
    let out = output::output_file(output_dir, &format!("{}.csv", stem))?;
    output::write_clusters_csv(&out, &values, &clustering.labels)?;

    let mut summary = BatchSummary {
        processed: 1,
        ..Default::default()
    };
    summary.wrote(out);

    if draw {
        let out = output::output_file(output_dir, &format!("{}_plot.png", stem))?;
        plot::plot_clusters(
            &out,
            &values,
            &clustering.labels,
            &format!(
                "Channel {} EMG Data Clustering into {} Clusters (Horizontal Clustering)",
                channel, clusters
            ),
        )?;
        summary.wrote(out);
    }
    Ok(summary)
}

/// Chart every EMG and IMU recording directly inside the subfolders of
/// `data_dir`.
///
/// EMG recordings give `<subfolder>_<stem>_plot.png` with all channels; IMU
/// recordings give one chart per message field, e.g.
/// `<subfolder>_<stem>_orientation_plot.png`.
pub fn run_plot(data_dir: &Path, output_dir: &Path) -> Result<BatchSummary> {
    let mut summary = BatchSummary::default();

    let walker = WalkDir::new(data_dir)
        .min_depth(2)
        .max_depth(2)
        .sort_by_file_name();
    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to walk {}", data_dir.display()))?;
        let path = entry.path();
        let is_csv = path.extension().and_then(|e| e.to_str()) == Some("csv");
        if !entry.file_type().is_file() || !is_csv {
            continue;
        }
        let subfolder = path
            .parent()
            .map(file_name)
            .unwrap_or_default();
        let prefix = format!("{}_{}", subfolder, file_stem(path));
        let name = file_name(path);

        let result = match RecordingKind::from_path(path) {
            RecordingKind::Emg => read_emg_csv(path).and_then(|rec| {
                let out = output::output_file(output_dir, &format!("{}_plot.png", prefix))?;
                let rows: Vec<usize> = (0..rec.len()).collect();
                plot::plot_emg(&out, &rec, &rows, &[], &format!("EMG Data over Time - {}", name))?;
                Ok(vec![out])
            }),
            RecordingKind::Imu => read_imu_csv(path).and_then(|rec| {
                let rows: Vec<usize> = (0..rec.len()).collect();
                ImuField::ALL
                    .iter()
                    .map(|&field| -> Result<PathBuf> {
                        let out = output::output_file(
                            output_dir,
                            &format!("{}{}", prefix, field.plot_suffix()),
                        )?;
                        plot::plot_imu(
                            &out,
                            &rec,
                            &rows,
                            field,
                            &format!("{} - {}", field.title(), name),
                        )?;
                        Ok(out)
                    })
                    .collect::<Result<Vec<_>>>()
            }),
            RecordingKind::Other => {
                println!(
                    "Skipping file {} as it doesn't match EMG or IMU data patterns.",
                    name
                );
                summary.skipped += 1;
                continue;
            }
        };

        match result {
            Ok(written) => {
                summary.processed += 1;
                for out in written {
                    summary.wrote(out);
                }
            }
            Err(e) => summary.skip(path, &e),
        }
    }

    Ok(summary)
}

/// Chart the requested force sensors of every recording in `input_dir` into
/// `<stem>_plot.png`, optionally balanced against their resting offsets.
pub fn run_plot_force(
    input_dir: &Path,
    output_dir: &Path,
    sensors: &[String],
    balance: Option<f64>,
) -> Result<BatchSummary> {
    let mut summary = BatchSummary::default();

    for path in find_files(input_dir, ".csv", false)? {
        println!("Processing file: {}", path.display());
        let result = read_force_csv(&path).and_then(|rec| {
            let balanced = balance.map(|after| balance_sensors(&rec, after));
            let channels = sensors
                .iter()
                .map(|name| -> Result<(String, Vec<f64>)> {
                    let values = match &balanced {
                        Some(balanced) => balanced
                            .iter()
                            .find(|b| &b.name == name)
                            .map(|b| b.values.clone()),
                        None => rec.channel(name),
                    };
                    let values = values.ok_or_else(|| SegmentError::UnknownSensor(name.clone()))?;
                    Ok((name.clone(), values))
                })
                .collect::<Result<Vec<_>>>()?;

            let out = output::output_file(output_dir, &format!("{}_plot.png", file_stem(&path)))?;
            plot::plot_force_channels(
                &out,
                &rec.time,
                &channels,
                &format!("Sensor/Force Data over Time - {}", file_name(&path)),
            )?;
            Ok(out)
        });

        match result {
            Ok(out) => {
                summary.processed += 1;
                summary.wrote(out);
            }
            Err(e) => summary.skip(&path, &e),
        }
    }

    Ok(summary)
}

/// Delete files with `extension` directly inside the subfolders of
/// `data_dir`. Returns the files deleted (or, on a dry run, found).
pub fn run_clean(data_dir: &Path, extension: &str, dry_run: bool) -> Result<Vec<PathBuf>> {
    let mut deleted = Vec::new();

    let walker = WalkDir::new(data_dir)
        .min_depth(2)
        .max_depth(2)
        .sort_by_file_name();
    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to walk {}", data_dir.display()))?;
        let matches = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e == extension)
            .unwrap_or(false);
        if !entry.file_type().is_file() || !matches {
            continue;
        }

        let path = entry.into_path();
        if dry_run {
            println!("Would delete plot file: {}", path.display());
            deleted.push(path);
            continue;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => {
                println!("Deleted plot file: {}", path.display());
                deleted.push(path);
            }
            Err(e) => println!("Error: Could not delete file {}: {}", path.display(), e),
        }
    }

    Ok(deleted)
}

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use ndarray::Array2;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::preprocessing;

/// Channels of one armband when a recording gives no better hint.
pub const EMG_CHANNELS: usize = 8;

/// Column layout of the arm-cube force recordings: accelerometer,
/// gyroscope, magnetometer, six force sensors and a millisecond clock.
pub const FORCE_COLUMNS: [&str; 16] = [
    "Ax", "Ay", "Az", "Gx", "Gy", "Gz", "Mx", "My", "Mz", "S1", "S2", "S3", "S4", "S5", "S6",
    "time",
];

pub const FORCE_SENSORS: [&str; 6] = ["S1", "S2", "S3", "S4", "S5", "S6"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingKind {
    Emg,
    Imu,
    Other,
}

impl RecordingKind {
    pub fn from_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        if name.contains("_emg") {
            RecordingKind::Emg
        } else if name.contains("_imu") {
            RecordingKind::Imu
        } else {
            RecordingKind::Other
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmgRecording {
    pub path: PathBuf,
    /// Log time of every row in nanoseconds.
    pub timestamps: Vec<i64>,
    /// Seconds since the first row.
    pub time: Vec<f64>,
    /// One row per sample, one column per channel.
    pub channels: Array2<f64>,
}

impl EmgRecording {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.ncols()
    }

    pub fn amplitude(&self) -> Vec<f64> {
        preprocessing::amplitude(&self.channels)
    }

    pub fn recorded_at(&self, idx: usize) -> Option<DateTime<Utc>> {
        self.timestamps.get(idx).and_then(|&ts| nanos_to_datetime(ts))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ImuSample {
    /// Quaternion as `[x, y, z, w]`.
    pub orientation: [f64; 4],
    pub angular_velocity: [f64; 3],
    pub linear_acceleration: [f64; 3],
}

#[derive(Debug, Clone)]
pub struct ImuRecording {
    pub path: PathBuf,
    pub timestamps: Vec<i64>,
    pub time: Vec<f64>,
    pub samples: Vec<ImuSample>,
}

impl ImuRecording {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn recorded_at(&self, idx: usize) -> Option<DateTime<Utc>> {
        self.timestamps.get(idx).and_then(|&ts| nanos_to_datetime(ts))
    }
}

#[derive(Debug, Clone)]
pub struct ForceRecording {
    pub path: PathBuf,
    /// Seconds since the earliest sample.
    pub time: Vec<f64>,
    /// The first fifteen columns of [`FORCE_COLUMNS`].
    pub channels: Array2<f64>,
}

impl ForceRecording {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Values of a named channel such as `"S1"` or `"Gx"`.
    pub fn channel(&self, name: &str) -> Option<Vec<f64>> {
        let idx = FORCE_COLUMNS[..FORCE_COLUMNS.len() - 1]
            .iter()
            .position(|c| *c == name)?;
        Some(self.channels.column(idx).to_vec())
    }
}

fn nanos_to_datetime(ts: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(
        ts.div_euclid(1_000_000_000),
        ts.rem_euclid(1_000_000_000) as u32,
    )
}

/// Parse an EMG sample stored as `array('h', [v0, v1, ...])`.
pub fn parse_emg_array(data: &str) -> Result<Vec<f64>> {
    let (_, rest) = data
        .split_once("array('h', ")
        .ok_or_else(|| anyhow!("missing array('h', ...) prefix in {:?}", data))?;
    let list = rest.trim_end().trim_end_matches(')').trim();
    let list = list
        .strip_prefix('[')
        .and_then(|l| l.strip_suffix(']'))
        .ok_or_else(|| anyhow!("expected a bracketed list in {:?}", data))?;

    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .map(|v| v as f64)
                .with_context(|| format!("invalid EMG value {:?}", s))
        })
        .collect()
}

/// Extract the named fields of a printed message such as
/// `geometry_msgs.msg.Vector3(x=0.1, y=-0.2, z=9.81)`.
///
/// Strings without `key=value` pairs fall back to their numbers in order of
/// appearance.
pub fn parse_message_fields(text: &str, keys: &[&str]) -> Result<Vec<f64>> {
    let mut named = BTreeMap::new();
    let mut bare = Vec::new();
    for token in text.split(|c| matches!(c, '(' | ')' | ',' | '[' | ']')) {
        let token = token.trim();
        if let Some((key, value)) = token.split_once('=') {
            if let Ok(v) = value.trim().parse::<f64>() {
                named.insert(key.trim().to_string(), v);
            }
        } else if let Ok(v) = token.parse::<f64>() {
            bare.push(v);
        }
    }

    if !named.is_empty() {
        return keys
            .iter()
            .map(|k| {
                named
                    .get(*k)
                    .copied()
                    .ok_or_else(|| anyhow!("field {:?} missing in {:?}", k, text))
            })
            .collect();
    }
    if bare.len() == keys.len() {
        return Ok(bare);
    }
    bail!("expected {} values in {:?}", keys.len(), text)
}

fn parse_timestamp(field: &str) -> Result<i64> {
    let field = field.trim();
    field
        .parse::<i64>()
        .or_else(|_| field.parse::<f64>().map(|v| v as i64))
        .with_context(|| format!("invalid timestamp {:?}", field))
}

fn column_index(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|h| h.trim() == name)
}

/// Load an EMG recording exported from the armband topic.
///
/// A row whose `_data` cannot be parsed is logged and replaced by zeros.
pub fn read_emg_csv(path: &Path) -> Result<EmgRecording> {
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open file: {}", path.display()))?;
    let headers = rdr.headers()?.clone();

    let data_idx = column_index(&headers, "_data")
        .ok_or_else(|| anyhow!("{} does not contain '_data' column", path.display()))?;
    let ts_idx = column_index(&headers, "timestamp")
        .ok_or_else(|| anyhow!("{} does not contain 'timestamp' column", path.display()))?;

    let mut timestamps = Vec::new();
    let mut rows: Vec<Option<Vec<f64>>> = Vec::new();
    for (line, result) in rdr.records().enumerate() {
        let record = result?;
        let ts = record
            .get(ts_idx)
            .ok_or_else(|| anyhow!("row {} has no timestamp", line + 1))
            .and_then(parse_timestamp)?;
        timestamps.push(ts);

        let data = record.get(data_idx).unwrap_or_default();
        match parse_emg_array(data) {
            Ok(values) => rows.push(Some(values)),
            Err(e) => {
                warn!("Error parsing data in {} row {}: {:#}", path.display(), line + 1, e);
                rows.push(None);
            }
        }
    }

    let width = rows
        .iter()
        .flatten()
        .next()
        .map(|r| r.len())
        .unwrap_or(EMG_CHANNELS);
    let mut flat = Vec::with_capacity(rows.len() * width);
    for (line, row) in rows.iter().enumerate() {
        match row {
            Some(values) if values.len() == width => flat.extend_from_slice(values),
            Some(values) => bail!(
                "{} row {} has {} channels, expected {}",
                path.display(),
                line + 1,
                values.len(),
                width
            ),
            None => flat.extend(std::iter::repeat(0.0).take(width)),
        }
    }
    let channels = Array2::from_shape_vec((rows.len(), width), flat)?;

    debug!(
        "{}: {} samples x {} channels",
        path.display(),
        channels.nrows(),
        width
    );

    Ok(EmgRecording {
        path: path.to_path_buf(),
        time: preprocessing::relative_seconds_ns(&timestamps),
        timestamps,
        channels,
    })
}

/// Load an IMU recording with orientation, angular velocity and linear
/// acceleration message columns.
pub fn read_imu_csv(path: &Path) -> Result<ImuRecording> {
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open file: {}", path.display()))?;
    let headers = rdr.headers()?.clone();

    let find = |name: &str| {
        column_index(&headers, name)
            .ok_or_else(|| anyhow!("{} does not contain '{}' column", path.display(), name))
    };
    let ts_idx = find("timestamp")?;
    let orientation_idx = find("_orientation")?;
    let angular_idx = find("_angular_velocity")?;
    let linear_idx = find("_linear_acceleration")?;

    let mut timestamps = Vec::new();
    let mut samples = Vec::new();
    for (line, result) in rdr.records().enumerate() {
        let record = result?;
        let field = |idx: usize| record.get(idx).unwrap_or_default();

        timestamps.push(parse_timestamp(field(ts_idx))?);
        let context = || format!("{} row {}", path.display(), line + 1);
        let o = parse_message_fields(field(orientation_idx), &["x", "y", "z", "w"])
            .with_context(context)?;
        let a = parse_message_fields(field(angular_idx), &["x", "y", "z"]).with_context(context)?;
        let l = parse_message_fields(field(linear_idx), &["x", "y", "z"]).with_context(context)?;

        samples.push(ImuSample {
            orientation: [o[0], o[1], o[2], o[3]],
            angular_velocity: [a[0], a[1], a[2]],
            linear_acceleration: [l[0], l[1], l[2]],
        });
    }

    Ok(ImuRecording {
        path: path.to_path_buf(),
        time: preprocessing::relative_seconds_ns(&timestamps),
        timestamps,
        samples,
    })
}

/// Load a force recording: 16 numeric columns, with or without a header row.
pub fn read_force_csv(path: &Path) -> Result<ForceRecording> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open file: {}", path.display()))?;

    let mut raw_time = Vec::new();
    let mut flat = Vec::new();
    for (line, result) in rdr.records().enumerate() {
        let record = result?;
        if record.len() != FORCE_COLUMNS.len() {
            bail!(
                "{} row {} has {} columns, expected {}",
                path.display(),
                line + 1,
                record.len(),
                FORCE_COLUMNS.len()
            );
        }

        let parsed: Result<Vec<f64>, _> = record.iter().map(str::parse::<f64>).collect();
        let values = match parsed {
            Ok(values) => values,
            Err(_) if line == 0 => {
                debug!("{}: skipping header row", path.display());
                continue;
            }
            Err(e) => {
                return Err(e).with_context(|| format!("{} row {}", path.display(), line + 1))
            }
        };

        raw_time.push(values[FORCE_COLUMNS.len() - 1]);
        flat.extend_from_slice(&values[..FORCE_COLUMNS.len() - 1]);
    }

    let channels = Array2::from_shape_vec((raw_time.len(), FORCE_COLUMNS.len() - 1), flat)?;
    Ok(ForceRecording {
        path: path.to_path_buf(),
        time: preprocessing::relative_seconds_ms(&raw_time),
        channels,
    })
}

/// Files below `root` whose name ends with `suffix`, in name order.
pub fn find_files(root: &Path, suffix: &str, recursive: bool) -> Result<Vec<PathBuf>> {
    let mut walker = WalkDir::new(root).sort_by_file_name();
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        let matches = entry
            .file_name()
            .to_str()
            .map(|name| name.ends_with(suffix))
            .unwrap_or(false);
        if entry.file_type().is_file() && matches {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn group_by_folder(files: Vec<PathBuf>) -> BTreeMap<PathBuf, Vec<PathBuf>> {
    let mut folders: BTreeMap<PathBuf, Vec<PathBuf>> = BTreeMap::new();
    for file in files {
        let folder = file.parent().map(Path::to_path_buf).unwrap_or_default();
        folders.entry(folder).or_default().push(file);
    }
    folders
}

/// Lower (RL) and upper (RU) arm EMG recordings of the same trial.
#[derive(Debug, Clone, PartialEq)]
pub struct ArmPair {
    pub lower: PathBuf,
    pub upper: PathBuf,
}

pub fn find_arm_pairs(root: &Path) -> Result<Vec<ArmPair>> {
    let folders = group_by_folder(find_files(root, ".csv", true)?);
    let mut pairs = Vec::new();
    for files in folders.into_values() {
        let pick = |suffix: &str| {
            files
                .iter()
                .find(|f| f.to_string_lossy().ends_with(suffix))
                .cloned()
        };
        if let (Some(lower), Some(upper)) = (pick("RL_emg.csv"), pick("RU_emg.csv")) {
            pairs.push(ArmPair { lower, upper });
        }
    }
    Ok(pairs)
}

/// EMG recording and the IMU recording of the same armband.
#[derive(Debug, Clone, PartialEq)]
pub struct EmgImuPair {
    pub emg: PathBuf,
    pub imu: PathBuf,
}

/// Pair every `<name>_emg.csv` with a `<name>_imu.csv` in the same folder.
pub fn find_emg_imu_pairs(root: &Path) -> Result<Vec<EmgImuPair>> {
    let mut pairs = Vec::new();
    for emg in find_files(root, "_emg.csv", true)? {
        let name = emg
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        let imu = emg.with_file_name(name.replace("_emg.csv", "_imu.csv"));
        if imu.is_file() {
            pairs.push(EmgImuPair { emg, imu });
        } else {
            debug!("no IMU recording next to {}", emg.display());
        }
    }
    Ok(pairs)
}

/// Header and row count of a CSV file.
#[derive(Debug, Clone)]
pub struct CsvSummary {
    pub headers: Vec<String>,
    pub rows: usize,
}

pub fn describe_csv(path: &Path) -> Result<CsvSummary> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open file: {}", path.display()))?;
    let headers = rdr.headers()?.iter().map(str::to_string).collect();
    let mut rows = 0;
    for record in rdr.records() {
        record?;
        rows += 1;
    }
    Ok(CsvSummary { headers, rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_parse_emg_array() {
        let values = parse_emg_array("array('h', [1, -2, 3, 40, 0, 0, -7, 8])").unwrap();
        assert_eq!(values, vec![1.0, -2.0, 3.0, 40.0, 0.0, 0.0, -7.0, 8.0]);
        assert!(parse_emg_array("[1, 2, 3]").is_err());
        assert!(parse_emg_array("array('h', [1, x])").is_err());
    }

    #[test]
    fn test_parse_message_fields() {
        let q = "geometry_msgs.msg.Quaternion(x=0.1, y=-0.2, z=0.3, w=0.9)";
        assert_eq!(
            parse_message_fields(q, &["x", "y", "z", "w"]).unwrap(),
            vec![0.1, -0.2, 0.3, 0.9]
        );
        let v = "geometry_msgs.msg.Vector3(x=1e-05, y=0.0, z=9.81)";
        assert_eq!(
            parse_message_fields(v, &["x", "y", "z"]).unwrap(),
            vec![1e-05, 0.0, 9.81]
        );
        assert_eq!(
            parse_message_fields("[1.5, 2.5, 3.5]", &["x", "y", "z"]).unwrap(),
            vec![1.5, 2.5, 3.5]
        );
        assert!(parse_message_fields("Vector3(x=1.0, y=2.0)", &["x", "y", "z"]).is_err());
    }

    #[test]
    fn test_recording_kind() {
        assert_eq!(
            RecordingKind::from_path(Path::new("a/H_r1_RL_emg.csv")),
            RecordingKind::Emg
        );
        assert_eq!(
            RecordingKind::from_path(Path::new("H_r1_RU_imu.csv")),
            RecordingKind::Imu
        );
        assert_eq!(
            RecordingKind::from_path(Path::new("notes.csv")),
            RecordingKind::Other
        );
    }

    #[test]
    fn test_read_emg_csv_replaces_bad_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trial_RL_emg.csv");
        fs::write(
            &path,
            "timestamp,_data\n\
             1000000000,\"array('h', [1, 2, 3])\"\n\
             1500000000,garbage\n\
             2000000000,\"array('h', [-4, 5, -6])\"\n",
        )
        .unwrap();

        let rec = read_emg_csv(&path).unwrap();
        assert_eq!(rec.len(), 3);
        assert_eq!(rec.channel_count(), 3);
        assert_eq!(rec.time, vec![0.0, 0.5, 1.0]);
        assert_eq!(rec.channels.row(1).to_vec(), vec![0.0, 0.0, 0.0]);
        assert_eq!(rec.amplitude(), vec![2.0, 0.0, 5.0]);
        assert_eq!(rec.recorded_at(0).unwrap().timestamp(), 1);
    }

    #[test]
    fn test_read_emg_csv_requires_data_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trial_RL_emg.csv");
        fs::write(&path, "timestamp,value\n1,2\n").unwrap();
        let err = read_emg_csv(&path).unwrap_err();
        assert!(err.to_string().contains("_data"));
    }

    #[test]
    fn test_read_imu_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trial_RL_imu.csv");
        fs::write(
            &path,
            "timestamp,header,_orientation,_angular_velocity,_linear_acceleration\n\
             0,h,\"Quaternion(x=0.0, y=0.0, z=0.0, w=1.0)\",\"Vector3(x=0.1, y=0.2, z=0.3)\",\"Vector3(x=0.0, y=0.0, z=9.8)\"\n\
             20000000,h,\"Quaternion(x=0.5, y=0.5, z=0.5, w=0.5)\",\"Vector3(x=0.0, y=0.0, z=0.0)\",\"Vector3(x=1.0, y=0.0, z=9.8)\"\n",
        )
        .unwrap();

        let rec = read_imu_csv(&path).unwrap();
        assert_eq!(rec.len(), 2);
        assert_eq!(rec.time, vec![0.0, 0.02]);
        assert_eq!(rec.samples[0].orientation, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(rec.samples[1].linear_acceleration, [1.0, 0.0, 9.8]);
    }

    #[test]
    fn test_read_force_csv_with_and_without_header() {
        let dir = tempfile::tempdir().unwrap();
        let row = |t: f64, s1: f64| {
            let mut fields = vec!["0".to_string(); 15];
            fields[9] = s1.to_string();
            fields.push(t.to_string());
            fields.join(",")
        };
        let body = format!("{}\n{}\n{}\n", row(5000.0, 1.0), row(6000.0, 2.0), row(7500.0, 3.0));

        let headerless = dir.path().join("cube1.csv");
        fs::write(&headerless, &body).unwrap();
        let with_header = dir.path().join("cube2.csv");
        fs::write(&with_header, format!("{}\n{}", FORCE_COLUMNS.join(","), body)).unwrap();

        for path in [headerless, with_header] {
            let rec = read_force_csv(&path).unwrap();
            assert_eq!(rec.time, vec![0.0, 1.0, 2.5]);
            assert_eq!(rec.channel("S1").unwrap(), vec![1.0, 2.0, 3.0]);
            assert!(rec.channel("time").is_none());
        }
    }

    #[test]
    fn test_pair_discovery() {
        let dir = tempfile::tempdir().unwrap();
        let trial = dir.path().join("H_r1deg0h0");
        let lonely = dir.path().join("H_r2deg0h0");
        fs::create_dir_all(&trial).unwrap();
        fs::create_dir_all(&lonely).unwrap();
        for name in [
            "H_r1deg0h0_RL_emg.csv",
            "H_r1deg0h0_RL_imu.csv",
            "H_r1deg0h0_RU_emg.csv",
        ] {
            fs::write(trial.join(name), "").unwrap();
        }
        fs::write(lonely.join("H_r2deg0h0_RL_emg.csv"), "").unwrap();

        let arms = find_arm_pairs(dir.path()).unwrap();
        assert_eq!(arms.len(), 1);
        assert!(arms[0].lower.ends_with("H_r1deg0h0_RL_emg.csv"));
        assert!(arms[0].upper.ends_with("H_r1deg0h0_RU_emg.csv"));

        let imu = find_emg_imu_pairs(dir.path()).unwrap();
        assert_eq!(imu.len(), 1);
        assert!(imu[0].imu.ends_with("H_r1deg0h0_RL_imu.csv"));

        assert_eq!(find_files(dir.path(), ".csv", true).unwrap().len(), 4);
        assert!(find_files(dir.path(), ".csv", false).unwrap().is_empty());
    }
}

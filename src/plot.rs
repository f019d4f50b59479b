//! PNG charts of recordings, windows, segments and clusters.
//!
//! Charts are drawn with the bitmap backend only. Captions and axis
//! descriptions are laid out but only rendered when plotters is built with a
//! font backend; the file names carry what each chart shows.

use anyhow::Result;
use log::debug;
use plotters::prelude::*;
use std::ops::Range;
use std::path::Path;

use crate::data_loading::{EmgRecording, ImuRecording, ImuSample};
use crate::segmentation::{Segment, TimeWindow};

const CHART_SIZE: (u32, u32) = (1200, 600);

struct Series {
    label: String,
    points: Vec<(f64, f64)>,
}

struct LineChart<'a> {
    title: &'a str,
    y_label: &'a str,
    series: Vec<Series>,
    /// Highlighted time spans drawn behind the lines.
    spans: &'a [TimeWindow],
}

/// Axis range covering every finite value, padded by 5%.
fn axis_range(values: impl Iterator<Item = f64>) -> Range<f64> {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if !lo.is_finite() {
        return 0.0..1.0;
    }
    if hi - lo < f64::EPSILON {
        return (lo - 1.0)..(hi + 1.0);
    }
    let pad = (hi - lo) * 0.05;
    (lo - pad)..(hi + pad)
}

fn draw_lines(path: &Path, chart: &LineChart) -> Result<()> {
    let points = || chart.series.iter().flat_map(|s| s.points.iter());
    let x_range = axis_range(
        points()
            .map(|p| p.0)
            .chain(chart.spans.iter().flat_map(|w| [w.start, w.end])),
    );
    let y_range = axis_range(points().map(|p| p.1));

    let root = BitMapBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut ctx = ChartBuilder::on(&root)
        .caption(chart.title, ("sans-serif", 20))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_range, y_range.clone())?;
    ctx.configure_mesh()
        .x_desc("Time (s)")
        .y_desc(chart.y_label)
        .draw()?;

    ctx.draw_series(chart.spans.iter().map(|w| {
        Rectangle::new(
            [(w.start, y_range.start), (w.end, y_range.end)],
            BLUE.mix(0.1).filled(),
        )
    }))?;

    for (i, series) in chart.series.iter().enumerate() {
        let color = Palette99::pick(i);
        ctx.draw_series(LineSeries::new(
            series.points.iter().copied(),
            color.stroke_width(1),
        ))?
        .label(series.label.as_str())
        .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], Palette99::pick(i)));
    }
    if chart.series.len() > 1 {
        ctx.configure_series_labels()
            .position(SeriesLabelPosition::UpperRight)
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
    }

    root.present()?;
    debug!("drew {} series into {}", chart.series.len(), path.display());
    Ok(())
}

/// EMG channels over time for the given rows, with `windows` shaded.
pub fn plot_emg(
    path: &Path,
    recording: &EmgRecording,
    rows: &[usize],
    windows: &[TimeWindow],
    title: &str,
) -> Result<()> {
    let series = (0..recording.channel_count())
        .map(|c| Series {
            label: format!("channel_{}", c),
            points: rows
                .iter()
                .map(|&i| (recording.time[i], recording.channels[[i, c]]))
                .collect(),
        })
        .collect();
    draw_lines(
        path,
        &LineChart {
            title,
            y_label: "EMG Signal",
            series,
            spans: windows,
        },
    )
}

/// One of the three message fields of an IMU recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImuField {
    Orientation,
    AngularVelocity,
    LinearAcceleration,
}

impl ImuField {
    pub const ALL: [ImuField; 3] = [
        ImuField::Orientation,
        ImuField::AngularVelocity,
        ImuField::LinearAcceleration,
    ];

    /// File name suffix, e.g. `_orientation_plot.png`.
    pub fn plot_suffix(self) -> &'static str {
        match self {
            ImuField::Orientation => "_orientation_plot.png",
            ImuField::AngularVelocity => "_angular_velocity_plot.png",
            ImuField::LinearAcceleration => "_linear_acceleration_plot.png",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            ImuField::Orientation => "Orientation (Quaternion) over Time",
            ImuField::AngularVelocity => "Angular Velocity over Time",
            ImuField::LinearAcceleration => "Linear Acceleration over Time",
        }
    }

    fn y_label(self) -> &'static str {
        match self {
            ImuField::Orientation => "Orientation",
            ImuField::AngularVelocity => "Angular Velocity (rad/s)",
            ImuField::LinearAcceleration => "Linear Acceleration (m/s^2)",
        }
    }

    fn labels(self) -> &'static [&'static str] {
        match self {
            ImuField::Orientation => &[
                "orientation_x",
                "orientation_y",
                "orientation_z",
                "orientation_w",
            ],
            ImuField::AngularVelocity => &[
                "angular_velocity_x",
                "angular_velocity_y",
                "angular_velocity_z",
            ],
            ImuField::LinearAcceleration => &[
                "linear_acceleration_x",
                "linear_acceleration_y",
                "linear_acceleration_z",
            ],
        }
    }

    fn values(self, sample: &ImuSample) -> &[f64] {
        match self {
            ImuField::Orientation => &sample.orientation[..],
            ImuField::AngularVelocity => &sample.angular_velocity[..],
            ImuField::LinearAcceleration => &sample.linear_acceleration[..],
        }
    }
}

/// One IMU field's components over time for the given rows.
pub fn plot_imu(
    path: &Path,
    recording: &ImuRecording,
    rows: &[usize],
    field: ImuField,
    title: &str,
) -> Result<()> {
    let series = field
        .labels()
        .iter()
        .enumerate()
        .map(|(k, label)| Series {
            label: label.to_string(),
            points: rows
                .iter()
                .map(|&i| (recording.time[i], field.values(&recording.samples[i])[k]))
                .collect(),
        })
        .collect();
    draw_lines(
        path,
        &LineChart {
            title,
            y_label: field.y_label(),
            series,
            spans: &[],
        },
    )
}

/// Force channels sharing one time axis.
pub fn plot_force_channels(
    path: &Path,
    time: &[f64],
    channels: &[(String, Vec<f64>)],
    title: &str,
) -> Result<()> {
    let series = channels
        .iter()
        .map(|(name, values)| Series {
            label: name.clone(),
            points: time.iter().copied().zip(values.iter().copied()).collect(),
        })
        .collect();
    draw_lines(
        path,
        &LineChart {
            title,
            y_label: "Force or Sensor Value",
            series,
            spans: &[],
        },
    )
}

/// Each peak segment of a sensor in its own colour.
pub fn plot_segments(path: &Path, segments: &[Segment], title: &str) -> Result<()> {
    let series = segments
        .iter()
        .enumerate()
        .map(|(i, segment)| Series {
            label: format!("Segment {}", i + 1),
            points: segment
                .time
                .iter()
                .copied()
                .zip(segment.values.iter().copied())
                .collect(),
        })
        .collect();
    draw_lines(
        path,
        &LineChart {
            title,
            y_label: "Value (Balanced)",
            series,
            spans: &[],
        },
    )
}

/// Scatter of `values` against their sample index, coloured by cluster.
pub fn plot_clusters(path: &Path, values: &[f64], labels: &[usize], title: &str) -> Result<()> {
    let x_range = axis_range((0..values.len()).map(|i| i as f64));
    let y_range = axis_range(values.iter().copied());

    let root = BitMapBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut ctx = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 20))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_range, y_range)?;
    ctx.configure_mesh()
        .x_desc("Sample Index")
        .y_desc("EMG Signal")
        .draw()?;

    ctx.draw_series(values.iter().zip(labels).enumerate().map(|(i, (&v, &label))| {
        Circle::new((i as f64, v), 2, Palette99::pick(label).mix(0.6).filled())
    }))?;

    root.present()?;
    Ok(())
}

use clap::builder::PossibleValuesParser;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::data_loading::FORCE_SENSORS;
use crate::force_analysis::ForcePeakParams;
use crate::segmentation::WindowParams;

/// Segment and export arm-cube sensor recordings
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Four peak windows for every EMG recording below a directory
    Windows {
        /// Directory searched recursively for *.csv EMG files
        input_dir: PathBuf,

        #[command(flatten)]
        output: OutputArgs,

        #[command(flatten)]
        window: WindowArgs,

        /// Trim quiet leading/trailing samples below this fraction of the peak amplitude
        #[arg(long)]
        trim_factor: Option<f64>,

        /// Also draw PNG charts
        #[arg(long)]
        plot: bool,
    },

    /// Windows from the lower-arm (RL) recording applied to the upper-arm (RU) one
    Pair {
        input_dir: PathBuf,

        #[command(flatten)]
        output: OutputArgs,

        #[command(flatten)]
        window: WindowArgs,

        /// Fraction of the peak amplitude below which leading/trailing samples are trimmed
        #[arg(long, default_value = "0.2")]
        trim_factor: f64,

        /// Also draw PNG charts
        #[arg(long)]
        plot: bool,
    },

    /// EMG and IMU rows inside every EMG-derived window
    Slices {
        input_dir: PathBuf,

        #[command(flatten)]
        output: OutputArgs,

        #[command(flatten)]
        window: WindowArgs,

        /// Also draw PNG charts
        #[arg(long)]
        plot: bool,
    },

    /// Offset removal and peak segmentation of the force-cube sensors
    ForcePeaks {
        /// Directory holding force recordings exported as CSV
        input_dir: PathBuf,

        #[command(flatten)]
        output: OutputArgs,

        #[command(flatten)]
        force: ForceArgs,

        /// Also draw PNG charts
        #[arg(long)]
        plot: bool,
    },

    /// Decoded channel tables for EMG, IMU and force recordings
    Export {
        input_dir: PathBuf,

        #[command(flatten)]
        output: OutputArgs,

        /// Treat the input as force-cube recordings
        #[arg(long)]
        force: bool,

        /// Subtract the resting offset of the force sensors
        #[arg(long, requires = "force")]
        balance: bool,

        /// Seconds after which force samples define the resting offset
        #[arg(long, default_value = "60.0")]
        baseline_after: f64,
    },

    /// Cluster one EMG channel by sample index
    Clusters {
        /// EMG recording
        input_file: PathBuf,

        #[command(flatten)]
        output: OutputArgs,

        /// Channel to cluster
        #[arg(long, default_value = "1")]
        channel: usize,

        /// Number of clusters
        #[arg(long, default_value = "8")]
        clusters: usize,

        /// Maximum k-means iterations
        #[arg(long, default_value = "300")]
        max_iter: usize,

        /// Also draw PNG charts
        #[arg(long)]
        plot: bool,
    },

    /// Charts of EMG and IMU recordings in the subfolders of a directory, or of force recordings
    Plot {
        data_dir: PathBuf,

        #[command(flatten)]
        output: OutputArgs,

        /// Treat the input as force-cube recordings
        #[arg(long)]
        force: bool,

        /// Force sensors to draw
        #[arg(
            long,
            value_delimiter = ',',
            default_value = "S4,S1,S3",
            value_parser = PossibleValuesParser::new(FORCE_SENSORS),
            requires = "force"
        )]
        sensors: Vec<String>,

        /// Subtract the resting offset of the force sensors
        #[arg(long, requires = "force")]
        balance: bool,

        /// Seconds after which force samples define the resting offset
        #[arg(long, default_value = "60.0")]
        baseline_after: f64,
    },

    /// Delete generated plot files in the subfolders of a directory
    Clean {
        data_dir: PathBuf,

        /// File extension to delete
        #[arg(long, default_value = "png")]
        extension: String,

        /// Only list the files that would be deleted
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Args, Debug, Clone)]
pub struct OutputArgs {
    /// Directory for derived files
    #[arg(long, env = "ARMCUBE_OUTPUT_DIR", default_value = "output_emg_windows")]
    pub output_dir: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct WindowArgs {
    /// Window width as a fraction of the segment duration
    #[arg(long, default_value = "0.3")]
    pub width_fraction: f64,

    /// Seconds added to the right side of every window
    #[arg(long, default_value = "0.4")]
    pub right_extension: f64,
}

impl WindowArgs {
    pub fn params(&self, trim_factor: Option<f64>) -> WindowParams {
        WindowParams {
            width_fraction: self.width_fraction,
            right_extension: self.right_extension,
            trim_factor,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ForceArgs {
    /// Force sensors to segment
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "S1,S3",
        value_parser = PossibleValuesParser::new(FORCE_SENSORS)
    )]
    pub sensors: Vec<String>,

    /// Seconds after which samples define the resting offset
    #[arg(long, default_value = "60.0")]
    pub baseline_after: f64,

    /// Samples with a magnitude at or below this are ignored
    #[arg(long, default_value = "0.1")]
    pub near_zero_threshold: f64,

    /// Standard deviation of the Gaussian smoothing, in samples
    #[arg(long, default_value = "2.0")]
    pub sigma: f64,

    /// Minimum peak height
    #[arg(long, default_value = "50000.0")]
    pub min_height: f64,

    /// Minimum peak prominence
    #[arg(long, default_value = "0.5")]
    pub min_prominence: f64,

    /// Minimum spacing between peaks in seconds
    #[arg(long, default_value = "4.0")]
    pub min_spacing: f64,

    /// Resting band half-width used to cut the last segment
    #[arg(long, default_value = "300.0")]
    pub stable_band: f64,

    /// Seconds the signal must stay in the resting band
    #[arg(long, default_value = "20.0")]
    pub stable_duration: f64,
}

impl From<&ForceArgs> for ForcePeakParams {
    fn from(args: &ForceArgs) -> Self {
        ForcePeakParams {
            baseline_after: args.baseline_after,
            near_zero_threshold: args.near_zero_threshold,
            smoothing_sigma: args.sigma,
            min_peak_height: args.min_height,
            min_prominence: args.min_prominence,
            min_peak_spacing: args.min_spacing,
            stable_lower: -args.stable_band,
            stable_upper: args.stable_band,
            stable_duration: args.stable_duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_window_defaults() {
        let cli = Cli::parse_from(["armcube", "windows", "emg_csv_data/h0", "--output-dir", "out"]);
        match cli.command {
            Command::Windows {
                window,
                trim_factor,
                output,
                ..
            } => {
                assert_eq!(window.params(trim_factor), WindowParams::default());
                assert_eq!(output.output_dir, PathBuf::from("out"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_force_defaults_match_params() {
        let cli = Cli::parse_from(["armcube", "force-peaks", "ArmCubeDatah0"]);
        match cli.command {
            Command::ForcePeaks { force, .. } => {
                assert_eq!(force.sensors, vec!["S1".to_string(), "S3".to_string()]);
                assert_eq!(ForcePeakParams::from(&force), ForcePeakParams::default());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_unknown_sensor_rejected() {
        assert!(Cli::try_parse_from(["armcube", "force-peaks", "data", "--sensors", "S7"]).is_err());
        let cli =
            Cli::try_parse_from(["armcube", "force-peaks", "data", "--sensors", "S2,S6"]).unwrap();
        match cli.command {
            Command::ForcePeaks { force, .. } => assert_eq!(force.sensors, vec!["S2", "S6"]),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_plot_flags() {
        let cli = Cli::parse_from(["armcube", "clusters", "trial_RL_emg.csv", "--plot"]);
        match cli.command {
            Command::Clusters { plot, channel, .. } => {
                assert!(plot);
                assert_eq!(channel, 1);
            }
            other => panic!("unexpected command {:?}", other),
        }

        let cli = Cli::parse_from(["armcube", "plot", "ArmCubeDatah1", "--force", "--balance"]);
        match cli.command {
            Command::Plot {
                force,
                sensors,
                balance,
                ..
            } => {
                assert!(force && balance);
                assert_eq!(sensors, vec!["S4", "S1", "S3"]);
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert!(Cli::try_parse_from(["armcube", "plot", "data", "--sensors", "S1"]).is_err());
    }

    #[test]
    fn test_balance_requires_force() {
        assert!(Cli::try_parse_from(["armcube", "export", "data", "--balance"]).is_err());
        assert!(Cli::try_parse_from(["armcube", "export", "data", "--force", "--balance"]).is_ok());
    }
}

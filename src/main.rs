use anyhow::Result;
use armcube_analysis::batch::{self, BatchSummary};
use armcube_analysis::config::{Cli, Command};
use armcube_analysis::force_analysis::ForcePeakParams;
use clap::Parser;
use log::debug;

fn report(summary: &BatchSummary) {
    println!(
        "\nProcessed {} recordings, skipped {}, wrote {} files",
        summary.processed,
        summary.skipped,
        summary.written.len()
    );
}

fn main() -> Result<()> {
    // Initialize logger
    env_logger::init();

    let cli = Cli::parse();
    debug!("{:?}", cli);

    match cli.command {
        Command::Windows {
            input_dir,
            output,
            window,
            trim_factor,
            plot,
        } => {
            let params = window.params(trim_factor);
            report(&batch::run_windows(&input_dir, &output.output_dir, &params, plot)?);
        }
        Command::Pair {
            input_dir,
            output,
            window,
            trim_factor,
            plot,
        } => {
            let params = window.params(Some(trim_factor));
            report(&batch::run_pair(&input_dir, &output.output_dir, &params, plot)?);
        }
        Command::Slices {
            input_dir,
            output,
            window,
            plot,
        } => {
            let params = window.params(None);
            report(&batch::run_slices(&input_dir, &output.output_dir, &params, plot)?);
        }
        Command::ForcePeaks {
            input_dir,
            output,
            force,
            plot,
        } => {
            let params = ForcePeakParams::from(&force);
            report(&batch::run_force_peaks(
                &input_dir,
                &output.output_dir,
                &force.sensors,
                &params,
                plot,
            )?);
        }
        Command::Export {
            input_dir,
            output,
            force,
            balance,
            baseline_after,
        } => {
            let balance = balance.then_some(baseline_after);
            report(&batch::run_export(
                &input_dir,
                &output.output_dir,
                force,
                balance,
            )?);
        }
        Command::Clusters {
            input_file,
            output,
            channel,
            clusters,
            max_iter,
            plot,
        } => {
            report(&batch::run_clusters(
                &input_file,
                &output.output_dir,
                channel,
                clusters,
                max_iter,
                plot,
            )?);
        }
        Command::Plot {
            data_dir,
            output,
            force,
            sensors,
            balance,
            baseline_after,
        } => {
            let summary = if force {
                batch::run_plot_force(
                    &data_dir,
                    &output.output_dir,
                    &sensors,
                    balance.then_some(baseline_after),
                )?
            } else {
                batch::run_plot(&data_dir, &output.output_dir)?
            };
            report(&summary);
        }
        Command::Clean {
            data_dir,
            extension,
            dry_run,
        } => {
            let deleted = batch::run_clean(&data_dir, &extension, dry_run)?;
            println!("\n{} plot files {}", deleted.len(), if dry_run { "found" } else { "deleted" });
        }
    }

    Ok(())
}

use anyhow::Result;
use armcube_analysis::data_loading::{describe_csv, read_emg_csv, RecordingKind};
use std::path::Path;

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 2 {
        println!("Usage: {} <recording.csv>", args[0]);
        std::process::exit(1);
    }

    let path = Path::new(&args[1]);
    let summary = describe_csv(path)?;

    println!("\nColumns:");
    println!("{:#?}", summary.headers);
    println!("Rows: {}", summary.rows);

    if RecordingKind::from_path(path) == RecordingKind::Emg {
        let recording = read_emg_csv(path)?;
        let duration = recording.time.last().copied().unwrap_or(0.0);
        println!(
            "EMG: {} samples x {} channels over {:.2}s",
            recording.len(),
            recording.channel_count(),
            duration
        );
    }

    Ok(())
}

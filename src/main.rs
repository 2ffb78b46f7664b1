mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;
use trimcut::{inspect, StopPolicy, TrimOptions, TrimRequest, Trimmer};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "trimcut=trace,trimcut_media=trace".to_string()
        } else {
            "trimcut=info,trimcut_media=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Trim {
            input,
            start,
            end,
            out_dir,
            first_overrun,
        } => trim_file(&input, start, end, out_dir.as_deref(), first_overrun),
        Commands::Inspect { file, json } => inspect_file(&file, json),
    }
}

fn trim_file(
    input: &Path,
    start_secs: f64,
    end_secs: f64,
    out_dir: Option<&Path>,
    first_overrun: bool,
) -> Result<()> {
    let options = TrimOptions {
        stop_policy: if first_overrun {
            StopPolicy::FirstOverrun
        } else {
            StopPolicy::PerTrack
        },
    };
    let mut trimmer = Trimmer::new().with_options(options);
    if let Some(dir) = out_dir {
        trimmer = trimmer.with_scratch_dir(dir);
    }

    let request = match TrimRequest::from_secs(input, start_secs, end_secs) {
        Ok(request) => request,
        Err(e) => {
            eprintln!("{}: {}", e.code(), e);
            std::process::exit(1);
        }
    };

    match trimmer.trim(&request) {
        Ok(path) => {
            println!("{}", path.display());
            Ok(())
        }
        Err(e) => {
            eprintln!("{}: {}", e.code(), e);
            std::process::exit(1);
        }
    }
}

fn inspect_file(file: &Path, json: bool) -> Result<()> {
    let report = match inspect::inspect(file) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("{}: {}", e.code(), e);
            std::process::exit(1);
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("File: {}", report.path.display());
    println!(
        "Duration: {:.3}s (timescale {})",
        report.duration_secs, report.timescale
    );
    println!("\nTracks: {}", report.tracks.len());
    for track in &report.tracks {
        print!(
            "  [{}] {} {} ({} samples, {} sync)",
            track.index, track.kind, track.codec, track.sample_count, track.sync_sample_count
        );
        if let (Some(w), Some(h)) = (track.width, track.height) {
            print!(", {}x{}", w, h);
        }
        if let Some(channels) = track.channels {
            print!(", {}ch", channels);
        }
        if let Some(rate) = track.sample_rate {
            print!(", {} Hz", rate);
        }
        println!();
    }

    Ok(())
}

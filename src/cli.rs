use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "trimcut")]
#[command(author, version, about = "Trim MP4 files without re-encoding")]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Trim a time window out of an MP4 file
    Trim {
        /// Input file to trim
        #[arg(required = true)]
        input: PathBuf,

        /// Window start in seconds
        #[arg(short, long)]
        start: f64,

        /// Window end in seconds
        #[arg(short, long)]
        end: f64,

        /// Directory for the output file (defaults to a scratch dir)
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// Stop all tracks at the first sample past the end, like
        /// legacy extractor-based trimmers
        #[arg(long)]
        first_overrun: bool,
    },

    /// Inspect an MP4 file and display track information
    Inspect {
        /// File to inspect
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

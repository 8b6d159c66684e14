//! CLI command definitions using clap

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tt-render")]
#[command(about = "Render XM modules and cues to WAV, or inspect modules")]
#[command(version)]
pub struct Cli {
    /// Audio config file (TOML); defaults apply when absent
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print a module's header, patterns and instruments
    Info {
        /// Path to the XM file
        file: PathBuf,
    },

    /// Render an XM module to WAV
    Xm {
        /// Path to the XM file
        file: PathBuf,

        #[command(flatten)]
        output: OutputArgs,

        /// Stop at the end of the song instead of looping
        #[arg(long)]
        no_loop: bool,
    },

    /// Render one cue from a sound bank and wave bank to WAV
    Cue {
        /// Sound bank (.ttsb)
        sounds: PathBuf,

        /// Wave bank (.ttwb)
        waves: PathBuf,

        /// Cue name
        cue: String,

        #[command(flatten)]
        output: OutputArgs,

        /// Seed for randomized volume, pitch and timing
        #[arg(long)]
        seed: Option<u64>,

        /// Banks were written big-endian
        #[arg(long)]
        big_endian: bool,
    },
}

#[derive(Args)]
pub struct OutputArgs {
    /// Output WAV path
    #[arg(short, long)]
    pub output: PathBuf,

    /// Longest render in seconds
    #[arg(long, default_value_t = 30.0)]
    pub seconds: f64,

    /// Output sample rate; overrides the config file
    #[arg(long)]
    pub sample_rate: Option<u32>,
}

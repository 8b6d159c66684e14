//! tt-render - offline renderer for the tt audio core
//!
//! # Commands
//!
//! - `tt-render info <file.xm>` - print module header, patterns and instruments
//! - `tt-render xm <file.xm> -o out.wav` - render a module through the mixer
//! - `tt-render cue <sounds.ttsb> <waves.ttwb> <cue> -o out.wav` - render one cue
//!
//! Output is 16-bit stereo WAV. Mixer settings come from `--config` (TOML),
//! falling back to defaults. Set `RUST_LOG=debug` for player diagnostics.

mod cli;
mod info;
mod render;

use anyhow::{Context, Result};
use clap::Parser;
use tt_audio::AudioConfig;
use tt_shared::{DiskFile, HeapMemoryManager};

use cli::{Cli, Commands, OutputArgs};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AudioConfig::load(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?,
        None => AudioConfig::default(),
    };

    match cli.command {
        Commands::Info { file } => {
            let mut io = DiskFile::new();
            let module =
                tt_xm::load_module(&mut io, &file.to_string_lossy(), &HeapMemoryManager::shared())
                    .with_context(|| format!("Failed to load {}", file.display()))?;
            print!("{}", info::describe(&module));
            Ok(())
        }
        Commands::Xm {
            file,
            output,
            no_loop,
        } => {
            let mut config = with_output(config, &output);
            if no_loop {
                config.looping_music = false;
            }
            render::render_xm(&file, &output.output, output.seconds, &config)?;
            Ok(())
        }
        Commands::Cue {
            sounds,
            waves,
            cue,
            output,
            seed,
            big_endian,
        } => {
            let mut config = with_output(config, &output);
            if seed.is_some() {
                config.random_seed = seed;
            }
            config.big_endian_banks |= big_endian;
            render::render_cue(
                &sounds,
                &waves,
                &cue,
                &output.output,
                output.seconds,
                &config,
            )?;
            Ok(())
        }
    }
}

fn with_output(mut config: AudioConfig, output: &OutputArgs) -> AudioConfig {
    if let Some(rate) = output.sample_rate {
        config.sample_rate = rate;
    }
    config.validated()
}

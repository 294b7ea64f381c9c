//! Gifloop command-line tool
//!
//! Probe videos, convert a range to a GIF, or pick the range interactively
//! while the GIF is re-encoded in the background.

mod commands;
mod config;
mod output;
mod prefs;

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use commands::convert::ConvertOptions;
use config::Config;
use output::{resolve_color_choice, Console, TerminalConsole};
use prefs::Prefs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gifloop")]
#[command(about = "Turn video ranges into GIFs", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Config file (defaults to <config dir>/gifloop/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show duration, size and frame rate of a video
    Probe {
        /// Input video
        file: PathBuf,
    },

    /// Convert a range of a video to a GIF next to it
    Convert {
        /// Input video
        file: PathBuf,
        /// Range start in seconds
        #[arg(long, default_value_t = 0.0)]
        start: f64,
        /// Range length in seconds (defaults to the rest of the video, capped)
        #[arg(long)]
        duration: Option<f64>,
        /// Output frame rate
        #[arg(long)]
        fps: Option<f64>,
        /// Output scale in (0, 1]
        #[arg(long)]
        scale: Option<f64>,
        /// Play the range backwards
        #[arg(long)]
        reverse: bool,
        /// Stamp text on the GIF (`--logo=TEXT`; configured text when bare)
        #[arg(long, require_equals = true)]
        logo: Option<Option<String>>,
    },

    /// Pick a range interactively; the GIF is re-encoded as you edit
    Session {
        /// Input video
        file: PathBuf,
    },

    /// Print the effective configuration
    Config,
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_env("GIFLOOP_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Locate `file` directly or in the last used directory, then remember it
fn resolve_input(prefs: &mut Prefs, file: &Path) -> anyhow::Result<PathBuf> {
    let resolved = prefs
        .resolve_input(file)
        .with_context(|| format!("Input file not found: {}", file.display()))?;
    if let Err(e) = prefs.remember(&resolved) {
        warn!(error = %e, "could not save preferences");
    }
    Ok(resolved)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load(cli.config.as_deref())?;
    let console: Arc<dyn Console> = Arc::new(TerminalConsole::new(resolve_color_choice()));
    let mut prefs = Prefs::open_default();

    match cli.command {
        Commands::Probe { file } => {
            let input = resolve_input(&mut prefs, &file)?;
            commands::probe::execute(&config, console.as_ref(), input)
        }

        Commands::Convert {
            file,
            start,
            duration,
            fps,
            scale,
            reverse,
            logo,
        } => {
            let input = resolve_input(&mut prefs, &file)?;
            let options = ConvertOptions {
                start,
                duration,
                fps,
                scale,
                reverse,
                logo,
            };
            commands::convert::execute(&config, console, input, &options)
        }

        Commands::Session { file } => {
            let input = resolve_input(&mut prefs, &file)?;
            commands::session::execute(&config, console, input)
        }

        Commands::Config => {
            if let Some(path) = Config::default_path() {
                println!("# default location: {}", path.display());
            }
            print!("{}", config.to_toml_string()?);
            println!("# last directory: {}", prefs.last_dir().display());
            Ok(())
        }
    }
}

//! multiconv CLI - The `multiconv` command.
//!
//! Converts multi-sample instrument libraries between sampler formats.
//!
//! # Architecture
//!
//! The CLI binary orchestrates the following crates:
//!
//! - **multiconv-model**: canonical model, detection walk, configuration
//! - **multiconv-formats**: format registry with all readers and writers
//!
//! Ctrl-C requests cancellation; the run stops before the next file.

mod convert;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use multiconv_formats::{DestinationFormat, SourceFormat};
use multiconv_model::{ConverterConfig, LogNotifier};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::convert::Session;

/// multiconv - Multi-sample format converter
#[derive(Parser, Debug)]
#[command(name = "multiconv")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Convert multi-sample instruments between sampler formats", long_about = None)]
struct Args {
    /// Configuration file (defaults to the user configuration)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the multi-samples found below a folder
    Detect {
        #[arg(value_name = "FOLDER")]
        folder: PathBuf,

        /// Source format
        #[arg(long)]
        from: SourceFormat,

        /// Read performances (multis) instead of single instruments
        #[arg(long)]
        performances: bool,
    },

    /// Convert all multi-samples below a folder
    Convert {
        #[arg(value_name = "SOURCE")]
        source: PathBuf,

        #[arg(value_name = "DESTINATION")]
        destination: PathBuf,

        /// Source format
        #[arg(long)]
        from: SourceFormat,

        /// Destination format
        #[arg(long)]
        to: DestinationFormat,

        /// Write each instrument of a performance into a performance folder
        #[arg(long)]
        performances: bool,

        /// Add numbered files instead of failing on existing output
        #[arg(long)]
        add_new_files: bool,

        /// Layers per MPC keygroup (4 or 8)
        #[arg(long, value_name = "COUNT")]
        mpc_layers: Option<usize>,
    },

    /// List the supported formats
    Formats,

    /// Write the default configuration file
    InitConfig,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let args = Args::parse();
    match args.command {
        Commands::Detect {
            folder,
            from,
            performances,
        } => {
            let config = load_config(args.config.as_deref())?;
            run_detect(&config, &folder, from, performances)
        }
        Commands::Convert {
            source,
            destination,
            from,
            to,
            performances,
            add_new_files,
            mpc_layers,
        } => {
            let mut config = load_config(args.config.as_deref())?;
            if add_new_files {
                config.destination.add_new_files = true;
            }
            if let Some(layers) = mpc_layers {
                config.destination.mpc_layer_limit = layers;
            }
            run_convert(&config, &source, &destination, from, to, performances)
        }
        Commands::Formats => {
            println!("Sources:");
            for format in SourceFormat::ALL {
                let detector = format.detector();
                println!("  {:<8} {} (.{})", format, detector.name(), detector.extensions().join(", ."));
            }
            println!();
            println!("Destinations:");
            for format in DestinationFormat::ALL {
                println!("  {:<8} {}", format, format.creator().name());
            }
            Ok(())
        }
        Commands::InitConfig => {
            let path = ConverterConfig::create_default_config_file().context("Failed to write configuration")?;
            println!("Wrote {}", path.display());
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<ConverterConfig> {
    match path {
        Some(path) => ConverterConfig::load_from(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => Ok(ConverterConfig::load_or_default()),
    }
}

/// Cancellation flag raised by Ctrl-C.
fn cancel_flag() -> Result<Arc<AtomicBool>> {
    let cancel = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&cancel))
        .context("Failed to install Ctrl-C handler")?;
    Ok(cancel)
}

fn run_detect(config: &ConverterConfig, folder: &Path, from: SourceFormat, performances: bool) -> Result<()> {
    if !folder.is_dir() {
        anyhow::bail!("Folder not found: {}", folder.display());
    }
    let cancel = cancel_flag()?;
    let session = Session {
        config,
        notifier: &LogNotifier,
        cancel: &cancel,
    };

    if performances {
        for performance in session.detect_performances(folder, from) {
            println!("{} ({} instruments)", performance.name, performance.instruments.len());
            for instrument in &performance.instruments {
                let channel = instrument
                    .midi_channel
                    .map_or_else(|| "omni".to_string(), |c| (c + 1).to_string());
                println!("  {} [channel {}]", instrument.source.name, channel);
            }
        }
        return Ok(());
    }

    let sources = session.detect(folder, from);
    for source in &sources {
        println!(
            "{}: {} groups, {} zones ({})",
            source.name,
            source.groups.len(),
            source.zone_count(),
            source.source_path.display()
        );
    }
    println!("{} multi-samples found", sources.len());
    Ok(())
}

fn run_convert(
    config: &ConverterConfig,
    source: &Path,
    destination: &Path,
    from: SourceFormat,
    to: DestinationFormat,
    performances: bool,
) -> Result<()> {
    let cancel = cancel_flag()?;
    let session = Session {
        config,
        notifier: &LogNotifier,
        cancel: &cancel,
    };
    log::info!("Converting {} ({}) to {} ({})", source.display(), from, destination.display(), to);
    let summary = session.convert(source, destination, from, to, performances)?;

    println!("{} files written, {} failed", summary.written.len(), summary.failed);
    if summary.cancelled {
        println!("Conversion cancelled");
    }
    if summary.failed > 0 {
        anyhow::bail!("{} multi-samples could not be written", summary.failed);
    }
    Ok(())
}

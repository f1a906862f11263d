use anyhow::Context;
use clap::{Parser, Subcommand};
use photo_align::config::{load_config_or_default, CaptionPosition, ConfigFormat};
use photo_align::data::loader::{load_image, save_image};
use photo_align::logging::init_logging;
use photo_align::visualization::{print_alignment, print_batch_summary};
use photo_align::{Aligner, BatchRunner, Config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "align")]
#[command(about = "Align a series of photos to a reference photo and caption them with their capture date")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Configuration file (TOML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Align every image in a folder to the reference image
    Batch {
        /// Path to the reference (base) image
        #[arg(short, long)]
        reference: Option<PathBuf>,

        /// Folder containing the images to align
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Folder receiving aligned/ and aligned/dated/
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Skip the captioned copies
        #[arg(long)]
        no_timestamp: bool,

        /// Caption position: top or bottom
        #[arg(long)]
        position: Option<CaptionPosition>,

        /// TrueType font used for captions
        #[arg(long)]
        font: Option<PathBuf>,

        /// Caption font size in pixels
        #[arg(long)]
        font_size: Option<f32>,
    },

    /// Align a single target image to a reference image
    Pair {
        /// Path to the reference image
        #[arg(short, long)]
        reference: PathBuf,

        /// Path to the image to align
        #[arg(short = 'T', long)]
        target: PathBuf,

        /// Where to write the aligned image
        #[arg(short, long)]
        output: PathBuf,

        /// Optional JSON file receiving the homography and statistics
        #[arg(long)]
        homography: Option<PathBuf>,
    },

    /// Write a configuration file with all defaults
    InitConfig {
        /// Destination path
        #[arg(short, long, default_value = "align.toml")]
        path: PathBuf,

        /// Output format (toml or json); inferred from the extension when omitted
        #[arg(short, long)]
        format: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_config_or_default(cli.config.as_deref());
    match cli.verbose {
        0 => {}
        1 => config.logging.global_level = "debug".to_string(),
        _ => {
            config.logging.global_level = "trace".to_string();
            config.logging.alignment_level = "trace".to_string();
            config.logging.batch_level = "trace".to_string();
        }
    }
    let _log_guard = init_logging(&config.logging)?;

    match cli.command {
        Commands::Batch {
            reference,
            input,
            output,
            no_timestamp,
            position,
            font,
            font_size,
        } => {
            config.batch.reference_image = reference.or(config.batch.reference_image);
            config.batch.input_folder = input.or(config.batch.input_folder);
            config.batch.output_folder = output.or(config.batch.output_folder);
            if no_timestamp {
                config.caption.enabled = false;
            }
            if let Some(position) = position {
                config.caption.position = position;
            }
            if font.is_some() {
                config.caption.font_path = font;
            }
            if let Some(size) = font_size {
                config.caption.font_size = size;
            }
            handle_batch(config)?;
        }
        Commands::Pair {
            reference,
            target,
            output,
            homography,
        } => {
            handle_pair(&config, reference, target, output, homography)?;
        }
        Commands::InitConfig { path, format } => {
            handle_init_config(path, format)?;
        }
    }

    Ok(())
}

fn validate(config: &Config) -> anyhow::Result<()> {
    if let Err(errors) = config.validate() {
        anyhow::bail!("Invalid configuration:\n  - {}", errors.join("\n  - "));
    }
    Ok(())
}

fn handle_batch(config: Config) -> anyhow::Result<()> {
    validate(&config)?;

    let runner = BatchRunner::new(config);
    let report = runner.run()?;
    print_batch_summary(&report);
    Ok(())
}

fn handle_pair(
    config: &Config,
    reference_path: PathBuf,
    target_path: PathBuf,
    output: PathBuf,
    homography_path: Option<PathBuf>,
) -> anyhow::Result<()> {
    validate(config)?;

    let reference = load_image(&reference_path)?;
    let target = load_image(&target_path)?;
    println!(
        "Reference: {}x{}, Target: {}x{}",
        reference.width(),
        reference.height(),
        target.width(),
        target.height()
    );

    let aligner = Aligner::new(config.alignment.clone());
    let alignment = aligner
        .align(&reference, &target)
        .with_context(|| format!("Could not align {}", target_path.display()))?;

    save_image(&alignment.warped, &output)?;
    print_alignment(&alignment.stats, &alignment.homography);
    println!("Aligned image saved to: {}", output.display());

    if let Some(path) = homography_path {
        let json = serde_json::json!({
            "reference": reference_path,
            "target": target_path,
            "homography": alignment.homography.to_rows(),
            "stats": alignment.stats,
        });
        std::fs::write(&path, serde_json::to_string_pretty(&json)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Homography saved to: {}", path.display());
    }

    Ok(())
}

fn handle_init_config(path: PathBuf, format: Option<String>) -> anyhow::Result<()> {
    let format = match format.as_deref().map(str::to_ascii_lowercase).as_deref() {
        Some("json") => ConfigFormat::Json,
        Some("toml") => ConfigFormat::Toml,
        Some(other) => anyhow::bail!("Unknown config format: {}", other),
        None => ConfigFormat::from_path(&path),
    };

    Config::default().save_to_file(&path, format)?;
    println!("Default configuration written to: {}", path.display());
    Ok(())
}

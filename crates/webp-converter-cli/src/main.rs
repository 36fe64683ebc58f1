use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use log::{error, info};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use webp_converter_core::config::LogLevel;
use webp_converter_core::logging::init_logger;
use webp_converter_core::{clamp_quality, Config, ConversionOptions, WebpConverter};

#[derive(Parser)]
#[command(name = "webp-converter")]
#[command(about = "Convert PNG and JPEG images to WebP inside allowed directories")]
#[command(version)]
struct Cli {
    /// Directory conversions are restricted to (repeatable)
    #[arg(long = "allowed-dir", global = true)]
    allowed_dirs: Vec<PathBuf>,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Write logs to rotating files in this directory instead of stderr
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone, Copy)]
struct EncodeArgs {
    /// Lossy quality (0-100, clamped)
    #[arg(short, long)]
    quality: Option<i64>,

    /// Encode losslessly
    #[arg(long)]
    lossless: bool,

    /// Keep the source images after converting
    #[arg(long)]
    keep_original: bool,
}

impl EncodeArgs {
    fn options(&self, defaults: ConversionOptions) -> ConversionOptions {
        ConversionOptions {
            quality: self.quality.map(clamp_quality).unwrap_or(defaults.quality),
            lossless: self.lossless || defaults.lossless,
            keep_original: self.keep_original || defaults.keep_original,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the conversion tools as JSON lines over stdin/stdout
    Serve {
        /// Allowed directories (same as --allowed-dir)
        #[arg(value_name = "ALLOWED_DIR")]
        roots: Vec<PathBuf>,
    },

    /// Convert a single image
    Convert {
        /// Image to convert
        image: PathBuf,

        #[command(flatten)]
        encode: EncodeArgs,
    },

    /// Convert images and directories of images
    Batch {
        /// Files or directories to convert
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        #[command(flatten)]
        encode: EncodeArgs,

        /// Number of parallel conversions (0 = one per CPU)
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Print the available tools and their argument schemas
    Tools,

    /// Generate default configuration file
    GenerateConfig {
        /// Path to save configuration file
        #[arg(default_value = "webp-converter.json")]
        path: PathBuf,
    },
}

/// Merge the configuration file, environment and command line.
///
/// Roots given on the command line win over the environment, which wins
/// over the configuration file.
fn load_config(cli: &Cli, extra_roots: &[PathBuf]) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Config::default(),
    };

    if let Some(roots) = Config::roots_from_env() {
        config = config.with_roots(roots);
    }

    let cli_roots: Vec<PathBuf> = cli
        .allowed_dirs
        .iter()
        .chain(extra_roots)
        .cloned()
        .collect();
    config = config.with_roots(cli_roots);

    config.log_level = match cli.verbose {
        0 => config.log_level,
        1 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    Ok(config)
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn serve(converter: &WebpConverter) -> anyhow::Result<()> {
    let registry = converter.tools();
    info!("Serving tools on stdio: {}", registry.names().join(", "));

    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();

    for line in stdin.lock().lines() {
        let line = line.context("reading request")?;
        if line.trim().is_empty() {
            continue;
        }

        let response = registry.handle_line(&line);
        serde_json::to_writer(&mut stdout, &response)?;
        stdout.write_all(b"\n")?;
        stdout.flush()?;
    }

    info!("Input closed, shutting down");
    Ok(())
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let extra_roots = match &cli.command {
        Commands::Serve { roots } => roots.clone(),
        _ => Vec::new(),
    };
    let mut config = load_config(&cli, &extra_roots)?;

    init_logger(config.log_level, cli.log_dir.as_deref())?;

    match &cli.command {
        Commands::GenerateConfig { path } => {
            Config::default().save_to_file(path)?;
            println!("Configuration file generated at: {}", path.display());
            return Ok(());
        }
        Commands::Batch {
            workers: Some(workers),
            ..
        } => config.workers = *workers,
        _ => {}
    }

    config.validate()?;
    let defaults = config.default_options();
    let converter = WebpConverter::new(config);

    match cli.command {
        Commands::Serve { .. } => serve(&converter),
        Commands::Convert { image, encode } => {
            let result = converter.convert(&image, encode.options(defaults));
            print_json(&result)?;
            if !result.is_success() {
                anyhow::bail!("conversion failed");
            }
            Ok(())
        }
        Commands::Batch { paths, encode, .. } => {
            let batch = converter.convert_batch(&paths, encode.options(defaults));
            print_json(&batch)?;
            info!(
                "Converted {} of {} images",
                batch.succeeded(),
                batch.len()
            );
            if batch.failed() > 0 {
                anyhow::bail!("{} of {} conversions failed", batch.failed(), batch.len());
            }
            Ok(())
        }
        Commands::Tools => print_json(&converter.tools().describe()),
        Commands::GenerateConfig { .. } => Ok(()),
    }
}

fn main() -> Result<(), anyhow::Error> {
    // Pick up WEBP_CONVERTER_* variables from a local .env file
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        error!("{:#}", e);
        return Err(e);
    }
    Ok(())
}

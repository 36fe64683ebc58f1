use log::{error, info, LevelFilter};
use std::path::Path;

// For file-based logging with rotation
use log4rs::append::rolling_file::policy::compound::roll::fixed_window::FixedWindowRoller;
use log4rs::append::rolling_file::policy::compound::trigger::size::SizeTrigger;
use log4rs::append::rolling_file::policy::compound::CompoundPolicy;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

use crate::config::LogLevel;
use crate::error::{Error, Result};

/// Environment variable overriding the log level when logging to a file
pub const LOG_LEVEL_ENV: &str = "WEBP_CONVERTER_LOG";

const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;
const ARCHIVED_LOGS: u32 = 5;

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

/// Initialize the logger.
///
/// Without a log directory, records go to stderr through `env_logger`
/// (`RUST_LOG` still wins over `level`). With one, they go to a rotating
/// file only, leaving stdout and stderr untouched for the tool protocol.
pub fn init_logger(level: LogLevel, log_dir: Option<&Path>) -> Result<()> {
    match log_dir {
        None => {
            env_logger::Builder::new()
                .filter_level(level.into())
                .parse_default_env()
                .target(env_logger::Target::Stderr)
                .try_init()
                .map_err(|e| Error::Configuration(format!("Failed to initialize logger: {}", e)))?;
            Ok(())
        }
        Some(dir) => init_file_logger(level, dir),
    }
}

fn init_file_logger(level: LogLevel, log_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(log_dir)?;

    let log_file_path = log_dir.join("webp-converter.log");
    let archived_logs_pattern = format!("{}/webp-converter.{{}}.log", log_dir.display());

    let file_trigger = SizeTrigger::new(MAX_LOG_SIZE);
    let file_roller = FixedWindowRoller::builder()
        .build(&archived_logs_pattern, ARCHIVED_LOGS)
        .map_err(|e| Error::Configuration(format!("Failed to create log roller: {}", e)))?;
    let compound_policy = CompoundPolicy::new(Box::new(file_trigger), Box::new(file_roller));

    let rolling_file = RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%d %H:%M:%S)} [{l}] [{M}:{L}] - {m}{n}",
        )))
        .build(&log_file_path, Box::new(compound_policy))
        .map_err(|e| Error::Configuration(format!("Failed to create log appender: {}", e)))?;

    let filter = std::env::var(LOG_LEVEL_ENV)
        .ok()
        .and_then(|value| value.parse::<LevelFilter>().ok())
        .unwrap_or_else(|| level.into());

    let config = Config::builder()
        .appender(Appender::builder().build("file", Box::new(rolling_file)))
        .build(Root::builder().appender("file").build(filter))
        .map_err(|e| Error::Configuration(format!("Failed to build log config: {}", e)))?;

    log4rs::init_config(config)
        .map_err(|e| Error::Configuration(format!("Failed to initialize log4rs: {}", e)))?;

    info!("Logging to file: {}", log_file_path.display());
    Ok(())
}

/// Log file operation that failed
pub fn log_file_error(path: &Path, operation: &str, error: &dyn std::error::Error) {
    error!(
        "File operation failed - Operation: {}, Path: {}, Error: {}",
        operation,
        path.display(),
        error
    );
}

/// Log file system modification
pub fn log_fs_modification(operation: &str, path: &Path, details: Option<&str>) {
    match details {
        Some(details) => info!(
            "FS CHANGE - Operation: {}, Path: {}, Details: {}",
            operation,
            path.display(),
            details
        ),
        None => info!("FS CHANGE - Operation: {}, Path: {}", operation, path.display()),
    }
}

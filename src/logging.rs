//! Logging via `tracing` and `tracing-subscriber`.
//!
//! Command output goes to stdout with `println!`; diagnostics go through
//! `tracing` to stderr, or to a log file while the terminal UI owns the screen.
//! `JOBBOARD_LOG` (then `RUST_LOG`) overrides the verbosity flags.

use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::EnvFilter;

pub const ENV_LOG: &str = "JOBBOARD_LOG";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: Level,
    pub log_file: Option<PathBuf>,
}

impl LogConfig {
    /// - 0: warn
    /// - 1 (`-v`): info
    /// - 2 (`-vv`): debug
    /// - 3+: trace
    pub fn from_verbosity(verbosity: u8) -> Self {
        let level = match verbosity {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        };
        Self {
            level,
            log_file: None,
        }
    }

    pub fn with_log_file(mut self, path: Option<PathBuf>) -> Self {
        self.log_file = path;
        self
    }
}

pub fn init_logging(config: &LogConfig) -> io::Result<()> {
    let filter = build_env_filter(config.level);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let result = match &config.log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => builder.with_writer(io::stderr).try_init(),
    };
    // A subscriber already installed (tests, repeated init) is not an error
    if let Err(err) = result {
        tracing::debug!("logging already initialized: {}", err);
    }
    Ok(())
}

fn build_env_filter(level: Level) -> EnvFilter {
    let level_str = level.as_str().to_lowercase();
    EnvFilter::try_from_env(ENV_LOG)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| {
            // Keep dependencies quiet unless asked for
            EnvFilter::new(format!("warn,jobboard={}", level_str))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_verbosity() {
        assert_eq!(LogConfig::from_verbosity(0).level, Level::WARN);
        assert_eq!(LogConfig::from_verbosity(1).level, Level::INFO);
        assert_eq!(LogConfig::from_verbosity(2).level, Level::DEBUG);
        assert_eq!(LogConfig::from_verbosity(9).level, Level::TRACE);
    }

    #[test]
    fn test_log_file_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("jobboard.log");
        let config = LogConfig::from_verbosity(1).with_log_file(Some(path.clone()));
        init_logging(&config).unwrap();
        assert!(path.exists());
    }
}

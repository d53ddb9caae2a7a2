//! Logging setup for the command-line binary.

use std::fs::File;
use std::path::{Path, PathBuf};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::Result;

/// Console and file logging choices for one run.
#[derive(Clone, Debug, Default)]
pub struct LogOptions {
    /// Log at debug level instead of info.
    pub verbose: bool,
    /// Log errors only.
    pub quiet: bool,
    /// Directory for a per-run log file; no file logging when unset.
    pub log_dir: Option<PathBuf>,
    /// Base name woven into the log file name.
    pub run_name: Option<String>,
}

/// Installs the global tracing subscriber.
///
/// Console output goes to stderr so stdout stays clean for command
/// results. `RUST_LOG` overrides the level the flags select. Returns
/// the log file path when file logging is active.
pub fn init(options: &LogOptions) -> Result<Option<PathBuf>> {
    let level = if options.verbose {
        "debug"
    } else if options.quiet {
        "error"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let console_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);

    let (file_layer, file_path) = match &options.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let path = log_file_path(dir, options.run_name.as_deref());
            let file = File::create(&path)?;
            let layer = fmt::layer().with_ansi(false).with_writer(file);
            (Some(layer), Some(path))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .ok();

    Ok(file_path)
}

fn log_file_path(dir: &Path, run_name: Option<&str>) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    match run_name {
        Some(name) => dir.join(format!("{stamp}-{name}.log")),
        None => dir.join(format!("{stamp}.log")),
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_path_includes_run_name() {
        let path = log_file_path(Path::new("/var/log/nm"), Some("mouse-pyramidal"));
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.ends_with("-mouse-pyramidal.log"));
        assert!(name.chars().next().unwrap().is_ascii_digit());
        assert!(path.starts_with("/var/log/nm"));
    }

    #[test]
    fn test_log_file_path_without_run_name() {
        let path = log_file_path(Path::new("logs"), None);
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.ends_with(".log"));
        assert!(!name.contains("--"));
    }
}

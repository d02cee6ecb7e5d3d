//! Console and optional file logging.
//!
//! The console layer prints INFO and above (DEBUG with `verbose`), the file
//! layer always records DEBUG with target and line information. Logging is
//! installed through an explicit [`LoggingContext`] held by the caller that
//! owns the process, so reconfiguration is a visible state transition.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Layer, Registry};

pub const LOG_FILE_ENV: &str = "LOG_FILE";
pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";
/// Size above which an existing log file is reported at startup.
pub const LOG_FILE_WARN_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("logging is already configured")]
    AlreadyConfigured,
    #[error("invalid log level {level:?}: {message}")]
    InvalidLevel { level: String, message: String },
    #[error("cannot open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot install subscriber: {0}")]
    Install(String),
}

/// What to log and where.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Show DEBUG records on the console.
    pub verbose: bool,
    /// Console filter override (`LOG_LEVEL`), e.g. `warn` or `oncolit_analysis=debug`.
    pub level: Option<String>,
    /// Also write DEBUG records to this file (`LOG_FILE`).
    ///
    /// The file is opened in append mode and never rotated or truncated, so
    /// it grows across runs until removed. A warning is logged at startup
    /// once it exceeds [`LOG_FILE_WARN_BYTES`].
    pub log_file: Option<PathBuf>,
}

impl LoggingSettings {
    pub fn new(verbose: bool) -> Self {
        Self { verbose, ..Default::default() }
    }

    /// Settings with `LOG_LEVEL` and `LOG_FILE` taken from the environment.
    pub fn from_env(verbose: bool) -> Self {
        Self {
            verbose,
            level: std::env::var(LOG_LEVEL_ENV).ok().filter(|s| !s.trim().is_empty()),
            log_file: std::env::var(LOG_FILE_ENV)
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
        }
    }

    /// Console filter directives. An explicit level wins over `verbose`.
    pub fn console_directives(&self) -> String {
        match &self.level {
            Some(level) => level.trim().to_lowercase(),
            None if self.verbose => "debug".to_string(),
            None => "info".to_string(),
        }
    }

    fn console_filter(&self) -> Result<EnvFilter, LoggingError> {
        let directives = self.console_directives();
        EnvFilter::try_new(&directives).map_err(|e| LoggingError::InvalidLevel {
            level: directives,
            message: e.to_string(),
        })
    }
}

enum LoggingState {
    Unconfigured,
    Configured {
        settings: LoggingSettings,
        console: reload::Handle<EnvFilter, Registry>,
    },
}

/// Owns the process-wide subscriber installation.
pub struct LoggingContext {
    state: LoggingState,
}

impl Default for LoggingContext {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggingContext {
    pub fn new() -> Self {
        Self { state: LoggingState::Unconfigured }
    }

    pub fn is_configured(&self) -> bool {
        matches!(self.state, LoggingState::Configured { .. })
    }

    pub fn settings(&self) -> Option<&LoggingSettings> {
        match &self.state {
            LoggingState::Configured { settings, .. } => Some(settings),
            LoggingState::Unconfigured => None,
        }
    }

    /// Install the subscriber.
    ///
    /// A second call fails with [`LoggingError::AlreadyConfigured`] unless
    /// `force` is set. Forcing swaps the console filter in place; the file
    /// destination chosen by the first call stays as it was.
    pub fn configure(&mut self, settings: LoggingSettings, force: bool) -> Result<(), LoggingError> {
        let filter = settings.console_filter()?;

        if let LoggingState::Configured { console, settings: current } = &mut self.state {
            if !force {
                return Err(LoggingError::AlreadyConfigured);
            }
            console
                .reload(filter)
                .map_err(|e| LoggingError::Install(e.to_string()))?;
            current.verbose = settings.verbose;
            current.level = settings.level;
            return Ok(());
        }

        let (console_filter, handle) = reload::Layer::new(filter);
        let console = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_filter(console_filter);

        let file = match &settings.log_file {
            Some(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent).map_err(|source| LoggingError::LogFile {
                        path: path.clone(),
                        source,
                    })?;
                }
                let handle = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|source| LoggingError::LogFile { path: path.clone(), source })?;
                Some(
                    fmt::layer()
                        .with_writer(Mutex::new(handle))
                        .with_ansi(false)
                        .with_target(true)
                        .with_line_number(true)
                        .with_filter(LevelFilter::DEBUG),
                )
            }
            None => None,
        };

        tracing_subscriber::registry()
            .with(console)
            .with(file)
            .try_init()
            .map_err(|e| LoggingError::Install(e.to_string()))?;

        if let Some(path) = &settings.log_file {
            tracing::info!(path = %path.display(), "Logging to file");
            if let Some(bytes) = oversized_log_file(path, LOG_FILE_WARN_BYTES) {
                tracing::warn!(path = %path.display(), bytes, "Log file is large and is not rotated");
            }
        }

        self.state = LoggingState::Configured { settings, console: handle };
        Ok(())
    }
}

/// Current size of `path` when it exceeds `limit` bytes.
fn oversized_log_file(path: &Path, limit: u64) -> Option<u64> {
    let len = std::fs::metadata(path).ok()?.len();
    (len > limit).then_some(len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oversized_log_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        assert_eq!(oversized_log_file(&path, 8), None);

        std::fs::write(&path, b"0123456789").unwrap();
        assert_eq!(oversized_log_file(&path, 8), Some(10));
        assert_eq!(oversized_log_file(&path, 10), None);
    }

    #[test]
    fn test_console_directives_default_to_info() {
        assert_eq!(LoggingSettings::new(false).console_directives(), "info");
        assert_eq!(LoggingSettings::new(true).console_directives(), "debug");
    }

    #[test]
    fn test_explicit_level_overrides_verbose() {
        let settings = LoggingSettings {
            verbose: true,
            level: Some(" WARN ".to_string()),
            log_file: None,
        };
        assert_eq!(settings.console_directives(), "warn");
    }

    #[test]
    fn test_invalid_level_is_rejected_before_install() {
        let mut ctx = LoggingContext::new();
        let settings = LoggingSettings {
            verbose: false,
            level: Some("not a [level".to_string()),
            log_file: None,
        };
        let err = ctx.configure(settings, false).unwrap_err();
        assert!(matches!(err, LoggingError::InvalidLevel { .. }));
        assert!(!ctx.is_configured());
    }

    #[test]
    fn test_second_configure_requires_force() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("logs").join("run.log");

        let mut ctx = LoggingContext::new();
        let settings = LoggingSettings {
            verbose: false,
            level: None,
            log_file: Some(log_path.clone()),
        };
        ctx.configure(settings.clone(), false).unwrap();
        assert!(ctx.is_configured());
        assert!(log_path.exists());

        let err = ctx.configure(settings, false).unwrap_err();
        assert!(matches!(err, LoggingError::AlreadyConfigured));

        ctx.configure(LoggingSettings::new(true), true).unwrap();
        let current = ctx.settings().unwrap();
        assert!(current.verbose);
        assert_eq!(current.log_file.as_deref(), Some(log_path.as_path()));
    }
}

use crate::constants::env as env_keys;
use crate::errors::ConfigError;
use chrono::Local;
use std::env;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl From<u8> for LogLevel {
    fn from(val: u8) -> Self {
        match val {
            0 => LogLevel::Error,
            1 => LogLevel::Warn,
            2 => LogLevel::Info,
            3 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

static DEFAULT_LOG_LEVEL: Mutex<LogLevel> = Mutex::new(LogLevel::Info);

pub fn set_log_level(level: LogLevel) {
    if let Ok(mut default_level) = DEFAULT_LOG_LEVEL.lock() {
        *default_level = level;
    }
}

/// `-v` raises the level to debug, `-vv` to trace.
pub fn set_log_level_from_verbosity(verbose: u8) {
    match verbose {
        0 => {}
        1 => set_log_level(LogLevel::Debug),
        _ => set_log_level(LogLevel::Trace),
    }
}

pub fn set_log_level_from_env() {
    if let Ok(level) = env::var(env_keys::LOG_LEVEL) {
        match level.to_uppercase().as_str() {
            "TRACE" => set_log_level(LogLevel::Trace),
            "DEBUG" => set_log_level(LogLevel::Debug),
            "INFO" => set_log_level(LogLevel::Info),
            "WARN" => set_log_level(LogLevel::Warn),
            "ERROR" => set_log_level(LogLevel::Error),
            _ => {}
        }
    }
}

fn get_default_log_level() -> Level {
    DEFAULT_LOG_LEVEL
        .lock()
        .map(|level| (*level).into())
        .unwrap_or(Level::INFO)
}

struct LocalTimeFormatter;

impl FormatTime for LocalTimeFormatter {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%d %H:%M:%S"))
    }
}

struct CustomFormatter;

impl<S, N> tracing_subscriber::fmt::FormatEvent<S, N> for CustomFormatter
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let metadata = event.metadata();

        write!(writer, "[")?;
        LocalTimeFormatter.format_time(&mut writer)?;
        write!(writer, "] ")?;
        write!(writer, "[{:5}] ", metadata.level())?;

        if let Some(file) = metadata.file() {
            let display_path = match metadata.module_path().and_then(|m| m.split("::").next()) {
                Some(crate_name) if !file.starts_with('/') && !file.starts_with("crates/") => {
                    format!("crates/{}/{}", crate_name.replace('_', "-"), file)
                }
                _ => file.to_string(),
            };
            write!(writer, "{}:{} ", display_path, metadata.line().unwrap_or(0))?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

fn env_filter() -> EnvFilter {
    let level_str = match get_default_log_level() {
        Level::ERROR => "error",
        Level::WARN => "warn",
        Level::INFO => "info",
        Level::DEBUG => "debug",
        Level::TRACE => "trace",
    };
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level_str))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

fn init_tracing_subscriber(log_path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(Mutex::new(log_file))
        .with_ansi(false)
        .event_format(CustomFormatter);

    let stderr_layer = env::var(env_keys::LOG_TEE).is_ok().then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .event_format(CustomFormatter)
    });

    tracing_subscriber::registry()
        .with(env_filter())
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .map_err(|e| ConfigError::General(format!("Failed to install logger: {}", e)))?;

    tracing::info!("--- Logger Initialized ---");

    Ok(())
}

/// Writes this run's session log into the pipeline log directory and points
/// `shieldrun.log` at it. Existing session logs are left in place.
pub fn init_session_logger(pipeline_dir: &Path) -> Result<PathBuf, ConfigError> {
    let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S");
    let pid = std::process::id();
    let filename = format!("shieldrun_{}_{}.log", timestamp, pid);
    let log_path = pipeline_dir.join(&filename);

    init_tracing_subscriber(&log_path)?;

    let symlink_path = pipeline_dir.join("shieldrun.log");
    let _ = fs::remove_file(&symlink_path);
    #[cfg(unix)]
    {
        use std::os::unix::fs::symlink;
        let _ = symlink(&filename, &symlink_path);
    }

    Ok(log_path)
}

pub fn init_stderr_logger() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .with_timer(LocalTimeFormatter)
        .with_ansi(false)
        .with_target(false)
        .with_level(true)
        .try_init();
}

pub fn format_command_for_display(command: &Command) -> String {
    let program = command.get_program().to_string_lossy();
    let args = command
        .get_args()
        .map(|arg| {
            let s = arg.to_string_lossy();
            if s.contains(char::is_whitespace) || s.is_empty() {
                format!("'{}'", s)
            } else {
                s.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ");
    format!("{} {}", program, args)
}

pub fn log_and_print_command(command: &Command) {
    let command_str = format_command_for_display(command);
    tracing::debug!("[CMD] {}", command_str);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_command_quotes_whitespace() {
        let mut cmd = Command::new("sbatch");
        cmd.arg("--job-name=gef_A").arg("my script.sh").arg("");
        assert_eq!(
            format_command_for_display(&cmd),
            "sbatch --job-name=gef_A 'my script.sh' ''"
        );
    }

    #[test]
    fn test_log_level_from_u8() {
        assert_eq!(LogLevel::from(0), LogLevel::Error);
        assert_eq!(LogLevel::from(3), LogLevel::Debug);
        assert_eq!(LogLevel::from(9), LogLevel::Trace);
    }
}

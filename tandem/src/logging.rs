// Logging for tandem
//
// Built on `tracing`. Every worker spawned by the scheduler and the pools is
// named, so thread-aware output shows which thread held leadership or
// executed a request. The macros below keep field names uniform across the
// scheduler, the reactor and the leader token.
//
// ```rust
// use tandem::logging::{self, LogConfig};
//
// logging::init(LogConfig {
//     target_filters: Some("tandem::leader_followers=trace".to_string()),
//     ..Default::default()
// });
// ```

use std::sync::Once;
use tracing::{Level, Subscriber};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: Level,
    /// One JSON object per event instead of console text
    pub json_format: bool,
    pub show_file_line: bool,
    pub show_thread_info: bool,
    pub show_time: bool,
    /// Extra directives, "target=level,target2=level2"
    pub target_filters: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_format: false,
            show_file_line: false,
            show_thread_info: true,
            show_time: true,
            target_filters: None,
        }
    }
}

static INIT: Once = Once::new();

fn build_filter(config: &LogConfig) -> EnvFilter {
    let mut env_filter = EnvFilter::from_default_env().add_directive(config.level.into());
    if let Some(filters) = &config.target_filters {
        for filter in filters.split(',') {
            match filter.trim().parse() {
                Ok(directive) => env_filter = env_filter.add_directive(directive),
                Err(err) => eprintln!("Ignoring log filter {:?}: {}", filter, err),
            }
        }
    }
    env_filter
}

/// Installs the global subscriber. Only the first call takes effect.
pub fn init(config: LogConfig) {
    INIT.call_once(|| {
        let registry = tracing_subscriber::registry().with(build_filter(&config));
        let ansi = atty::is(atty::Stream::Stdout);

        let subscriber: Box<dyn Subscriber + Send + Sync> = match (config.json_format, config.show_time) {
            (true, _) => Box::new(
                registry.with(
                    fmt::layer()
                        .json()
                        .flatten_event(true)
                        .with_thread_names(config.show_thread_info),
                ),
            ),
            (false, true) => Box::new(
                registry.with(
                    fmt::layer()
                        .with_ansi(ansi)
                        .with_file(config.show_file_line)
                        .with_line_number(config.show_file_line)
                        .with_thread_names(config.show_thread_info),
                ),
            ),
            (false, false) => Box::new(
                registry.with(
                    fmt::layer()
                        .without_time()
                        .with_ansi(ansi)
                        .with_file(config.show_file_line)
                        .with_line_number(config.show_file_line)
                        .with_thread_names(config.show_thread_info),
                ),
            ),
        };

        if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
            eprintln!("Error setting global tracing subscriber: {}", err);
        }
    });
}

/// Method request lifecycle (executed, parked, retried, failed, discarded)
///
/// ```rust
/// use tandem::log_request;
///
/// log_request!("GetWeight", "retried", backoff_ms = 10);
/// ```
#[macro_export]
macro_rules! log_request {
    ($request:expr, $status:expr) => {
        tracing::debug!(request = %$request, status = $status);
    };
    ($request:expr, $status:expr, $($fields:tt)*) => {
        tracing::debug!(request = %$request, status = $status, $($fields)*);
    };
}

/// Leadership transitions, at trace level.
#[macro_export]
macro_rules! log_leader {
    ($thread:expr, $event:expr) => {
        tracing::trace!(thread = %$thread, event = $event);
    };
    ($thread:expr, $event:expr, $($fields:tt)*) => {
        tracing::trace!(thread = %$thread, event = $event, $($fields)*);
    };
}

/// Reactor descriptor events (added, removed, ready)
#[macro_export]
macro_rules! log_reactor {
    ($fd:expr, $event:expr) => {
        tracing::debug!(fd = $fd, event = $event);
    };
    ($fd:expr, $event:expr, $($fields:tt)*) => {
        tracing::debug!(fd = $fd, event = $event, $($fields)*);
    };
}

/// Errors carry the error itself as the `error` field.
///
/// ```rust
/// use tandem::log_error;
///
/// let error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
/// log_error!(error, component = "reactor");
/// ```
#[macro_export]
macro_rules! log_error {
    ($error:expr) => {
        tracing::error!(error = %$error);
    };
    ($error:expr, $($fields:tt)*) => {
        tracing::error!(error = %$error, $($fields)*);
    };
}

/// Name of the current thread, for log fields.
pub(crate) fn thread_label() -> String {
    std::thread::current()
        .name()
        .map(str::to_string)
        .unwrap_or_else(|| format!("{:?}", std::thread::current().id()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init(LogConfig {
            level: Level::WARN,
            show_time: false,
            target_filters: Some("tandem=debug, not a directive=".to_string()),
            ..Default::default()
        });
        init(LogConfig::default());
        log_request!("Probe", "executed");
    }

    #[test]
    fn test_thread_label_uses_name() {
        let label = std::thread::Builder::new()
            .name("tandem-test".to_string())
            .spawn(thread_label)
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(label, "tandem-test");
    }
}

//! Tracing subscriber for the workspace
//!
//! Two sinks: a human-readable console and a daily-rolling JSON file that can
//! be attached to bug reports. `RUST_LOG` takes precedence over
//! [`LoggingConfig::filter`].

use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::paths;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

const LOG_FILE_PREFIX: &str = "pgdesk.log";

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub log_dir: PathBuf,
    pub console: bool,
    pub json_file: bool,
    /// Source file and line on console records
    pub source_location: bool,
    /// Emit span creation and close, which times tab switches and queries
    pub span_timing: bool,
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::development()
        } else {
            Self::production()
        }
    }
}

impl LoggingConfig {
    pub fn development() -> Self {
        Self {
            log_dir: paths::log_dir(),
            console: true,
            json_file: true,
            source_location: true,
            span_timing: true,
            filter: "info,pgdesk_connection=debug,pgdesk_query=debug,pgdesk_services=debug"
                .to_string(),
        }
    }

    pub fn production() -> Self {
        Self {
            log_dir: paths::log_dir(),
            console: false,
            json_file: true,
            source_location: false,
            span_timing: false,
            filter: "warn,pgdesk_services=info".to_string(),
        }
    }

    /// Console only, for test binaries
    pub fn testing() -> Self {
        Self {
            log_dir: std::env::temp_dir().join("pgdesk-tests"),
            console: true,
            json_file: false,
            source_location: true,
            span_timing: false,
            filter: "debug".to_string(),
        }
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.filter))
    }

    fn span_events(&self) -> FmtSpan {
        // NEW rather than ENTER: async spans are re-entered on every poll
        if self.span_timing {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }

    fn console_layer(&self) -> BoxedLayer {
        fmt::layer()
            .with_target(true)
            .with_file(self.source_location)
            .with_line_number(self.source_location)
            .with_span_events(self.span_events())
            .compact()
            .with_filter(self.env_filter())
            .boxed()
    }

    fn json_layer(&self) -> anyhow::Result<(BoxedLayer, WorkerGuard)> {
        std::fs::create_dir_all(&self.log_dir)?;
        let appender = tracing_appender::rolling::daily(&self.log_dir, LOG_FILE_PREFIX);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer()
            .json()
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_span_events(self.span_events())
            .with_current_span(true)
            .with_span_list(false)
            .with_ansi(false)
            .with_writer(writer)
            .with_filter(self.env_filter())
            .boxed();
        Ok((layer, guard))
    }
}

/// Install the global subscriber.
///
/// The returned guard flushes the JSON file on drop; hold it for the life of
/// the process. Fails if a subscriber is already installed.
pub fn init(config: &LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut guard = None;

    if config.console {
        layers.push(config.console_layer());
    }
    if config.json_file {
        let (layer, file_guard) = config.json_layer()?;
        layers.push(layer);
        guard = Some(file_guard);
    }

    tracing_subscriber::registry().with(layers).try_init()?;

    tracing::info!(
        log_dir = %config.log_dir.display(),
        console = config.console,
        json_file = config.json_file,
        "logging initialized"
    );
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn production_writes_files_only() {
        let config = LoggingConfig::production();
        assert!(config.json_file);
        assert!(!config.console);
        assert!(!config.span_timing);
    }

    #[test]
    fn testing_never_touches_disk() {
        let config = LoggingConfig::testing();
        assert!(!config.json_file);
        assert_eq!(config.filter, "debug");
    }

    #[test]
    fn span_events_follow_timing_flag() {
        let mut config = LoggingConfig::testing();
        assert_eq!(config.span_events(), FmtSpan::NONE);
        config.span_timing = true;
        assert_eq!(config.span_events(), FmtSpan::NEW | FmtSpan::CLOSE);
    }
}

use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INSTALLED: OnceCell<()> = OnceCell::new();

const DEFAULT_LOG_FILE: &str = "tinyfish.logs.jsonl";

/// Where log lines go. Stdout is never a sink: it carries the JSON result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogSink {
    Stderr,
    JsonFile { dir: PathBuf, file_name: String },
}

/// Logging choices for one `tinyfish` process, resolved before anything is
/// installed.
///
/// Read from:
/// - `TINYFISH_OBSERVABILITY_ENABLED`: `off`/`0`/`false` silences logging entirely.
/// - `TINYFISH_LOG_LEVEL`, then `RUST_LOG`: filter directives. Invalid
///   directives are skipped.
/// - `TINYFISH_JSON_LOG_PATH`: write JSON lines to this file instead of stderr.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    enabled: bool,
    filter: String,
    sink: LogSink,
}

impl LogSettings {
    pub fn from_env(verbose: bool) -> Self {
        Self::resolve(verbose, |key| std::env::var(key).ok())
    }

    fn resolve(verbose: bool, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let enabled = lookup("TINYFISH_OBSERVABILITY_ENABLED")
            .is_none_or(|raw| !is_off(&raw));
        let fallback = if verbose { "debug" } else { "warn" };
        let filter = ["TINYFISH_LOG_LEVEL", "RUST_LOG"]
            .into_iter()
            .filter_map(&lookup)
            .map(|raw| raw.trim().to_owned())
            .find(|raw| !raw.is_empty() && EnvFilter::try_new(raw).is_ok())
            .unwrap_or_else(|| fallback.to_owned());
        let sink = lookup("TINYFISH_JSON_LOG_PATH")
            .filter(|raw| !raw.trim().is_empty())
            .map_or(LogSink::Stderr, |raw| json_sink(Path::new(raw.trim())));
        Self {
            enabled,
            filter,
            sink,
        }
    }

    /// Installs the global subscriber. Later calls in the same process are
    /// no-ops.
    pub fn install(self) {
        INSTALLED.get_or_init(|| {
            if !self.enabled {
                return;
            }
            let filter = EnvFilter::new(&self.filter);
            match self.sink {
                LogSink::Stderr => {
                    let console = tracing_subscriber::fmt::layer()
                        .compact()
                        .with_target(false)
                        .with_writer(std::io::stderr);
                    let _ = tracing_subscriber::registry()
                        .with(filter)
                        .with(console)
                        .try_init();
                }
                LogSink::JsonFile { dir, file_name } => {
                    if let Err(err) = std::fs::create_dir_all(&dir) {
                        eprintln!("warning: cannot create log dir {}: {err}", dir.display());
                    }
                    let writer = tracing_appender::rolling::never(&dir, file_name);
                    let json = tracing_subscriber::fmt::layer()
                        .json()
                        .with_current_span(true)
                        .with_target(false)
                        .with_writer(writer);
                    let _ = tracing_subscriber::registry()
                        .with(filter)
                        .with(json)
                        .try_init();
                }
            }
        });
    }
}

fn is_off(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}

fn json_sink(path: &Path) -> LogSink {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(DEFAULT_LOG_FILE)
        .to_owned();
    LogSink::JsonFile { dir, file_name }
}

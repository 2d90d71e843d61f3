use crate::errors::ServeError;
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

/// Contextual logging facade. Every line carries the component context
/// (`local-server:channel`, ...) and optional JSON metadata.
#[derive(Debug, Clone)]
pub struct Logger {
    context: String,
}

impl Logger {
    pub fn new(context: &str) -> Self {
        Self {
            context: context.to_string(),
        }
    }

    pub fn child(&self, suffix: &str) -> Self {
        let context = if suffix.is_empty() {
            self.context.clone()
        } else {
            format!("{}:{}", self.context, suffix)
        };
        Self { context }
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    fn log(&self, level: LogLevel, message: &str, meta: Option<&serde_json::Value>) {
        let meta = meta
            .filter(|m| !m.is_null())
            .map(|m| m.to_string())
            .unwrap_or_default();
        let context = self.context.as_str();
        match level {
            LogLevel::Error => tracing::error!(context, meta = %meta, "{}", message),
            LogLevel::Warn => tracing::warn!(context, meta = %meta, "{}", message),
            LogLevel::Info => tracing::info!(context, meta = %meta, "{}", message),
            LogLevel::Debug => tracing::debug!(context, meta = %meta, "{}", message),
        }
    }

    pub fn error(&self, message: &str, meta: Option<&serde_json::Value>) {
        self.log(LogLevel::Error, message, meta);
    }

    pub fn warn(&self, message: &str, meta: Option<&serde_json::Value>) {
        self.log(LogLevel::Warn, message, meta);
    }

    pub fn info(&self, message: &str, meta: Option<&serde_json::Value>) {
        self.log(LogLevel::Info, message, meta);
    }

    pub fn debug(&self, message: &str, meta: Option<&serde_json::Value>) {
        self.log(LogLevel::Debug, message, meta);
    }
}

fn resolve_filter() -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let level = match std::env::var("LOG_LEVEL")
        .unwrap_or_else(|_| "info".to_string())
        .trim()
        .to_lowercase()
        .as_str()
    {
        "error" => "error",
        "warn" | "warning" => "warn",
        "debug" => "debug",
        "trace" => "trace",
        _ => "info",
    };
    EnvFilter::new(level)
}

fn json_requested() -> bool {
    std::env::var("LOG_FORMAT")
        .map(|v| v.trim().eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Installs the global subscriber: stderr output, plus an append-only mirror
/// when `LOG_FILE` is set.
pub fn init_tracing() -> Result<(), ServeError> {
    let json = json_requested();
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    layers.push(if json {
        stderr_layer.json().boxed()
    } else {
        stderr_layer.boxed()
    });

    if let Some(path) = std::env::var("LOG_FILE")
        .ok()
        .filter(|v| !v.trim().is_empty())
    {
        let path = std::path::PathBuf::from(path.trim());
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| ServeError::Filesystem {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| ServeError::Filesystem {
                path: path.clone(),
                source,
            })?;
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(file));
        layers.push(if json {
            file_layer.json().boxed()
        } else {
            file_layer.boxed()
        });
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(resolve_filter())
        .try_init()
        .map_err(|err| ServeError::Logging(err.to_string()))
}

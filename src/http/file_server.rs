use crate::constants::service::FILE_SERVER_NAME;
use crate::envelope::ResponseEnvelope;
use crate::errors::ServeError;
use crate::services::config::FileServerConfig;
use crate::services::logger::{init_tracing, Logger};
use crate::utils::time::local_iso_timestamp;
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Serialize;
use serde_json::ser::{CompactFormatter, Formatter, PrettyFormatter};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

/// Wire formatting of every response body and the advertised `Server`
/// header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// Pretty-printed JSON, `Server: Python/HTTP-Server`.
    Unix,
    /// Compact JSON with CRLF line endings, `Server: Microsoft-IIS/10.0`.
    Windows,
}

impl ResponseMode {
    pub fn from_windows_flag(windows: bool) -> Self {
        if windows {
            ResponseMode::Windows
        } else {
            ResponseMode::Unix
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ResponseMode::Unix => "Unix",
            ResponseMode::Windows => "Windows",
        }
    }

    pub fn server_header(self) -> &'static str {
        match self {
            ResponseMode::Unix => "Python/HTTP-Server",
            ResponseMode::Windows => "Microsoft-IIS/10.0",
        }
    }

    /// Serializes `body` with non-ASCII characters written as `\uXXXX`
    /// escapes.
    pub fn render(self, body: &impl Serialize) -> String {
        let rendered = match self {
            ResponseMode::Unix => to_ascii_json(body, PrettyFormatter::with_indent(b"  ")),
            ResponseMode::Windows => to_ascii_json(body, CompactFormatter),
        };
        // Only envelopes and json! maps come through here.
        let text = rendered.unwrap_or_else(|err| {
            format!(
                r#"{{"status":"error","data":"","msg":"failed to render response: {}"}}"#,
                err
            )
        });
        match self {
            ResponseMode::Unix => text,
            ResponseMode::Windows => text.replace('\n', "\r\n"),
        }
    }

    fn respond(self, status: StatusCode, body: &impl Serialize) -> Response {
        (
            status,
            [
                (header::CONTENT_TYPE, HeaderValue::from_static("application/json")),
                (header::SERVER, HeaderValue::from_static(self.server_header())),
            ],
            self.render(body),
        )
            .into_response()
    }
}

fn to_ascii_json<F: Formatter>(body: &impl Serialize, formatter: F) -> serde_json::Result<String> {
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, AsciiEscaped(formatter));
    body.serialize(&mut serializer)?;
    Ok(String::from_utf8_lossy(&out).into_owned())
}

/// Wraps a formatter and escapes every non-ASCII character in strings as
/// UTF-16 `\uXXXX` units.
struct AsciiEscaped<F>(F);

impl<F: Formatter> Formatter for AsciiEscaped<F> {
    fn write_string_fragment<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        fragment: &str,
    ) -> io::Result<()> {
        let mut start = 0;
        for (idx, ch) in fragment.char_indices() {
            if ch.is_ascii() {
                continue;
            }
            writer.write_all(fragment[start..idx].as_bytes())?;
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units).iter() {
                write!(writer, "\\u{:04x}", unit)?;
            }
            start = idx + ch.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }

    fn begin_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.begin_array(writer)
    }

    fn end_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.end_array(writer)
    }

    fn begin_array_value<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        self.0.begin_array_value(writer, first)
    }

    fn end_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.end_array_value(writer)
    }

    fn begin_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.begin_object(writer)
    }

    fn end_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.end_object(writer)
    }

    fn begin_object_key<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        self.0.begin_object_key(writer, first)
    }

    fn end_object_key<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.end_object_key(writer)
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.begin_object_value(writer)
    }

    fn end_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.end_object_value(writer)
    }
}

#[derive(Clone)]
struct FileServerState {
    logger: Logger,
    files_directory: Arc<PathBuf>,
    mode: ResponseMode,
}

pub fn router(logger: Logger, files_directory: PathBuf, mode: ResponseMode) -> Router {
    let state = FileServerState {
        logger: logger.child("files"),
        files_directory: Arc::new(files_directory),
        mode,
    };
    Router::new()
        .route("/file/", get(serve_unnamed))
        .route("/file/{*name}", get(serve_file))
        .route("/health", get(health))
        .fallback(invalid_endpoint)
        .with_state(state)
}

/// Maps a requested name onto the served directory using only the text after
/// its last `/`, so `../` and nested paths cannot leave the directory. A name
/// ending in `/`, `.` or `..` names no file.
pub fn resolve_file_path(files_directory: &std::path::Path, name: &str) -> Option<PathBuf> {
    match name.rsplit('/').next().unwrap_or_default() {
        "" | "." | ".." => None,
        base => Some(files_directory.join(base)),
    }
}

async fn serve_file(State(state): State<FileServerState>, Path(name): Path<String>) -> Response {
    respond_with_file(&state, name).await
}

async fn serve_unnamed(State(state): State<FileServerState>) -> Response {
    respond_with_file(&state, String::new()).await
}

async fn respond_with_file(state: &FileServerState, name: String) -> Response {
    let envelope = match read_file(&state.files_directory, &name).await {
        Some(content) => ResponseEnvelope::success(content),
        None => {
            state.logger.warn(
                "File not served",
                Some(&serde_json::json!({"filename": name})),
            );
            ResponseEnvelope::error(format!("there was an error retrieving {}", name))
        }
    };
    state.mode.respond(StatusCode::OK, &envelope)
}

async fn read_file(files_directory: &std::path::Path, name: &str) -> Option<String> {
    let path = resolve_file_path(files_directory, name)?;
    let metadata = tokio::fs::metadata(&path).await.ok()?;
    if !metadata.is_file() {
        return None;
    }
    let bytes = tokio::fs::read(&path).await.ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

async fn health(State(state): State<FileServerState>) -> Response {
    state.mode.respond(
        StatusCode::OK,
        &serde_json::json!({
            "status": "healthy",
            "service": FILE_SERVER_NAME,
            "timestamp": local_iso_timestamp(),
            "mode": state.mode.label(),
        }),
    )
}

async fn invalid_endpoint(State(state): State<FileServerState>) -> Response {
    state.mode.respond(
        StatusCode::NOT_FOUND,
        &ResponseEnvelope::error("Invalid endpoint"),
    )
}

/// Entry point of the `file-server` binary.
pub async fn run() -> Result<(), ServeError> {
    init_tracing()?;
    let logger = Logger::new(FILE_SERVER_NAME);
    let config = FileServerConfig::from_env()?;

    tokio::fs::create_dir_all(&config.files_directory)
        .await
        .map_err(|source| ServeError::Filesystem {
            path: config.files_directory.clone(),
            source,
        })?;

    let mode = ResponseMode::from_windows_flag(config.windows_mode);
    logger.info(
        &format!("Server starting on {}", config.server.address()),
        Some(&serde_json::json!({
            "files_directory": config.files_directory.display().to_string(),
            "mode": mode.label(),
        })),
    );

    let app = router(logger.clone(), config.files_directory.clone(), mode);
    super::serve(&config.server, app, &logger).await
}

#[cfg(test)]
mod tests {
    use super::{resolve_file_path, ResponseMode};
    use crate::envelope::ResponseEnvelope;
    use std::path::{Path, PathBuf};

    #[test]
    fn unix_mode_pretty_prints() {
        let text = ResponseMode::Unix.render(&ResponseEnvelope::success("hi"));
        assert_eq!(
            text,
            "{\n  \"status\": \"success\",\n  \"data\": \"hi\",\n  \"msg\": \"data returned\"\n}"
        );
    }

    #[test]
    fn windows_mode_is_compact() {
        let text = ResponseMode::Windows.render(&ResponseEnvelope::success("line1\nline2"));
        assert_eq!(
            text,
            r#"{"status":"success","data":"line1\nline2","msg":"data returned"}"#
        );
        assert!(!text.contains('\r'));
    }

    #[test]
    fn headers_follow_mode() {
        assert_eq!(ResponseMode::from_windows_flag(true).server_header(), "Microsoft-IIS/10.0");
        assert_eq!(ResponseMode::from_windows_flag(false).server_header(), "Python/HTTP-Server");
        assert_eq!(ResponseMode::Windows.label(), "Windows");
    }

    #[test]
    fn resolve_keeps_only_the_base_name() {
        let dir = Path::new("/srv/files");
        assert_eq!(
            resolve_file_path(dir, "report.txt"),
            Some(PathBuf::from("/srv/files/report.txt"))
        );
        assert_eq!(
            resolve_file_path(dir, "../../etc/passwd"),
            Some(PathBuf::from("/srv/files/passwd"))
        );
        assert_eq!(resolve_file_path(dir, ".."), None);
        assert_eq!(resolve_file_path(dir, ""), None);
        assert_eq!(resolve_file_path(dir, "report.txt/"), None);
        assert_eq!(resolve_file_path(dir, "report.txt/."), None);
        assert_eq!(resolve_file_path(dir, "a/.."), None);
        assert_eq!(
            resolve_file_path(dir, "a\\b.txt"),
            Some(PathBuf::from("/srv/files/a\\b.txt"))
        );
    }

    #[test]
    fn non_ascii_is_escaped_in_both_modes() {
        let envelope = ResponseEnvelope::success("caf\u{e9} \u{2713} \u{1F600}");
        assert_eq!(
            ResponseMode::Windows.render(&envelope),
            r#"{"status":"success","data":"caf\u00e9 \u2713 \ud83d\ude00","msg":"data returned"}"#
        );
        let text = ResponseMode::Unix.render(&envelope);
        assert!(text.contains(r#""data": "caf\u00e9 \u2713 \ud83d\ude00""#), "{}", text);
        assert!(text.is_ascii());
    }

    #[test]
    fn nested_values_keep_their_layout() {
        let body = serde_json::json!({"a": [1, "\u{e9}"], "b": {}});
        assert_eq!(ResponseMode::Windows.render(&body), r#"{"a":[1,"\u00e9"],"b":{}}"#);
        assert_eq!(
            ResponseMode::Unix.render(&body),
            "{\n  \"a\": [\n    1,\n    \"\\u00e9\"\n  ],\n  \"b\": {}\n}"
        );
    }
}

use crate::constants::{limits, network as network_constants};
use crate::errors::ChannelError;
use crate::managers::channel::{CommandResult, RemoteChannel};
use crate::services::config::ChannelConfig;
use crate::services::logger::Logger;
use crate::utils::shell::build_remote_command;
use crate::utils::text::{decode_output, truncate_utf8_prefix};
use ssh2::{Channel, ErrorCode, Session, Stream};
use std::io::{ErrorKind, Read};
use std::net::{TcpStream, ToSocketAddrs};
use std::ops::Deref;
use std::sync::Arc;
use std::time::{Duration, Instant};

const LIBSSH2_ERROR_TIMEOUT: i32 = -9;
const LIBSSH2_ERROR_AUTHENTICATION_FAILED: i32 = -18;
const LIBSSH2_ERROR_PUBLICKEY_UNVERIFIED: i32 = -19;
const LIBSSH2_ERROR_SOCKET_TIMEOUT: i32 = -30;

/// Remote command channel over SSH. Every `execute` opens a fresh session
/// and tears it down before returning.
#[derive(Clone)]
pub struct SshChannel {
    logger: Logger,
    config: Arc<ChannelConfig>,
}

impl SshChannel {
    pub fn new(logger: Logger, config: Arc<ChannelConfig>) -> Self {
        Self {
            logger: logger.child("channel"),
            config,
        }
    }

    pub fn command_for(&self, filename: &str) -> String {
        build_remote_command(&self.config.remote_script, filename)
    }
}

#[async_trait::async_trait]
impl RemoteChannel for SshChannel {
    async fn execute(&self, filename: &str) -> Result<CommandResult, ChannelError> {
        let command = self.command_for(filename);
        let config = self.config.clone();
        let logger = self.logger.clone();
        tokio::task::spawn_blocking(move || exec_blocking(&config, &logger, &command))
            .await
            .map_err(|err| ChannelError::Communication(format!("SSH exec task failed: {}", err)))?
    }
}

/// Owns a handshaken session and disconnects it when dropped, whichever way
/// the invocation ends.
struct SessionGuard {
    session: Session,
}

impl Deref for SessionGuard {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.session
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.session.set_blocking(true);
        let _ = self.session.disconnect(None, "request complete", None);
    }
}

fn exec_blocking(
    config: &ChannelConfig,
    logger: &Logger,
    command: &str,
) -> Result<CommandResult, ChannelError> {
    logger.info(
        "Attempting SSH connection",
        Some(&serde_json::json!({"host": config.host, "port": config.port})),
    );
    let session = connect_session(config, logger)?;
    logger.info("SSH connection established successfully", None);

    logger.info(
        "Executing command",
        Some(&serde_json::json!({"command": command})),
    );
    let result = run_command(&session, command, config, logger)?;
    logger.info(
        "Command finished",
        Some(&serde_json::json!({
            "exit_code": result.exit_code,
            "duration_ms": result.duration_ms,
            "stdout": truncate_utf8_prefix(&result.stdout, limits::LOG_OUTPUT_BYTES),
            "stderr": truncate_utf8_prefix(&result.stderr, limits::LOG_OUTPUT_BYTES),
        })),
    );
    Ok(result)
}

fn connect_session(config: &ChannelConfig, logger: &Logger) -> Result<SessionGuard, ChannelError> {
    let tcp = open_tcp(&config.host, config.port, config.connect_timeout)?;

    let mut session = Session::new()
        .map_err(|err| ChannelError::Transport(format!("failed to create SSH session: {}", err)))?;
    session.set_timeout(timeout_ms(config.connect_timeout));
    session.set_tcp_stream(tcp);
    session.handshake().map_err(map_ssh_error)?;
    let session = SessionGuard { session };

    let check = config
        .host_key_policy
        .verify(&session, &config.host, config.port)?;
    if let Some(err) = &check.record_error {
        logger.warn(
            "Could not record host key",
            Some(&serde_json::json!({
                "host": config.host,
                "port": config.port,
                "fingerprint": check.fingerprint,
                "error": err,
            })),
        );
    }
    if check.recorded {
        logger.warn(
            "Recorded previously unseen host key",
            Some(&serde_json::json!({
                "host": config.host,
                "port": config.port,
                "fingerprint": check.fingerprint,
            })),
        );
    } else {
        logger.debug(
            "Host key accepted",
            Some(&serde_json::json!({
                "policy": config.host_key_policy.label(),
                "fingerprint": check.fingerprint,
            })),
        );
    }

    authenticate(&session, config)?;
    Ok(session)
}

fn authenticate(session: &Session, config: &ChannelConfig) -> Result<(), ChannelError> {
    if !config.private_key_path.is_file() {
        return Err(ChannelError::Communication(format!(
            "SSH private key not found: {}",
            config.private_key_path.display()
        )));
    }
    session
        .userauth_pubkey_file(
            &config.username,
            None,
            &config.private_key_path,
            config.passphrase.as_deref(),
        )
        .map_err(map_ssh_error)?;
    if !session.authenticated() {
        return Err(ChannelError::Authentication(
            "Authentication failed.".to_string(),
        ));
    }
    Ok(())
}

fn open_tcp(host: &str, port: u16, timeout: Duration) -> Result<TcpStream, ChannelError> {
    let addrs = (host, port).to_socket_addrs().map_err(|err| {
        ChannelError::Communication(format!("Failed to resolve {}:{}: {}", host, port, err))
    })?;
    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(err) => last_err = Some(err),
        }
    }
    Err(ChannelError::Communication(match last_err {
        Some(err) => format!("Failed to connect to {}:{}: {}", host, port, err),
        None => format!("No addresses resolved for {}:{}", host, port),
    }))
}

/// What the output loop needs from a running exec channel.
trait CommandStreams {
    fn read_stdout(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;
    fn read_stderr(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;
    fn eof(&self) -> bool;
    fn close(&mut self);
}

struct ExecStreams {
    channel: Channel,
    stderr: Stream,
}

impl CommandStreams for ExecStreams {
    fn read_stdout(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.channel.read(buf)
    }

    fn read_stderr(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.stderr.read(buf)
    }

    fn eof(&self) -> bool {
        self.channel.eof()
    }

    fn close(&mut self) {
        let _ = self.channel.close();
    }
}

/// Bounded capture of one output stream. Bytes past `limit` are counted and
/// dropped.
#[derive(Debug)]
struct Capture {
    bytes: Vec<u8>,
    total: usize,
    limit: usize,
}

impl Capture {
    fn new(limit: usize) -> Self {
        Self {
            bytes: Vec::new(),
            total: 0,
            limit,
        }
    }

    fn push(&mut self, chunk: &[u8]) {
        self.total = self.total.saturating_add(chunk.len());
        if self.bytes.len() < self.limit {
            let remaining = self.limit - self.bytes.len();
            self.bytes
                .extend_from_slice(&chunk[..chunk.len().min(remaining)]);
        }
    }

    fn truncated(&self) -> bool {
        self.total > self.bytes.len()
    }
}

/// Drains stdout and stderr until the remote side signals EOF and nothing is
/// left to read, or until `timeout` elapses.
fn pump_output(
    streams: &mut impl CommandStreams,
    timeout: Duration,
    max_capture: usize,
) -> Result<(Capture, Capture), ChannelError> {
    let mut stdout = Capture::new(max_capture);
    let mut stderr = Capture::new(max_capture);
    let mut buf = [0u8; limits::READ_CHUNK_BYTES];
    let started = Instant::now();

    loop {
        let read = streams.read_stdout(&mut buf);
        let mut progressed = take_chunk(read, &buf, &mut stdout, "stdout")?;
        let read = streams.read_stderr(&mut buf);
        progressed |= take_chunk(read, &buf, &mut stderr, "stderr")?;

        if !progressed && streams.eof() {
            return Ok((stdout, stderr));
        }
        if started.elapsed() > timeout {
            streams.close();
            return Err(ChannelError::Communication(format!(
                "Remote command timed out after {} seconds",
                timeout.as_secs()
            )));
        }
        if !progressed {
            std::thread::sleep(Duration::from_millis(network_constants::POLL_INTERVAL_MS));
        }
    }
}

fn take_chunk(
    read: std::io::Result<usize>,
    buf: &[u8],
    sink: &mut Capture,
    label: &str,
) -> Result<bool, ChannelError> {
    match read {
        Ok(n) if n > 0 => {
            sink.push(&buf[..n]);
            Ok(true)
        }
        Ok(_) => Ok(false),
        Err(err) if err.kind() == ErrorKind::WouldBlock => Ok(false),
        Err(err) => Err(ChannelError::Communication(format!(
            "SSH {} read failed: {}",
            label, err
        ))),
    }
}

/// libssh2 reports 0 when no exit status arrived, so a channel that did not
/// close cleanly or was ended by a signal is reported as -1.
fn resolve_exit_code(closed: bool, signal: Option<&str>, status: i32) -> i32 {
    if !closed || signal.is_some() {
        -1
    } else {
        status
    }
}

fn run_command(
    session: &Session,
    command: &str,
    config: &ChannelConfig,
    logger: &Logger,
) -> Result<CommandResult, ChannelError> {
    let timeout = config.command_timeout;
    session.set_timeout(timeout_ms(timeout));
    let mut channel = session.channel_session().map_err(map_ssh_error)?;
    channel.exec(command).map_err(map_ssh_error)?;
    session.set_blocking(false);

    let started = Instant::now();
    let stderr = channel.stderr();
    let mut streams = ExecStreams { channel, stderr };
    let (stdout, stderr) = pump_output(&mut streams, timeout, config.max_capture_bytes)?;
    let mut channel = streams.channel;

    session.set_blocking(true);
    session.set_timeout(timeout_ms(
        timeout
            .saturating_sub(started.elapsed())
            .max(Duration::from_millis(network_constants::TIMEOUT_CHANNEL_CLOSE_GRACE_MS)),
    ));
    let closed = channel.wait_close().is_ok();
    let signal = channel.exit_signal().ok().and_then(|sig| sig.exit_signal);
    let status = channel.exit_status().unwrap_or(-1);
    let exit_code = resolve_exit_code(closed, signal.as_deref(), status);

    if exit_code != status {
        logger.warn(
            "Remote command ended without an exit status",
            Some(&serde_json::json!({
                "closed": closed,
                "signal": signal,
                "reported_status": status,
            })),
        );
    }
    for (label, capture) in [("stdout", &stdout), ("stderr", &stderr)] {
        if capture.truncated() {
            logger.warn(
                "Remote output exceeded capture limit",
                Some(&serde_json::json!({
                    "stream": label,
                    "total_bytes": capture.total,
                    "captured_bytes": capture.bytes.len(),
                })),
            );
        }
    }

    Ok(CommandResult {
        exit_code,
        stdout: decode_output(&stdout.bytes),
        stderr: decode_output(&stderr.bytes),
        duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    })
}

fn timeout_ms(timeout: Duration) -> u32 {
    u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX)
}

fn map_ssh_error(err: ssh2::Error) -> ChannelError {
    let message = if err.message().is_empty() {
        err.to_string()
    } else {
        err.message().to_string()
    };
    match err.code() {
        ErrorCode::Session(LIBSSH2_ERROR_TIMEOUT | LIBSSH2_ERROR_SOCKET_TIMEOUT) => {
            ChannelError::Communication(format!("SSH operation timed out: {}", message))
        }
        ErrorCode::Session(
            LIBSSH2_ERROR_AUTHENTICATION_FAILED | LIBSSH2_ERROR_PUBLICKEY_UNVERIFIED,
        ) => ChannelError::Authentication(message),
        _ => ChannelError::Transport(message),
    }
}

use crate::constants::{files, legacy, limits, network};
use crate::errors::ConfigError;
use crate::services::host_keys::HostKeyPolicy;
use crate::utils::user_paths::expand_home_path;
use std::path::PathBuf;
use std::time::Duration;

/// Everything the remote command channel needs, fixed at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub private_key_path: PathBuf,
    pub passphrase: Option<String>,
    pub remote_script: String,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
    pub max_capture_bytes: usize,
    pub host_key_policy: HostKeyPolicy,
}

impl ChannelConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let home = lookup("HOME");
        let known_hosts = read_string(&lookup, "KNOWN_HOSTS_PATH")
            .map(|raw| expand_home_path(&raw, home.as_deref()));
        let host_key_policy = HostKeyPolicy::from_parts(
            read_string(&lookup, "HOST_KEY_POLICY").as_deref(),
            read_string(&lookup, "HOST_KEY_FINGERPRINT").as_deref(),
            known_hosts,
        )?;
        let key_path = read_string(&lookup, "SSH_KEY_PATH")
            .unwrap_or_else(|| legacy::DEFAULT_KEY_PATH.to_string());

        Ok(Self {
            host: read_string(&lookup, "LEGACY_HOST")
                .unwrap_or_else(|| legacy::DEFAULT_HOST.to_string()),
            port: read_port(&lookup, "LEGACY_PORT", network::SSH_DEFAULT_PORT)?,
            username: read_string(&lookup, "LEGACY_USER")
                .unwrap_or_else(|| legacy::DEFAULT_USER.to_string()),
            private_key_path: expand_home_path(&key_path, home.as_deref()),
            passphrase: lookup("SSH_KEY_PASSPHRASE").filter(|v| !v.is_empty()),
            remote_script: read_string(&lookup, "LEGACY_SCRIPT")
                .unwrap_or_else(|| legacy::DEFAULT_SCRIPT.to_string()),
            connect_timeout: read_secs(
                &lookup,
                "CONNECT_TIMEOUT",
                network::TIMEOUT_SSH_CONNECT_SECS,
            )?,
            command_timeout: read_secs(&lookup, "JOB_TIMEOUT", network::TIMEOUT_JOB_SECS)?,
            max_capture_bytes: read_bytes(
                &lookup,
                "MAX_CAPTURE_BYTES",
                limits::MAX_CAPTURE_BYTES,
            )?,
            host_key_policy,
        })
    }

    /// Config summary for the startup log; never includes the passphrase.
    pub fn describe(&self) -> serde_json::Value {
        serde_json::json!({
            "hostname": self.host,
            "port": self.port,
            "username": self.username,
            "key_filename": self.private_key_path.display().to_string(),
            "script": self.remote_script,
            "connect_timeout_secs": self.connect_timeout.as_secs(),
            "command_timeout_secs": self.command_timeout.as_secs(),
            "max_capture_bytes": self.max_capture_bytes,
            "host_key_policy": self.host_key_policy.label(),
        })
    }
}

/// Listen address of an HTTP service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        default_port: u16,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            host: read_string(&lookup, "HOST")
                .unwrap_or_else(|| network::DEFAULT_BIND_HOST.to_string()),
            port: read_port(&lookup, "PORT", default_port)?,
        })
    }

    pub fn proxy_from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok(), network::PROXY_DEFAULT_PORT)
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileServerConfig {
    pub server: ServerConfig,
    pub files_directory: PathBuf,
    pub windows_mode: bool,
}

impl FileServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            server: ServerConfig::from_lookup(&lookup, network::FILE_SERVER_DEFAULT_PORT)?,
            files_directory: PathBuf::from(
                read_string(&lookup, "FILES_DIRECTORY")
                    .unwrap_or_else(|| files::DEFAULT_DIRECTORY.to_string()),
            ),
            windows_mode: lookup("WINDOWS_MODE")
                .map(|v| v.trim().eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        })
    }
}

fn read_string(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn read_port(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    fallback: u16,
) -> Result<u16, ConfigError> {
    let Some(raw) = read_string(lookup, name) else {
        return Ok(fallback);
    };
    match raw.parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(ConfigError::InvalidPort { name, value: raw }),
    }
}

fn read_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    fallback: u64,
) -> Result<Duration, ConfigError> {
    let Some(raw) = read_string(lookup, name) else {
        return Ok(Duration::from_secs(fallback));
    };
    match raw.parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::InvalidNumber { name, value: raw }),
    }
}

fn read_bytes(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    fallback: usize,
) -> Result<usize, ConfigError> {
    let Some(raw) = read_string(lookup, name) else {
        return Ok(fallback);
    };
    match raw.parse::<usize>() {
        Ok(bytes) if bytes > 0 => Ok(bytes),
        _ => Err(ConfigError::InvalidNumber { name, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::{ChannelConfig, FileServerConfig, ServerConfig};
    use crate::errors::ConfigError;
    use crate::services::host_keys::HostKeyPolicy;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::time::Duration;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn channel_defaults_match_legacy_deployment() {
        let config = ChannelConfig::from_lookup(lookup_from(&[])).expect("config");
        assert_eq!(config.host, "remote-server-1");
        assert_eq!(config.port, 22);
        assert_eq!(config.username, "legacy");
        assert_eq!(config.private_key_path, PathBuf::from("/app/ssh_keys/id_rsa"));
        assert_eq!(config.remote_script, "/home/legacy/proxy_request.sh");
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.command_timeout, Duration::from_secs(60));
        assert_eq!(config.passphrase, None);
        assert_eq!(config.max_capture_bytes, 8 * 1024 * 1024);
        assert_eq!(
            config.host_key_policy,
            HostKeyPolicy::AutoTrust { known_hosts: None }
        );
    }

    #[test]
    fn channel_reads_overrides_and_expands_home() {
        let config = ChannelConfig::from_lookup(lookup_from(&[
            ("HOME", "/home/ops"),
            ("LEGACY_HOST", " legacy.internal "),
            ("LEGACY_PORT", "2222"),
            ("LEGACY_USER", "svc"),
            ("SSH_KEY_PATH", "~/.ssh/id_ed25519"),
            ("JOB_TIMEOUT", "5"),
            ("MAX_CAPTURE_BYTES", "65536"),
            ("KNOWN_HOSTS_PATH", "~/.ssh/known_hosts"),
        ]))
        .expect("config");
        assert_eq!(config.host, "legacy.internal");
        assert_eq!(config.port, 2222);
        assert_eq!(config.username, "svc");
        assert_eq!(
            config.private_key_path,
            PathBuf::from("/home/ops/.ssh/id_ed25519")
        );
        assert_eq!(config.command_timeout, Duration::from_secs(5));
        assert_eq!(config.max_capture_bytes, 65536);
        assert_eq!(
            config.host_key_policy,
            HostKeyPolicy::AutoTrust {
                known_hosts: Some(PathBuf::from("/home/ops/.ssh/known_hosts"))
            }
        );
    }

    #[test]
    fn invalid_numbers_name_the_variable() {
        let err = ChannelConfig::from_lookup(lookup_from(&[("JOB_TIMEOUT", "soon")]))
            .expect_err("invalid timeout");
        assert_eq!(
            err,
            ConfigError::InvalidNumber {
                name: "JOB_TIMEOUT",
                value: "soon".to_string()
            }
        );
        let err = ChannelConfig::from_lookup(lookup_from(&[("LEGACY_PORT", "0")]))
            .expect_err("invalid port");
        assert!(err.to_string().contains("LEGACY_PORT"));
    }

    #[test]
    fn describe_omits_passphrase() {
        let config = ChannelConfig::from_lookup(lookup_from(&[("SSH_KEY_PASSPHRASE", "hunter2")]))
            .expect("config");
        assert_eq!(config.passphrase.as_deref(), Some("hunter2"));
        assert!(!config.describe().to_string().contains("hunter2"));
    }

    #[test]
    fn server_uses_given_default_port() {
        let config = ServerConfig::from_lookup(lookup_from(&[]), 5000).expect("config");
        assert_eq!(config.address(), "0.0.0.0:5000");
        let config =
            ServerConfig::from_lookup(lookup_from(&[("PORT", "6000"), ("HOST", "127.0.0.1")]), 5000)
                .expect("config");
        assert_eq!(config.address(), "127.0.0.1:6000");
    }

    #[test]
    fn file_server_windows_mode_is_case_insensitive() {
        let config = FileServerConfig::from_lookup(lookup_from(&[("WINDOWS_MODE", "TRUE")]))
            .expect("config");
        assert!(config.windows_mode);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.files_directory, PathBuf::from("/app/files"));
        let config = FileServerConfig::from_lookup(lookup_from(&[("WINDOWS_MODE", "yes")]))
            .expect("config");
        assert!(!config.windows_mode);
    }
}

use crate::constants::network::SSH_DEFAULT_PORT;
use crate::errors::{ChannelError, ConfigError};
use base64::Engine;
use ssh2::{CheckResult, KnownHostFileKind, KnownHostKeyFormat, KnownHosts, Session};
use std::path::{Path, PathBuf};

/// How the proxy decides whether the remote endpoint is who it claims to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostKeyPolicy {
    /// Accept any host key. When a known_hosts path is given, keys seen for
    /// the first time are appended there; changed keys are still accepted.
    AutoTrust { known_hosts: Option<PathBuf> },
    /// The SHA256 fingerprint of the host key must equal this value
    /// (`SHA256:<base64 without padding>`).
    Pinned { fingerprint: String },
    /// The host key must match an entry of an OpenSSH known_hosts file.
    KnownHosts { path: PathBuf },
}

/// What the policy observed during a successful check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostKeyCheck {
    pub fingerprint: Option<String>,
    pub recorded: bool,
    /// Why a first-seen key could not be written to known_hosts. The key is
    /// still accepted.
    pub record_error: Option<String>,
}

impl HostKeyPolicy {
    /// Builds a policy from the raw `HOST_KEY_POLICY` value plus the optional
    /// fingerprint and known_hosts path. An unset policy means `pin` when a
    /// fingerprint is configured and `auto` otherwise.
    pub fn from_parts(
        policy: Option<&str>,
        fingerprint: Option<&str>,
        known_hosts: Option<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let fingerprint = fingerprint.and_then(normalize_fingerprint_sha256);
        let normalized = policy
            .map(|v| v.trim().to_lowercase())
            .filter(|v| !v.is_empty());
        let normalized = match normalized {
            Some(value) => value,
            None if fingerprint.is_some() => "pin".to_string(),
            None => "auto".to_string(),
        };
        match normalized.as_str() {
            "auto" | "accept" | "tofu" => Ok(HostKeyPolicy::AutoTrust { known_hosts }),
            "pin" | "pinned" => fingerprint
                .map(|fingerprint| HostKeyPolicy::Pinned { fingerprint })
                .ok_or(ConfigError::MissingFingerprint),
            "known_hosts" | "strict" => known_hosts
                .map(|path| HostKeyPolicy::KnownHosts { path })
                .ok_or(ConfigError::MissingKnownHosts),
            other => Err(ConfigError::UnknownHostKeyPolicy(other.to_string())),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            HostKeyPolicy::AutoTrust { .. } => "auto",
            HostKeyPolicy::Pinned { .. } => "pin",
            HostKeyPolicy::KnownHosts { .. } => "known_hosts",
        }
    }

    /// Runs the policy against a session that has completed its handshake.
    pub fn verify(
        &self,
        session: &Session,
        host: &str,
        port: u16,
    ) -> Result<HostKeyCheck, ChannelError> {
        let observed = fingerprint_host_key_sha256(session);
        match self {
            HostKeyPolicy::AutoTrust { known_hosts } => {
                let (recorded, record_error) = match known_hosts {
                    Some(path) => match record_if_unseen(session, path, host, port) {
                        Ok(recorded) => (recorded, None),
                        Err(err) => (false, Some(err)),
                    },
                    None => (false, None),
                };
                Ok(HostKeyCheck {
                    fingerprint: observed,
                    recorded,
                    record_error,
                })
            }
            HostKeyPolicy::Pinned { fingerprint } => {
                if observed.as_deref() != Some(fingerprint.as_str()) {
                    return Err(ChannelError::Transport(format!(
                        "host key mismatch for {} (expected {}, got {})",
                        host,
                        fingerprint,
                        observed.unwrap_or_else(|| "unknown".to_string())
                    )));
                }
                Ok(HostKeyCheck {
                    fingerprint: observed,
                    recorded: false,
                    record_error: None,
                })
            }
            HostKeyPolicy::KnownHosts { path } => {
                check_known_hosts(session, path, host, port)?;
                Ok(HostKeyCheck {
                    fingerprint: observed,
                    recorded: false,
                    record_error: None,
                })
            }
        }
    }
}

pub fn normalize_fingerprint_sha256(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let cleaned = trimmed.trim_end_matches('=');
    let body = match cleaned.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("sha256:") => cleaned[7..].trim(),
        _ => cleaned,
    };
    if body.is_empty() {
        return None;
    }
    Some(format!("SHA256:{}", body))
}

pub fn fingerprint_host_key_sha256(session: &Session) -> Option<String> {
    let hash = session.host_key_hash(ssh2::HashType::Sha256)?;
    let encoded = base64::engine::general_purpose::STANDARD_NO_PAD.encode(hash);
    Some(format!("SHA256:{}", encoded))
}

/// known_hosts host field; non-default ports use the `[host]:port` form.
pub fn known_hosts_entry_name(host: &str, port: u16) -> String {
    if port == SSH_DEFAULT_PORT {
        host.to_string()
    } else {
        format!("[{}]:{}", host, port)
    }
}

fn check_known_hosts(
    session: &Session,
    path: &Path,
    host: &str,
    port: u16,
) -> Result<(), ChannelError> {
    let (key, _) = session
        .host_key()
        .ok_or_else(|| ChannelError::Transport("remote host presented no host key".to_string()))?;
    let mut known_hosts = session
        .known_hosts()
        .map_err(|err| ChannelError::Transport(format!("known_hosts unavailable: {}", err)))?;
    known_hosts
        .read_file(path, KnownHostFileKind::OpenSSH)
        .map_err(|err| {
            ChannelError::Transport(format!(
                "failed to read known_hosts {}: {}",
                path.display(),
                err
            ))
        })?;
    match known_hosts.check_port(host, port, key) {
        CheckResult::Match => Ok(()),
        CheckResult::Mismatch => Err(ChannelError::Transport(format!(
            "host key for {} does not match {}",
            known_hosts_entry_name(host, port),
            path.display()
        ))),
        CheckResult::NotFound => Err(ChannelError::Transport(format!(
            "host {} is not listed in {}",
            known_hosts_entry_name(host, port),
            path.display()
        ))),
        CheckResult::Failure => Err(ChannelError::Transport(format!(
            "host key check against {} failed",
            path.display()
        ))),
    }
}

fn record_if_unseen(session: &Session, path: &Path, host: &str, port: u16) -> Result<bool, String> {
    let Some((key, key_type)) = session.host_key() else {
        return Ok(false);
    };
    let mut known_hosts = session
        .known_hosts()
        .map_err(|err| format!("known_hosts unavailable: {}", err))?;
    record_host_key(&mut known_hosts, path, host, port, key, key_type.into())
}

/// Appends `key` for `host:port` to the known_hosts file at `path` unless an
/// entry for that host already exists. Returns whether a line was written.
fn record_host_key(
    known_hosts: &mut KnownHosts,
    path: &Path,
    host: &str,
    port: u16,
    key: &[u8],
    format: KnownHostKeyFormat,
) -> Result<bool, String> {
    if path.exists() {
        known_hosts
            .read_file(path, KnownHostFileKind::OpenSSH)
            .map_err(|err| format!("failed to read {}: {}", path.display(), err))?;
    }
    if !matches!(known_hosts.check_port(host, port, key), CheckResult::NotFound) {
        return Ok(false);
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|err| format!("failed to create {}: {}", parent.display(), err))?;
    }
    known_hosts
        .add(&known_hosts_entry_name(host, port), key, "", format)
        .map_err(|err| format!("failed to add host key: {}", err))?;
    known_hosts
        .write_file(path, KnownHostFileKind::OpenSSH)
        .map_err(|err| format!("failed to write {}: {}", path.display(), err))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::{
        known_hosts_entry_name, normalize_fingerprint_sha256, record_host_key, HostKeyPolicy,
    };
    use crate::errors::ConfigError;
    use ssh2::{KnownHostKeyFormat, KnownHosts, Session};
    use std::path::PathBuf;

    const KEY: &[u8] = b"\x00\x00\x00\x07ssh-rsa\x00\x00\x00\x01\x23";

    fn empty_known_hosts() -> KnownHosts {
        Session::new()
            .expect("session")
            .known_hosts()
            .expect("known hosts")
    }

    fn scratch_dir(prefix: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("{}-{}", prefix, uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("create scratch dir");
        dir
    }

    #[test]
    fn first_seen_key_is_written_once() {
        let dir = scratch_dir("relay-known-hosts");
        let path = dir.join("nested").join("known_hosts");

        let recorded = record_host_key(
            &mut empty_known_hosts(),
            &path,
            "legacy",
            2222,
            KEY,
            KnownHostKeyFormat::SshRsa,
        )
        .expect("record");
        assert!(recorded);
        let written = std::fs::read_to_string(&path).expect("known_hosts written");
        assert!(written.starts_with("[legacy]:2222 ssh-rsa "), "{}", written);

        let again = record_host_key(
            &mut empty_known_hosts(),
            &path,
            "legacy",
            2222,
            KEY,
            KnownHostKeyFormat::SshRsa,
        )
        .expect("second record");
        assert!(!again);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn unwritable_location_is_reported() {
        let dir = scratch_dir("relay-known-hosts");
        let blocker = dir.join("not-a-dir");
        std::fs::write(&blocker, "x").expect("write blocker");
        let path = blocker.join("known_hosts");

        let err = record_host_key(
            &mut empty_known_hosts(),
            &path,
            "legacy",
            22,
            KEY,
            KnownHostKeyFormat::SshRsa,
        )
        .expect_err("must fail");
        assert!(err.contains("not-a-dir"), "{}", err);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn fingerprint_normalization_accepts_common_spellings() {
        assert_eq!(
            normalize_fingerprint_sha256("sha256:abcDEF="),
            Some("SHA256:abcDEF".to_string())
        );
        assert_eq!(
            normalize_fingerprint_sha256("  abcDEF  "),
            Some("SHA256:abcDEF".to_string())
        );
        assert_eq!(normalize_fingerprint_sha256("SHA256:"), None);
        assert_eq!(normalize_fingerprint_sha256(""), None);
    }

    #[test]
    fn unset_policy_defaults_to_auto_trust() {
        let policy = HostKeyPolicy::from_parts(None, None, None).expect("policy");
        assert_eq!(policy, HostKeyPolicy::AutoTrust { known_hosts: None });
    }

    #[test]
    fn fingerprint_without_policy_pins() {
        let policy = HostKeyPolicy::from_parts(None, Some("SHA256:xyz"), None).expect("policy");
        assert_eq!(
            policy,
            HostKeyPolicy::Pinned {
                fingerprint: "SHA256:xyz".to_string()
            }
        );
    }

    #[test]
    fn explicit_policies_require_their_inputs() {
        assert_eq!(
            HostKeyPolicy::from_parts(Some("pin"), None, None),
            Err(ConfigError::MissingFingerprint)
        );
        assert_eq!(
            HostKeyPolicy::from_parts(Some("known_hosts"), None, None),
            Err(ConfigError::MissingKnownHosts)
        );
        assert_eq!(
            HostKeyPolicy::from_parts(Some("Known_Hosts"), None, Some(PathBuf::from("/k"))),
            Ok(HostKeyPolicy::KnownHosts {
                path: PathBuf::from("/k")
            })
        );
        assert_eq!(
            HostKeyPolicy::from_parts(Some("tofu"), Some("SHA256:x"), None),
            Ok(HostKeyPolicy::AutoTrust { known_hosts: None })
        );
    }

    #[test]
    fn unknown_policy_is_rejected() {
        assert_eq!(
            HostKeyPolicy::from_parts(Some("yolo"), None, None),
            Err(ConfigError::UnknownHostKeyPolicy("yolo".to_string()))
        );
    }

    #[test]
    fn entry_name_brackets_non_default_ports() {
        assert_eq!(known_hosts_entry_name("legacy", 22), "legacy");
        assert_eq!(known_hosts_entry_name("legacy", 2222), "[legacy]:2222");
    }
}

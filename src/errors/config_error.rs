use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{name} must be a positive integer (got {value:?})")]
    InvalidNumber { name: &'static str, value: String },
    #[error("{name} must be a port between 1 and 65535 (got {value:?})")]
    InvalidPort { name: &'static str, value: String },
    #[error("Unknown HOST_KEY_POLICY: {0} (use one of: auto, tofu, pin, known_hosts)")]
    UnknownHostKeyPolicy(String),
    #[error("HOST_KEY_FINGERPRINT is required for HOST_KEY_POLICY=pin")]
    MissingFingerprint,
    #[error("KNOWN_HOSTS_PATH is required for HOST_KEY_POLICY=known_hosts")]
    MissingKnownHosts,
}

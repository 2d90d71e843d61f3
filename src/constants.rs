pub mod network {
    pub const SSH_DEFAULT_PORT: u16 = 22;
    pub const PROXY_DEFAULT_PORT: u16 = 5000;
    pub const FILE_SERVER_DEFAULT_PORT: u16 = 8080;
    pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";
    pub const TIMEOUT_SSH_CONNECT_SECS: u64 = 30;
    pub const TIMEOUT_JOB_SECS: u64 = 60;
    pub const TIMEOUT_CHANNEL_CLOSE_GRACE_MS: u64 = 2_000;
    pub const POLL_INTERVAL_MS: u64 = 20;
}

pub mod legacy {
    pub const DEFAULT_HOST: &str = "remote-server-1";
    pub const DEFAULT_USER: &str = "legacy";
    pub const DEFAULT_KEY_PATH: &str = "/app/ssh_keys/id_rsa";
    pub const DEFAULT_SCRIPT: &str = "/home/legacy/proxy_request.sh";
}

pub mod service {
    pub const PROXY_NAME: &str = "local-server";
    pub const FILE_SERVER_NAME: &str = "remote-server-2";
}

pub mod files {
    pub const DEFAULT_DIRECTORY: &str = "/app/files";
}

pub mod limits {
    pub const READ_CHUNK_BYTES: usize = 8192;
    pub const LOG_OUTPUT_BYTES: usize = 4 * 1024;
    pub const MAX_CAPTURE_BYTES: usize = 8 * 1024 * 1024;
}

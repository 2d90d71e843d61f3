use crate::errors::ChannelError;

/// Output of one remote command. Produced once per invocation and consumed
/// by the interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Time from exec to EOF on both streams.
    pub duration_ms: u64,
}

/// One remote command execution for a requested filename. Implementations
/// open and release their own resources on every call.
#[async_trait::async_trait]
pub trait RemoteChannel: Send + Sync {
    async fn execute(&self, filename: &str) -> Result<CommandResult, ChannelError>;
}

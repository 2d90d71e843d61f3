use thiserror::Error;

/// Failure of one remote command channel invocation.
///
/// The `Display` text is what ends up in the `msg` field of the error
/// envelope, after the `there was an error retrieving {filename}, ` prefix.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("SSH Authentication failed: {0}")]
    Authentication(String),
    #[error("SSH connection error: {0}")]
    Transport(String),
    #[error("{0}")]
    Communication(String),
}

impl ChannelError {
    pub fn kind(&self) -> &'static str {
        match self {
            ChannelError::Authentication(_) => "authentication",
            ChannelError::Transport(_) => "transport",
            ChannelError::Communication(_) => "communication",
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            ChannelError::Authentication(detail)
            | ChannelError::Transport(detail)
            | ChannelError::Communication(detail) => detail,
        }
    }
}

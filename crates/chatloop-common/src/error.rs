/// Errors shared across the chatloop crates.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("tool '{name}' failed: {reason}")]
    ToolInvocation { name: String, reason: String },

    #[error("tool loop exceeded maximum of {limit} iterations")]
    ToolLoopExceeded { limit: usize },

    #[error("tool '{0}' is already registered")]
    DuplicateTool(String),

    #[error("turn cancelled: {0}")]
    Cancelled(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("agent error: {0}")]
    Agent(String),

    #[error("gateway error: {0}")]
    Gateway(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Per-turn errors the model can recover from once they are fed back as a
    /// tool result.
    pub fn is_recoverable_tool_error(&self) -> bool {
        matches!(self, Error::UnknownTool(_) | Error::ToolInvocation { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

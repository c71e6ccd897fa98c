pub mod error;
pub mod message;
pub mod types;

pub use error::{Error, Result};
pub use message::{ChatMessage, ChatRole, ToolCall};
pub use types::ThreadId;

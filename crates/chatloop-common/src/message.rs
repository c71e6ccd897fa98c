use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One turn of a conversation. Messages are immutable once appended to a log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A request from the model to invoke a named tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

impl ChatMessage {
    fn plain(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call_id: None,
            tool_calls: Vec::new(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(ChatRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(ChatRole::Assistant, content)
    }

    pub fn assistant_with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::plain(ChatRole::Assistant, content)
        }
    }

    /// Result of a tool call, correlated by the originating call id.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::plain(ChatRole::Tool, content)
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Check the role-specific shape of a message before it enters a log.
    pub fn validate(&self) -> Result<()> {
        match self.role {
            ChatRole::Tool => {
                if self.tool_call_id.as_deref().is_none_or(str::is_empty) {
                    return Err(Error::InvalidMessage(
                        "tool message must carry a tool_call_id".into(),
                    ));
                }
                if self.has_tool_calls() {
                    return Err(Error::InvalidMessage(
                        "tool message cannot request tool calls".into(),
                    ));
                }
            }
            ChatRole::Assistant => {
                if self.tool_call_id.is_some() {
                    return Err(Error::InvalidMessage(
                        "assistant message cannot carry a tool_call_id".into(),
                    ));
                }
            }
            ChatRole::System | ChatRole::User => {
                if self.has_tool_calls() || self.tool_call_id.is_some() {
                    return Err(Error::InvalidMessage(format!(
                        "{:?} message cannot carry tool call data",
                        self.role
                    )));
                }
            }
        }
        Ok(())
    }
}

//! Model-facing message types.
//!
//! The event log speaks in turns and parts; completion providers speak in
//! flat role-tagged messages with tool calls attached. [`messages_from_turns`]
//! converts the former into the latter before every model call.

use crate::decode::{Decoded, ToolOutcome, decode};
use crate::turn::{Role, Turn};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The role of a message sender as seen by the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    /// System instructions (surface prompt)
    System,
    /// Tool execution result
    Tool,
}

/// A single message sent to a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,

    pub role: MessageRole,

    pub content: String,

    /// Tool calls requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<MessageToolCall>,

    /// If this is a tool result, which tool call it responds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn with_role(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(MessageRole::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(MessageRole::System, content)
    }

    /// Create a tool result message.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::with_role(MessageRole::Tool, content);
        msg.tool_call_id = Some(tool_call_id.into());
        msg
    }
}

/// A tool call embedded in an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageToolCall {
    pub id: String,

    pub name: String,

    /// Arguments as a JSON string
    pub arguments: String,
}

/// Flatten a turn sequence into provider messages.
///
/// Agent turns become one assistant message carrying the text and the tool
/// calls that were issued, followed by one tool message per resolved call.
/// Unresolved calls are dropped: the model must not see a call without its
/// answer.
pub fn messages_from_turns(turns: &[Turn]) -> Vec<Message> {
    let mut messages = Vec::with_capacity(turns.len());

    for turn in turns {
        match turn.role {
            Role::User => {
                let text = turn.text();
                if !text.is_empty() {
                    messages.push(Message::user(text));
                }
            }
            Role::Agent => {
                let mut assistant = Message::assistant(turn.text());
                let mut results = Vec::new();

                for part in &turn.parts {
                    let Decoded::Invocation(inv) = decode(part) else {
                        continue;
                    };
                    let Some(call_id) = inv.call_id else { continue };
                    let content = match inv.outcome {
                        ToolOutcome::Pending => continue,
                        ToolOutcome::Result(output) => output.to_string(),
                        ToolOutcome::Failed(msg) | ToolOutcome::Cancelled(msg) => {
                            format!("Error: {msg}")
                        }
                    };
                    assistant.tool_calls.push(MessageToolCall {
                        id: call_id.to_string(),
                        name: inv.tool_name.to_string(),
                        arguments: inv.input.to_string(),
                    });
                    results.push(Message::tool_result(call_id, content));
                }

                if !assistant.content.is_empty() || !assistant.tool_calls.is_empty() {
                    messages.push(assistant);
                    messages.extend(results);
                }
            }
        }
    }

    messages
}

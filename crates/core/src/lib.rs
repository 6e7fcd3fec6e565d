//! # Tracefold Core
//!
//! Domain types, traits, and error definitions shared by every tracefold
//! crate: the conversation event log and its parts, the tool-invocation
//! decoder, the streaming event protocol, and the `Tool` / `Provider`
//! seams that the agent loop is written against.
//!
//! All other crates depend inward on this one.

pub mod decode;
pub mod error;
pub mod event;
pub mod log;
pub mod message;
pub mod provider;
pub mod stream_event;
pub mod tool;
pub mod turn;

// Re-export key types at crate root for ergonomics
pub use decode::{CANCELLED_MESSAGE, Decoded, Invocation, ToolOutcome, ToolPhase, decode};
pub use error::{Error, LifecycleError, ProviderError, Result, ToolError};
pub use event::{DomainEvent, EventBus};
pub use log::{EventLog, StreamStatus};
pub use message::{Message, MessageRole, MessageToolCall, messages_from_turns};
pub use provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk, ToolDefinition, Usage};
pub use stream_event::AgentStreamEvent;
pub use tool::{Tool, ToolCall, ToolRegistry};
pub use turn::{Part, Role, ToolPart, Turn};

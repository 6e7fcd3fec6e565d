//! Agent-level streaming events.
//!
//! `AgentStreamEvent` is what the agent loop emits while it runs and what
//! the gateway forwards to clients over SSE. Folding these events into an
//! [`EventLog`](crate::log::EventLog) reproduces the turn/part structure the
//! view builders consume.

use crate::provider::Usage;
use serde::{Deserialize, Serialize};

/// Events emitted by the agent during streaming execution.
///
/// - `text_delta`: partial answer text
/// - `reasoning_delta`: partial reasoning text
/// - `tool_input_start`: the model started producing a tool call
/// - `tool_call`: a tool call is fully specified and about to run
/// - `tool_result`: tool execution completed
/// - `tool_error`: tool execution failed or was cancelled
/// - `step_finish`: one model round-trip finished
/// - `done`: stream is complete
/// - `error`: the request failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentStreamEvent {
    TextDelta {
        delta: String,
    },

    ReasoningDelta {
        delta: String,
    },

    ToolInputStart {
        tool_call_id: String,
        tool_name: String,
    },

    ToolCall {
        tool_call_id: String,
        tool_name: String,
        input: serde_json::Value,
    },

    ToolResult {
        tool_call_id: String,
        tool_name: String,
        output: serde_json::Value,
    },

    ToolError {
        tool_call_id: String,
        tool_name: String,
        error_text: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        cancelled: bool,
    },

    StepFinish {
        step: usize,
    },

    /// The stream is complete; carries the run's final metadata.
    Done {
        request_id: String,
        steps: usize,
        tool_calls_made: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },

    /// The request failed; nothing follows.
    Error {
        message: String,
    },
}

impl AgentStreamEvent {
    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::TextDelta { .. } => "text_delta",
            Self::ReasoningDelta { .. } => "reasoning_delta",
            Self::ToolInputStart { .. } => "tool_input_start",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::ToolError { .. } => "tool_error",
            Self::StepFinish { .. } => "step_finish",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }

    /// Whether nothing else follows this event on the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_delta_serialization() {
        let event = AgentStreamEvent::TextDelta {
            delta: "Hello".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"text_delta""#));
        assert!(json.contains(r#""delta":"Hello""#));
    }

    #[test]
    fn tool_call_serialization() {
        let event = AgentStreamEvent::ToolCall {
            tool_call_id: "call_1".into(),
            tool_name: "searchWeb".into(),
            input: serde_json::json!({"query": "rust"}),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"tool_call""#));
        assert!(json.contains(r#""tool_name":"searchWeb""#));
    }

    #[test]
    fn tool_error_omits_cancelled_when_false() {
        let event = AgentStreamEvent::ToolError {
            tool_call_id: "c".into(),
            tool_name: "t".into(),
            error_text: "boom".into(),
            cancelled: false,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("cancelled"));
    }

    #[test]
    fn event_type_matches_serialized_tag() {
        let events = vec![
            AgentStreamEvent::ReasoningDelta { delta: "x".into() },
            AgentStreamEvent::ToolInputStart {
                tool_call_id: "a".into(),
                tool_name: "b".into(),
            },
            AgentStreamEvent::ToolResult {
                tool_call_id: "a".into(),
                tool_name: "b".into(),
                output: serde_json::json!({}),
            },
            AgentStreamEvent::StepFinish { step: 1 },
            AgentStreamEvent::Done {
                request_id: "r".into(),
                steps: 1,
                tool_calls_made: 0,
                usage: None,
            },
            AgentStreamEvent::Error {
                message: "x".into(),
            },
        ];
        for event in events {
            let value = serde_json::to_value(&event).unwrap();
            assert_eq!(value["type"], event.event_type());
        }
    }

    #[test]
    fn terminal_events() {
        assert!(AgentStreamEvent::Error { message: "x".into() }.is_terminal());
        assert!(!AgentStreamEvent::StepFinish { step: 0 }.is_terminal());
    }

    #[test]
    fn event_deserialization() {
        let json = r#"{"type":"text_delta","delta":"hi"}"#;
        let event: AgentStreamEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event, AgentStreamEvent::TextDelta { delta: "hi".into() });
    }
}

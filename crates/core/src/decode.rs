//! Tool-invocation lifecycle decoder.
//!
//! Classifies a raw [`Part`] into one of four lifecycle phases and pulls out
//! the tool name and payloads. Several generations of wire vocabulary are
//! accepted for the state string; anything unrecognized comes back as
//! [`Decoded::Unclassified`] so callers can skip it.

use crate::turn::{Part, ToolPart};
use serde::Serialize;
use serde_json::Value;

/// Error text written onto invocations that were stopped by the user.
pub const CANCELLED_MESSAGE: &str = "Tool execution was cancelled";

const FAILED_MESSAGE: &str = "Tool execution failed";

static NULL: Value = Value::Null;

/// Lifecycle phase of a tool invocation. Phases only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolPhase {
    Partial,
    Requested,
    Completed,
    Errored,
}

impl ToolPhase {
    /// Map a wire state string onto a phase.
    pub fn from_state(state: &str) -> Option<Self> {
        match state {
            "input-streaming" | "partial-call" | "partial" => Some(Self::Partial),
            "input-available" | "call" | "requested" => Some(Self::Requested),
            "output-available" | "result" | "completed" => Some(Self::Completed),
            "output-error" | "error" | "errored" => Some(Self::Errored),
            _ => None,
        }
    }

    /// Partial or requested: the invocation has not resolved yet.
    pub fn is_pending(self) -> bool {
        matches!(self, Self::Partial | Self::Requested)
    }
}

/// How an invocation resolved, if it has.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ToolOutcome<'a> {
    Pending,
    Result(&'a Value),
    Failed(&'a str),
    Cancelled(&'a str),
}

/// A classified tool invocation borrowed from its part.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Invocation<'a> {
    pub tool_name: &'a str,
    pub call_id: Option<&'a str>,
    pub phase: ToolPhase,
    pub input: &'a Value,
    pub outcome: ToolOutcome<'a>,
}

impl<'a> Invocation<'a> {
    /// The input object overlaid with the fields of an object output.
    ///
    /// Echo-style tools return their arguments plus extra fields, so the
    /// merged object carries everything either side reported.
    pub fn merged_payload(&self) -> Value {
        let output = match self.outcome {
            ToolOutcome::Result(Value::Object(map)) => Some(map),
            _ => None,
        };
        match (self.input, output) {
            (Value::Object(input), Some(output)) => {
                let mut merged = input.clone();
                merged.extend(output.iter().map(|(k, v)| (k.clone(), v.clone())));
                Value::Object(merged)
            }
            (_, Some(output)) => Value::Object(output.clone()),
            (input, None) => input.clone(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Cancelled(_))
    }
}

/// Result of decoding one part.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded<'a> {
    /// Not a tool part (text, reasoning, unknown tags).
    NotApplicable,
    Invocation(Invocation<'a>),
    /// A tool part that cannot be classified.
    Unclassified { reason: String },
}

impl<'a> Decoded<'a> {
    pub fn invocation(self) -> Option<Invocation<'a>> {
        match self {
            Self::Invocation(inv) => Some(inv),
            _ => None,
        }
    }
}

/// Classify a part. Total and side-effect free.
pub fn decode(part: &Part) -> Decoded<'_> {
    match part {
        Part::Tool(tool) => decode_tool(tool),
        _ => Decoded::NotApplicable,
    }
}

/// Classify a tool part.
pub fn decode_tool(tool: &ToolPart) -> Decoded<'_> {
    let Some(tool_name) = tool.tool_name.as_deref().filter(|n| !n.is_empty()) else {
        return Decoded::Unclassified {
            reason: "missing tool name".into(),
        };
    };
    let Some(phase) = ToolPhase::from_state(&tool.state) else {
        return Decoded::Unclassified {
            reason: format!("unknown state `{}`", tool.state),
        };
    };

    let error_text = tool.error_text.as_deref();
    let (phase, outcome) = match phase {
        ToolPhase::Partial | ToolPhase::Requested => (phase, ToolOutcome::Pending),
        ToolPhase::Completed => {
            let output = tool.output.as_ref().unwrap_or(&NULL);
            if legacy_cancelled(output) {
                (
                    ToolPhase::Errored,
                    ToolOutcome::Cancelled(error_text.unwrap_or(CANCELLED_MESSAGE)),
                )
            } else {
                (phase, ToolOutcome::Result(output))
            }
        }
        ToolPhase::Errored if tool.cancelled => (
            phase,
            ToolOutcome::Cancelled(error_text.unwrap_or(CANCELLED_MESSAGE)),
        ),
        ToolPhase::Errored => (phase, ToolOutcome::Failed(error_text.unwrap_or(FAILED_MESSAGE))),
    };

    Decoded::Invocation(Invocation {
        tool_name,
        call_id: tool.tool_call_id.as_deref().filter(|id| !id.is_empty()),
        phase,
        input: &tool.input,
        outcome,
    })
}

fn legacy_cancelled(output: &Value) -> bool {
    output.get("__cancelled").and_then(Value::as_bool) == Some(true)
}

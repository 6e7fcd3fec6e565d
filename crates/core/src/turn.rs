//! Turn and Part: the units of the conversation event log.
//!
//! A [`Turn`] is one message-level exchange attributed to the user or the
//! agent. It holds an ordered list of [`Part`]s: plain text, reasoning
//! fragments, and tool invocations whose lifecycle state advances in place
//! while the agent streams.
//!
//! Parts arrive from clients in a loosely shaped JSON format, so `Part`
//! deserializes through [`serde_json::Value`] and never fails: unknown tags
//! are kept as [`Part::Other`] and skipped by everything downstream.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use uuid::Uuid;

/// Canonical wire values for [`ToolPart::state`].
pub mod state {
    pub const INPUT_STREAMING: &str = "input-streaming";
    pub const INPUT_AVAILABLE: &str = "input-available";
    pub const OUTPUT_AVAILABLE: &str = "output-available";
    pub const OUTPUT_ERROR: &str = "output-error";
}

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human on the other end of the surface
    User,
    /// The agent loop (model output plus tool activity)
    #[serde(rename = "assistant", alias = "agent")]
    Agent,
}

/// One exchange unit in the conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawTurn")]
pub struct Turn {
    pub id: String,
    pub role: Role,
    pub parts: Vec<Part>,
}

/// Accepts both `{role, parts}` and the plain `{role, content}` shape.
#[derive(Deserialize)]
struct RawTurn {
    #[serde(default)]
    id: Option<String>,
    role: Role,
    #[serde(default)]
    parts: Option<Vec<Part>>,
    #[serde(default)]
    content: Option<String>,
}

impl From<RawTurn> for Turn {
    fn from(raw: RawTurn) -> Self {
        let parts = match (raw.parts, raw.content) {
            (Some(parts), _) => parts,
            (None, Some(content)) if !content.is_empty() => vec![Part::text(content)],
            (None, _) => Vec::new(),
        };
        Self {
            id: raw.id.unwrap_or_else(new_turn_id),
            role: raw.role,
            parts,
        }
    }
}

fn new_turn_id() -> String {
    Uuid::new_v4().to_string()
}

impl Turn {
    /// A user turn holding a single text part.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: new_turn_id(),
            role: Role::User,
            parts: vec![Part::text(text)],
        }
    }

    /// An agent turn with the given parts.
    pub fn agent(parts: Vec<Part>) -> Self {
        Self {
            id: new_turn_id(),
            role: Role::Agent,
            parts,
        }
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }

    pub fn is_agent(&self) -> bool {
        self.role == Role::Agent
    }

    /// The first non-empty text part, if any.
    pub fn first_text(&self) -> Option<&str> {
        self.parts.iter().find_map(|p| match p {
            Part::Text { text } if !text.is_empty() => Some(text.as_str()),
            _ => None,
        })
    }

    /// All text parts joined with blank lines.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// A typed fragment within a turn.
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text { text: String },
    Reasoning { text: String },
    Tool(ToolPart),
    /// Any tag this crate does not model (sources, step markers, files...).
    Other { kind: String, raw: Value },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn reasoning(text: impl Into<String>) -> Self {
        Self::Reasoning { text: text.into() }
    }

    /// The wire tag of this part.
    pub fn kind(&self) -> &str {
        match self {
            Self::Text { .. } => "text",
            Self::Reasoning { .. } => "reasoning",
            Self::Tool(_) => "tool-invocation",
            Self::Other { kind, .. } => kind,
        }
    }

    pub fn as_tool(&self) -> Option<&ToolPart> {
        match self {
            Self::Tool(tool) => Some(tool),
            _ => None,
        }
    }

    pub fn as_tool_mut(&mut self) -> Option<&mut ToolPart> {
        match self {
            Self::Tool(tool) => Some(tool),
            _ => None,
        }
    }

    /// Build a part from its JSON shape. Never fails.
    pub fn from_value(value: Value) -> Self {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        match kind.as_str() {
            "text" => Self::Text {
                text: string_field(&value, &["text"]),
            },
            "reasoning" => Self::Reasoning {
                text: string_field(&value, &["text", "reasoning"]),
            },
            "tool-invocation" => {
                // Older clients nest the invocation one level down.
                let inner = value
                    .get("toolInvocation")
                    .filter(|v| v.is_object())
                    .cloned()
                    .unwrap_or_else(|| value.clone());
                match serde_json::from_value::<ToolPart>(inner) {
                    Ok(tool) => Self::Tool(tool),
                    Err(_) => Self::Other { kind, raw: value },
                }
            }
            k if k.starts_with("tool-") => {
                let name = k.trim_start_matches("tool-").to_string();
                match serde_json::from_value::<ToolPart>(value.clone()) {
                    Ok(mut tool) => {
                        if tool.tool_name.is_none() && !name.is_empty() {
                            tool.tool_name = Some(name);
                        }
                        Self::Tool(tool)
                    }
                    Err(_) => Self::Other { kind, raw: value },
                }
            }
            _ => Self::Other { kind, raw: value },
        }
    }

    /// The JSON shape of this part.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Text { text } => serde_json::json!({ "type": "text", "text": text }),
            Self::Reasoning { text } => serde_json::json!({ "type": "reasoning", "text": text }),
            Self::Tool(tool) => {
                let mut value = serde_json::to_value(tool).unwrap_or(Value::Null);
                if let Value::Object(map) = &mut value {
                    map.insert("type".into(), Value::String("tool-invocation".into()));
                }
                value
            }
            Self::Other { raw, .. } => raw.clone(),
        }
    }
}

fn string_field(value: &Value, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|k| value.get(*k).and_then(Value::as_str))
        .unwrap_or_default()
        .to_string()
}

impl Serialize for Part {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Part {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::from_value)
    }
}

/// A tool invocation as it appears in the log.
///
/// `state` is kept as the raw wire string; classification into a lifecycle
/// phase is the decoder's job (see [`crate::decode`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,

    #[serde(default)]
    pub state: String,

    #[serde(default, alias = "args")]
    pub input: Value,

    #[serde(default, alias = "result", skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_text: Option<String>,

    /// Set when the user stopped the request before this invocation resolved.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub cancelled: bool,
}

impl ToolPart {
    fn with_state(call_id: impl Into<String>, name: impl Into<String>, state: &str, input: Value) -> Self {
        Self {
            tool_call_id: Some(call_id.into()),
            tool_name: Some(name.into()),
            state: state.to_string(),
            input,
            output: None,
            error_text: None,
            cancelled: false,
        }
    }

    /// An invocation whose input is still streaming.
    pub fn partial(call_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::with_state(call_id, name, state::INPUT_STREAMING, Value::Null)
    }

    /// A fully specified invocation awaiting execution.
    pub fn requested(call_id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        Self::with_state(call_id, name, state::INPUT_AVAILABLE, input)
    }

    /// A resolved invocation.
    pub fn completed(
        call_id: impl Into<String>,
        name: impl Into<String>,
        input: Value,
        output: Value,
    ) -> Self {
        let mut part = Self::with_state(call_id, name, state::OUTPUT_AVAILABLE, input);
        part.output = Some(output);
        part
    }

    /// A failed invocation.
    pub fn errored(
        call_id: impl Into<String>,
        name: impl Into<String>,
        input: Value,
        message: impl Into<String>,
    ) -> Self {
        let mut part = Self::with_state(call_id, name, state::OUTPUT_ERROR, input);
        part.error_text = Some(message.into());
        part
    }

    pub fn into_part(self) -> Part {
        Part::Tool(self)
    }
}

impl From<ToolPart> for Part {
    fn from(tool: ToolPart) -> Self {
        Part::Tool(tool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_content_turn_becomes_text_part() {
        let turn: Turn = serde_json::from_value(json!({
            "role": "user",
            "content": "research entropy"
        }))
        .unwrap();
        assert!(turn.is_user());
        assert_eq!(turn.first_text(), Some("research entropy"));
    }

    #[test]
    fn agent_role_accepts_both_spellings() {
        let a: Turn = serde_json::from_value(json!({"role": "assistant", "parts": []})).unwrap();
        let b: Turn = serde_json::from_value(json!({"role": "agent", "parts": []})).unwrap();
        assert!(a.is_agent());
        assert!(b.is_agent());
    }

    #[test]
    fn unknown_part_tag_is_preserved() {
        let part: Part = serde_json::from_value(json!({"type": "step-start"})).unwrap();
        assert_eq!(part.kind(), "step-start");
        assert!(matches!(part, Part::Other { .. }));
        assert_eq!(part.to_value(), json!({"type": "step-start"}));
    }

    #[test]
    fn typed_tool_tag_carries_name() {
        let part: Part = serde_json::from_value(json!({
            "type": "tool-searchWeb",
            "toolCallId": "c1",
            "state": "input-available",
            "input": {"query": "rust"}
        }))
        .unwrap();
        let tool = part.as_tool().unwrap();
        assert_eq!(tool.tool_name.as_deref(), Some("searchWeb"));
        assert_eq!(tool.input["query"], "rust");
    }

    #[test]
    fn nested_legacy_invocation_is_unwrapped() {
        let part: Part = serde_json::from_value(json!({
            "type": "tool-invocation",
            "toolInvocation": {
                "toolCallId": "c9",
                "toolName": "updateResearchTree",
                "state": "result",
                "args": {"nodeId": "n0"},
                "result": {"nodeId": "n0"}
            }
        }))
        .unwrap();
        let tool = part.as_tool().unwrap();
        assert_eq!(tool.state, "result");
        assert_eq!(tool.input["nodeId"], "n0");
        assert!(tool.output.is_some());
    }

    #[test]
    fn reasoning_accepts_legacy_field() {
        let part: Part =
            serde_json::from_value(json!({"type": "reasoning", "reasoning": "hmm"})).unwrap();
        assert_eq!(part, Part::reasoning("hmm"));
    }

    #[test]
    fn tool_part_serializes_with_tag() {
        let part = ToolPart::requested("c1", "searchWeb", json!({"query": "q"})).into_part();
        let value = part.to_value();
        assert_eq!(value["type"], "tool-invocation");
        assert_eq!(value["toolName"], "searchWeb");
        assert_eq!(value["state"], "input-available");
        assert!(value.get("cancelled").is_none());
    }

    #[test]
    fn turn_text_joins_text_parts() {
        let turn = Turn::agent(vec![
            Part::text("first"),
            Part::reasoning("skip me"),
            Part::text("second"),
        ]);
        assert_eq!(turn.text(), "first\n\nsecond");
    }
}

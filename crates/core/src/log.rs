//! The conversation event log.
//!
//! `EventLog` is the transport-side owner of the turn sequence. It folds the
//! agent's [`AgentStreamEvent`]s into turns and parts so that the view
//! builders can recompute their models from [`EventLog::turns`] after every
//! change. Turns are only ever appended; the one exception is the trailing
//! agent turn, whose parts grow and advance in place while streaming.

use crate::decode::ToolPhase;
use crate::stream_event::AgentStreamEvent;
use crate::turn::{Part, Role, ToolPart, Turn, state};
use serde::{Deserialize, Serialize};

/// Transport status of the current request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    #[default]
    Idle,
    Submitted,
    Streaming,
    Error,
}

impl StreamStatus {
    pub fn is_streaming(self) -> bool {
        self == Self::Streaming
    }

    /// Whether a request is outstanding (submitted or streaming).
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Submitted | Self::Streaming)
    }
}

/// Ordered, append-only sequence of turns plus transport status.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    turns: Vec<Turn>,
    status: StreamStatus,
    last_error: Option<String>,
    step_break: bool,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing turn sequence (e.g. a request body or a replay file).
    pub fn from_turns(turns: Vec<Turn>) -> Self {
        Self {
            turns,
            ..Self::default()
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn status(&self) -> StreamStatus {
        self.status
    }

    pub fn set_status(&mut self, status: StreamStatus) {
        self.status = status;
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Append a user turn and mark the log as awaiting a response.
    pub fn push_user(&mut self, text: impl Into<String>) -> &Turn {
        self.push_turn(Turn::user(text));
        self.status = StreamStatus::Submitted;
        self.last_error = None;
        &self.turns[self.turns.len() - 1]
    }

    /// Append a fully formed turn.
    pub fn push_turn(&mut self, turn: Turn) {
        self.turns.push(turn);
        self.step_break = false;
    }

    /// Record a transport failure.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = StreamStatus::Error;
        self.last_error = Some(message.into());
    }

    /// Turns belonging to the current session: everything after the last
    /// user turn.
    pub fn current_session_mut(&mut self) -> &mut [Turn] {
        let start = self
            .turns
            .iter()
            .rposition(Turn::is_user)
            .map(|i| i + 1)
            .unwrap_or(0);
        &mut self.turns[start..]
    }

    /// Fold one stream event into the log.
    pub fn apply(&mut self, event: &AgentStreamEvent) {
        if self.status == StreamStatus::Submitted && !event.is_terminal() {
            self.status = StreamStatus::Streaming;
        }

        match event {
            AgentStreamEvent::TextDelta { delta } => {
                let turn = self.open_agent_turn();
                match turn.parts.last_mut() {
                    Some(Part::Text { text }) => text.push_str(delta),
                    _ => turn.parts.push(Part::text(delta.clone())),
                }
            }
            AgentStreamEvent::ReasoningDelta { delta } => {
                let turn = self.open_agent_turn();
                match turn.parts.last_mut() {
                    Some(Part::Reasoning { text }) => text.push_str(delta),
                    _ => turn.parts.push(Part::reasoning(delta.clone())),
                }
            }
            AgentStreamEvent::ToolInputStart {
                tool_call_id,
                tool_name,
            } => {
                if self.tool_part_mut(tool_call_id).is_none() {
                    let part = ToolPart::partial(tool_call_id.clone(), tool_name.clone());
                    self.open_agent_turn().parts.push(part.into());
                }
            }
            AgentStreamEvent::ToolCall {
                tool_call_id,
                tool_name,
                input,
            } => match self.tool_part_mut(tool_call_id) {
                Some(part) => {
                    if can_move_to(part, ToolPhase::Requested) {
                        part.state = state::INPUT_AVAILABLE.into();
                        part.input = input.clone();
                    }
                }
                None => {
                    let part =
                        ToolPart::requested(tool_call_id.clone(), tool_name.clone(), input.clone());
                    self.open_agent_turn().parts.push(part.into());
                }
            },
            AgentStreamEvent::ToolResult {
                tool_call_id,
                tool_name,
                output,
            } => match self.tool_part_mut(tool_call_id) {
                Some(part) => {
                    if can_move_to(part, ToolPhase::Completed) {
                        part.state = state::OUTPUT_AVAILABLE.into();
                        part.output = Some(output.clone());
                    }
                }
                None => {
                    let part = ToolPart::completed(
                        tool_call_id.clone(),
                        tool_name.clone(),
                        serde_json::Value::Null,
                        output.clone(),
                    );
                    self.open_agent_turn().parts.push(part.into());
                }
            },
            AgentStreamEvent::ToolError {
                tool_call_id,
                tool_name,
                error_text,
                cancelled,
            } => {
                if self.tool_part_mut(tool_call_id).is_none() {
                    let part = ToolPart::partial(tool_call_id.clone(), tool_name.clone());
                    self.open_agent_turn().parts.push(part.into());
                }
                if let Some(part) = self.tool_part_mut(tool_call_id)
                    && can_move_to(part, ToolPhase::Errored)
                {
                    part.state = state::OUTPUT_ERROR.into();
                    part.error_text = Some(error_text.clone());
                    part.cancelled = *cancelled;
                }
            }
            AgentStreamEvent::StepFinish { .. } => {
                self.step_break = true;
            }
            AgentStreamEvent::Done { .. } => {
                self.status = StreamStatus::Idle;
                self.step_break = false;
            }
            AgentStreamEvent::Error { message } => {
                self.fail(message.clone());
                self.step_break = false;
            }
        }
    }

    /// The trailing agent turn, opening a new one after a user turn or a
    /// step boundary.
    fn open_agent_turn(&mut self) -> &mut Turn {
        let reuse = !self.step_break && self.turns.last().is_some_and(|t| t.role == Role::Agent);
        if !reuse {
            self.turns.push(Turn::agent(Vec::new()));
            self.step_break = false;
        }
        let last = self.turns.len() - 1;
        &mut self.turns[last]
    }

    /// Most recent tool part of the current session with this call id.
    fn tool_part_mut(&mut self, call_id: &str) -> Option<&mut ToolPart> {
        self.current_session_mut()
            .iter_mut()
            .rev()
            .flat_map(|t| t.parts.iter_mut().rev())
            .filter_map(Part::as_tool_mut)
            .find(|p| p.tool_call_id.as_deref() == Some(call_id))
    }
}

/// Tool parts only move forward, and a resolved part is final.
fn can_move_to(part: &ToolPart, next: ToolPhase) -> bool {
    match ToolPhase::from_state(&part.state) {
        Some(current) => {
            !matches!(current, ToolPhase::Completed | ToolPhase::Errored) && next >= current
        }
        None => true,
    }
}

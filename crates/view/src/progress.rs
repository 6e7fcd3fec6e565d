//! Linear progress reconstruction for the chat and dev surfaces.
//!
//! Turns are partitioned into sessions (one user turn plus the agent turns
//! that answer it). Each session becomes an ordered list of steps:
//! initializing, one thinking step per reasoning part, a tool-call step per
//! invocation with a tool-result step once it resolves, and a closing
//! milestone when the agent produced text.
//!
//! Step ids are derived from the session index, the step kind and per-kind
//! counters scoped to the session, so recomputing over the same log yields
//! identical ids.

use crate::tree::build_tree;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use tracefold_core::decode::{Decoded, Invocation, ToolOutcome, ToolPhase, decode};
use tracefold_core::log::StreamStatus;
use tracefold_core::turn::{Part, Role, Turn};
use tracing::trace;

/// Reasoning labels longer than this are cut and suffixed with `...`.
pub const THINKING_PREVIEW_CHARS: usize = 100;

/// Prompt shown for a user turn without text.
pub const DEFAULT_PROMPT: &str = "New request";

// ── Steps ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepKind {
    Initializing,
    Thinking,
    ToolCall,
    ToolResult,
    Milestone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Active,
    Completed,
    Cancelled,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressStep {
    pub id: String,
    pub kind: StepKind,
    pub label: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Index into the turn sequence of the turn that produced this step.
    pub source_turn_index: usize,
}

/// Labels of the closing milestone step of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MilestoneLabels {
    /// Id prefix; the session index is appended.
    pub id: &'static str,
    pub active: &'static str,
    pub completed: &'static str,
}

impl MilestoneLabels {
    /// General chat.
    pub const RESPONSE: Self = Self {
        id: "responding",
        active: "Responding...",
        completed: "Response ready",
    };

    /// Website generation.
    pub const WEBSITE: Self = Self {
        id: "creating-website",
        active: "Creating website...",
        completed: "Website created!",
    };
}

impl Default for MilestoneLabels {
    fn default() -> Self {
        Self::RESPONSE
    }
}

// ── Sessions ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCounts {
    /// Resolved tool results
    pub findings: usize,
    /// Distinct concepts reported as axioms
    pub axioms: usize,
    /// Distinct URLs in resolved tool outputs
    pub sources: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub index: usize,
    pub prompt: String,
    pub steps: Vec<ProgressStep>,
    pub is_active: bool,
    pub completed: bool,
    pub counts: SessionCounts,
}

/// A user turn and the agent turns answering it, as indices into the log.
struct Group {
    user: usize,
    agents: Vec<usize>,
}

fn partition(turns: &[Turn]) -> Vec<Group> {
    let mut groups = Vec::new();
    for (i, turn) in turns.iter().enumerate() {
        if turn.role != Role::User || turn.parts.is_empty() {
            continue;
        }
        let agents = turns[i + 1..]
            .iter()
            .enumerate()
            .take_while(|(_, t)| t.role != Role::User)
            .map(|(offset, _)| i + 1 + offset)
            .collect();
        groups.push(Group { user: i, agents });
    }
    groups
}

/// Rebuild all sessions from the turn sequence.
pub fn build_progress(
    turns: &[Turn],
    status: StreamStatus,
    labels: MilestoneLabels,
) -> Vec<Session> {
    let groups = partition(turns);
    let last = groups.len().saturating_sub(1);

    groups
        .iter()
        .enumerate()
        .map(|(index, group)| {
            let active = index == last && status.is_streaming();
            SessionBuilder::new(turns, group, index, active, labels).build()
        })
        .collect()
}

/// The active step of the newest session, or its last step.
pub fn latest_step(sessions: &[Session]) -> Option<&ProgressStep> {
    let session = sessions.last()?;
    session
        .steps
        .iter()
        .find(|s| s.status == StepStatus::Active)
        .or_else(|| session.steps.last())
}

// ── Builder ─────────────────────────────────────────────────────────────

/// Per-session fold state. Dropped after each session.
struct SessionBuilder<'a> {
    turns: &'a [Turn],
    group: &'a Group,
    index: usize,
    active: bool,
    labels: MilestoneLabels,
    steps: Vec<ProgressStep>,
    thinking: usize,
    tool_calls: usize,
    tool_results: usize,
    /// Invocation key → index of its tool-call step.
    calls: HashMap<String, usize>,
    resulted: BTreeSet<String>,
    /// Per-tool ordinals for invocations without a call id. The k-th
    /// resolved part of a tool pairs with its k-th pending part.
    anonymous_pending: HashMap<String, usize>,
    anonymous_resolved: HashMap<String, usize>,
}

impl<'a> SessionBuilder<'a> {
    fn new(
        turns: &'a [Turn],
        group: &'a Group,
        index: usize,
        active: bool,
        labels: MilestoneLabels,
    ) -> Self {
        Self {
            turns,
            group,
            index,
            active,
            labels,
            steps: Vec::new(),
            thinking: 0,
            tool_calls: 0,
            tool_results: 0,
            calls: HashMap::new(),
            resulted: BTreeSet::new(),
            anonymous_pending: HashMap::new(),
            anonymous_resolved: HashMap::new(),
        }
    }

    fn build(mut self) -> Session {
        let has_agent = !self.group.agents.is_empty();
        self.steps.push(ProgressStep {
            id: format!("init-{}", self.index),
            kind: StepKind::Initializing,
            label: "Initializing".into(),
            status: if has_agent || !self.active {
                StepStatus::Completed
            } else {
                StepStatus::Active
            },
            tool_name: None,
            source_turn_index: self.group.user,
        });

        let last_agent = self.group.agents.last().copied();
        for &turn_index in &self.group.agents {
            let turn = &self.turns[turn_index];
            let in_last_turn = Some(turn_index) == last_agent;
            for (part_index, part) in turn.parts.iter().enumerate() {
                let is_last_part = in_last_turn && part_index + 1 == turn.parts.len();
                match part {
                    Part::Reasoning { text } => {
                        self.thinking_step(text, turn_index, is_last_part);
                    }
                    Part::Tool(_) => match decode(part) {
                        Decoded::Invocation(inv) => {
                            self.tool_step(&inv, turn_index, in_last_turn);
                        }
                        Decoded::Unclassified { reason } => {
                            trace!(%reason, turn = turn_index, "skipping unclassified tool part");
                        }
                        Decoded::NotApplicable => {}
                    },
                    _ => {}
                }
            }
        }

        let text_turn = self
            .group
            .agents
            .iter()
            .rev()
            .copied()
            .find(|&i| self.turns[i].first_text().is_some());
        if let Some(turn_index) = text_turn {
            self.steps.push(ProgressStep {
                id: format!("{}-{}", self.labels.id, self.index),
                kind: StepKind::Milestone,
                label: if self.active {
                    self.labels.active
                } else {
                    self.labels.completed
                }
                .into(),
                status: self.live_status(true),
                tool_name: None,
                source_turn_index: turn_index,
            });
        }

        let counts = self.counts();
        let prompt = self.turns[self.group.user]
            .first_text()
            .unwrap_or(DEFAULT_PROMPT)
            .to_string();

        Session {
            index: self.index,
            prompt,
            is_active: self.active,
            completed: !self.active && has_agent,
            counts,
            steps: self.steps,
        }
    }

    fn live_status(&self, live: bool) -> StepStatus {
        if self.active && live {
            StepStatus::Active
        } else {
            StepStatus::Completed
        }
    }

    fn thinking_step(&mut self, text: &str, turn_index: usize, is_last_part: bool) {
        self.steps.push(ProgressStep {
            id: format!("thinking-{}-{}", self.index, self.thinking),
            kind: StepKind::Thinking,
            label: preview(text),
            status: self.live_status(is_last_part),
            tool_name: None,
            source_turn_index: turn_index,
        });
        self.thinking += 1;
    }

    fn invocation_key(&mut self, inv: &Invocation<'_>) -> String {
        match inv.call_id {
            Some(id) => id.to_string(),
            None => {
                let ordinals = if inv.phase.is_pending() {
                    &mut self.anonymous_pending
                } else {
                    &mut self.anonymous_resolved
                };
                let ordinal = ordinals.entry(inv.tool_name.to_string()).or_insert(0);
                let key = format!("{}#{}", inv.tool_name, ordinal);
                *ordinal += 1;
                key
            }
        }
    }

    /// Index of the tool-call step for `key`, creating it if needed.
    fn call_step(
        &mut self,
        key: &str,
        tool: &str,
        turn_index: usize,
        status: StepStatus,
    ) -> usize {
        if let Some(&idx) = self.calls.get(key) {
            return idx;
        }
        let idx = self.steps.len();
        self.steps.push(ProgressStep {
            id: format!("toolcall-{}-{}-{}", tool, self.index, self.tool_calls),
            kind: StepKind::ToolCall,
            label: format!("invoking `{tool}`"),
            status,
            tool_name: Some(tool.to_string()),
            source_turn_index: turn_index,
        });
        self.tool_calls += 1;
        self.calls.insert(key.to_string(), idx);
        idx
    }

    fn tool_step(&mut self, inv: &Invocation<'_>, turn_index: usize, in_last_turn: bool) {
        let key = self.invocation_key(inv);
        let tool = inv.tool_name;

        match inv.phase {
            ToolPhase::Partial | ToolPhase::Requested => {
                let status = self.live_status(in_last_turn);
                self.call_step(&key, tool, turn_index, status);
            }
            ToolPhase::Completed => {
                let idx = self.call_step(&key, tool, turn_index, StepStatus::Completed);
                let step = &mut self.steps[idx];
                step.status = StepStatus::Completed;
                step.label = format!("invoked `{tool}`");

                if self.resulted.insert(key) {
                    self.steps.push(ProgressStep {
                        id: format!("toolresult-{}-{}-{}", tool, self.index, self.tool_results),
                        kind: StepKind::ToolResult,
                        label: format!("result from `{tool}`"),
                        status: StepStatus::Completed,
                        tool_name: Some(tool.to_string()),
                        source_turn_index: turn_index,
                    });
                    self.tool_results += 1;
                }
            }
            ToolPhase::Errored => {
                let idx = self.call_step(&key, tool, turn_index, StepStatus::Completed);
                let step = &mut self.steps[idx];
                if inv.is_cancelled() {
                    step.status = StepStatus::Cancelled;
                    step.label = format!("cancelled `{tool}`");
                } else {
                    step.status = StepStatus::Completed;
                    step.label = format!("failed `{tool}`");
                }
            }
        }
    }

    fn counts(&self) -> SessionCounts {
        let mut urls = BTreeSet::new();
        for &i in &self.group.agents {
            for part in &self.turns[i].parts {
                if let Some(ToolOutcome::Result(output)) = decode(part).invocation().map(|inv| inv.outcome) {
                    collect_urls(output, &mut urls);
                }
            }
        }

        let end = self.group.agents.last().map(|&i| i + 1).unwrap_or(self.group.user + 1);
        let tree = build_tree(&self.turns[self.group.user..end]);

        SessionCounts {
            findings: self.resulted.len(),
            axioms: tree.stats().axioms,
            sources: urls.len(),
        }
    }
}

/// Reasoning label: the first [`THINKING_PREVIEW_CHARS`] characters.
fn preview(text: &str) -> String {
    if text.chars().count() > THINKING_PREVIEW_CHARS {
        let cut: String = text.chars().take(THINKING_PREVIEW_CHARS).collect();
        format!("{cut}...")
    } else {
        text.to_string()
    }
}

/// Collect every `url` string field reachable in a tool output.
fn collect_urls(value: &Value, out: &mut BTreeSet<String>) {
    match value {
        Value::Object(map) => {
            for (key, v) in map {
                match v {
                    Value::String(s) if key == "url" && !s.is_empty() => {
                        out.insert(s.clone());
                    }
                    _ => collect_urls(v, out),
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_urls(v, out)),
        _ => {}
    }
}

// ── Website result ──────────────────────────────────────────────────────

/// Generated page produced by the dev surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebsiteResult {
    pub html: String,
}

/// Newest text part that parses as a JSON object with an `html` field.
pub fn website_result(turns: &[Turn]) -> Option<WebsiteResult> {
    turns
        .iter()
        .rev()
        .flat_map(|t| t.parts.iter().rev())
        .find_map(|part| {
            let Part::Text { text } = part else {
                return None;
            };
            let value: Value = serde_json::from_str(strip_fence(text)).ok()?;
            let html = value.as_object()?.get("html")?;
            Some(WebsiteResult {
                html: html.as_str().unwrap_or_default().to_string(),
            })
        })
}

/// Strip a surrounding ```json fence if the model added one.
fn strip_fence(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tracefold_core::CANCELLED_MESSAGE;
    use tracefold_core::turn::ToolPart;

    fn build(turns: &[Turn], status: StreamStatus) -> Vec<Session> {
        build_progress(turns, status, MilestoneLabels::WEBSITE)
    }

    #[test]
    fn empty_log_has_no_sessions() {
        assert!(build(&[], StreamStatus::Idle).is_empty());
    }

    #[test]
    fn agent_turns_before_first_user_turn_are_ignored() {
        let turns = vec![Turn::agent(vec![Part::text("hello")]), Turn::user("hi")];
        let sessions = build(&turns, StreamStatus::Idle);
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].steps.len(), 1);
    }

    #[test]
    fn submitted_session_is_initializing() {
        let turns = vec![Turn::user("build a landing page")];
        let sessions = build(&turns, StreamStatus::Streaming);
        assert_eq!(sessions[0].prompt, "build a landing page");
        assert_eq!(sessions[0].steps[0].id, "init-0");
        assert_eq!(sessions[0].steps[0].status, StepStatus::Active);
        assert!(sessions[0].is_active);
        assert!(!sessions[0].completed);
    }

    #[test]
    fn long_reasoning_label_is_truncated() {
        let reasoning = "a".repeat(250);
        let turns = vec![Turn::user("q"), Turn::agent(vec![Part::reasoning(reasoning)])];
        let sessions = build(&turns, StreamStatus::Idle);
        let thinking = &sessions[0].steps[1];
        assert_eq!(thinking.kind, StepKind::Thinking);
        assert_eq!(thinking.label, format!("{}...", "a".repeat(100)));
    }

    #[test]
    fn short_reasoning_is_kept_verbatim() {
        let turns = vec![Turn::user("q"), Turn::agent(vec![Part::reasoning("short")])];
        let sessions = build(&turns, StreamStatus::Idle);
        assert_eq!(sessions[0].steps[1].label, "short");
    }

    #[test]
    fn last_reasoning_part_is_active_while_streaming() {
        let turns = vec![
            Turn::user("q"),
            Turn::agent(vec![Part::reasoning("one"), Part::reasoning("two")]),
        ];
        let sessions = build(&turns, StreamStatus::Streaming);
        assert_eq!(sessions[0].steps[1].status, StepStatus::Completed);
        assert_eq!(sessions[0].steps[2].status, StepStatus::Active);
    }

    #[test]
    fn tool_lifecycle_produces_call_and_result_steps() {
        let turns = vec![
            Turn::user("q"),
            Turn::agent(vec![
                ToolPart::completed("c1", "searchWeb", json!({"query": "x"}), json!({"results": []}))
                    .into_part(),
            ]),
            Turn::agent(vec![ToolPart::requested("c2", "extractWebContent", json!({})).into_part()]),
        ];
        let sessions = build(&turns, StreamStatus::Streaming);
        let steps = &sessions[0].steps;

        assert_eq!(steps[1].id, "toolcall-searchWeb-0-0");
        assert_eq!(steps[1].label, "invoked `searchWeb`");
        assert_eq!(steps[1].status, StepStatus::Completed);
        assert_eq!(steps[2].id, "toolresult-searchWeb-0-0");
        assert_eq!(steps[2].label, "result from `searchWeb`");
        assert_eq!(steps[3].id, "toolcall-extractWebContent-0-1");
        assert_eq!(steps[3].label, "invoking `extractWebContent`");
        assert_eq!(steps[3].status, StepStatus::Active);
    }

    #[test]
    fn pending_call_outside_last_turn_is_completed() {
        let turns = vec![
            Turn::user("q"),
            Turn::agent(vec![ToolPart::requested("c1", "searchWeb", json!({})).into_part()]),
            Turn::agent(vec![Part::reasoning("next")]),
        ];
        let sessions = build(&turns, StreamStatus::Streaming);
        assert_eq!(sessions[0].steps[1].status, StepStatus::Completed);
    }

    #[test]
    fn duplicate_call_parts_are_folded_once() {
        let turns = vec![
            Turn::user("q"),
            Turn::agent(vec![
                ToolPart::requested("c1", "searchWeb", json!({})).into_part(),
                ToolPart::completed("c1", "searchWeb", json!({}), json!({})).into_part(),
            ]),
        ];
        let sessions = build(&turns, StreamStatus::Idle);
        let calls = sessions[0]
            .steps
            .iter()
            .filter(|s| s.kind == StepKind::ToolCall)
            .count();
        assert_eq!(calls, 1);
        assert_eq!(sessions[0].counts.findings, 1);
    }

    #[test]
    fn abort_cancels_active_call_only() {
        let mut cancelled = ToolPart::errored("c2", "extractWebContent", json!({}), CANCELLED_MESSAGE);
        cancelled.cancelled = true;
        let before = vec![
            Turn::user("q"),
            Turn::agent(vec![
                ToolPart::completed("c1", "searchWeb", json!({}), json!({})).into_part(),
                ToolPart::requested("c2", "extractWebContent", json!({})).into_part(),
            ]),
        ];
        let after = vec![
            before[0].clone(),
            Turn::agent(vec![
                ToolPart::completed("c1", "searchWeb", json!({}), json!({})).into_part(),
                cancelled.into_part(),
            ]),
        ];

        let streaming = build(&before, StreamStatus::Streaming);
        assert_eq!(streaming[0].steps[3].status, StepStatus::Active);

        let stopped = build(&after, StreamStatus::Idle);
        assert_eq!(stopped[0].steps[1], {
            let mut s = streaming[0].steps[1].clone();
            s.status = StepStatus::Completed;
            s
        });
        assert_eq!(stopped[0].steps[2], streaming[0].steps[2]);
        assert_eq!(stopped[0].steps[3].status, StepStatus::Cancelled);
        assert_eq!(stopped[0].steps[3].label, "cancelled `extractWebContent`");
    }

    #[test]
    fn failed_tool_is_not_cancelled() {
        let turns = vec![
            Turn::user("q"),
            Turn::agent(vec![ToolPart::errored("c1", "searchWeb", json!({}), "HTTP 500").into_part()]),
        ];
        let sessions = build(&turns, StreamStatus::Idle);
        assert_eq!(sessions[0].steps[1].status, StepStatus::Completed);
        assert_eq!(sessions[0].steps[1].label, "failed `searchWeb`");
    }

    #[test]
    fn milestone_follows_text() {
        let turns = vec![Turn::user("q"), Turn::agent(vec![Part::text("{\"html\": \"<p>\"}")])];
        let live = build(&turns, StreamStatus::Streaming);
        let last = live[0].steps.last().unwrap();
        assert_eq!(last.id, "creating-website-0");
        assert_eq!(last.label, "Creating website...");
        assert_eq!(last.status, StepStatus::Active);

        let done = build(&turns, StreamStatus::Idle);
        let last = done[0].steps.last().unwrap();
        assert_eq!(last.label, "Website created!");
        assert_eq!(last.status, StepStatus::Completed);
        assert!(done[0].completed);
    }

    #[test]
    fn only_last_session_is_active() {
        let turns = vec![
            Turn::user("first"),
            Turn::agent(vec![Part::text("a")]),
            Turn::user("second"),
        ];
        let sessions = build_progress(&turns, StreamStatus::Streaming, MilestoneLabels::RESPONSE);
        assert!(!sessions[0].is_active);
        assert!(sessions[1].is_active);
        assert_eq!(sessions[0].steps.last().unwrap().label, "Response ready");
        assert_eq!(sessions[1].steps[0].id, "init-1");
    }

    #[test]
    fn user_turn_without_text_uses_default_prompt() {
        let turn: Turn = serde_json::from_value(json!({
            "role": "user",
            "parts": [{"type": "file", "url": "x"}]
        }))
        .unwrap();
        let sessions = build(&[turn], StreamStatus::Idle);
        assert_eq!(sessions[0].prompt, DEFAULT_PROMPT);
    }

    #[test]
    fn rebuild_is_deterministic() {
        let turns = vec![
            Turn::user("q"),
            Turn::agent(vec![
                Part::reasoning("plan"),
                ToolPart::requested("c1", "searchWeb", json!({})).into_part(),
            ]),
        ];
        assert_eq!(
            build(&turns, StreamStatus::Streaming),
            build(&turns, StreamStatus::Streaming)
        );
    }

    #[test]
    fn anonymous_resolution_pairs_with_its_request() {
        let mut requested = ToolPart::requested("x", "searchWeb", json!({}));
        requested.tool_call_id = None;
        let mut completed = requested.clone();
        completed.state = "output-available".into();
        completed.output = Some(json!({}));
        let turns = vec![
            Turn::user("q"),
            Turn::agent(vec![requested.into_part()]),
            Turn::agent(vec![completed.into_part()]),
        ];
        let sessions = build(&turns, StreamStatus::Idle);
        let steps = &sessions[0].steps;

        let calls: Vec<_> = steps
            .iter()
            .filter(|s| s.kind == StepKind::ToolCall)
            .map(|s| s.label.as_str())
            .collect();
        assert_eq!(calls, vec!["invoked `searchWeb`"]);
        let results = steps.iter().filter(|s| s.kind == StepKind::ToolResult).count();
        assert_eq!(results, 1);
    }

    #[test]
    fn separate_anonymous_calls_keep_separate_steps() {
        let mut first = ToolPart::completed("x", "searchWeb", json!({}), json!({}));
        first.tool_call_id = None;
        let second = first.clone();
        let turns = vec![
            Turn::user("q"),
            Turn::agent(vec![first.into_part(), second.into_part()]),
        ];
        let sessions = build(&turns, StreamStatus::Idle);
        let calls = sessions[0]
            .steps
            .iter()
            .filter(|s| s.kind == StepKind::ToolCall)
            .count();
        assert_eq!(calls, 2);
        assert_eq!(sessions[0].counts.findings, 2);
    }

    #[test]
    fn counts_sources_and_axioms() {
        let turns = vec![
            Turn::user("q"),
            Turn::agent(vec![
                ToolPart::completed(
                    "c1",
                    "searchWeb",
                    json!({}),
                    json!({"results": [{"url": "https://a.example"}, {"url": "https://b.example"}]}),
                )
                .into_part(),
                ToolPart::completed(
                    "c2",
                    "extractWebContent",
                    json!({}),
                    json!({"results": [{"url": "https://a.example"}]}),
                )
                .into_part(),
                ToolPart::requested(
                    "c3",
                    "upsertConceptNode",
                    json!({"nodeId": "n0", "concept": "X", "parentId": null, "depth": 0, "status": "completed", "isAxiom": true}),
                )
                .into_part(),
            ]),
        ];
        let counts = build(&turns, StreamStatus::Idle)[0].counts;
        assert_eq!(counts.findings, 2);
        assert_eq!(counts.sources, 2);
        assert_eq!(counts.axioms, 1);
    }

    #[test]
    fn latest_step_prefers_active() {
        let turns = vec![
            Turn::user("q"),
            Turn::agent(vec![ToolPart::requested("c1", "searchWeb", json!({})).into_part()]),
        ];
        let live = build(&turns, StreamStatus::Streaming);
        assert_eq!(latest_step(&live).unwrap().label, "invoking `searchWeb`");

        let idle = build(&[Turn::user("q")], StreamStatus::Idle);
        assert_eq!(latest_step(&idle).unwrap().kind, StepKind::Initializing);
        assert!(latest_step(&[]).is_none());
    }

    #[test]
    fn website_result_reads_newest_html() {
        let turns = vec![
            Turn::user("q"),
            Turn::agent(vec![Part::text(r#"{"html": "<h1>old</h1>"}"#)]),
            Turn::user("again"),
            Turn::agent(vec![
                Part::text("```json\n{\"html\": \"<h1>new</h1>\"}\n```"),
                Part::text("not json"),
            ]),
        ];
        assert_eq!(website_result(&turns).unwrap().html, "<h1>new</h1>");
        assert!(website_result(&[Turn::user("plain")]).is_none());
    }

    #[test]
    fn session_serializes_camel_case() {
        let sessions = build(&[Turn::user("q")], StreamStatus::Idle);
        let json = serde_json::to_value(&sessions[0]).unwrap();
        assert_eq!(json["isActive"], false);
        assert_eq!(json["steps"][0]["kind"], "initializing");
        assert_eq!(json["steps"][0]["sourceTurnIndex"], 0);
    }
}

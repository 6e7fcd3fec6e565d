//! Rebuilding view models from a saved log.
//!
//! Two input shapes are accepted:
//! - a JSON array of turns, as a front-end would persist them
//! - JSON lines mixing turns (objects with a `role`) and stream events
//!   (objects with a `type`), as captured from a surface's SSE stream
//!
//! Events are folded into the log in file order, so a capture of a live
//! request replays to the same sessions the client saw.

use serde_json::{Value, json};
use tracefold_agent::Surface;
use tracefold_core::{AgentStreamEvent, EventLog, StreamStatus, Turn};
use tracefold_view::{build_progress, build_tree, error_banner, latest_step, website_result};

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("line {line}: {source}")]
    Line {
        line: usize,
        source: serde_json::Error,
    },

    #[error("line {line}: expected a turn or a stream event")]
    Unrecognized { line: usize },

    #[error("invalid log: {0}")]
    Json(#[from] serde_json::Error),
}

/// Parse a saved log into an [`EventLog`].
pub fn load_log(input: &str) -> Result<EventLog, ReplayError> {
    if input.trim_start().starts_with('[') {
        let turns: Vec<Turn> = serde_json::from_str(input)?;
        return Ok(EventLog::from_turns(turns));
    }

    let mut log = EventLog::new();
    for (i, line) in input.lines().enumerate() {
        let line_no = i + 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(line).map_err(|source| ReplayError::Line {
            line: line_no,
            source,
        })?;

        if value.get("role").is_some() {
            let turn: Turn = serde_json::from_value(value).map_err(|source| ReplayError::Line {
                line: line_no,
                source,
            })?;
            let user = turn.is_user();
            log.push_turn(turn);
            if user {
                log.set_status(StreamStatus::Submitted);
            }
        } else if value.get("type").is_some() {
            let event: AgentStreamEvent =
                serde_json::from_value(value).map_err(|source| ReplayError::Line {
                    line: line_no,
                    source,
                })?;
            log.apply(&event);
        } else {
            return Err(ReplayError::Unrecognized { line: line_no });
        }
    }
    Ok(log)
}

/// Rebuild the view model a surface would render for `input`.
///
/// Research logs yield the concept tree; chat and dev logs yield progress
/// sessions. `status` overrides the status recovered from the log.
pub fn replay(
    input: &str,
    surface: Surface,
    status: Option<StreamStatus>,
) -> Result<Value, ReplayError> {
    let log = load_log(input)?;
    let turns = log.turns();

    if surface == Surface::Research {
        let tree = build_tree(turns);
        return Ok(json!({
            "tree": tree,
            "complete": tree.is_research_complete(),
            "knowledge": tree.knowledge(),
        }));
    }

    let sessions = build_progress(
        turns,
        status.unwrap_or(log.status()),
        surface.milestone(),
    );
    let mut view = json!({
        "sessions": sessions,
        "latestStep": latest_step(&sessions),
    });
    if surface == Surface::Dev
        && let Some(website) = website_result(turns)
    {
        view["website"] = json!(website);
    }
    if let Some(error) = log.last_error() {
        view["banner"] = json!(error_banner(error));
    }
    Ok(view)
}

/// Parse a `--status` value.
pub fn parse_status(s: &str) -> Result<StreamStatus, String> {
    match s.to_ascii_lowercase().as_str() {
        "idle" => Ok(StreamStatus::Idle),
        "submitted" => Ok(StreamStatus::Submitted),
        "streaming" => Ok(StreamStatus::Streaming),
        "error" => Ok(StreamStatus::Error),
        other => Err(format!(
            "unknown status '{other}' (expected idle, submitted, streaming or error)"
        )),
    }
}

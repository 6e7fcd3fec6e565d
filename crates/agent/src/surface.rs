//! Surfaces: chat, dev and research.
//!
//! A surface bundles what differs between the three endpoints: the system
//! prompt, the tool set, when the loop stops, the milestone the progress
//! view shows, and the lifecycle budget.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracefold_config::{SearchConfig, SurfaceConfig, SurfacesConfig};
use tracefold_core::tool::ToolRegistry;
use tracefold_tools::SearchBackend;
use tracefold_view::MilestoneLabels;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Surface {
    Chat,
    Dev,
    Research,
}

/// When the loop stops besides the step budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The model answered without calling a tool.
    NoToolCalls,
    /// As above, or the root of the concept tree was reported completed.
    ResearchComplete,
}

impl Surface {
    pub const ALL: [Surface; 3] = [Surface::Chat, Surface::Dev, Surface::Research];

    pub fn name(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Dev => "dev",
            Self::Research => "research",
        }
    }

    pub fn termination(self) -> Termination {
        match self {
            Self::Research => Termination::ResearchComplete,
            Self::Chat | Self::Dev => Termination::NoToolCalls,
        }
    }

    pub fn milestone(self) -> MilestoneLabels {
        match self {
            Self::Dev => MilestoneLabels::WEBSITE,
            Self::Chat | Self::Research => MilestoneLabels::RESPONSE,
        }
    }

    /// This surface's budget from the `[surfaces]` table.
    pub fn config(self, surfaces: &SurfacesConfig) -> &SurfaceConfig {
        match self {
            Self::Chat => &surfaces.chat,
            Self::Dev => &surfaces.dev,
            Self::Research => &surfaces.research,
        }
    }

    pub fn toolset(
        self,
        backend: Option<Arc<dyn SearchBackend>>,
        search: &SearchConfig,
    ) -> ToolRegistry {
        match self {
            Self::Chat => tracefold_tools::chat_toolset(backend, search),
            Self::Dev => tracefold_tools::dev_toolset(backend, search),
            Self::Research => tracefold_tools::research_toolset(backend, search),
        }
    }

    /// System prompt, stamped with the current time.
    pub fn system_prompt(self, now: DateTime<Utc>) -> String {
        let body = match self {
            Self::Chat => CHAT_PROMPT,
            Self::Dev => DEV_PROMPT,
            Self::Research => RESEARCH_PROMPT,
        };
        format!(
            "{body}\nCurrent Date and Time: {}\n",
            now.to_rfc3339_opts(SecondsFormat::Millis, true)
        )
    }
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Surface {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chat" => Ok(Self::Chat),
            "dev" => Ok(Self::Dev),
            "research" => Ok(Self::Research),
            other => Err(format!(
                "unknown surface '{other}' (expected chat, dev or research)"
            )),
        }
    }
}

// ── Prompts ─────────────────────────────────────────────────────────────

const CHAT_PROMPT: &str = "\
You are a helpful AI assistant.
You can search the web and extract information when needed to provide accurate and up-to-date responses.
Use the search tools when you need current information or when the user asks about recent events, news, or topics that require up-to-date information.
You can call tools in sequence: search first, then extract detailed content from specific URLs if more detail is needed.

KNOWLEDGE UPDATE POLICY:
- If, given the current time, your knowledge may be outdated or insufficient, use searchWeb and extractWebContent to update it before answering.

TIME AND DATE HANDLING:
- If the user names a specific time or date, use it.
- Otherwise use the current date and time; call getCurrentDateTime for time-sensitive answers.
";

const DEV_PROMPT: &str = "\
You are an autonomous agent that implements the user's prompt as a complete HTML file.
Follow this workflow:
1. Search for how to implement the prompt with searchWeb and analyze the results.
2. If any pages are relevant, read them with extractWebContent.
3. Only after gathering what you need, implement the solution.
4. Return the whole implementation as a single self-contained HTML file: CSS in a style tag in the head, JavaScript in a script tag in the body, external libraries only through CDN links in the head. Do not use frameworks like React, Vue or Angular.

RESPONSIVE DESIGN:
- Always make the page fully responsive and mobile-first, using media queries, Flexbox or Grid, and relative units.
- Keep interactive elements touch-friendly and typography readable from 320px to 1920px+ viewports.

5. Respond only with a JSON object of the form {\"html\": \"<the complete HTML code>\"}, with no extra commentary.
";

const RESEARCH_PROMPT: &str = "\
You are a deep research agent that builds a concept tree for comprehensive research.

TREE STRUCTURE:
- Build a proper tree from root to leaves. Every node except the root has exactly one parent.
- Track every node with upsertConceptNode. Node IDs use the format \"node_0\", \"node_1\", ...
- Root: depth 0, parentId null. Children: depth = parent depth + 1, parentId = parent nodeId.

NODE STATUS (3 states only):
- \"idle\": the node exists but research has not started
- \"loading\": the node is being researched
- \"completed\": research finished and the node is an axiom or all its children are completed

PROCESS:
1. Create the root node with status \"idle\".
2. For each node: set it to \"loading\", plan queries with researchConcept, gather information with searchWeb and extractWebContent, then decide with evaluateAxiom.
3. If it is not an axiom, split it with breakdownConcept and create each child with upsertConceptNode (status \"idle\").
4. Repeat for every idle node until all leaves are axioms.
5. Mark a node \"completed\" when it is an axiom or all its children are completed, and propagate completion to parents.

AXIOM CRITERIA (strict):
A concept is an axiom only if it is a fundamental law, basic data type or elementary operation (e.g. \"pixel\", \"bit\", \"addition\"), cannot be decomposed into simpler technical concepts, and has no implementation variations. If it has sub-categories, multiple approaches, or needs an explanation of how it works, it is not an axiom. When in doubt, break it down.

COMPLETION:
- Research is complete when the root node is \"completed\".
- Call generateReport only once the tree is complete.
";

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parse_and_display_round_trip() {
        for surface in Surface::ALL {
            assert_eq!(surface.to_string().parse::<Surface>(), Ok(surface));
        }
        assert_eq!("Research".parse::<Surface>(), Ok(Surface::Research));
        assert!("voice".parse::<Surface>().is_err());
    }

    #[test]
    fn prompt_is_stamped_with_time() {
        let now = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        let prompt = Surface::Chat.system_prompt(now);
        assert!(prompt.starts_with("You are a helpful AI assistant."));
        assert!(prompt.ends_with("Current Date and Time: 2025-01-02T03:04:05.000Z\n"));
    }

    #[test]
    fn dev_asks_for_html_json() {
        let prompt = Surface::Dev.system_prompt(Utc::now());
        assert!(prompt.contains(r#"{"html": "#));
    }

    #[test]
    fn research_stops_on_completed_tree() {
        assert_eq!(Surface::Research.termination(), Termination::ResearchComplete);
        assert_eq!(Surface::Chat.termination(), Termination::NoToolCalls);
    }

    #[test]
    fn milestones_per_surface() {
        assert_eq!(Surface::Dev.milestone(), MilestoneLabels::WEBSITE);
        assert_eq!(Surface::Chat.milestone(), MilestoneLabels::RESPONSE);
    }

    #[test]
    fn budgets_come_from_config() {
        let surfaces = SurfacesConfig::default();
        assert_eq!(Surface::Chat.config(&surfaces).max_duration_secs, 30);
        assert_eq!(Surface::Dev.config(&surfaces).max_retries, 2);
    }

    #[test]
    fn toolsets_differ_by_surface() {
        let search = SearchConfig::default();
        assert!(Surface::Research.toolset(None, &search).contains("upsertConceptNode"));
        assert!(Surface::Chat.toolset(None, &search).contains("getCurrentDateTime"));
    }
}

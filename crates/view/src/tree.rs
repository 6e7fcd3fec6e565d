//! Concept tree reconstruction for the research surface.
//!
//! The research agent reports its tree through two tool contracts: a node
//! upsert and a batch breakdown of a parent into children. [`build_tree`]
//! folds those invocations, in log order, into a node map and then derives
//! the edge set from the nodes' `parentId` fields. Edges are never cached,
//! so a child that arrives before its parent is connected as soon as the
//! parent shows up.
//!
//! The tree mirrors what the agent asserted. Completion is not propagated
//! from children to parents.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracefold_core::decode::{Decoded, ToolPhase, decode};
use tracefold_core::turn::Turn;
use tracing::trace;

// ── Node ────────────────────────────────────────────────────────────────

/// Research status of a node as reported by the agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    #[default]
    Idle,
    Loading,
    Completed,
}

impl NodeStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(Self::Idle),
            "loading" => Some(Self::Loading),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Loading => write!(f, "loading"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptNode {
    pub node_id: String,
    pub concept: String,
    /// Fixed at first sight.
    pub parent_id: Option<String>,
    /// Fixed at first sight.
    pub depth: u32,
    pub status: NodeStatus,
    pub is_axiom: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub research_notes: Option<String>,
}

/// A derived `parent → child` edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptEdge {
    pub id: String,
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeStats {
    pub total_nodes: usize,
    pub axioms: usize,
    pub concepts: usize,
    pub idle: usize,
    pub loading: usize,
    pub completed: usize,
}

// ── Tree ────────────────────────────────────────────────────────────────

/// Nodes in first-seen order plus the edges derived from them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptTree {
    nodes: Vec<ConceptNode>,
    edges: Vec<ConceptEdge>,
    root: Option<String>,
    stats: TreeStats,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl ConceptTree {
    pub fn nodes(&self) -> &[ConceptNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[ConceptEdge] {
        &self.edges
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, node_id: &str) -> Option<&ConceptNode> {
        self.index.get(node_id).map(|&i| &self.nodes[i])
    }

    /// The first parentless node seen.
    pub fn root(&self) -> Option<&ConceptNode> {
        self.root.as_deref().and_then(|id| self.node(id))
    }

    pub fn children(&self, node_id: &str) -> Vec<&ConceptNode> {
        self.nodes
            .iter()
            .filter(|n| n.parent_id.as_deref() == Some(node_id))
            .collect()
    }

    /// Nodes whose parent has not been reported (yet).
    pub fn dangling(&self) -> Vec<&ConceptNode> {
        self.nodes
            .iter()
            .filter(|n| {
                n.parent_id
                    .as_deref()
                    .is_some_and(|p| !self.index.contains_key(p))
            })
            .collect()
    }

    pub fn stats(&self) -> TreeStats {
        self.stats
    }

    pub fn max_depth(&self) -> u32 {
        self.nodes.iter().map(|n| n.depth).max().unwrap_or(0)
    }

    /// Research ends when the root is reported completed.
    pub fn is_research_complete(&self) -> bool {
        self.root()
            .is_some_and(|root| root.status == NodeStatus::Completed)
    }

    /// Axioms rendered as a plain-text knowledge file, one paragraph each.
    pub fn knowledge(&self) -> String {
        self.nodes
            .iter()
            .filter(|n| n.is_axiom)
            .map(|n| {
                let notes = n
                    .research_notes
                    .as_deref()
                    .filter(|s| !s.is_empty())
                    .unwrap_or("Fundamental axiom");
                format!("{}: {}", n.concept, notes)
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    // ── Fold ────────────────────────────────────────────────────────────

    fn insert(&mut self, node: ConceptNode) {
        if node.parent_id.is_none() && self.root.is_none() {
            self.root = Some(node.node_id.clone());
        }
        self.index.insert(node.node_id.clone(), self.nodes.len());
        self.nodes.push(node);
    }

    fn get_mut(&mut self, node_id: &str) -> Option<&mut ConceptNode> {
        self.index.get(node_id).map(|&i| &mut self.nodes[i])
    }

    fn apply_upsert(&mut self, payload: &Value) {
        let Some(node_id) = str_field(payload, &["nodeId"]) else {
            trace!("upsert without nodeId skipped");
            return;
        };
        let concept = str_field(payload, &["concept"]);
        let status = str_field(payload, &["status"]).and_then(NodeStatus::parse);
        let is_axiom = payload.get("isAxiom").and_then(Value::as_bool);
        let notes = str_field(payload, &["notes", "researchData"]);

        if let Some(node) = self.get_mut(node_id) {
            if let Some(concept) = concept {
                node.concept = concept.to_string();
            }
            if let Some(status) = status {
                node.status = status;
            }
            if let Some(is_axiom) = is_axiom {
                node.is_axiom = is_axiom;
            }
            if let Some(notes) = notes {
                node.research_notes = Some(notes.to_string());
            }
            return;
        }

        let parent_id = str_field(payload, &["parentId"]).map(str::to_string);
        let depth = payload
            .get("depth")
            .and_then(Value::as_u64)
            .and_then(|d| u32::try_from(d).ok())
            .unwrap_or_else(|| self.child_depth(parent_id.as_deref()));

        self.insert(ConceptNode {
            node_id: node_id.to_string(),
            concept: concept.unwrap_or_default().to_string(),
            parent_id,
            depth,
            status: status.unwrap_or_default(),
            is_axiom: is_axiom.unwrap_or(false),
            research_notes: notes.map(str::to_string),
        });
    }

    fn apply_breakdown(&mut self, payload: &Value) {
        let Some(parent_id) = str_field(payload, &["parentNodeId", "parentId"]) else {
            trace!("breakdown without parentNodeId skipped");
            return;
        };
        let children = payload
            .get("children")
            .or_else(|| payload.get("subConcepts"))
            .and_then(Value::as_array);
        let depth = self.child_depth(Some(parent_id));
        let root = self.root.clone();

        for child in children.into_iter().flatten() {
            let Some(child_id) = str_field(child, &["nodeId"]) else {
                continue;
            };
            if child_id == parent_id {
                continue;
            }
            let concept = str_field(child, &["concept"]);
            let is_axiom = child.get("isAxiom").and_then(Value::as_bool);
            let reasoning = str_field(child, &["reasoning"]);

            match self.get_mut(child_id) {
                Some(node) => {
                    if let Some(concept) = concept {
                        node.concept = concept.to_string();
                    }
                    if let Some(is_axiom) = is_axiom {
                        node.is_axiom = is_axiom;
                    }
                    if node.research_notes.is_none() {
                        node.research_notes = reasoning.map(str::to_string);
                    }
                    if node.parent_id.is_none() && root.as_deref() != Some(child_id) {
                        node.parent_id = Some(parent_id.to_string());
                    }
                }
                None => self.insert(ConceptNode {
                    node_id: child_id.to_string(),
                    concept: concept.unwrap_or_default().to_string(),
                    parent_id: Some(parent_id.to_string()),
                    depth,
                    status: NodeStatus::Idle,
                    is_axiom: is_axiom.unwrap_or(false),
                    research_notes: reasoning.map(str::to_string),
                }),
            }
        }

        let summary = str_field(payload, &["summary", "researchSummary"]);
        if let (Some(summary), Some(parent)) = (summary, self.get_mut(parent_id))
            && parent.research_notes.is_none()
        {
            parent.research_notes = Some(summary.to_string());
        }
    }

    fn child_depth(&self, parent_id: Option<&str>) -> u32 {
        match parent_id {
            None => 0,
            Some(p) => self.node(p).map(|n| n.depth + 1).unwrap_or(1),
        }
    }

    fn finish(mut self) -> Self {
        self.edges = self
            .nodes
            .iter()
            .filter_map(|n| {
                let parent = n.parent_id.as_deref()?;
                (parent != n.node_id && self.index.contains_key(parent)).then(|| ConceptEdge {
                    id: format!("edge-{}-{}", parent, n.node_id),
                    source: parent.to_string(),
                    target: n.node_id.clone(),
                })
            })
            .collect();

        let mut stats = TreeStats {
            total_nodes: self.nodes.len(),
            ..TreeStats::default()
        };
        for node in &self.nodes {
            if node.is_axiom {
                stats.axioms += 1;
            }
            match node.status {
                NodeStatus::Idle => stats.idle += 1,
                NodeStatus::Loading => stats.loading += 1,
                NodeStatus::Completed => stats.completed += 1,
            }
        }
        stats.concepts = stats.total_nodes - stats.axioms;
        self.stats = stats;
        self
    }
}

/// Non-empty string value of the first key present.
fn str_field<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|k| value.get(*k).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
}

/// Tool names that upsert a single node.
pub const UPSERT_TOOLS: &[&str] = &["upsertConceptNode", "updateResearchTree"];

/// Tool names that announce a breakdown.
pub const BREAKDOWN_TOOLS: &[&str] = &["breakdownConcept", "breakDownConcept"];

/// Fold every tree-tool invocation in `turns` into a concept tree.
///
/// Invocations count once they are fully specified (requested) or resolved
/// (completed); streaming and failed invocations are ignored. A resolved
/// invocation is read from its input overlaid with its output.
pub fn build_tree(turns: &[Turn]) -> ConceptTree {
    let mut tree = ConceptTree::default();

    for part in turns
        .iter()
        .filter(|t| t.is_agent())
        .flat_map(|t| t.parts.iter())
    {
        let inv = match decode(part) {
            Decoded::Invocation(inv) => inv,
            Decoded::NotApplicable => continue,
            Decoded::Unclassified { reason } => {
                trace!(%reason, "skipping unclassified tool part");
                continue;
            }
        };
        if !matches!(inv.phase, ToolPhase::Requested | ToolPhase::Completed) {
            continue;
        }

        if UPSERT_TOOLS.contains(&inv.tool_name) {
            tree.apply_upsert(&inv.merged_payload());
        } else if BREAKDOWN_TOOLS.contains(&inv.tool_name) {
            tree.apply_breakdown(&inv.merged_payload());
        }
    }

    tree.finish()
}

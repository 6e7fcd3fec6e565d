//! Research tree tools.
//!
//! These tools do no work of their own: they validate the model's arguments
//! and echo them back. The concept tree is rebuilt from those echoes, so the
//! output field names below are a contract with the tree builder.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracefold_core::error::ToolError;
use tracefold_core::tool::Tool;

fn parse<T: for<'de> Deserialize<'de>>(arguments: Value) -> Result<T, ToolError> {
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

fn echo<T: Serialize>(args: &T) -> Result<Value, ToolError> {
    serde_json::to_value(args).map_err(|e| ToolError::ExecutionFailed {
        tool_name: "research".into(),
        reason: e.to_string(),
    })
}

fn require(field: &str, value: &str) -> Result<(), ToolError> {
    if value.trim().is_empty() {
        return Err(ToolError::InvalidArguments(format!("'{field}' must not be empty")));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum NodeState {
    Idle,
    Loading,
    Completed,
}

// ── upsertConceptNode ───────────────────────────────────────────────────

pub struct UpsertConceptNodeTool;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertArgs {
    node_id: String,
    concept: String,
    parent_id: Option<String>,
    depth: u32,
    status: NodeState,
    is_axiom: bool,
    notes: Option<String>,
}

#[async_trait]
impl Tool for UpsertConceptNodeTool {
    fn name(&self) -> &str {
        "upsertConceptNode"
    }

    fn description(&self) -> &str {
        "Create or update a node of the research tree. Call it whenever a concept is added or its status changes."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "nodeId": {"type": "string", "description": "Unique node id, e.g. node_0"},
                "concept": {"type": "string", "description": "The concept this node represents"},
                "parentId": {"type": ["string", "null"], "description": "Parent node id, null for the root"},
                "depth": {"type": "integer", "minimum": 0, "description": "Depth in the tree, 0 for the root"},
                "status": {
                    "type": "string",
                    "enum": ["idle", "loading", "completed"],
                    "description": "idle (not started), loading (researching), completed (axiom or all children completed)"
                },
                "isAxiom": {"type": "boolean", "description": "Whether this concept is an axiom"},
                "notes": {"type": ["string", "null"], "description": "Research findings for this concept"}
            },
            "required": ["nodeId", "concept", "parentId", "depth", "status", "isAxiom", "notes"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let args: UpsertArgs = parse(arguments)?;
        require("nodeId", &args.node_id)?;
        if args.parent_id.as_deref() == Some(args.node_id.as_str()) {
            return Err(ToolError::InvalidArguments(
                "a node cannot be its own parent".into(),
            ));
        }
        echo(&args)
    }
}

// ── breakdownConcept ────────────────────────────────────────────────────

pub struct BreakdownConceptTool;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubConcept {
    node_id: String,
    concept: String,
    is_axiom: bool,
    reasoning: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BreakdownArgs {
    parent_node_id: String,
    concept: String,
    summary: String,
    children: Vec<SubConcept>,
}

#[async_trait]
impl Tool for BreakdownConceptTool {
    fn name(&self) -> &str {
        "breakdownConcept"
    }

    fn description(&self) -> &str {
        "Break a researched concept down into smaller concepts or axioms based on the research findings."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "parentNodeId": {"type": "string", "description": "The node being broken down"},
                "concept": {"type": "string", "description": "The concept being broken down"},
                "summary": {"type": "string", "description": "Summary of the research findings"},
                "children": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "nodeId": {"type": "string"},
                            "concept": {"type": "string"},
                            "isAxiom": {"type": "boolean"},
                            "reasoning": {"type": "string", "description": "Why this is or is not an axiom"}
                        },
                        "required": ["nodeId", "concept", "isAxiom", "reasoning"]
                    }
                }
            },
            "required": ["parentNodeId", "concept", "summary", "children"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let args: BreakdownArgs = parse(arguments)?;
        require("parentNodeId", &args.parent_node_id)?;

        let mut output = echo(&args)?;
        output["message"] = Value::String(format!(
            "Broke down \"{}\" into {} sub-concepts",
            args.concept,
            args.children.len()
        ));
        Ok(output)
    }
}

// ── researchConcept ─────────────────────────────────────────────────────

pub struct ResearchConceptTool;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResearchArgs {
    node_id: String,
    concept: String,
    search_queries: Vec<String>,
}

#[async_trait]
impl Tool for ResearchConceptTool {
    fn name(&self) -> &str {
        "researchConcept"
    }

    fn description(&self) -> &str {
        "Plan the web searches for one concept. Run the planned queries with searchWeb afterwards."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "nodeId": {"type": "string"},
                "concept": {"type": "string"},
                "searchQueries": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Search queries covering the concept from several angles"
                }
            },
            "required": ["nodeId", "concept", "searchQueries"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let args: ResearchArgs = parse(arguments)?;
        let mut output = echo(&args)?;
        output["status"] =
            "Research queries prepared - use searchWeb tool to execute these queries".into();
        Ok(output)
    }
}

// ── evaluateAxiom ───────────────────────────────────────────────────────

pub struct EvaluateAxiomTool;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EvaluateArgs {
    node_id: String,
    concept: String,
    #[serde(alias = "researchFindings")]
    findings: String,
    is_axiom: bool,
    reasoning: String,
    confidence: f64,
}

#[async_trait]
impl Tool for EvaluateAxiomTool {
    fn name(&self) -> &str {
        "evaluateAxiom"
    }

    fn description(&self) -> &str {
        "Decide whether a researched concept is a fundamental axiom that needs no further breakdown."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "nodeId": {"type": "string"},
                "concept": {"type": "string"},
                "findings": {"type": "string", "description": "Research findings about the concept"},
                "isAxiom": {"type": "boolean"},
                "reasoning": {"type": "string"},
                "confidence": {"type": "number", "minimum": 0, "maximum": 1}
            },
            "required": ["nodeId", "concept", "findings", "isAxiom", "reasoning", "confidence"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let args: EvaluateArgs = parse(arguments)?;
        if !(0.0..=1.0).contains(&args.confidence) {
            return Err(ToolError::InvalidArguments(format!(
                "'confidence' must be between 0 and 1, got {}",
                args.confidence
            )));
        }

        let verdict = if args.is_axiom {
            "an axiom"
        } else {
            "requiring further breakdown"
        };
        let mut output = echo(&args)?;
        output["evaluation"] = Value::String(format!(
            "Evaluated \"{}\" as {} with {}% confidence",
            args.concept,
            verdict,
            (args.confidence * 100.0).round() as u32
        ));
        Ok(output)
    }
}

// ── generateReport ──────────────────────────────────────────────────────

pub struct GenerateReportTool;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportArgs {
    title: String,
    summary: String,
    key_findings: Vec<String>,
    conclusions: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    methodology: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    total_nodes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    axiom_nodes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    research_depth: Option<u32>,
}

#[async_trait]
impl Tool for GenerateReportTool {
    fn name(&self) -> &str {
        "generateReport"
    }

    fn description(&self) -> &str {
        "Write the final research report once the root concept is completed."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": {"type": "string"},
                "summary": {"type": "string", "description": "Executive summary"},
                "keyFindings": {"type": "array", "items": {"type": "string"}},
                "conclusions": {"type": "string"},
                "methodology": {"type": ["string", "null"]},
                "totalNodes": {"type": ["integer", "null"], "minimum": 0},
                "axiomNodes": {"type": ["integer", "null"], "minimum": 0},
                "researchDepth": {"type": ["integer", "null"], "minimum": 0}
            },
            "required": ["title", "summary", "keyFindings", "conclusions"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let args: ReportArgs = parse(arguments)?;
        require("title", &args.title)?;
        let mut output = echo(&args)?;
        output["status"] = "Comprehensive research report generated".into();
        Ok(output)
    }
}

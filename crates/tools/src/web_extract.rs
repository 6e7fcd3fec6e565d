//! `extractWebContent`: full-page content for URLs found by `searchWeb`.

use crate::search::{ExtractRequest, SearchBackend};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracefold_core::error::ToolError;
use tracefold_core::tool::Tool;

pub const EXTRACT_UNAVAILABLE: &str = "Content extraction is not available. Please set TAVILY_API_KEY environment variable to enable content extraction functionality.";

pub struct ExtractWebContentTool {
    backend: Option<Arc<dyn SearchBackend>>,
}

impl ExtractWebContentTool {
    pub fn new(backend: Option<Arc<dyn SearchBackend>>) -> Self {
        Self { backend }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Args {
    urls: Vec<String>,
    include_images: Option<bool>,
    extract_depth: Option<String>,
    format: Option<String>,
}

#[async_trait]
impl Tool for ExtractWebContentTool {
    fn name(&self) -> &str {
        "extractWebContent"
    }

    fn description(&self) -> &str {
        "Extract detailed content from specific web pages for in-depth analysis, usually after getting initial results from searchWeb."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "urls": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "URLs to extract content from"
                },
                "includeImages": {
                    "type": ["boolean", "null"],
                    "description": "Include images found on the pages"
                },
                "extractDepth": {
                    "type": ["string", "null"],
                    "enum": ["basic", "advanced", null],
                    "description": "Extraction depth - basic or advanced"
                },
                "format": {
                    "type": ["string", "null"],
                    "enum": ["markdown", "text", null],
                    "description": "Output format"
                }
            },
            "required": ["urls"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let args: Args = serde_json::from_value(arguments)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        if args.urls.is_empty() {
            return Err(ToolError::InvalidArguments("'urls' must not be empty".into()));
        }

        let Some(backend) = &self.backend else {
            return Ok(Value::String(EXTRACT_UNAVAILABLE.into()));
        };

        let request = ExtractRequest {
            urls: args.urls,
            extract_depth: args.extract_depth.unwrap_or_else(|| "basic".into()),
            format: args.format.unwrap_or_else(|| "markdown".into()),
            include_images: args.include_images,
        };

        let response = backend
            .extract(&request)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: e.to_string(),
            })?;

        let results: Vec<Value> = response
            .results
            .iter()
            .map(|page| json!({"url": page.url, "content": page.text()}))
            .collect();

        let mut output = json!({ "results": results });
        if !response.failed.is_empty() {
            output["failed"] = json!(response.failed);
        }
        Ok(output)
    }
}

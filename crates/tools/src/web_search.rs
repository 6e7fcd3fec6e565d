//! `searchWeb`: web search over the configured [`SearchBackend`].
//!
//! Without a backend the tool still answers, telling the model that search
//! is unavailable, so conversations keep going without a search key.

use crate::search::{SearchBackend, SearchRequest};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracefold_config::SearchConfig;
use tracefold_core::error::ToolError;
use tracefold_core::tool::Tool;

pub const SEARCH_UNAVAILABLE: &str = "Web search is not available. Please set TAVILY_API_KEY environment variable to enable web search functionality.";

const MAX_RESULTS_LIMIT: u32 = 20;

pub struct SearchWebTool {
    backend: Option<Arc<dyn SearchBackend>>,
    max_results: u32,
    search_depth: String,
}

impl SearchWebTool {
    pub fn new(backend: Option<Arc<dyn SearchBackend>>, config: &SearchConfig) -> Self {
        Self {
            backend,
            max_results: config.max_results,
            search_depth: config.search_depth.clone(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Args {
    query: String,
    max_results: Option<u32>,
    search_depth: Option<String>,
    topic: Option<String>,
    time_range: Option<String>,
    days: Option<u32>,
    include_answer: Option<bool>,
    include_domains: Option<Vec<String>>,
    exclude_domains: Option<Vec<String>>,
}

#[async_trait]
impl Tool for SearchWebTool {
    fn name(&self) -> &str {
        "searchWeb"
    }

    fn description(&self) -> &str {
        "Search the web for current information, news, or any topic you need to research. After getting results, use extractWebContent to read specific URLs in detail."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query to find relevant information"
                },
                "maxResults": {
                    "type": ["integer", "null"],
                    "minimum": 0,
                    "maximum": MAX_RESULTS_LIMIT,
                    "description": "Maximum number of search results"
                },
                "searchDepth": {
                    "type": ["string", "null"],
                    "enum": ["basic", "advanced", null],
                    "description": "Search depth - basic (1 credit) or advanced (2 credits)"
                },
                "topic": {
                    "type": ["string", "null"],
                    "enum": ["general", "news", null],
                    "description": "'news' for real-time updates, 'general' for broader searches"
                },
                "timeRange": {
                    "type": ["string", "null"],
                    "enum": ["day", "week", "month", "year", null],
                    "description": "Time range back from the current date"
                },
                "days": {
                    "type": ["integer", "null"],
                    "minimum": 1,
                    "description": "Number of days back (news topic only)"
                },
                "includeAnswer": {
                    "type": ["boolean", "null"],
                    "description": "Include a generated short answer"
                },
                "includeDomains": {
                    "type": ["array", "null"],
                    "items": {"type": "string"},
                    "description": "Only return results from these domains"
                },
                "excludeDomains": {
                    "type": ["array", "null"],
                    "items": {"type": "string"},
                    "description": "Never return results from these domains"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let args: Args = serde_json::from_value(arguments)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        if args.query.trim().is_empty() {
            return Err(ToolError::InvalidArguments("'query' must not be empty".into()));
        }

        let Some(backend) = &self.backend else {
            return Ok(Value::String(SEARCH_UNAVAILABLE.into()));
        };

        let request = SearchRequest {
            max_results: args
                .max_results
                .unwrap_or(self.max_results)
                .min(MAX_RESULTS_LIMIT),
            search_depth: args
                .search_depth
                .unwrap_or_else(|| self.search_depth.clone()),
            topic: args.topic,
            time_range: args.time_range,
            days: args.days,
            include_answer: args.include_answer,
            include_domains: args.include_domains.unwrap_or_default(),
            exclude_domains: args.exclude_domains.unwrap_or_default(),
            ..SearchRequest::new(args.query, 0, "")
        };

        let response = backend
            .search(&request)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: e.to_string(),
            })?;

        let empty = response.results.is_empty();
        let mut output = json!({
            "query": request.query,
            "results": response.results,
        });
        if let Some(answer) = response.answer {
            output["answer"] = Value::String(answer);
        }
        if empty {
            output["note"] = "No results found.".into();
        }
        Ok(output)
    }
}

//! Tool implementations for tracefold.
//!
//! Tools give the agent its reach: web search and page extraction through
//! a [`SearchBackend`], the server clock, and the research-tree tools whose
//! echoed arguments drive the concept tree view.
//!
//! Each surface gets its own registry from the `*_toolset` functions.

pub mod datetime;
pub mod research;
pub mod search;
pub mod web_extract;
pub mod web_search;

use std::sync::Arc;
use tracefold_config::SearchConfig;
use tracefold_core::tool::ToolRegistry;

pub use datetime::GetCurrentDateTimeTool;
pub use research::{
    BreakdownConceptTool, EvaluateAxiomTool, GenerateReportTool, ResearchConceptTool,
    UpsertConceptNodeTool,
};
pub use search::{SearchBackend, SearchError, TavilyBackend};
pub use web_extract::ExtractWebContentTool;
pub use web_search::SearchWebTool;

/// `searchWeb` and `extractWebContent` sharing one backend.
fn web_tools(backend: Option<Arc<dyn SearchBackend>>, config: &SearchConfig) -> ToolRegistry {
    ToolRegistry::new()
        .with(Arc::new(SearchWebTool::new(backend.clone(), config)))
        .with(Arc::new(ExtractWebContentTool::new(backend)))
}

/// General chat: web search, extraction and the clock.
pub fn chat_toolset(backend: Option<Arc<dyn SearchBackend>>, config: &SearchConfig) -> ToolRegistry {
    web_tools(backend, config).with(Arc::new(GetCurrentDateTimeTool::new()))
}

/// Website generation: same reach as chat.
pub fn dev_toolset(backend: Option<Arc<dyn SearchBackend>>, config: &SearchConfig) -> ToolRegistry {
    chat_toolset(backend, config)
}

/// Research: web search, extraction and the research-tree tools.
pub fn research_toolset(
    backend: Option<Arc<dyn SearchBackend>>,
    config: &SearchConfig,
) -> ToolRegistry {
    web_tools(backend, config)
        .with(Arc::new(UpsertConceptNodeTool))
        .with(Arc::new(BreakdownConceptTool))
        .with(Arc::new(ResearchConceptTool))
        .with(Arc::new(EvaluateAxiomTool))
        .with(Arc::new(GenerateReportTool))
}

//! View models derived from the conversation event log.
//!
//! Every builder here is a pure function of the turn sequence (and, for
//! progress, the transport status). Callers rebuild from scratch after each
//! change to the log; equal inputs always produce equal outputs, including
//! step ids.
//!
//! - [`progress`]: linear progress sessions for the chat and dev surfaces
//! - [`tree`]: the concept tree driven by the research tools
//! - [`banner`]: user-facing rendering of transport errors

pub mod banner;
pub mod progress;
pub mod tree;

pub use banner::{ErrorBanner, error_banner};
pub use progress::{
    MilestoneLabels, ProgressStep, Session, SessionCounts, StepKind, StepStatus, WebsiteResult,
    build_progress, latest_step, website_result,
};
pub use tree::{ConceptEdge, ConceptNode, ConceptTree, NodeStatus, TreeStats, build_tree};

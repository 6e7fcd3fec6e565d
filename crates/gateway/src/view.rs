//! View endpoints: the same builders a front-end would run, over HTTP.
//!
//! - `POST /api/view/progress`: `{messages, status?, surface?, error?}` → sessions
//! - `POST /api/view/tree`: `{messages}` → concept tree

use axum::Json;
use axum::body::Bytes;
use serde::{Deserialize, Serialize};
use tracefold_agent::Surface;
use tracefold_core::StreamStatus;
use tracefold_view::{
    ConceptTree, ErrorBanner, ProgressStep, Session, WebsiteResult, build_progress, build_tree,
    error_banner, latest_step, website_result,
};

use crate::stream::{BodyError, parse_body};

#[derive(Debug, Default, Deserialize)]
struct ProgressOptions {
    #[serde(default)]
    status: Option<StreamStatus>,
    #[serde(default)]
    surface: Option<Surface>,
    /// Last transport error, rendered as a banner.
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressView {
    pub sessions: Vec<Session>,
    pub latest_step: Option<ProgressStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<WebsiteResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub banner: Option<ErrorBanner>,
}

pub(crate) async fn progress_handler(body: Bytes) -> Result<Json<ProgressView>, BodyError> {
    let (value, turns) = parse_body(&body)?;
    let options: ProgressOptions =
        serde_json::from_value(value).map_err(|e| BodyError::Malformed(e.to_string()))?;

    let surface = options.surface.unwrap_or(Surface::Chat);
    let sessions = build_progress(
        &turns,
        options.status.unwrap_or_default(),
        surface.milestone(),
    );
    let latest_step = latest_step(&sessions).cloned();
    let website = (surface == Surface::Dev)
        .then(|| website_result(&turns))
        .flatten();

    Ok(Json(ProgressView {
        sessions,
        latest_step,
        website,
        banner: options.error.as_deref().map(error_banner),
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeView {
    pub tree: ConceptTree,
    pub complete: bool,
    pub knowledge: String,
}

pub(crate) async fn tree_handler(body: Bytes) -> Result<Json<TreeView>, BodyError> {
    let (_, turns) = parse_body(&body)?;
    let tree = build_tree(&turns);
    Ok(Json(TreeView {
        complete: tree.is_research_complete(),
        knowledge: tree.knowledge(),
        tree,
    }))
}

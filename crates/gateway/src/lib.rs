//! HTTP gateway for tracefold.
//!
//! Exposes the three streaming surfaces, the view builders, and a health
//! check. Every surface request gets its own `RequestController`: the
//! controller's deadline, the surface's wall-clock budget and the client
//! connection all end the same request.
//!
//! Built on Axum.

pub mod stream;
pub mod view;

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    http::{Method, header},
    response::Json,
    routing::{get, post},
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

use tracefold_agent::{AgentRunner, Surface};
use tracefold_config::AppConfig;
use tracefold_core::event::EventBus;
use tracefold_core::provider::Provider;
use tracefold_tools::{SearchBackend, TavilyBackend};

/// Shared application state for the gateway.
pub struct GatewayState {
    pub config: AppConfig,
    pub event_bus: Arc<EventBus>,
    chat: AgentRunner,
    dev: AgentRunner,
    research: AgentRunner,
}

pub type SharedState = Arc<GatewayState>;

impl GatewayState {
    /// Build one runner per surface over a shared provider and search backend.
    pub fn new(
        config: AppConfig,
        provider: Arc<dyn Provider>,
        backend: Option<Arc<dyn SearchBackend>>,
    ) -> Self {
        let event_bus = Arc::new(EventBus::default());
        let runner = |surface| {
            AgentRunner::from_config(provider.clone(), surface, backend.clone(), &config)
                .with_event_bus(event_bus.clone())
        };
        Self {
            chat: runner(Surface::Chat),
            dev: runner(Surface::Dev),
            research: runner(Surface::Research),
            event_bus,
            config,
        }
    }

    pub fn runner(&self, surface: Surface) -> &AgentRunner {
        match surface {
            Surface::Chat => &self.chat,
            Surface::Dev => &self.dev,
            Surface::Research => &self.research,
        }
    }
}

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    let cors = state.config.gateway.cors.then(|| {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE])
            .max_age(std::time::Duration::from_secs(3600))
    });

    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/api/chat", post(stream::chat_handler))
        .route("/api/dev", post(stream::dev_handler))
        .route("/api/research", post(stream::research_handler))
        .route("/api/view/progress", post(view::progress_handler))
        .route("/api/view/tree", post(view::tree_handler))
        .with_state(state)
        .layer(DefaultBodyLimit::max(8 * 1024 * 1024)); // long research logs

    let router = match cors {
        Some(cors) => router.layer(cors),
        None => router,
    };
    router.layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let provider = tracefold_providers::build_from_config(&config.provider)?;
    let backend = TavilyBackend::from_config(&config.search);
    if backend.is_none() {
        warn!("TAVILY_API_KEY not set; searchWeb and extractWebContent are disabled");
    }

    let state = Arc::new(GatewayState::new(config, provider, backend));
    spawn_event_logger(&state.event_bus);

    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Log domain events until the bus is dropped.
fn spawn_event_logger(bus: &EventBus) {
    let mut events = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => debug!(kind = event.name(), event = ?event, "domain event"),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "Event logger lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    surfaces: [&'static str; 3],
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        surfaces: Surface::ALL.map(Surface::name),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use tracefold_core::error::ProviderError;
    use tracefold_core::message::Message;
    use tracefold_core::provider::{ProviderRequest, ProviderResponse, Usage};

    /// Lightweight mock provider for gateway tests.
    struct MockProvider {
        response_text: String,
    }

    #[async_trait::async_trait]
    impl Provider for MockProvider {
        fn name(&self) -> &str {
            "gateway_mock"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            Ok(ProviderResponse {
                message: Message::assistant(&self.response_text),
                reasoning: None,
                usage: Some(Usage {
                    prompt_tokens: 10,
                    completion_tokens: 5,
                    total_tokens: 15,
                }),
                model: "mock-model".into(),
            })
        }
    }

    /// Never answers.
    struct StalledProvider;

    #[async_trait::async_trait]
    impl Provider for StalledProvider {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            std::future::pending().await
        }
    }

    fn app_with(provider: Arc<dyn Provider>) -> Router {
        let state = GatewayState::new(AppConfig::default(), provider, None);
        build_router(Arc::new(state))
    }

    fn app() -> Router {
        app_with(Arc::new(MockProvider {
            response_text: "Mock response from agent".into(),
        }))
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn health_endpoint() {
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["surfaces"], json!(["chat", "dev", "research"]));
    }

    #[tokio::test]
    async fn non_array_messages_is_bad_request() {
        for uri in ["/api/chat", "/api/dev", "/api/research"] {
            let response = app()
                .oneshot(post_json(uri, r#"{"messages": "hello"}"#))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(body_text(response).await, "Invalid messages format");
        }
    }

    #[tokio::test]
    async fn unparseable_body_is_server_error() {
        let response = app()
            .oneshot(post_json("/api/chat", "{oops"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body_text(response).await.is_empty());
    }

    #[tokio::test]
    async fn chat_streams_sse_events() {
        let response = app()
            .oneshot(post_json(
                "/api/chat",
                r#"{"messages": [{"role": "user", "content": "hi"}]}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            response.headers()["content-type"]
                .to_str()
                .unwrap()
                .starts_with("text/event-stream")
        );

        let body = body_text(response).await;
        assert!(body.contains("event: text_delta"));
        assert!(body.contains("Mock response from agent"));
        assert!(body.contains("event: step_finish"));
        assert!(body.contains("event: done"));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_request_times_out() {
        let response = app_with(Arc::new(StalledProvider))
            .oneshot(post_json(
                "/api/chat",
                r#"{"messages": [{"role": "user", "content": "hi"}]}"#,
            ))
            .await
            .unwrap();

        let body = body_text(response).await;
        assert!(body.contains("event: error"));
        assert!(body.contains("request timed out after 30s"));
    }

    #[tokio::test]
    async fn progress_view_builds_sessions() {
        let body = json!({
            "messages": [
                {"role": "user", "content": "Build a page"},
                {"role": "assistant", "parts": [
                    {"type": "tool-invocation", "toolInvocation": {
                        "toolCallId": "c1", "toolName": "searchWeb",
                        "state": "result", "args": {"query": "x"},
                        "result": {"results": [{"url": "https://a.example"}]}
                    }},
                    {"type": "text", "text": "{\"html\": \"<p>hi</p>\"}"}
                ]}
            ],
            "status": "idle",
            "surface": "dev",
            "error": "Request timed out"
        });
        let response = app()
            .oneshot(post_json("/api/view/progress", &body.to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json: Value = serde_json::from_str(&body_text(response).await).unwrap();
        let session = &json["sessions"][0];
        assert_eq!(session["prompt"], "Build a page");
        assert_eq!(session["counts"]["sources"], 1);
        assert_eq!(json["website"]["html"], "<p>hi</p>");
        assert!(json["banner"]["hint"].is_string());
    }

    #[tokio::test]
    async fn tree_view_builds_tree() {
        let body = json!({
            "messages": [
                {"role": "user", "content": "pixels"},
                {"role": "assistant", "parts": [
                    {"type": "tool-invocation", "toolInvocation": {
                        "toolCallId": "c1", "toolName": "upsertConceptNode",
                        "state": "result",
                        "args": {"nodeId": "node_0", "concept": "Pixel", "parentId": null,
                                 "depth": 0, "status": "completed", "isAxiom": true},
                        "result": {"nodeId": "node_0", "concept": "Pixel", "parentId": null,
                                   "depth": 0, "status": "completed", "isAxiom": true}
                    }}
                ]}
            ]
        });
        let response = app()
            .oneshot(post_json("/api/view/tree", &body.to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(json["tree"]["nodes"][0]["nodeId"], "node_0");
        assert_eq!(json["tree"]["edges"], json!([]));
        assert_eq!(json["complete"], true);
    }

    #[tokio::test]
    async fn view_rejects_non_array_messages() {
        let response = app()
            .oneshot(post_json("/api/view/tree", r#"{"messages": {}}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

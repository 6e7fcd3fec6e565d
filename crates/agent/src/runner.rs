//! The streaming agent runner.

use crate::surface::{Surface, Termination};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracefold_config::AppConfig;
use tracefold_core::error::{Error, LifecycleError, ProviderError, ToolError};
use tracefold_core::event::{DomainEvent, EventBus};
use tracefold_core::message::{Message, MessageToolCall, messages_from_turns};
use tracefold_core::provider::{Provider, ProviderRequest, Usage};
use tracefold_core::tool::{ToolCall, ToolRegistry};
use tracefold_core::{AgentStreamEvent, CANCELLED_MESSAGE, EventLog, Turn};
use tracefold_lifecycle::RequestController;
use tracefold_tools::SearchBackend;
use tracefold_view::build_tree;
use tracing::{debug, info, warn};

/// Runs one surface's agent loop against a provider.
///
/// Cheap to clone: the provider, tools and event bus are shared.
#[derive(Clone)]
pub struct AgentRunner {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    surface: Surface,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    max_steps: usize,
    event_bus: Arc<EventBus>,
}

impl AgentRunner {
    pub fn new(provider: Arc<dyn Provider>, surface: Surface, tools: ToolRegistry) -> Self {
        Self {
            provider,
            tools: Arc::new(tools),
            surface,
            model: "gpt-4o".into(),
            temperature: 0.7,
            max_tokens: None,
            max_steps: 100,
            event_bus: Arc::new(EventBus::default()),
        }
    }

    /// Build a runner for `surface` with its tool set and budget from `config`.
    pub fn from_config(
        provider: Arc<dyn Provider>,
        surface: Surface,
        backend: Option<Arc<dyn SearchBackend>>,
        config: &AppConfig,
    ) -> Self {
        Self::new(provider, surface, surface.toolset(backend, &config.search))
            .with_model(&config.provider.model)
            .with_temperature(config.provider.temperature)
            .with_max_tokens(config.provider.max_tokens)
            .with_max_steps(surface.config(&config.surfaces).max_steps)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Model round-trips before the loop stops.
    pub fn with_max_steps(mut self, max: usize) -> Self {
        self.max_steps = max;
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn surface(&self) -> Surface {
        self.surface
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Run the loop over `turns` in a background task.
    ///
    /// The returned stream always ends with `done` or `error`. Cancelling
    /// the controller's token stops the loop; unresolved tool calls of the
    /// current step are reported as cancelled before the final `error`.
    pub fn run_stream(
        &self,
        turns: Vec<Turn>,
        controller: RequestController,
    ) -> mpsc::Receiver<AgentStreamEvent> {
        let (tx, rx) = mpsc::channel(64);
        let runner = self.clone();
        tokio::spawn(async move {
            runner.drive(turns, controller, tx).await;
        });
        rx
    }

    async fn drive(
        self,
        turns: Vec<Turn>,
        controller: RequestController,
        tx: mpsc::Sender<AgentStreamEvent>,
    ) {
        let request_id = uuid::Uuid::new_v4().to_string();
        let started = Instant::now();
        info!(%request_id, surface = %self.surface, turns = turns.len(), "Agent run started");
        self.event_bus.publish(DomainEvent::RequestStarted {
            request_id: request_id.clone(),
            surface: self.surface.to_string(),
            timestamp: Utc::now(),
        });

        let mut run = Run {
            tx,
            log: EventLog::from_turns(turns),
            steps: 0,
            tool_calls_made: 0,
            usage: None,
        };

        let result = self.run_steps(&controller, &mut run).await;
        let outcome = match &result {
            Ok(()) => "completed",
            Err(Error::Lifecycle(LifecycleError::Aborted)) => "aborted",
            Err(Error::Lifecycle(LifecycleError::TimedOut { .. })) => "timed-out",
            Err(_) => "failed",
        };

        match result {
            Ok(()) => {
                controller.complete();
                run.emit(AgentStreamEvent::Done {
                    request_id: request_id.clone(),
                    steps: run.steps,
                    tool_calls_made: run.tool_calls_made,
                    usage: run.usage,
                })
                .await;
            }
            Err(e) => {
                warn!(%request_id, error = %e, "Agent run failed");
                self.event_bus.publish(DomainEvent::ErrorOccurred {
                    context: format!("agent:{}", self.surface),
                    error_message: e.to_string(),
                    timestamp: Utc::now(),
                });
                run.emit(AgentStreamEvent::Error {
                    message: error_message(&e),
                })
                .await;
            }
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        info!(%request_id, outcome, steps = run.steps, duration_ms, "Agent run finished");
        self.event_bus.publish(DomainEvent::RequestFinished {
            request_id,
            outcome: outcome.into(),
            steps: run.steps,
            duration_ms,
            timestamp: Utc::now(),
        });
    }

    async fn run_steps(&self, controller: &RequestController, run: &mut Run) -> Result<(), Error> {
        let system = Message::system(self.surface.system_prompt(Utc::now()));
        let definitions = self.tools.definitions();
        let token = controller.token();
        let provider = self.provider.as_ref();

        loop {
            if run.steps >= self.max_steps {
                warn!(max_steps = self.max_steps, "Max steps reached, stopping");
                return Ok(());
            }
            run.steps += 1;
            let step = run.steps;
            debug!(step, surface = %self.surface, "Agent step");

            let mut messages = vec![system.clone()];
            messages.extend(messages_from_turns(run.log.turns()));
            let request = ProviderRequest {
                model: self.model.clone(),
                messages,
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                tools: definitions.clone(),
                stream: true,
            };

            // Only opening the stream is retried; a broken stream ends the run.
            let mut chunks = controller
                .retry_if(|| provider.stream(request.clone()), ProviderError::is_transient)
                .await?;

            let mut calls = Vec::new();
            loop {
                let chunk = tokio::select! {
                    biased;
                    _ = token.cancelled() => return Err(controller.cancellation_error().into()),
                    chunk = chunks.recv() => chunk,
                };
                let Some(chunk) = chunk else { break };
                let chunk = chunk?;

                if let Some(delta) = chunk.reasoning {
                    run.emit(AgentStreamEvent::ReasoningDelta { delta }).await;
                }
                if let Some(delta) = chunk.content {
                    run.emit(AgentStreamEvent::TextDelta { delta }).await;
                }
                if let Some(usage) = &chunk.usage {
                    run.usage.get_or_insert_with(Usage::default).add(usage);
                }
                if chunk.done {
                    calls = chunk.tool_calls;
                    break;
                }
            }

            if calls.is_empty() {
                run.emit(AgentStreamEvent::StepFinish { step }).await;
                return Ok(());
            }

            debug!(step, tool_count = calls.len(), "Executing tool calls");
            for call in &calls {
                run.emit(AgentStreamEvent::ToolInputStart {
                    tool_call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                })
                .await;
            }

            for (index, call) in calls.iter().enumerate() {
                if token.is_cancelled() {
                    run.cancel_calls(&calls[index..]).await;
                    self.publish_cancelled(calls.len() - index);
                    return Err(controller.cancellation_error().into());
                }

                let input = match parse_arguments(&call.arguments) {
                    Ok(input) => input,
                    Err(e) => {
                        run.emit(AgentStreamEvent::ToolCall {
                            tool_call_id: call.id.clone(),
                            tool_name: call.name.clone(),
                            input: Value::String(call.arguments.clone()),
                        })
                        .await;
                        run.emit(tool_error(call, &e)).await;
                        continue;
                    }
                };

                run.emit(AgentStreamEvent::ToolCall {
                    tool_call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    input: input.clone(),
                })
                .await;

                let tool_call = ToolCall {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    arguments: input,
                };
                let start = Instant::now();
                let result = tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        run.cancel_calls(&calls[index..]).await;
                        self.publish_cancelled(calls.len() - index);
                        return Err(controller.cancellation_error().into());
                    }
                    result = self.tools.execute(&tool_call) => result,
                };
                let duration_ms = start.elapsed().as_millis() as u64;
                run.tool_calls_made += 1;

                self.event_bus.publish(DomainEvent::ToolExecuted {
                    tool_name: call.name.clone(),
                    success: result.is_ok(),
                    duration_ms,
                    timestamp: Utc::now(),
                });

                match result {
                    Ok(output) => {
                        run.emit(AgentStreamEvent::ToolResult {
                            tool_call_id: call.id.clone(),
                            tool_name: call.name.clone(),
                            output,
                        })
                        .await;
                    }
                    Err(e) => {
                        warn!(tool = %call.name, error = %e, "Tool execution failed");
                        run.emit(tool_error(call, &e)).await;
                    }
                }
            }

            run.emit(AgentStreamEvent::StepFinish { step }).await;

            if self.surface.termination() == Termination::ResearchComplete
                && build_tree(current_session(run.log.turns())).is_research_complete()
            {
                info!(step, "Research tree complete, stopping");
                return Ok(());
            }
        }
    }

    fn publish_cancelled(&self, count: usize) {
        if count > 0 {
            self.event_bus.publish(DomainEvent::InvocationsCancelled {
                count,
                timestamp: Utc::now(),
            });
        }
    }
}

/// Per-request loop state. Every emitted event is also folded into `log`,
/// which is where the next step's messages come from.
struct Run {
    tx: mpsc::Sender<AgentStreamEvent>,
    log: EventLog,
    steps: usize,
    tool_calls_made: usize,
    usage: Option<Usage>,
}

impl Run {
    async fn emit(&mut self, event: AgentStreamEvent) {
        self.log.apply(&event);
        // A closed receiver means the client left; the controller handles that.
        let _ = self.tx.send(event).await;
    }

    async fn cancel_calls(&mut self, calls: &[MessageToolCall]) {
        for call in calls {
            self.emit(AgentStreamEvent::ToolError {
                tool_call_id: call.id.clone(),
                tool_name: call.name.clone(),
                error_text: CANCELLED_MESSAGE.into(),
                cancelled: true,
            })
            .await;
        }
    }
}

fn parse_arguments(raw: &str) -> Result<Value, ToolError> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(raw).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

fn tool_error(call: &MessageToolCall, error: &ToolError) -> AgentStreamEvent {
    AgentStreamEvent::ToolError {
        tool_call_id: call.id.clone(),
        tool_name: call.name.clone(),
        error_text: error.to_string(),
        cancelled: false,
    }
}

/// Turns after the last user turn.
fn current_session(turns: &[Turn]) -> &[Turn] {
    let start = turns.iter().rposition(Turn::is_user).map_or(0, |i| i + 1);
    &turns[start..]
}

/// The message clients see in the terminal `error` event.
fn error_message(error: &Error) -> String {
    match error {
        Error::Provider(e) => e.to_string(),
        Error::Lifecycle(e) => e.to_string(),
        Error::Tool(e) => e.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;
    use tracefold_core::provider::ProviderResponse;
    use tracefold_core::tool::Tool;
    use tracefold_lifecycle::{LifecyclePolicy, RequestState};

    /// Returns scripted responses in order and records every request.
    struct ScriptedProvider {
        script: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
        requests: Mutex<Vec<ProviderRequest>>,
    }

    impl ScriptedProvider {
        fn new(script: Vec<Result<ProviderResponse, ProviderError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<ProviderRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            self.requests.lock().unwrap().push(request);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .expect("script exhausted")
        }
    }

    fn text(content: &str) -> Result<ProviderResponse, ProviderError> {
        Ok(ProviderResponse {
            message: Message::assistant(content),
            reasoning: None,
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
            model: "mock-model".into(),
        })
    }

    fn calls(calls: Vec<(&str, &str, Value)>) -> Result<ProviderResponse, ProviderError> {
        let mut message = Message::assistant("");
        message.tool_calls = calls
            .into_iter()
            .map(|(id, name, args)| MessageToolCall {
                id: id.into(),
                name: name.into(),
                arguments: args.to_string(),
            })
            .collect();
        Ok(ProviderResponse {
            message,
            reasoning: Some("let me check".into()),
            usage: None,
            model: "mock-model".into(),
        })
    }

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echo the arguments"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
            Ok(json!({ "echo": arguments }))
        }
    }

    struct Hang;

    #[async_trait]
    impl Tool for Hang {
        fn name(&self) -> &str {
            "hang"
        }
        fn description(&self) -> &str {
            "Never returns"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, _: Value) -> Result<Value, ToolError> {
            std::future::pending().await
        }
    }

    fn runner(provider: Arc<ScriptedProvider>, surface: Surface, tools: ToolRegistry) -> AgentRunner {
        AgentRunner::new(provider, surface, tools).with_model("mock-model")
    }

    fn controller() -> RequestController {
        let controller = RequestController::new(LifecyclePolicy {
            timeout: Duration::from_secs(60),
            max_retries: 2,
            retry_delay: Duration::from_millis(100),
        });
        controller.arm();
        controller
    }

    async fn collect(mut rx: mpsc::Receiver<AgentStreamEvent>) -> Vec<AgentStreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    fn types(events: &[AgentStreamEvent]) -> Vec<&'static str> {
        events.iter().map(AgentStreamEvent::event_type).collect()
    }

    #[tokio::test]
    async fn text_answer_finishes_in_one_step() {
        let provider = ScriptedProvider::new(vec![text("Hello! How can I help?")]);
        let controller = controller();
        let agent = runner(provider.clone(), Surface::Chat, ToolRegistry::new());

        let events = collect(agent.run_stream(vec![Turn::user("Hello!")], controller.clone())).await;

        assert_eq!(types(&events), vec!["text_delta", "step_finish", "done"]);
        match events.last().unwrap() {
            AgentStreamEvent::Done { steps, tool_calls_made, usage, .. } => {
                assert_eq!(*steps, 1);
                assert_eq!(*tool_calls_made, 0);
                assert_eq!(usage.unwrap().total_tokens, 15);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(controller.state(), RequestState::Completed);

        let request = &provider.requests()[0];
        assert!(request.stream);
        assert!(request.messages[0].content.contains("Current Date and Time"));
        assert_eq!(request.messages[1].content, "Hello!");
    }

    #[tokio::test]
    async fn tool_results_feed_the_next_step() {
        let provider = ScriptedProvider::new(vec![
            calls(vec![("call_1", "echo", json!({"q": 1}))]),
            text("done"),
        ]);
        let agent = runner(provider.clone(), Surface::Chat, ToolRegistry::new().with(Arc::new(Echo)));

        let events = collect(agent.run_stream(vec![Turn::user("go")], controller())).await;

        assert_eq!(
            types(&events),
            vec![
                "reasoning_delta",
                "tool_input_start",
                "tool_call",
                "tool_result",
                "step_finish",
                "text_delta",
                "step_finish",
                "done",
            ]
        );
        assert!(matches!(
            &events[3],
            AgentStreamEvent::ToolResult { output, .. } if output["echo"]["q"] == 1
        ));

        let second = &provider.requests()[1];
        let tool_message = second.messages.last().unwrap();
        assert_eq!(tool_message.tool_call_id.as_deref(), Some("call_1"));
        assert!(tool_message.content.contains("echo"));
        assert_eq!(second.messages[second.messages.len() - 2].tool_calls[0].name, "echo");
    }

    #[tokio::test]
    async fn tool_failures_do_not_stop_the_loop() {
        let provider = ScriptedProvider::new(vec![
            calls(vec![("call_1", "missing", json!({}))]),
            text("recovered"),
        ]);
        let agent = runner(provider.clone(), Surface::Chat, ToolRegistry::new());

        let events = collect(agent.run_stream(vec![Turn::user("go")], controller())).await;

        let error = events
            .iter()
            .find(|e| e.event_type() == "tool_error")
            .unwrap();
        assert!(matches!(
            error,
            AgentStreamEvent::ToolError { error_text, cancelled: false, .. }
                if error_text.contains("Tool not found: missing")
        ));
        assert!(events.last().unwrap().event_type() == "done");
        assert!(provider.requests()[1].messages.last().unwrap().content.starts_with("Error: "));
    }

    #[tokio::test]
    async fn malformed_arguments_become_tool_errors() {
        let mut message = Message::assistant("");
        message.tool_calls = vec![MessageToolCall {
            id: "call_1".into(),
            name: "echo".into(),
            arguments: "{not json".into(),
        }];
        let provider = ScriptedProvider::new(vec![
            Ok(ProviderResponse {
                message,
                reasoning: None,
                usage: None,
                model: "m".into(),
            }),
            text("ok"),
        ]);
        let agent = runner(provider, Surface::Chat, ToolRegistry::new().with(Arc::new(Echo)));

        let events = collect(agent.run_stream(vec![Turn::user("go")], controller())).await;
        assert!(events.iter().any(|e| matches!(
            e,
            AgentStreamEvent::ToolError { error_text, .. } if error_text.starts_with("Invalid tool arguments")
        )));
    }

    #[tokio::test]
    async fn step_budget_is_enforced() {
        let looping = || calls(vec![("call", "echo", json!({}))]);
        let provider = ScriptedProvider::new(vec![looping(), looping(), looping()]);
        let agent = runner(provider.clone(), Surface::Chat, ToolRegistry::new().with(Arc::new(Echo)))
            .with_max_steps(2);

        let events = collect(agent.run_stream(vec![Turn::user("go")], controller())).await;

        assert!(matches!(
            events.last().unwrap(),
            AgentStreamEvent::Done { steps: 2, tool_calls_made: 2, .. }
        ));
        assert_eq!(provider.requests().len(), 2);
    }

    #[tokio::test]
    async fn research_stops_when_root_completes() {
        let root = json!({
            "nodeId": "node_0",
            "concept": "Pixels",
            "parentId": null,
            "depth": 0,
            "status": "completed",
            "isAxiom": true,
            "notes": null
        });
        // A second response would panic: the loop must stop first.
        let provider = ScriptedProvider::new(vec![calls(vec![(
            "call_1",
            "upsertConceptNode",
            root,
        )])]);
        let agent = runner(
            provider.clone(),
            Surface::Research,
            tracefold_tools::research_toolset(None, &Default::default()),
        );

        let events = collect(agent.run_stream(vec![Turn::user("pixels")], controller())).await;

        assert_eq!(events.last().unwrap().event_type(), "done");
        assert_eq!(provider.requests().len(), 1);
    }

    #[tokio::test]
    async fn abort_cancels_running_tool() {
        let provider = ScriptedProvider::new(vec![calls(vec![
            ("call_1", "hang", json!({})),
            ("call_2", "echo", json!({})),
        ])]);
        let controller = controller();
        let tools = ToolRegistry::new().with(Arc::new(Hang)).with(Arc::new(Echo));
        let agent = runner(provider, Surface::Chat, tools);

        let mut rx = agent.run_stream(vec![Turn::user("go")], controller.clone());
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            if event.event_type() == "tool_call" {
                controller.abort();
            }
            events.push(event);
        }

        let cancelled: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                AgentStreamEvent::ToolError { tool_call_id, cancelled: true, error_text, .. } => {
                    assert_eq!(error_text, CANCELLED_MESSAGE);
                    Some(tool_call_id.as_str())
                }
                _ => None,
            })
            .collect();
        assert_eq!(cancelled, vec!["call_1", "call_2"]);
        assert_eq!(
            events.last().unwrap(),
            &AgentStreamEvent::Error {
                message: "Request was aborted".into()
            }
        );
        assert_eq!(controller.state(), RequestState::Aborted);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_provider_errors_are_retried() {
        let provider = ScriptedProvider::new(vec![
            Err(ProviderError::Network("connection reset".into())),
            text("second time lucky"),
        ]);
        let agent = runner(provider.clone(), Surface::Chat, ToolRegistry::new());

        let events = collect(agent.run_stream(vec![Turn::user("go")], controller())).await;

        assert_eq!(events.last().unwrap().event_type(), "done");
        assert_eq!(provider.requests().len(), 2);
    }

    #[tokio::test]
    async fn permanent_provider_errors_end_the_stream() {
        let provider = ScriptedProvider::new(vec![Err(ProviderError::AuthenticationFailed(
            "bad key".into(),
        ))]);
        let bus = Arc::new(EventBus::default());
        let mut domain = bus.subscribe();
        let agent = runner(provider.clone(), Surface::Chat, ToolRegistry::new()).with_event_bus(bus);

        let events = collect(agent.run_stream(vec![Turn::user("go")], controller())).await;

        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            AgentStreamEvent::Error { message } if message.contains("Authentication failed: bad key")
        ));
        assert_eq!(provider.requests().len(), 1);

        let mut outcome = None;
        while let Ok(event) = domain.try_recv() {
            if let DomainEvent::RequestFinished { outcome: o, .. } = event.as_ref() {
                outcome = Some(o.clone());
            }
        }
        assert_eq!(outcome.as_deref(), Some("failed"));
    }
}

//! `tracefold chat`: run one surface in the terminal.
//!
//! Events from the agent loop are folded into a local [`EventLog`] and the
//! progress view is rebuilt after each one; step changes go to stderr and
//! answer text to stdout. Ctrl+C aborts the request in flight and cancels
//! its pending tool calls without leaving the REPL.

use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracefold_agent::{AgentRunner, Surface};
use tracefold_config::AppConfig;
use tracefold_core::{AgentStreamEvent, EventLog};
use tracefold_lifecycle::{LifecyclePolicy, RequestController, abort_and_cancel};
use tracefold_tools::TavilyBackend;
use tracefold_view::{build_progress, build_tree, error_banner, latest_step, website_result};
use tracing::{debug, info, warn};

pub async fn run(
    config: AppConfig,
    surface: Surface,
    message: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;

    let provider = tracefold_providers::build_from_config(&config.provider).inspect_err(|_| {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set TRACEFOLD_API_KEY or OPENAI_API_KEY, or add it to");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
    })?;
    let backend = TavilyBackend::from_config(&config.search);
    let search_enabled = backend.is_some();
    info!(%surface, model = %config.provider.model, search_enabled, "Terminal session starting");

    let runner = AgentRunner::from_config(provider, surface, backend, &config);
    let controller =
        RequestController::new(LifecyclePolicy::from(surface.config(&config.surfaces)));
    let mut log = EventLog::new();

    if let Some(msg) = message {
        send(&runner, &controller, &mut log, msg).await;
        return Ok(());
    }

    println!();
    println!("  tracefold: {surface} surface");
    println!();
    println!("  Model:     {}", config.provider.model);
    println!("  Tools:     {}", runner.tools().names().join(", "));
    if !search_enabled {
        println!("  Search:    disabled (set TAVILY_API_KEY)");
    }
    println!();
    println!("  Type your message and press Enter.");
    println!("  Ctrl+C aborts a running request. Type 'exit' to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }
        send(&runner, &controller, &mut log, line.to_string()).await;
        println!();
    }

    println!();
    println!("  Goodbye!");
    Ok(())
}

/// Run one request and render it until it ends or the user aborts.
async fn send(runner: &AgentRunner, controller: &RequestController, log: &mut EventLog, text: String) {
    log.push_user(text);
    controller.arm();
    let _guard = controller.start_timeout(|| {});

    let mut events = runner.run_stream(log.turns().to_vec(), controller.clone());
    let mut screen = Screen::new(runner.surface());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                let cancelled = abort_and_cancel(controller, log);
                warn!(cancelled, "Request aborted from the terminal");
                screen.break_line();
                eprintln!("  [Aborted] {cancelled} pending tool call(s) cancelled");
                break;
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                debug!(event = event.event_type(), "stream event");
                log.apply(&event);
                screen.show(&event, log);
                if event.is_terminal() {
                    break;
                }
            }
        }
    }

    screen.finish(log);
}

/// Terminal rendering of one request.
struct Screen {
    surface: Surface,
    shown: Option<String>,
    mid_line: bool,
}

impl Screen {
    fn new(surface: Surface) -> Self {
        Self {
            surface,
            shown: None,
            mid_line: false,
        }
    }

    fn show(&mut self, event: &AgentStreamEvent, log: &EventLog) {
        if let AgentStreamEvent::TextDelta { delta } = event
            && self.surface != Surface::Dev
        {
            print!("{delta}");
            let _ = std::io::stdout().flush();
            self.mid_line = true;
            return;
        }

        let sessions = build_progress(log.turns(), log.status(), self.surface.milestone());
        let Some(step) = latest_step(&sessions) else {
            return;
        };
        let key = format!("{}:{}", step.id, step.status);
        if self.shown.as_deref() == Some(key.as_str()) {
            return;
        }
        self.break_line();
        eprintln!("  [{}] {}", step.status, step.label);
        self.shown = Some(key);
    }

    fn break_line(&mut self) {
        if self.mid_line {
            println!();
            self.mid_line = false;
        }
    }

    fn finish(&mut self, log: &EventLog) {
        self.break_line();

        if let Some(error) = log.last_error() {
            eprintln!("  {}", error_banner(error));
            return;
        }

        match self.surface {
            Surface::Chat => {}
            Surface::Dev => match website_result(log.turns()) {
                Some(website) => println!("{}", website.html),
                None => eprintln!("  No website was produced."),
            },
            Surface::Research => {
                let tree = build_tree(log.turns());
                let stats = tree.stats();
                eprintln!(
                    "  Concept tree: {} nodes, {} axioms, depth {}",
                    stats.total_nodes,
                    stats.axioms,
                    tree.max_depth()
                );
                if tree.is_research_complete() {
                    println!();
                    println!("{}", tree.knowledge());
                }
            }
        }
    }
}

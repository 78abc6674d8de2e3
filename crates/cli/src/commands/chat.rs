//! `tasktier chat`: Interactive or single-message chat mode.
//!
//! Ctrl-C during a turn cancels it: the submit future is dropped, which kills
//! any running command's process group, and the REPL keeps going. Ctrl-C at
//! the prompt leaves.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tasktier_agent::{Exhaustion, Outcome, Session, SessionSettings};
use tasktier_core::context::{ContextSources, StaticContext};
use tasktier_core::event::{DomainEvent, EventBus};
use tasktier_providers::AnthropicProvider;
use tasktier_store::TierPolicy;
use tasktier_tools::{RunSettings, default_registry};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::{self, error::TryRecvError};

pub async fn run(
    root: &Path,
    message: Option<String>,
    debug: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let project = super::Project::open(root)?;
    let config = &project.config;

    // Check for API key early so the error is clear
    let Some(api_key) = config.api_key.clone() else {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    TASKTIER_API_KEY=sk-ant-...");
        eprintln!("    ANTHROPIC_API_KEY=sk-ant-...");
        eprintln!();
        eprintln!("  Or add `api_key` to {}", tasktier_config::AppConfig::config_path(root).display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    };

    let mut provider = AnthropicProvider::new(api_key)?;
    if let Some(url) = &config.api_url {
        provider = provider.with_base_url(url);
    }

    let context = StaticContext::load(&ContextSources {
        root: project.layout.root().to_path_buf(),
        files: config.context.files.iter().map(PathBuf::from).collect(),
        base_prompt: config.context.system_prompt.clone(),
        max_bytes: config.context.max_bytes,
    });
    let context_files = context.loaded_files.len();
    let context_tokens = context.estimated_tokens();

    let tools = Arc::new(default_registry(
        project.layout.clone(),
        project.store.clone(),
        RunSettings {
            default_timeout_secs: config.tools.command_timeout_secs,
            max_timeout_secs: config.tools.max_command_timeout_secs,
            max_output_bytes: config.tools.max_output_bytes,
        },
    ));

    let event_bus = Arc::new(EventBus::default());
    let mut events = debug.then(|| event_bus.subscribe());
    let mut session = Session::new(Arc::new(provider), tools, context, event_bus)
        .with_settings(SessionSettings::from(&config.agent))
        .with_tier_policy(TierPolicy::new(project.layout.clone()));
    let started = Instant::now();

    if let Some(msg) = message {
        // Single message mode
        eprint!("  Thinking...");
        let outcome = tokio::select! {
            outcome = session.submit(&msg) => Some(outcome),
            Ok(()) = tokio::signal::ctrl_c() => None,
        };
        eprint!("\r              \r");
        match outcome {
            Some(outcome) => println!("{}", outcome?),
            None => eprintln!("  [Interrupted]"),
        }
        if debug {
            print_debug(&session, started.elapsed(), events.as_mut());
        }
        return Ok(());
    }

    // Interactive mode
    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║  Task Management Agent (Three-Tier Memory)   ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Model:     {}", config.agent.model);
    println!("  Tools:     read, write, run, search, discover");
    println!("  Context:   {context_files} files loaded (~{context_tokens} tokens)");
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'continue' after a cut-off answer, 'exit' or 'quit' to leave.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut truncated = false;

    print!("  You > ");
    std::io::stdout().flush()?;

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            Ok(()) = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };
        let input = line.trim();
        if matches!(input, "exit" | "quit") {
            break;
        }
        if input.is_empty() {
            print!("  You > ");
            std::io::stdout().flush()?;
            continue;
        }

        eprint!("  ...");
        let resume = truncated && input == "continue";
        let turn = async {
            if resume {
                session.resume().await
            } else {
                session.submit(input).await
            }
        };
        let result = tokio::select! {
            result = turn => Some(result),
            Ok(()) = tokio::signal::ctrl_c() => None,
        };
        eprint!("\r     \r");

        match result {
            None => {
                truncated = false;
                eprintln!("  [Interrupted] Turn cancelled; running commands were stopped.");
                println!();
            }
            Some(Ok(outcome)) => {
                truncated = matches!(outcome, Outcome::Exhausted(Exhaustion::Truncated { .. }));
                println!();
                for line in outcome.to_string().lines() {
                    println!("  Assistant > {line}");
                }
                println!();
            }
            Some(Err(e)) => {
                truncated = false;
                eprintln!("  [Error] {e}");
                println!();
            }
        }
        if debug {
            print_debug(&session, started.elapsed(), events.as_mut());
        }

        print!("  You > ");
        std::io::stdout().flush()?;
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

fn print_debug(
    session: &Session,
    elapsed: Duration,
    events: Option<&mut broadcast::Receiver<Arc<DomainEvent>>>,
) {
    let bar = "=".repeat(60);
    println!("{bar}");
    println!("DEBUG INFO");
    println!("{bar}");
    println!("Session: {}", session.transcript().id);
    println!("Duration: {:.2}s", elapsed.as_secs_f64());
    println!("Transcript messages: {}", session.transcript().len());
    println!("{}", session.report());
    if let Some(rx) = events {
        let steps = drain_events(rx);
        if !steps.is_empty() {
            println!("Steps since last report:");
            for step in steps {
                println!("  {step}");
            }
        }
    }
    println!("{bar}");
}

/// Everything published since the last drain, one line per event.
fn drain_events(rx: &mut broadcast::Receiver<Arc<DomainEvent>>) -> Vec<String> {
    let mut steps = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => steps.push(describe_event(&event)),
            Err(TryRecvError::Lagged(missed)) => steps.push(format!("({missed} events dropped)")),
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }
    steps
}

fn describe_event(event: &DomainEvent) -> String {
    match event {
        DomainEvent::ModelCalled {
            model,
            stop_reason,
            input_tokens,
            output_tokens,
            ..
        } => format!("model {model}: {stop_reason}, {input_tokens} in / {output_tokens} out"),
        DomainEvent::ToolExecuted {
            tool_name,
            call_id,
            success,
            duration_ms,
            ..
        } => {
            let status = if *success { "ok" } else { "error" };
            format!("tool {tool_name} [{call_id}]: {status} in {duration_ms}ms")
        }
        DomainEvent::TurnCompleted {
            outcome,
            tool_rounds,
            ..
        } => format!("turn: {outcome} after {tool_rounds} tool round(s)"),
        DomainEvent::ProtocolViolation { reason, .. } => format!("protocol violation: {reason}"),
    }
}

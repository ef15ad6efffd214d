//! `stepwise run` and `stepwise flow`: host one task and talk to it.
//!
//! Questions the task asks are read from stdin. Ctrl-C terminates it.

use std::sync::Arc;

use stepwise_config::AppConfig;
use stepwise_core::event::{DomainEvent, EventBus};
use stepwise_runtime::{TaskKind, TaskManager, TaskStatus};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tracing::{info, warn};

pub async fn run(message: &str, kind: TaskKind) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let provider = stepwise_providers::build_from_config(&config)?;
    let store = stepwise_flow::store_from_config(&config);

    let events = EventBus::default();
    spawn_progress_printer(&events);
    let manager = TaskManager::new(config, provider, store).with_event_bus(events);

    let task_id = match kind {
        TaskKind::Agent => manager.spawn_agent(message).await?,
        TaskKind::Flow => manager.spawn_flow(message).await?,
    };
    info!(task_id = %task_id, "Task started");

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    supervise(&manager, &task_id, &mut stdin).await?;

    let info = manager.status(&task_id).await?;
    if info.kind == TaskKind::Flow {
        if let Some(plan) = manager.plan(&task_id).await? {
            eprintln!("\n{}", plan.render());
        }
    }

    match info.status {
        TaskStatus::Completed => {
            println!("{}", info.result.unwrap_or_default());
            Ok(())
        }
        TaskStatus::Terminated => Err("Task was cancelled".into()),
        status => Err(status.to_string().into()),
    }
}

/// Follow the task until it ends, answering its questions from stdin.
async fn supervise(
    manager: &TaskManager,
    task_id: &str,
    stdin: &mut Lines<BufReader<Stdin>>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut status_rx = manager.watch(task_id).await?;

    loop {
        let status = status_rx.borrow_and_update().clone();
        if status.is_terminal() {
            return Ok(());
        }

        if let Some(question) = status.question() {
            match ask_operator(question, stdin).await? {
                Some(answer) => {
                    if let Err(e) = manager.respond(task_id, &answer).await {
                        warn!("Answer not delivered: {e}");
                    }
                }
                None => stop(manager, task_id).await,
            }
        }

        tokio::select! {
            changed = status_rx.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
            }
            _ = tokio::signal::ctrl_c() => stop(manager, task_id).await,
        }
    }
}

/// Print the question and read one line. `None` on Ctrl-C or end of input.
async fn ask_operator(
    question: &str,
    stdin: &mut Lines<BufReader<Stdin>>,
) -> Result<Option<String>, std::io::Error> {
    let mut stderr = tokio::io::stderr();
    stderr
        .write_all(format!("\n  Agent asks: {question}\n  You > ").as_bytes())
        .await?;
    stderr.flush().await?;

    tokio::select! {
        line = stdin.next_line() => Ok(line?.map(|l| l.trim().to_string())),
        _ = tokio::signal::ctrl_c() => Ok(None),
    }
}

async fn stop(manager: &TaskManager, task_id: &str) {
    eprintln!("\n  Terminating task...");
    if let Err(e) = manager.terminate(task_id).await {
        warn!("Terminate failed: {e}");
    }
}

fn spawn_progress_printer(events: &EventBus) {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            if let Some(line) = progress_line(&event) {
                eprintln!("  {line}");
            }
        }
    });
}

fn progress_line(event: &Arc<DomainEvent>) -> Option<String> {
    match event.as_ref() {
        DomainEvent::AgentStepStarted {
            agent,
            step,
            max_steps,
            ..
        } => Some(format!("[{agent}] step {step}/{max_steps}")),
        DomainEvent::ToolExecuted {
            tool_name,
            success,
            duration_ms,
            ..
        } => Some(format!(
            "  {} {tool_name} ({duration_ms}ms)",
            if *success { "ran" } else { "failed" }
        )),
        DomainEvent::StuckDetected { agent, .. } => {
            Some(format!("[{agent}] repeating itself, nudging"))
        }
        DomainEvent::PlanCreated { title, steps, .. } => {
            Some(format!("Plan: {title} ({steps} steps)"))
        }
        DomainEvent::PlanStepUpdated {
            step_index, status, ..
        } => Some(format!("Step {step_index}: {status}")),
        DomainEvent::InteractionRequired { .. } | DomainEvent::TaskStatusChanged { .. } => None,
    }
}

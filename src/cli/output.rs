//! CLI output formatting

use crate::core::{CycleOutcome, OrchestratorConfig, RunnerState, RunnerStatus};
use crate::execution::OrchestratorEvent;
use console::Emoji;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Format a cycle outcome for display
pub fn format_outcome(outcome: CycleOutcome) -> String {
    match outcome {
        CycleOutcome::Succeeded => style("SUCCEEDED").green().to_string(),
        CycleOutcome::Failed => style("FAILED").red().to_string(),
        CycleOutcome::Skipped => style("SKIPPED").dim().to_string(),
    }
}

/// Format a runner state for display
pub fn format_state(state: RunnerState) -> String {
    match state {
        RunnerState::Idle => style("IDLE").dim().to_string(),
        RunnerState::Running => style("RUNNING").yellow().to_string(),
        RunnerState::Stopped => style("STOPPED").blue().to_string(),
    }
}

/// Format an orchestrator event for display
pub fn format_event(event: &OrchestratorEvent) -> String {
    match event {
        OrchestratorEvent::RunnerStarted { runner_id } => {
            format!("{} Runner {} started", ROCKET, style(runner_id).bold())
        }
        OrchestratorEvent::CycleStarted {
            runner_id,
            cycle,
            attempt,
        } => {
            if *attempt > 1 {
                format!(
                    "{} {} #{} (attempt {})",
                    SPINNER,
                    style(runner_id).cyan(),
                    cycle,
                    style(attempt).dim()
                )
            } else {
                format!("{} {} #{}", SPINNER, style(runner_id).cyan(), cycle)
            }
        }
        OrchestratorEvent::CycleRetrying {
            runner_id,
            cycle,
            attempt,
            delay,
        } => format!(
            "{} {} #{} retrying in {:?} (attempt {})",
            WARN,
            style(runner_id).yellow(),
            cycle,
            delay,
            attempt
        ),
        OrchestratorEvent::CycleFinished {
            runner_id,
            cycle,
            outcome,
            message,
            failures,
        } => {
            let icon = match outcome {
                CycleOutcome::Failed => CROSS,
                CycleOutcome::Succeeded => CHECK,
                CycleOutcome::Skipped => INFO,
            };
            let mut line = format!(
                "{} {} #{} {}",
                icon,
                style(runner_id).bold(),
                cycle,
                format_outcome(*outcome)
            );
            if !message.is_empty() {
                line.push_str(&format!(" {}", style(message).dim()));
            }
            for (pipe_id, error) in failures {
                line.push_str(&format!("\n    {}: {}", style(pipe_id).red(), error));
            }
            line
        }
        OrchestratorEvent::RunnerStopped { runner_id, error } => match error {
            Some(error) => format!(
                "{} Runner {} terminated: {}",
                CROSS,
                style(runner_id).bold(),
                style(error).red()
            ),
            None => format!("{} Runner {} stopped", INFO, style(runner_id).bold()),
        },
    }
}

/// One line per runner with its counters
pub fn format_runner_status(status: &RunnerStatus) -> String {
    let mut line = format!(
        "  {} {} - {} cycles, {} failed",
        style(&status.runner_id).bold(),
        format_state(status.state),
        style(status.cycles).cyan(),
        style(status.failed_cycles).red()
    );
    if let Some(outcome) = status.last_outcome {
        line.push_str(&format!(", last {}", format_outcome(outcome)));
    }
    if let Some(error) = &status.error {
        line.push_str(&format!("\n    {}", style(error).red()));
    }
    line
}

/// Summary printed by `validate`
pub fn format_config_summary(config: &OrchestratorConfig) -> String {
    let mut lines = vec![
        format!("  Runners: {}", style(config.runners.len()).cyan()),
        format!("  Services: {}", style(config.services.len()).cyan()),
        format!("  Params: {}", style(config.params.len()).cyan()),
    ];
    for runner in &config.runners {
        let interval = runner
            .trigger
            .interval
            .as_ref()
            .and_then(|i| i.duration())
            .map(|duration| format!("{:?}", duration))
            .unwrap_or_else(|| "-".to_string());
        lines.push(format!(
            "    {} every {} ({} pipes, {} attempts)",
            style(&runner.id).bold(),
            style(interval).dim(),
            runner.run.used_types().len(),
            runner.retry.attempts
        ));
    }
    lines.join("\n")
}

use anyhow::{Context, Result};
use std::time::Duration;
use ticketpipe::cli::commands::{RunCommand, ValidateCommand};
use ticketpipe::cli::output::*;
use ticketpipe::cli::{Cli, Command};
use ticketpipe::core::OrchestratorConfig;
use ticketpipe::execution::Orchestrator;
use ticketpipe::plugin::PluginHost;
use tracing::{error, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging; RUST_LOG overrides -v
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    match &cli.command {
        Command::Run(cmd) => run_orchestrator(cmd).await?,
        Command::Validate(cmd) => validate_config(cmd)?,
    }

    Ok(())
}

async fn run_orchestrator(cmd: &RunCommand) -> Result<()> {
    let mut config = OrchestratorConfig::from_file(&cmd.file)
        .context("Failed to load orchestrator config")?;

    println!(
        "{} Loaded {} runner(s) from {}",
        INFO,
        style(config.runners.len()).cyan(),
        style(&cmd.file).bold()
    );

    for (key, value) in &cmd.param {
        config.params.insert(key.clone(), value.clone());
        println!(
            "{} Param override: {} = {}",
            INFO,
            style(key).cyan(),
            style(value).dim()
        );
    }

    let host = PluginHost::new();
    let mut orchestrator = Orchestrator::new(config, &host)?;
    orchestrator.add_event_handler(|event| println!("{}", format_event(&event)));

    let shutdown = orchestrator.shutdown_handle();
    let for_secs = cmd.for_secs;
    tokio::spawn(async move {
        match for_secs {
            Some(secs) => {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
                    _ = tokio::signal::ctrl_c() => {}
                }
            }
            None => {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                    return;
                }
            }
        }
        println!("\n{} Stopping runners...", INFO);
        shutdown.stop();
    });

    println!();
    let result = orchestrator.run().await;

    println!("\n{} Runner status:", INFO);
    for status in orchestrator.status() {
        println!("{}", format_runner_status(&status));
    }

    if let Err(e) = result {
        println!("\n{} {}", CROSS, style("Orchestrator stopped with an error").red());
        error!("{}", e);
        std::process::exit(1);
    }

    println!("\n{} All runners stopped {}", CHECK, style("cleanly").green());
    Ok(())
}

fn validate_config(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating orchestrator configuration...", INFO);

    let result = OrchestratorConfig::from_file(&cmd.file)
        .and_then(|config| {
            Orchestrator::new(config.clone(), &PluginHost::new())?;
            Ok(config)
        });

    match result {
        Ok(config) => {
            println!("{} Configuration is valid!", CHECK);
            println!("{}", format_config_summary(&config));

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    }
}

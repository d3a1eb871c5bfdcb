use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, error};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use jobgate::cli::{Cli, Command};
use jobgate::config::JobGateConfig;
use jobgate::resolver::resolve;
use jobgate::rules::{RuleTable, RuleTableHandle, load_or_init};
use jobgate::simulate::{Scenario, Simulator};
use jobgate::ui::Printer;
use jobgate::JobId;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match JobGateConfig::load_from(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e:#}");
            std::process::exit(2);
        }
    };

    let filter = if cli.verbose {
        "jobgate=debug".to_string()
    } else {
        format!("jobgate={}", config.log_level)
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run(cli, config).await {
        error!("{e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: JobGateConfig) -> Result<()> {
    let printer = Printer::new();
    let table = load_table(&cli, &config)?;

    match cli.command {
        Command::Check => {
            printer.rule_summary(&table);
        }
        Command::Resolve { job, level } => {
            let bundle = table
                .lookup(&JobId::new(job.clone()))
                .and_then(|rule| resolve(&rule.level_permissions, level));
            printer.bundle(&job, level, bundle);
        }
        Command::Simulate {
            scenario,
            parallel,
            json,
        } => {
            let scenario = Scenario::load(&scenario)?;
            let simulator = Simulator::new(Arc::new(RuleTableHandle::new(table)), &scenario);
            let report = simulator.run(&scenario.events, parallel).await?;
            printer.report(&report, json);
        }
    }

    Ok(())
}

fn load_table(cli: &Cli, config: &JobGateConfig) -> Result<RuleTable> {
    // An explicit --rules file must exist; only the configured path gets a default.
    let (path, write_default) = match &cli.rules {
        Some(path) => (path.clone(), false),
        None => (config.rules_path.clone(), config.write_default_rules),
    };
    debug!(path = %path.display(), "Loading rule table");
    load_or_init(&path, write_default)
        .with_context(|| format!("failed to load rule table {}", path.display()))
}

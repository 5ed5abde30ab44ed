use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use log::{error, info, warn};

use svcassure_agent::cli::Args;
use svcassure_agent::config::Config;
use svcassure_agent::consumers::{FileSnapshotSink, SnapshotConsumer};
use svcassure_agent::engine::HealthEngine;
use svcassure_agent::error::AgentError;
use svcassure_agent::graph::node::HostOs;
use svcassure_agent::metrics::{MetricRegistry, MetricStore};
use svcassure_agent::producers::{JsonScopeProducer, ProcLinuxProducer, Producer};
use svcassure_agent::rules;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::from_command(args.command);
    init_logging(config.verbose);
    run_command(config).await
}

fn init_logging(verbose: bool) {
    let mut builder = env_logger::Builder::from_default_env();
    if verbose && std::env::var("RUST_LOG").is_err() {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();
}

async fn run_command(config: Config) -> Result<()> {
    if let Err(e) = config.validate() {
        error!("{e}");
        return Err(fatal_to_exit(e));
    }

    println!("{}", "svcassure-agent starting".bold().green());
    println!(
        "  resources: {}  period: {}s",
        config.resources_directory.display(),
        config.input_period_seconds
    );

    let (registry, load_errors) = MetricRegistry::load(config.metrics_descriptor_path())
        .context("loading metric descriptor file")?;
    for e in &load_errors {
        warn!("{e}");
    }

    let (compiled_rules, rule_errors) = rules::load(config.rules_path(), &registry)
        .context("loading rule file")?;
    for e in &rule_errors {
        warn!("{e}");
    }
    info!("loaded {} rule(s), {} descriptor(s)", compiled_rules.len(), registry.names().count());

    let host_os = detect_host_os();
    let mut engine = HealthEngine::new(registry, compiled_rules, host_os, config.input_period_seconds);
    let mut store = MetricStore::new();

    let mut producers: Vec<Box<dyn Producer>> = vec![Box::new(ProcLinuxProducer::new("/proc", 20))];
    if let Some(dir) = &config.hypervisor_target {
        producers.push(Box::new(JsonScopeProducer::new("hypervisor", dir, "hypervisor/vms", 20)));
    }
    if let Some(dir) = &config.gnmi_target {
        producers.push(Box::new(JsonScopeProducer::new("gnmi", dir, "gnmi", 20)));
    }

    let mut consumer: Option<Box<dyn SnapshotConsumer>> = if config.disable_ipc_snapshot {
        None
    } else {
        Some(Box::new(FileSnapshotSink::new(config.snapshot_path.clone())))
    };

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received, finishing the current tick");
                stop.store(true, Ordering::SeqCst);
            }
        });
    }

    let mut interval = tokio::time::interval(Duration::from_secs(config.input_period_seconds));
    while !stop.load(Ordering::SeqCst) {
        interval.tick().await;

        for producer in &mut producers {
            if let Err(e) = producer.collect(&mut store) {
                warn!("producer {} faulted: {e}", producer.name());
            }
        }

        let snapshot = engine.update(&mut store);

        if let Some(consumer) = &mut consumer {
            if let Err(e) = consumer.publish(&snapshot) {
                warn!("consumer {} failed to publish: {e}", consumer.name());
            }
        }
    }

    for producer in &mut producers {
        producer.exit();
    }
    if let Some(consumer) = &mut consumer {
        consumer.exit();
    }

    println!("{}", "svcassure-agent stopped".bold().yellow());
    Ok(())
}

fn detect_host_os() -> HostOs {
    match std::env::consts::OS {
        "linux" => HostOs::Linux,
        "windows" => HostOs::Windows,
        "macos" => HostOs::MacOs,
        other => {
            warn!("unrecognized host OS {other:?}, falling back to Linux refresh table");
            HostOs::Linux
        }
    }
}

fn fatal_to_exit(err: AgentError) -> anyhow::Error {
    anyhow::anyhow!("{err}")
}

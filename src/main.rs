// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/tamperwatch

//! TamperWatch - Tamper and Sabotage Monitoring Service
//!
//! Headless daemon: reads sabotage sensor states from MQTT and/or stdin,
//! keeps the OK/Alarm status current and escalates through notification,
//! siren, light and call channels while monitoring is armed.

use anyhow::Result;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use tamperwatch::core::{MonitorHandle, MonitorService, MonitoringController, MonitoringState};
use tamperwatch::escalation::{AdapterSet, TargetAdapter};
use tamperwatch::ingest::{LinesSource, UpdateSource};
use tamperwatch::sources::SubscriptionDiff;
use tamperwatch::{Config, EventBus, Journal, VERSION};

const QUEUE_CAPACITY: usize = 1024;

/// TamperWatch - Tamper and Sabotage Monitoring Service
#[derive(Parser, Debug)]
#[command(name = "tamperwatch")]
#[command(author = "TamperWatch Project")]
#[command(version = VERSION)]
#[command(about = "Edge-triggered tamper/sabotage monitoring with alarm escalation")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace-level logging
    #[arg(long)]
    trace: bool,

    /// Start armed regardless of the persisted state
    #[arg(long)]
    armed: bool,

    /// Read JSON-lines updates from stdin
    #[arg(long)]
    stdin: bool,

    /// MQTT broker address
    #[arg(long)]
    mqtt_broker: Option<String>,

    /// Data output directory
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Load or create configuration
    let config_path = args.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_create(&config_path)?;

    // Initialize logging
    let log_level = if args.trace {
        Level::TRACE
    } else if args.debug {
        Level::DEBUG
    } else {
        Level::from_str(&config.log_level).unwrap_or(Level::INFO)
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(args.debug)
        .with_line_number(args.debug)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("TamperWatch v{} - Tamper and Sabotage Monitoring", VERSION);

    // Override with command line args
    if let Some(data_dir) = args.data_dir {
        config.database.path = data_dir.join("tamperwatch.db");
        config.data_dir = data_dir;
    }
    if let Some(broker) = args.mqtt_broker {
        config.mqtt.enabled = true;
        config.mqtt.broker = broker;
    }

    info!("Configuration loaded from {:?}", config_path);
    info!("{} sources configured", config.sources.len());

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(config, config_path, args.armed, args.stdin))
}

async fn run(config: Config, config_path: PathBuf, force_armed: bool, read_stdin: bool) -> Result<()> {
    let journal = if config.database.enabled {
        Some(Journal::open(&config.database)?)
    } else {
        None
    };

    let persisted = match &journal {
        Some(journal) => journal.load_monitoring()?,
        None => None,
    };
    let initial = MonitoringState::from_enabled(force_armed || persisted.unwrap_or(config.initial_monitoring));
    info!("Monitoring starts {}", initial);

    let event_bus = Arc::new(EventBus::default());

    #[cfg(feature = "mqtt")]
    let mqtt = if config.mqtt.enabled {
        Some(tamperwatch::ingest::MqttLink::new(&config.mqtt))
    } else {
        None
    };

    #[cfg(feature = "mqtt")]
    let adapter = match &mqtt {
        Some((link, _)) => TargetAdapter::new().with_mqtt(link.client()),
        None => TargetAdapter::new(),
    };
    #[cfg(not(feature = "mqtt"))]
    let adapter = TargetAdapter::new();

    let adapters = Arc::new(AdapterSet::uniform(Arc::new(adapter)));
    let controller = MonitoringController::new(
        config.controller_settings(),
        adapters,
        initial,
        event_bus.clone(),
        event_bus.clone(),
    )?;
    let initial_subscriptions = controller.subscriptions();

    // the service drains in-flight escalations before the side tasks stop
    let (service_shutdown_tx, service_shutdown_rx) = broadcast::channel(1);
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let (handle, service) = MonitorService::spawn(controller, event_bus.clone(), QUEUE_CAPACITY, service_shutdown_rx);

    let recorder = journal
        .as_ref()
        .map(|journal| journal.spawn_recorder(&event_bus, shutdown_tx.subscribe()));

    let mut update_sources: Vec<Arc<dyn UpdateSource>> = Vec::new();

    #[cfg(feature = "mqtt")]
    let forwarder = match mqtt {
        Some((link, eventloop)) => {
            link.follow(&initial_subscriptions);
            link.spawn_event_loop(eventloop, handle.clone());
            let forwarder = link.spawn_forwarder(&event_bus, shutdown_tx.subscribe());
            update_sources.push(Arc::new(link));
            Some(forwarder)
        }
        None => None,
    };

    if read_stdin {
        // subscribed before the first line is read
        let lines = Arc::new(LinesSource::with_subscriptions(initial_subscriptions));
        update_sources.push(lines.clone());
        let handle = handle.clone();
        tokio::spawn(async move {
            let reader = tokio::io::BufReader::new(tokio::io::stdin());
            if let Err(e) = lines.run(reader, handle).await {
                warn!("Stdin source stopped: {}", e);
            }
        });
    }

    info!("TamperWatch running");
    info!("   Press Ctrl+C to shutdown");

    wait_for_shutdown(&handle, &config_path, &update_sources).await?;

    info!("Shutdown signal received, cleaning up...");

    let _ = service_shutdown_tx.send(());
    if let Err(e) = service.await {
        error!("Monitor service task failed: {}", e);
    }

    let _ = shutdown_tx.send(());
    if let Some(recorder) = recorder {
        let _ = recorder.await;
    }
    #[cfg(feature = "mqtt")]
    if let Some(forwarder) = forwarder {
        let _ = forwarder.await;
    }

    info!("TamperWatch shutdown complete");

    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown(handle: &MonitorHandle, config_path: &Path, sources: &[Arc<dyn UpdateSource>]) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup())?;
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => return Ok(result?),
            _ = hangup.recv() => {
                info!("SIGHUP received, reloading configuration");
                reload(handle, config_path, sources).await;
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown(_handle: &MonitorHandle, _config_path: &Path, _sources: &[Arc<dyn UpdateSource>]) -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}

/// Re-read the configuration file and swap in its sources and channels.
/// A rejected file leaves everything as it was.
#[cfg_attr(not(unix), allow(dead_code))]
async fn reload(handle: &MonitorHandle, config_path: &Path, sources: &[Arc<dyn UpdateSource>]) {
    let config = match Config::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to reload {:?}: {}", config_path, e);
            return;
        }
    };

    match handle.reload(config.controller_settings()).await {
        Ok(Ok(diff)) => apply_diff(sources, &diff).await,
        Ok(Err(e)) => error!("Configuration rejected: {}", e),
        Err(e) => error!("Reload failed: {}", e),
    }
}

#[cfg_attr(not(unix), allow(dead_code))]
async fn apply_diff(sources: &[Arc<dyn UpdateSource>], diff: &SubscriptionDiff) {
    if diff.is_empty() {
        return;
    }
    for source in sources {
        if let Err(e) = source.apply_subscriptions(diff).await {
            error!("Failed to update subscriptions: {}", e);
        }
    }
}

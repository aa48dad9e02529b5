use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tenure::store::{FaultController, FaultyStore, MemoryStore};
use tenure::telemetry::{LogFormat, TelemetryConfig, shutdown_tracing};
use tenure::{
    CancellationToken, ElectionSettings, Elector, ElectorConfig, ElectorHandle, TracingLogger,
};
use tokio::task::JoinSet;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Number of electors competing for the lease
    #[arg(short = 'n', long, default_value_t = 3)]
    instances: usize,

    /// Election topic
    #[arg(short, long, default_value = "demo")]
    topic: String,

    /// JSON file with election settings (durations in milliseconds)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Lease validity in milliseconds (overrides the settings file)
    #[arg(long)]
    validity_ms: Option<u64>,

    /// Renew this many milliseconds before the lease lapses
    #[arg(long)]
    renew_before_ms: Option<u64>,

    /// Follower obtain interval in milliseconds
    #[arg(long)]
    obtain_interval_ms: Option<u64>,

    /// Lower bound on validity in milliseconds
    #[arg(long)]
    min_validity_ms: Option<u64>,

    /// Partition the current leader every N seconds (0 disables)
    #[arg(long, default_value_t = 0)]
    crash_every: u64,

    /// Log filter directive
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit JSON log lines
    #[arg(long)]
    json: bool,

    /// Export spans to this OTLP/gRPC endpoint
    #[arg(long)]
    otlp_endpoint: Option<String>,
}

struct Node {
    handle: ElectorHandle,
    faults: FaultController,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut telemetry = TelemetryConfig::builder()
        .service_name("tenure-cli")
        .log_level(cli.log_level.as_str())
        .format(if cli.json {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        });
    if let Some(endpoint) = &cli.otlp_endpoint {
        telemetry = telemetry.endpoint(endpoint.as_str());
    }
    telemetry.build().init()?;

    let mut settings = load_settings(cli.config.as_ref()).await?;
    let overrides = [
        (cli.validity_ms, &mut settings.validity),
        (cli.renew_before_ms, &mut settings.renew_before),
        (cli.obtain_interval_ms, &mut settings.obtain_interval),
        (cli.min_validity_ms, &mut settings.min_validity),
    ];
    for (millis, field) in overrides {
        if let Some(millis) = millis {
            *field = Duration::from_millis(millis);
        }
    }
    settings.validate()?;
    anyhow::ensure!(cli.instances > 0, "at least one instance is required");

    let shared = MemoryStore::new();
    let cancel = CancellationToken::new();
    let mut tasks = JoinSet::new();
    let mut nodes = Vec::with_capacity(cli.instances);
    let mut lease_key = String::new();

    for _ in 0..cli.instances {
        let (store, faults) = FaultyStore::new(shared.clone());
        let config = ElectorConfig::builder(store, cli.topic.as_str())
            .settings(settings.clone())
            .logger(TracingLogger)
            .build();
        let elector = Elector::new(config)?;
        lease_key = elector.keys().lease().to_string();

        info!(instance = %elector.instance(), "starting elector");
        nodes.push(Node {
            handle: elector.handle(),
            faults,
        });
        tasks.spawn(elector.run(cancel.child_token()));
    }

    let mut status = tokio::time::interval(Duration::from_secs(1));
    status.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut crash = (cli.crash_every > 0).then(|| {
        let every = Duration::from_secs(cli.crash_every);
        let mut interval = tokio::time::interval_at(Instant::now() + every, every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result.context("failed to listen for ctrl-c")?;
                info!("shutting down");
                break;
            }
            _ = status.tick() => report(&nodes, &shared, &lease_key),
            _ = tick(&mut crash) => partition_leader(&nodes, settings.validity),
        }
    }

    cancel.cancel();
    while let Some(joined) = tasks.join_next().await {
        if let Err(err) = joined {
            warn!(error = %err, "elector task failed");
        }
    }

    shutdown_tracing();
    Ok(())
}

async fn load_settings(path: Option<&PathBuf>) -> anyhow::Result<ElectionSettings> {
    let Some(path) = path else {
        return Ok(ElectionSettings::default());
    };
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid settings in {}", path.display()))
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn report(nodes: &[Node], store: &MemoryStore, key: &str) {
    let leaders: Vec<String> = nodes
        .iter()
        .filter(|node| node.handle.is_leader())
        .map(|node| node.handle.instance().to_string())
        .collect();
    let holder = store
        .holder(key)
        .map_or_else(|| "-".to_string(), |id| id.to_string());

    if leaders.len() > 1 {
        warn!(leaders = ?leaders, holder = %holder, "more than one instance believes it leads");
    } else {
        info!(
            leader = leaders.first().map_or("-", String::as_str),
            holder = %holder,
            partitioned = nodes.iter().filter(|node| node.faults.is_partitioned()).count(),
            "status"
        );
    }
}

/// Cuts the current leader off from the store and heals it once its lease
/// has certainly expired.
fn partition_leader(nodes: &[Node], heal_after: Duration) {
    let Some(node) = nodes
        .iter()
        .find(|node| node.handle.is_leader() && !node.faults.is_partitioned())
    else {
        info!("no reachable leader to partition");
        return;
    };

    info!(instance = %node.handle.instance(), "partitioning leader");
    node.faults.partition();

    let faults = node.faults.clone();
    let instance = node.handle.instance();
    tokio::spawn(async move {
        tokio::time::sleep(heal_after).await;
        faults.heal();
        info!(instance = %instance, "healed partition");
    });
}

use clap::Parser;
use pkg_constants::network::{
    DEFAULT_CLUSTER_NETWORK, DEFAULT_PROJECT, DEFAULT_PUBLIC_FIP_POOL, DEFAULT_PUBLIC_FIP_SUBNET,
    DEFAULT_PUBLIC_NETWORK,
};
use pkg_constants::paths::{DEFAULT_DATA_DIR, DEFAULT_MANAGER_CONFIG};
use pkg_controllers::{EventDispatcher, ReconcilerConfig, Registry, ServiceReconciler};
use pkg_state::KvStore;
use pkg_state::client::StateStore;
use pkg_state::memory::MemoryStore;
use pkg_types::config::{ManagerConfigFile, load_config_file};
use pkg_vnc::patch::{HttpServicePatcher, LogOnlyPatcher};
use pkg_vnc::{ServicePatcher, StoreControlPlane};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "vnlb-manager",
    about = "Reconciles Services into virtual-network loadbalancers"
)]
struct Cli {
    /// Path to YAML config file
    #[arg(long, short, default_value = DEFAULT_MANAGER_CONFIG)]
    config: String,

    /// Control-plane store backend: memory or slatedb
    #[arg(long)]
    backend: Option<String>,

    /// Directory for SlateDB state storage
    #[arg(long)]
    data_dir: Option<String>,

    /// Cluster API base URL for Service status patches
    #[arg(long)]
    api_server: Option<String>,

    /// File of JSON watch events, one per line (stdin if omitted)
    #[arg(long)]
    events: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Create the fixed networks, the public pool and the configured projects.
async fn bootstrap(cp: &StoreControlPlane, file: &ManagerConfigFile) -> anyhow::Result<()> {
    cp.ensure_project(DEFAULT_PROJECT).await?;
    for ns in &file.namespaces {
        cp.ensure_project(ns).await?;
    }

    let cluster_network = file
        .cluster_network_name
        .as_deref()
        .unwrap_or(DEFAULT_CLUSTER_NETWORK);
    cp.ensure_virtual_network(DEFAULT_PROJECT, cluster_network)
        .await?;

    let public = cp
        .ensure_virtual_network(
            DEFAULT_PROJECT,
            file.public_network_name
                .as_deref()
                .unwrap_or(DEFAULT_PUBLIC_NETWORK),
        )
        .await?;
    let pool = cp
        .ensure_floating_ip_pool(
            &public,
            file.public_fip_pool_name
                .as_deref()
                .unwrap_or(DEFAULT_PUBLIC_FIP_POOL),
            file.public_fip_subnet
                .as_deref()
                .unwrap_or(DEFAULT_PUBLIC_FIP_SUBNET),
        )
        .await?;
    info!("Public floating-IP pool {} ({})", pool.uuid, pool.subnet);
    Ok(())
}

/// Feed every line of `input` to the dispatcher, in order.
async fn run<R: AsyncBufRead + Unpin>(dispatcher: &EventDispatcher, input: R) -> anyhow::Result<()> {
    let mut lines = input.lines();
    let mut processed = 0usize;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match dispatcher.process_line(line).await {
            Ok(()) => processed += 1,
            Err(e) => warn!("Skipping malformed event: {:#}", e),
        }
    }
    info!("Event stream closed after {} event(s)", processed);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    // Load config file (returns defaults if file not found)
    let mut file_cfg: ManagerConfigFile = load_config_file(&cli.config)?;
    info!("Config file: {}", cli.config);

    // Merge: CLI args > config file > defaults
    let backend = cli
        .backend
        .or(file_cfg.backend.take())
        .unwrap_or_else(|| "memory".to_string());
    let data_dir = cli
        .data_dir
        .or(file_cfg.data_dir.take())
        .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string());
    let api_server = cli.api_server.or(file_cfg.api_server.take());

    let (store, slate): (Arc<dyn KvStore>, Option<StateStore>) = match backend.as_str() {
        "memory" => (Arc::new(MemoryStore::new()), None),
        "slatedb" => {
            let state = StateStore::new(&data_dir).await?;
            (Arc::new(state.clone()), Some(state))
        }
        other => anyhow::bail!("unknown backend {:?} (expected memory or slatedb)", other),
    };

    info!("Starting vnlb-manager");
    info!("  Backend:    {}", backend);
    if slate.is_some() {
        info!("  Data dir:   {}", data_dir);
    }
    info!(
        "  API server: {}",
        api_server.as_deref().unwrap_or("<none, patches are logged>")
    );

    let cp = StoreControlPlane::new(store);
    bootstrap(&cp, &file_cfg).await?;

    let patcher: Arc<dyn ServicePatcher> = match &api_server {
        Some(url) => Arc::new(HttpServicePatcher::new(url)),
        None => Arc::new(LogOnlyPatcher),
    };
    let config = ReconcilerConfig::from_file(&file_cfg);
    if let Some(fabric) = &config.link_local {
        info!(
            "  Link-local: {} -> {}:{}",
            config.kubernetes_service_name, fabric.ip, fabric.port
        );
    }
    // Objects left by an earlier run must be recorded before the first event.
    let registry = Registry::new();
    registry.sync(&cp).await?;

    let reconciler = Arc::new(ServiceReconciler::new(
        &config,
        Arc::new(cp),
        Arc::new(registry),
        patcher,
    ));
    let dispatcher = EventDispatcher::new(reconciler);

    match &cli.events {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to open event file {}: {}", path, e))?;
            run(&dispatcher, BufReader::new(file)).await?;
        }
        None => run(&dispatcher, BufReader::new(tokio::io::stdin())).await?,
    }

    if let Some(state) = slate {
        state.close().await?;
    }
    Ok(())
}

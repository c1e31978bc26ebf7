//! # Initialization
//!
//! Controller initialization logic including rustls setup, tracing, metrics,
//! server startup, and Kubernetes client setup.

use crate::config::{ControllerConfig, SharedControllerConfig};
use crate::controller::reconciler::Reconciler;
use crate::controller::server::{start_server, ServerState};
use crate::controller::watches::{KubeWatchRegistry, WatchRegistry};
use crate::crd::Composable;
use crate::discovery::KubeDiscovery;
use crate::observability;
use crate::store::KubeObjectStore;
use anyhow::{Context, Result};
use kube::api::{Api, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Options taken from the command line
#[derive(Debug, Clone, Default)]
pub struct RuntimeOptions {
    /// Kubeconfig file; in-cluster or default configuration when absent
    pub kubeconfig: Option<PathBuf>,
    /// Overrides `METRICS_PORT`
    pub metrics_port: Option<u16>,
}

/// Initialization result containing all necessary components for the controller
pub struct InitializationResult {
    /// Kubernetes client
    pub client: Client,
    /// API for the Composable CRD, all namespaces
    pub composables: Api<Composable>,
    /// Reconciler context
    pub reconciler: Arc<Reconciler>,
    /// Dynamic watches on kinds created from templates
    pub watches: Arc<KubeWatchRegistry>,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
    pub controller_config: SharedControllerConfig,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("server_ready", &self.server_state.ready())
            .field("controller_config", &self.controller_config)
            .finish_non_exhaustive()
    }
}

/// Initialize the controller runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - HTTP server startup
/// - Kubernetes client creation
/// - Reconciler setup
pub async fn initialize(options: RuntimeOptions) -> Result<InitializationResult> {
    // Must happen before any client is built
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|e| anyhow::anyhow!("Failed to install rustls crypto provider: {e:?}"))?;

    let mut config = ControllerConfig::from_env();
    if let Some(port) = options.metrics_port {
        config.metrics_port = port;
    }
    let controller_config: SharedControllerConfig = Arc::new(config);

    init_tracing(&controller_config)?;

    info!("Starting Composable Controller");
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );
    info!(
        admission_control = controller_config.admission_control,
        max_concurrent_reconciliations = controller_config.max_concurrent_reconciliations,
        "Controller configuration loaded"
    );

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());
    let server_port = controller_config.metrics_port;
    let server_state_clone = Arc::clone(&server_state);
    tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });

    let client = create_client(options.kubeconfig.as_ref()).await?;

    let composables: Api<Composable> = Api::all(client.clone());
    check_crd_queryable(&composables).await;

    let watches = Arc::new(KubeWatchRegistry::new(client.clone()));
    let reconciler = Arc::new(Reconciler::new(
        Arc::new(KubeObjectStore::new(client.clone())),
        Arc::new(KubeDiscovery::new(client.clone())),
        Arc::clone(&watches) as Arc<dyn WatchRegistry>,
        Arc::clone(&controller_config),
    ));

    info!("Controller initialized, starting watch loop...");

    Ok(InitializationResult {
        client,
        composables,
        reconciler,
        watches,
        server_state,
        controller_config,
    })
}

/// `RUST_LOG` wins over `LOG_LEVEL`; `LOG_FORMAT=json` switches to JSON lines
fn init_tracing(config: &ControllerConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "composable_controller={}",
            config.log_level.to_lowercase()
        ))
    });

    let result = if config.log_format.eq_ignore_ascii_case("json") {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).try_init()
    };
    result.map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {e}"))
}

async fn create_client(kubeconfig: Option<&PathBuf>) -> Result<Client> {
    let Some(path) = kubeconfig else {
        return Client::try_default()
            .await
            .context("Failed to create Kubernetes client");
    };

    info!("Using kubeconfig {}", path.display());
    let kubeconfig = Kubeconfig::read_from(path)
        .with_context(|| format!("Failed to read kubeconfig {}", path.display()))?;
    let config = kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .context("Failed to load kubeconfig")?;
    Client::try_from(config).context("Failed to create Kubernetes client")
}

/// Log how many Composables exist, or why they cannot be listed
async fn check_crd_queryable(composables: &Api<Composable>) {
    match composables.list(&ListParams::default().limit(1)).await {
        Ok(list) => {
            let remaining = list
                .metadata
                .remaining_item_count
                .and_then(|n| usize::try_from(n).ok())
                .unwrap_or_default();
            info!(
                "CRD is queryable, found {} existing Composable resources",
                list.items.len() + remaining
            );
        }
        Err(e) => {
            error!("CRD is not queryable; {:?}. Is the CRD installed?", e);
            error!("Installation: crdgen | kubectl apply -f -");
            warn!("Continuing despite CRD queryability check failure - controller will retry");
        }
    }
}

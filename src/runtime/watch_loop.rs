//! # Watch Loop
//!
//! Controller watch loop that monitors Composable resources, and the objects
//! created from them, and triggers reconciliation when changes are detected.

use crate::config::SharedControllerConfig;
use crate::constants::{WATCH_BACKOFF_MAX_MS, WATCH_BACKOFF_START_MS};
use crate::controller::reconciler::{reconcile, Reconciler};
use crate::controller::server::ServerState;
use crate::controller::watches::KubeWatchRegistry;
use crate::crd::Composable;
use crate::runtime::error_policy::{handle_reconciliation_error, handle_watch_stream_error};
use futures::{FutureExt, StreamExt};
use kube::api::Api;
use kube_runtime::controller::{self, Controller};
use kube_runtime::watcher;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

/// SIGINT and SIGTERM listeners
///
/// Both handlers are installed by [`ShutdownSignal::new`], so a signal that
/// arrives before anyone awaits [`ShutdownSignal::recv`] is kept, not fatal.
pub struct ShutdownSignal {
    interrupt: Signal,
    terminate: Signal,
}

impl std::fmt::Debug for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownSignal").finish_non_exhaustive()
    }
}

impl ShutdownSignal {
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    /// Wait for the first of SIGINT/SIGTERM and return its name
    pub async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
        }
    }
}

/// Mark the server not ready and publish `true` on `stop` once a signal arrives
pub fn spawn_shutdown_listener(
    mut shutdown: ShutdownSignal,
    server_state: Arc<ServerState>,
    stop: watch::Sender<bool>,
) -> JoinHandle<&'static str> {
    tokio::spawn(async move {
        let name = shutdown.recv().await;
        info!("Received {}, initiating graceful shutdown...", name);
        server_state.set_ready(false);
        stop.send_replace(true);
        info!("Marked server as not ready, waiting for in-flight reconciliations to complete...");
        name
    })
}

/// Run the controller watch loop
///
/// Watches Composables in all namespaces plus every kind registered with
/// `watches`. The loop restarts the controller when its stream ends and
/// returns once `shutdown` fires.
pub async fn run_watch_loop(
    composables: Api<Composable>,
    reconciler: Arc<Reconciler>,
    watches: Arc<KubeWatchRegistry>,
    server_state: Arc<ServerState>,
    controller_config: SharedControllerConfig,
    shutdown: ShutdownSignal,
) -> Result<(), anyhow::Error> {
    let backoff_duration_ms = Arc::new(AtomicU64::new(WATCH_BACKOFF_START_MS));

    server_state.set_ready(true);

    let (stop_tx, mut stopped) = watch::channel(false);
    spawn_shutdown_listener(shutdown, Arc::clone(&server_state), stop_tx);

    loop {
        if *stopped.borrow() {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let backoff = Arc::clone(&backoff_duration_ms);
        let restart_delay_secs = controller_config.watch_restart_delay_secs;
        let watch_span = tracing::info_span!("controller.watch", operation = "watch_loop");

        info!("Starting controller watch loop...");
        Controller::new(
            composables.clone(),
            watcher::Config::default().any_semantic(),
        )
        .with_config(
            controller::Config::default()
                .concurrency(controller_config.max_concurrent_reconciliations),
        )
        .reconcile_on(watches.subscribe())
        .graceful_shutdown_on(stop_trigger(stopped.clone()))
        .run(
            reconcile,
            handle_reconciliation_error,
            Arc::clone(&reconciler),
        )
        .filter_map(move |event| {
            let backoff = Arc::clone(&backoff);
            async move {
                match event {
                    Ok((object, _action)) => {
                        backoff.store(WATCH_BACKOFF_START_MS, Ordering::Relaxed);
                        debug!(object = %object, "watch.event.reconciled");
                        Some(())
                    }
                    // Already handled by the error policy
                    Err(controller::Error::ReconcilerFailed(e, object)) => {
                        debug!(object = %object, error = %e, "watch.event.reconciliation_failed");
                        Some(())
                    }
                    Err(e) => {
                        let error_string = format!("{e:?}");
                        handle_watch_stream_error(
                            &error_string,
                            &backoff,
                            WATCH_BACKOFF_MAX_MS,
                            restart_delay_secs,
                        )
                        .await
                    }
                }
            }
        })
        .for_each(|()| futures::future::ready(()))
        .instrument(watch_span)
        .await;

        if *stopped.borrow() {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let delay = controller_config.watch_restart_delay_duration();
        warn!(
            "Controller watch stream ended, restarting in {} seconds...",
            delay.as_secs()
        );
        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            _ = stopped.wait_for(|stop| *stop) => {
                info!("Shutdown requested, exiting watch loop");
                break;
            }
        }
    }

    info!("Controller stopped gracefully");
    Ok(())
}

/// Resolves once `true` is published on `stopped`
fn stop_trigger(
    mut stopped: watch::Receiver<bool>,
) -> futures::future::Shared<futures::future::BoxFuture<'static, ()>> {
    async move {
        // A dropped sender also ends the controller
        let _ = stopped.wait_for(|stop| *stop).await;
    }
    .boxed()
    .shared()
}

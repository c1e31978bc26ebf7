//! Signal handling of the watch loop
//!
//! These tests send SIGTERM to the test process itself. Every test installs
//! its handlers through `ShutdownSignal::new` before signalling.

mod common;

use common::{reconciler, FakeCluster};
use composable_controller::config::ControllerConfig;
use composable_controller::controller::server::ServerState;
use composable_controller::controller::watches::KubeWatchRegistry;
use composable_controller::crd::Composable;
use composable_controller::runtime::{run_watch_loop, spawn_shutdown_listener, ShutdownSignal};
use kube::api::Api;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Points at a port nothing listens on
const UNREACHABLE_KUBECONFIG: &str = r"
apiVersion: v1
kind: Config
clusters:
  - name: unreachable
    cluster:
      server: http://127.0.0.1:1
contexts:
  - name: unreachable
    context:
      cluster: unreachable
      user: nobody
current-context: unreachable
users:
  - name: nobody
    user: {}
";

fn send_sigterm_to_self() {
    let status = Command::new("sh")
        .args(["-c", &format!("kill -TERM {}", std::process::id())])
        .status()
        .unwrap();
    assert!(status.success());
}

async fn unreachable_client() -> Client {
    let _ = rustls::crypto::ring::default_provider().install_default();
    let kubeconfig = Kubeconfig::from_yaml(UNREACHABLE_KUBECONFIG).unwrap();
    let config = kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .unwrap();
    Client::try_from(config).unwrap()
}

#[tokio::test]
async fn test_sigterm_marks_server_not_ready() {
    let shutdown = ShutdownSignal::new().unwrap();
    let state = Arc::new(ServerState::default());
    state.set_ready(true);
    let (stop_tx, stopped) = watch::channel(false);

    let listener = spawn_shutdown_listener(shutdown, Arc::clone(&state), stop_tx);
    send_sigterm_to_self();

    let name = tokio::time::timeout(Duration::from_secs(5), listener)
        .await
        .expect("listener did not see the signal")
        .unwrap();
    assert_eq!(name, "SIGTERM");
    assert!(!state.ready());
    assert!(*stopped.borrow());
}

#[tokio::test]
async fn test_watch_loop_exits_on_sigterm() {
    let shutdown = ShutdownSignal::new().unwrap();
    let client = unreachable_client().await;
    let cluster = Arc::new(FakeCluster::default());
    let state = Arc::new(ServerState::default());
    let config = Arc::new(ControllerConfig {
        watch_restart_delay_secs: 1,
        ..ControllerConfig::default()
    });

    let watch_loop = tokio::spawn(run_watch_loop(
        Api::<Composable>::all(client.clone()),
        Arc::new(reconciler(&cluster)),
        Arc::new(KubeWatchRegistry::new(client)),
        Arc::clone(&state),
        config,
        shutdown,
    ));
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(state.ready());

    send_sigterm_to_self();

    tokio::time::timeout(Duration::from_secs(15), watch_loop)
        .await
        .expect("watch loop still running after SIGTERM")
        .unwrap()
        .unwrap();
    assert!(!state.ready());
}

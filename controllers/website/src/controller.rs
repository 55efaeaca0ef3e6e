//! Main controller implementation.
//!
//! This module contains the `Controller` struct that wires the object stores,
//! the reconciler, the watcher and the metrics/probe server together.

use crate::backoff::BackoffTracker;
use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::metrics::Metrics;
use crate::reconciler::Reconciler;
use crate::server::{self, ServerState};
use crate::watcher::{self, Context};
use crds::Website;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::{Api, Client, CustomResourceExt};
use kube_runtime::controller::Config as RuntimeConfig;
use resource_store::KubeStore;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Main controller for Website management.
#[derive(Debug)]
pub struct Controller {
    website_watcher: JoinHandle<Result<(), ControllerError>>,
    metrics_server: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance and starts its background tasks.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing Website Controller");

        let kube_client = Client::try_default().await?;

        if config.skip_crd_check {
            warn!("Skipping Website CRD check");
        } else {
            ensure_crd_installed(kube_client.clone()).await?;
        }

        let metrics = Arc::new(
            Metrics::new().map_err(|e| ControllerError::Server(format!("failed to register metrics: {e}")))?,
        );

        let reconciler = Reconciler::new(
            Box::new(KubeStore::<Website>::new(kube_client.clone())),
            Box::new(KubeStore::<ConfigMap>::new(kube_client.clone())),
            Box::new(KubeStore::<Deployment>::new(kube_client.clone())),
            Box::new(KubeStore::<Service>::new(kube_client.clone())),
            metrics.clone(),
        );

        let ctx = Arc::new(Context {
            reconciler,
            backoff: BackoffTracker::new(config.backoff_min, config.backoff_max),
            metrics: metrics.clone(),
            conflict_requeue: config.conflict_requeue,
        });

        let server_state = Arc::new(ServerState::new(metrics));
        let metrics_server = tokio::spawn(server::serve(config.metrics_addr, server_state.clone()));

        let runtime_config = RuntimeConfig::default()
            .debounce(config.debounce)
            .concurrency(config.concurrency);
        let namespace = config.namespace.clone();
        let website_watcher = tokio::spawn(async move {
            watcher::watch_websites(kube_client, namespace.as_deref(), runtime_config, ctx).await
        });
        server_state.mark_ready();

        Ok(Self {
            website_watcher,
            metrics_server,
        })
    }

    /// Runs the controller until shutdown.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("Website Controller running");

        // The watcher returns on SIGTERM/SIGINT; the server runs forever
        tokio::select! {
            result = &mut self.website_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("Website watcher panicked: {}", e)))??;
            }
            result = &mut self.metrics_server => {
                result.map_err(|e| ControllerError::Server(format!("Metrics server panicked: {}", e)))??;
            }
        }

        info!("Website Controller stopped");
        Ok(())
    }
}

/// Fails fast when the Website CRD has not been applied to the cluster.
async fn ensure_crd_installed(client: Client) -> Result<(), ControllerError> {
    let crds: Api<CustomResourceDefinition> = Api::all(client);
    let name = Website::crd_name();

    match crds.get_opt(name).await? {
        Some(_) => {
            info!("Found CRD {}", name);
            Ok(())
        }
        None => Err(ControllerError::CrdNotInstalled(format!(
            "{name} not found; apply the output of `crdgen` first"
        ))),
    }
}

//! Kubernetes resource watchers.
//!
//! Website events, and events of the ConfigMaps, Deployments and Services a
//! Website owns, are funnelled through `kube_runtime::Controller`, which
//! reduces them to the owning site and runs at most one reconcile per site at
//! a time.

use crate::backoff::BackoffTracker;
use crate::error::ControllerError;
use crate::metrics::Metrics;
use crate::reconciler::desired::{MANAGED_BY_LABEL, MANAGER};
use crate::reconciler::{ReconcileOutcome, Reconciler, SiteKey};
use crds::Website;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use kube::{Api, Client, ResourceExt};
use kube_runtime::controller::{Action, Config as RuntimeConfig};
use kube_runtime::{Controller, watcher};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Shared state handed to every reconcile.
#[derive(Debug)]
pub struct Context {
    pub reconciler: Reconciler,
    pub backoff: BackoffTracker,
    pub metrics: Arc<Metrics>,
    /// Delay before re-running a site that hit a version conflict
    pub conflict_requeue: Duration,
}

fn site_key(site: &Website) -> SiteKey {
    SiteKey::new(&site.namespace().unwrap_or_default(), &site.name_any())
}

/// Maps a finished reconcile to the next action of the dispatcher.
pub fn next_action(outcome: &ReconcileOutcome, conflict_requeue: Duration) -> Action {
    match outcome {
        ReconcileOutcome::Converged { .. } | ReconcileOutcome::SiteGone => Action::await_change(),
        ReconcileOutcome::Requeue { .. } => Action::requeue(conflict_requeue),
    }
}

async fn reconcile(site: Arc<Website>, ctx: Arc<Context>) -> Result<Action, ControllerError> {
    let key = site_key(&site);
    let started = Instant::now();

    match ctx.reconciler.reconcile_site(&key).await {
        Ok(outcome) => {
            ctx.metrics.observe_reconcile(outcome.label(), started.elapsed());
            if let ReconcileOutcome::Requeue { reason } = &outcome {
                debug!("Requeueing Website {}: {}", key, reason);
            } else {
                ctx.backoff.reset(&key.to_string());
            }
            Ok(next_action(&outcome, ctx.conflict_requeue))
        }
        Err(e) => {
            ctx.metrics.observe_reconcile("error", started.elapsed());
            Err(e)
        }
    }
}

/// Backs off per site on reconcile errors.
pub fn error_policy(site: Arc<Website>, error: &ControllerError, ctx: Arc<Context>) -> Action {
    let key = site_key(&site);
    let delay = ctx.backoff.next(&key.to_string());
    error!("Reconciliation error for Website {}: {} (retrying in {:?})", key, error, delay);
    Action::requeue(delay)
}

/// Watches Websites and their owned resources until shutdown.
pub async fn watch_websites(
    client: Client,
    namespace: Option<&str>,
    runtime_config: RuntimeConfig,
    ctx: Arc<Context>,
) -> Result<(), ControllerError> {
    info!("Starting Website watcher");

    let websites: Api<Website> = scoped_api(client.clone(), namespace);
    let config_maps: Api<ConfigMap> = scoped_api(client.clone(), namespace);
    let deployments: Api<Deployment> = scoped_api(client.clone(), namespace);
    let services: Api<Service> = scoped_api(client, namespace);

    // Only objects this controller wrote can be owned by a Website
    let owned = watcher::Config::default().labels(&format!("{MANAGED_BY_LABEL}={MANAGER}"));

    Controller::new(websites, watcher::Config::default())
        .owns(config_maps, owned.clone())
        .owns(deployments, owned.clone())
        .owns(services, owned)
        .with_config(runtime_config)
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok((obj, _)) => debug!("Reconciled Website {}", obj),
                Err(e) => warn!("Controller error: {}", e),
            }
        })
        .await;

    info!("Website watcher stopped");
    Ok(())
}

fn scoped_api<K>(client: Client, namespace: Option<&str>) -> Api<K>
where
    K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    K::DynamicType: Default,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

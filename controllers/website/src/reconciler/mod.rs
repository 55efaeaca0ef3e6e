//! Reconciliation of Website resources.
//!
//! One pass fetches the site, builds the desired ConfigMap, Deployment and
//! Service, applies them in that order, re-reads the Deployment and writes
//! the recomputed status back onto the site.
//!
//! - `desired`: pure desired-state builder
//! - `merge`: per-kind merge of desired fields into existing objects
//! - `apply`: create-or-update with a single conflict retry
//! - `status`: status projection from the observed Deployment

pub mod apply;
#[cfg(test)]
mod apply_test;
pub mod desired;
pub mod merge;
pub mod status;

use crate::error::ControllerError;
use crate::metrics::Metrics;
use apply::apply_or_create;
use crds::Website;
use desired::DesiredState;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Resource;
use resource_store::{ObjectStore, StoreError};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Identity of a site: namespace and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SiteKey {
    pub namespace: String,
    pub name: String,
}

impl SiteKey {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

impl std::fmt::Display for SiteKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// How a reconcile finished when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// All derived resources match the spec and the status is current
    Converged { available_replicas: i32 },
    /// The site no longer exists; cleanup is left to garbage collection
    SiteGone,
    /// A concurrent writer won a write; run again shortly
    Requeue { reason: String },
}

impl ReconcileOutcome {
    /// Label used for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            ReconcileOutcome::Converged { .. } => "converged",
            ReconcileOutcome::SiteGone => "site_gone",
            ReconcileOutcome::Requeue { .. } => "requeue",
        }
    }
}

enum Step {
    Applied,
    Conflict(String),
}

/// Reconciles Websites against the object stores.
pub struct Reconciler {
    pub(crate) websites: Box<dyn ObjectStore<Website>>,
    pub(crate) config_maps: Box<dyn ObjectStore<ConfigMap>>,
    pub(crate) deployments: Box<dyn ObjectStore<Deployment>>,
    pub(crate) services: Box<dyn ObjectStore<Service>>,
    metrics: Arc<Metrics>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler").finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(
        websites: Box<dyn ObjectStore<Website>>,
        config_maps: Box<dyn ObjectStore<ConfigMap>>,
        deployments: Box<dyn ObjectStore<Deployment>>,
        services: Box<dyn ObjectStore<Service>>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            websites,
            config_maps,
            deployments,
            services,
            metrics,
        }
    }

    /// Runs one reconcile pass for `key`.
    ///
    /// Conflicts end in [`ReconcileOutcome::Requeue`]; every other store
    /// failure is returned as an error for the caller to back off on.
    pub async fn reconcile_site(&self, key: &SiteKey) -> Result<ReconcileOutcome, ControllerError> {
        let Some(site) = self.websites.get(&key.namespace, &key.name).await? else {
            info!("Website {} not found, nothing to do", key);
            return Ok(ReconcileOutcome::SiteGone);
        };
        info!("Reconciling Website {}", key);

        let owner = desired::owner_reference(&site)
            .ok_or_else(|| ControllerError::InvalidSite(format!("{key} has no uid")))?;
        let desired = DesiredState::build(&key.name, &site.spec);
        let names = &desired.names;
        debug!(
            "Desired state for Website {}: {} replica(s) of {} exposed as {}",
            key, desired.replicas, desired.image, desired.service_type
        );

        if let Step::Conflict(reason) = self
            .apply_step("ConfigMap", self.config_maps.as_ref(), key, &names.config_map, &owner, |cm| {
                merge::config_map(cm, &desired.config_map);
            })
            .await?
        {
            return Ok(ReconcileOutcome::Requeue { reason });
        }

        if let Step::Conflict(reason) = self
            .apply_step("Deployment", self.deployments.as_ref(), key, &names.deployment, &owner, |d| {
                merge::deployment(d, &desired.deployment);
            })
            .await?
        {
            return Ok(ReconcileOutcome::Requeue { reason });
        }

        if let Step::Conflict(reason) = self
            .apply_step("Service", self.services.as_ref(), key, &names.service, &owner, |svc| {
                merge::service(svc, &desired.service);
            })
            .await?
        {
            return Ok(ReconcileOutcome::Requeue { reason });
        }

        let observed = self.deployments.get(&key.namespace, &names.deployment).await?;
        let status = status::project(names, &key.namespace, observed.as_ref());
        let available_replicas = status.available_replicas;

        if site.status.as_ref() == Some(&status) {
            debug!("Status of Website {} unchanged, skipping write", key);
        } else {
            let mut updated = site;
            updated.status = Some(status);
            match self.websites.replace_status(&key.namespace, &updated).await {
                Ok(_) => debug!("Wrote status of Website {}", key),
                Err(err) if err.is_conflict() => {
                    warn!("Status write for Website {} conflicted, requeueing: {}", key, err);
                    return Ok(ReconcileOutcome::Requeue {
                        reason: format!("status write conflicted: {err}"),
                    });
                }
                Err(source) => {
                    return Err(ControllerError::StatusWrite {
                        name: key.to_string(),
                        source,
                    });
                }
            }
        }

        info!(
            "Website {} converged (available replicas: {})",
            key, available_replicas
        );
        Ok(ReconcileOutcome::Converged { available_replicas })
    }

    async fn apply_step<K, F>(
        &self,
        kind: &'static str,
        store: &dyn ObjectStore<K>,
        key: &SiteKey,
        name: &str,
        owner: &OwnerReference,
        mutate: F,
    ) -> Result<Step, ControllerError>
    where
        K: Resource + Clone + Default + PartialEq + Send + Sync + 'static,
        F: Fn(&mut K) + Send + Sync,
    {
        match apply_or_create(store, &key.namespace, name, owner, mutate).await {
            Ok(applied) => {
                self.metrics.observe_apply(kind, applied.result());
                if applied.wrote() {
                    info!(
                        "{} {}/{} {} (resourceVersion {})",
                        kind,
                        key.namespace,
                        name,
                        applied.result(),
                        applied.object().meta().resource_version.as_deref().unwrap_or("<none>")
                    );
                } else {
                    debug!("{} {}/{} unchanged", kind, key.namespace, name);
                }
                Ok(Step::Applied)
            }
            Err(err @ (StoreError::Conflict(_) | StoreError::AlreadyExists(_))) => {
                self.metrics.observe_apply(kind, "conflict");
                warn!("{} {}/{} still conflicts after retry: {}", kind, key.namespace, name, err);
                Ok(Step::Conflict(format!("{kind} {name}: {err}")))
            }
            Err(source) => {
                self.metrics.observe_apply(kind, "error");
                error!("Failed to apply {} {}/{}: {}", kind, key.namespace, name, source);
                Err(ControllerError::Apply {
                    kind,
                    name: name.to_string(),
                    source,
                })
            }
        }
    }
}

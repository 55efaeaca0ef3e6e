//! Test utilities for unit testing the reconciler
//!
//! This module provides helpers for creating test data and a reconciler wired
//! to in-memory stores.

use crate::metrics::Metrics;
use crate::reconciler::{Reconciler, SiteKey};
use crds::{Website, WebsiteSpec};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use resource_store::MockStore;
use std::sync::Arc;

/// Content used by the end-to-end scenario
pub const TEST_CONTENT: &str = "<h1>Test Website</h1>";

/// Spec with only the required field set
pub fn test_spec() -> WebsiteSpec {
    WebsiteSpec {
        image: None,
        replicas: None,
        index_html: TEST_CONTENT.to_string(),
        service_type: None,
    }
}

/// Website with a uid, as it would be read back from the cluster
pub fn test_website(name: &str, namespace: &str) -> Website {
    Website {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            uid: Some(format!("{name}-uid")),
            ..Default::default()
        },
        spec: test_spec(),
        status: None,
    }
}

/// Reconciler backed by mock stores, with handles to inspect them
pub struct Harness {
    pub websites: MockStore<Website>,
    pub config_maps: MockStore<ConfigMap>,
    pub deployments: MockStore<Deployment>,
    pub services: MockStore<Service>,
    pub metrics: Arc<Metrics>,
    pub reconciler: Reconciler,
}

impl Harness {
    pub fn new() -> Self {
        let websites = MockStore::new();
        let config_maps = MockStore::new();
        let deployments = MockStore::new();
        let services = MockStore::new();
        let metrics = Arc::new(Metrics::new().unwrap());

        let reconciler = Reconciler::new(
            Box::new(websites.clone()),
            Box::new(config_maps.clone()),
            Box::new(deployments.clone()),
            Box::new(services.clone()),
            metrics.clone(),
        );

        Self {
            websites,
            config_maps,
            deployments,
            services,
            metrics,
            reconciler,
        }
    }

    /// Seeds a website and returns its key
    pub fn add_site(&self, site: Website) -> SiteKey {
        let stored = self.websites.insert(site);
        SiteKey::new(
            stored.metadata.namespace.as_deref().unwrap_or("default"),
            stored.metadata.name.as_deref().unwrap_or_default(),
        )
    }

    /// Total writes issued against the derived resources
    pub fn derived_writes(&self) -> usize {
        self.config_maps.create_count()
            + self.config_maps.replace_count()
            + self.deployments.create_count()
            + self.deployments.replace_count()
            + self.services.create_count()
            + self.services.replace_count()
    }

    /// Simulates the deployment controller reporting available replicas
    pub fn report_available(&self, namespace: &str, deployment: &str, available: i32) {
        self.deployments.modify(namespace, deployment, |d| {
            d.status.get_or_insert_with(Default::default).available_replicas = Some(available);
        });
    }
}

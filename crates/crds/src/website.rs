//! Website CRD
//!
//! Describes one static website instance: the HTML it serves, how many
//! replicas serve it, which image serves it and how it is exposed.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "web.microscaler.io",
    version = "v1alpha1",
    kind = "Website",
    namespaced,
    status = "WebsiteStatus",
    shortname = "site",
    printcolumn = r#"{"name":"Replicas","type":"integer","jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"Available","type":"integer","jsonPath":".status.availableReplicas"}"#,
    printcolumn = r#"{"name":"URL","type":"string","jsonPath":".status.url"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct WebsiteSpec {
    /// Container image serving the content (defaults to an unprivileged nginx)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Number of replicas for the website workload (defaults to 1)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 1))]
    pub replicas: Option<i32>,

    /// The HTML content served at "/"
    #[serde(rename = "indexHTML")]
    #[schemars(length(min = 1))]
    pub index_html: String,

    /// How the website is exposed (defaults to ClusterIP)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_type: Option<ServiceType>,
}

/// Exposure mode of the website endpoint.
///
/// Variants are ordered from most to least restrictive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
pub enum ServiceType {
    /// Reachable only from inside the cluster
    #[default]
    ClusterIP,

    /// Exposed on a port of every node
    NodePort,

    /// Exposed through an external load balancer
    LoadBalancer,
}

impl ServiceType {
    /// Name used by the Kubernetes Service API.
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceType::ClusterIP => "ClusterIP",
            ServiceType::NodePort => "NodePort",
            ServiceType::LoadBalancer => "LoadBalancer",
        }
    }
}

impl std::fmt::Display for ServiceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observed state of a Website.
///
/// Always recomputed from the derived resources; never used as input.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WebsiteStatus {
    /// Number of available replicas reported by the Deployment
    #[serde(default)]
    pub available_replicas: i32,

    /// Name of the Service created for this website
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,

    /// In-cluster URL of the website
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

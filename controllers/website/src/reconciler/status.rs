//! Status projection.
//!
//! The status is recomputed from the observed Deployment on every reconcile;
//! the previously written status is never an input.

use super::desired::DerivedNames;
use crds::WebsiteStatus;
use k8s_openapi::api::apps::v1::Deployment;

/// In-cluster URL of a service.
pub fn service_url(service: &str, namespace: &str) -> String {
    format!("http://{service}.{namespace}.svc.cluster.local")
}

/// Composes the site status from the observed workload.
///
/// A missing Deployment (or one without status yet) reports zero available replicas.
pub fn project(names: &DerivedNames, namespace: &str, observed: Option<&Deployment>) -> WebsiteStatus {
    let available_replicas = observed
        .and_then(|d| d.status.as_ref())
        .and_then(|s| s.available_replicas)
        .unwrap_or(0);

    WebsiteStatus {
        available_replicas,
        service_name: Some(names.service.clone()),
        url: Some(service_url(&names.service, namespace)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::DeploymentStatus;

    #[test]
    fn test_missing_deployment_reports_zero() {
        let names = DerivedNames::for_site("demo");
        let status = project(&names, "default", None);

        assert_eq!(status.available_replicas, 0);
        assert_eq!(status.service_name.as_deref(), Some("demo-svc"));
        assert_eq!(
            status.url.as_deref(),
            Some("http://demo-svc.default.svc.cluster.local")
        );
    }

    #[test]
    fn test_available_replicas_are_read_from_status() {
        let names = DerivedNames::for_site("demo");
        let deployment = Deployment {
            status: Some(DeploymentStatus {
                available_replicas: Some(3),
                replicas: Some(4),
                ..Default::default()
            }),
            ..Default::default()
        };

        let status = project(&names, "web", Some(&deployment));
        assert_eq!(status.available_replicas, 3);
        assert_eq!(status.url.as_deref(), Some("http://demo-svc.web.svc.cluster.local"));

        let without_status = Deployment::default();
        assert_eq!(project(&names, "web", Some(&without_status)).available_replicas, 0);
    }
}

//! Desired state of the resources derived from a Website.
//!
//! Everything here is a pure function of the site name and spec: no I/O and
//! no randomness, so the same input always yields the same objects.

use crds::{ServiceType, Website, WebsiteSpec};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, ContainerPort, PodSpec, PodTemplateSpec, Service,
    ServicePort, ServiceSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::Resource;
use std::collections::BTreeMap;

/// Suffix of the ConfigMap holding the site content
pub const CONFIG_MAP_SUFFIX: &str = "-content";
/// Suffix of the Deployment serving the site
pub const DEPLOYMENT_SUFFIX: &str = "-deploy";
/// Suffix of the Service exposing the site
pub const SERVICE_SUFFIX: &str = "-svc";

/// Key of the content inside the ConfigMap
pub const CONTENT_KEY: &str = "index.html";
/// Name of the serving container
pub const CONTAINER_NAME: &str = "web";
/// Port the serving container listens on
pub const CONTAINER_PORT: i32 = 8080;
/// Port exposed by the Service
pub const SERVICE_PORT: i32 = 80;
/// Name shared by the container port and the Service port
pub const PORT_NAME: &str = "http";
/// Name of the content volume
pub const VOLUME_NAME: &str = "html";
/// Where the content volume is mounted in the container
pub const MOUNT_PATH: &str = "/usr/share/nginx/html";
/// File mode of the projected content (0644)
pub const VOLUME_DEFAULT_MODE: i32 = 0o644;

/// Image used when the spec does not name one
pub const DEFAULT_IMAGE: &str = "nginxinc/nginx-unprivileged:1.27-alpine";
/// Replica count used when the spec does not set one
pub const DEFAULT_REPLICAS: i32 = 1;

/// Label selecting the pods of one site
pub const NAME_LABEL: &str = "app.kubernetes.io/name";
/// Label marking objects written by this controller
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
/// Value of [`MANAGED_BY_LABEL`]
pub const MANAGER: &str = "website-operator";

/// Names of the derived resources of one site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedNames {
    pub config_map: String,
    pub deployment: String,
    pub service: String,
}

impl DerivedNames {
    /// Derives the resource names from the site name.
    pub fn for_site(site_name: &str) -> Self {
        Self {
            config_map: format!("{site_name}{CONFIG_MAP_SUFFIX}"),
            deployment: format!("{site_name}{DEPLOYMENT_SUFFIX}"),
            service: format!("{site_name}{SERVICE_SUFFIX}"),
        }
    }
}

/// Labels used by the Deployment selector, the pod template and the Service selector.
pub fn selector_labels(site_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(NAME_LABEL.to_string(), site_name.to_string())])
}

/// Labels put on the metadata of every derived resource.
pub fn resource_labels(site_name: &str) -> BTreeMap<String, String> {
    let mut labels = selector_labels(site_name);
    labels.insert(MANAGED_BY_LABEL.to_string(), MANAGER.to_string());
    labels
}

/// Controller owner reference pointing at the site.
///
/// `None` when the site has not been persisted yet (no uid).
pub fn owner_reference(site: &Website) -> Option<OwnerReference> {
    let mut owner = site.controller_owner_ref(&())?;
    owner.block_owner_deletion = Some(true);
    Some(owner)
}

/// Target shape of the three resources derived from one site.
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredState {
    pub names: DerivedNames,
    pub replicas: i32,
    pub image: String,
    pub service_type: ServiceType,
    pub config_map: ConfigMap,
    pub deployment: Deployment,
    pub service: Service,
}

impl DesiredState {
    /// Computes the desired resources, substituting defaults for unset fields.
    pub fn build(site_name: &str, spec: &WebsiteSpec) -> Self {
        let names = DerivedNames::for_site(site_name);
        let replicas = spec.replicas.unwrap_or(DEFAULT_REPLICAS);
        let image = spec
            .image
            .as_deref()
            .filter(|image| !image.is_empty())
            .unwrap_or(DEFAULT_IMAGE)
            .to_string();
        let service_type = spec.service_type.unwrap_or_default();

        let config_map = ConfigMap {
            metadata: metadata(&names.config_map, site_name),
            data: Some(BTreeMap::from([(
                CONTENT_KEY.to_string(),
                spec.index_html.clone(),
            )])),
            ..Default::default()
        };

        let deployment = Deployment {
            metadata: metadata(&names.deployment, site_name),
            spec: Some(DeploymentSpec {
                replicas: Some(replicas),
                selector: LabelSelector {
                    match_labels: Some(selector_labels(site_name)),
                    ..Default::default()
                },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(selector_labels(site_name)),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        containers: vec![web_container(&image)],
                        volumes: Some(vec![content_volume(&names.config_map)]),
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        };

        let service = Service {
            metadata: metadata(&names.service, site_name),
            spec: Some(ServiceSpec {
                type_: Some(service_type.as_str().to_string()),
                selector: Some(selector_labels(site_name)),
                ports: Some(vec![http_service_port()]),
                ..Default::default()
            }),
            ..Default::default()
        };

        Self {
            names,
            replicas,
            image,
            service_type,
            config_map,
            deployment,
            service,
        }
    }
}

fn metadata(name: &str, site_name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        labels: Some(resource_labels(site_name)),
        ..Default::default()
    }
}

fn web_container(image: &str) -> Container {
    Container {
        name: CONTAINER_NAME.to_string(),
        image: Some(image.to_string()),
        ports: Some(vec![ContainerPort {
            name: Some(PORT_NAME.to_string()),
            container_port: CONTAINER_PORT,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        volume_mounts: Some(vec![VolumeMount {
            name: VOLUME_NAME.to_string(),
            mount_path: MOUNT_PATH.to_string(),
            read_only: Some(true),
            ..Default::default()
        }]),
        ..Default::default()
    }
}

fn content_volume(config_map_name: &str) -> Volume {
    Volume {
        name: VOLUME_NAME.to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: config_map_name.to_string(),
            default_mode: Some(VOLUME_DEFAULT_MODE),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn http_service_port() -> ServicePort {
    ServicePort {
        name: Some(PORT_NAME.to_string()),
        port: SERVICE_PORT,
        target_port: Some(IntOrString::Int(CONTAINER_PORT)),
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{test_spec, test_website};

    #[test]
    fn test_derived_names_are_fixed_suffixes() {
        let names = DerivedNames::for_site("demo");
        assert_eq!(names.config_map, "demo-content");
        assert_eq!(names.deployment, "demo-deploy");
        assert_eq!(names.service, "demo-svc");
        assert_eq!(names, DerivedNames::for_site("demo"));
    }

    #[test]
    fn test_defaults_are_substituted() {
        let desired = DesiredState::build("demo", &test_spec());

        assert_eq!(desired.replicas, 1);
        assert_eq!(desired.image, DEFAULT_IMAGE);
        assert_eq!(desired.service_type, ServiceType::ClusterIP);

        let service_spec = desired.service.spec.as_ref().unwrap();
        assert_eq!(service_spec.type_.as_deref(), Some("ClusterIP"));

        let pod = desired.deployment.spec.as_ref().unwrap().template.spec.as_ref().unwrap();
        assert_eq!(pod.containers[0].image.as_deref(), Some(DEFAULT_IMAGE));
    }

    #[test]
    fn test_explicit_values_pass_through() {
        let mut spec = test_spec();
        spec.replicas = Some(3);
        spec.image = Some("registry.local/static:2".to_string());
        spec.service_type = Some(ServiceType::LoadBalancer);

        let desired = DesiredState::build("demo", &spec);
        let deployment_spec = desired.deployment.spec.as_ref().unwrap();
        assert_eq!(deployment_spec.replicas, Some(3));
        assert_eq!(
            deployment_spec.template.spec.as_ref().unwrap().containers[0].image.as_deref(),
            Some("registry.local/static:2")
        );
        assert_eq!(
            desired.service.spec.as_ref().unwrap().type_.as_deref(),
            Some("LoadBalancer")
        );
    }

    #[test]
    fn test_build_is_byte_identical_across_calls() {
        let spec = test_spec();
        let first = serde_json::to_vec(&DesiredState::build("demo", &spec).deployment).unwrap();
        let second = serde_json::to_vec(&DesiredState::build("demo", &spec).deployment).unwrap();
        assert_eq!(first, second);
        assert_eq!(DesiredState::build("demo", &spec), DesiredState::build("demo", &spec));
    }

    #[test]
    fn test_selector_labels_match_everywhere() {
        let desired = DesiredState::build("demo", &test_spec());
        let deployment_spec = desired.deployment.spec.as_ref().unwrap();

        let selector = deployment_spec.selector.match_labels.as_ref().unwrap();
        let template = deployment_spec.template.metadata.as_ref().unwrap().labels.as_ref().unwrap();
        let service = desired.service.spec.as_ref().unwrap().selector.as_ref().unwrap();

        assert_eq!(selector, template);
        assert_eq!(selector, service);
        assert_eq!(selector.get(NAME_LABEL).map(String::as_str), Some("demo"));
    }

    #[test]
    fn test_content_and_ports_are_wired() {
        let desired = DesiredState::build("demo", &test_spec());

        let data = desired.config_map.data.as_ref().unwrap();
        assert_eq!(data.get(CONTENT_KEY), Some(&test_spec().index_html));

        let pod = desired.deployment.spec.as_ref().unwrap().template.spec.as_ref().unwrap();
        let volume = &pod.volumes.as_ref().unwrap()[0];
        assert_eq!(volume.config_map.as_ref().unwrap().name, "demo-content");
        assert_eq!(pod.containers[0].ports.as_ref().unwrap()[0].container_port, 8080);

        let port = &desired.service.spec.as_ref().unwrap().ports.as_ref().unwrap()[0];
        assert_eq!(port.port, 80);
        assert_eq!(port.target_port, Some(IntOrString::Int(8080)));
    }

    #[test]
    fn test_owner_reference_requires_uid() {
        let mut site = test_website("demo", "default");
        site.metadata.uid = None;
        assert!(owner_reference(&site).is_none());

        site.metadata.uid = Some("site-uid".to_string());
        let owner = owner_reference(&site).unwrap();
        assert_eq!(owner.kind, "Website");
        assert_eq!(owner.name, "demo");
        assert_eq!(owner.uid, "site-uid");
        assert_eq!(owner.controller, Some(true));
        assert_eq!(owner.block_owner_deletion, Some(true));
    }
}

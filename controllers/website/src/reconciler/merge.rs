//! Merges desired fields into existing objects.
//!
//! Each function only touches the fields the controller owns and leaves
//! anything the API server or other writers set in place, so it can run on a
//! freshly constructed object as well as on one read back from the cluster.

use super::desired::{CONTAINER_NAME, CONTENT_KEY, VOLUME_NAME};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Container, Service, ServicePort, Volume, VolumeMount};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// Merges the desired labels into `meta`, keeping foreign labels.
fn merge_labels(meta: &mut ObjectMeta, desired: &ObjectMeta) {
    if let Some(labels) = &desired.labels {
        let existing = meta.labels.get_or_insert_with(Default::default);
        for (key, value) in labels {
            existing.insert(key.clone(), value.clone());
        }
    }
}

/// ConfigMap: labels and the content key.
pub fn config_map(existing: &mut ConfigMap, desired: &ConfigMap) {
    merge_labels(&mut existing.metadata, &desired.metadata);

    if let Some(content) = desired.data.as_ref().and_then(|data| data.get(CONTENT_KEY)) {
        existing
            .data
            .get_or_insert_with(Default::default)
            .insert(CONTENT_KEY.to_string(), content.clone());
    }
}

/// Deployment: replicas, selector, template labels, the web container and the content volume.
pub fn deployment(existing: &mut Deployment, desired: &Deployment) {
    merge_labels(&mut existing.metadata, &desired.metadata);

    let Some(desired_spec) = &desired.spec else {
        return;
    };
    let spec = existing.spec.get_or_insert_with(Default::default);
    spec.replicas = desired_spec.replicas;
    spec.selector = desired_spec.selector.clone();

    let template_meta = spec.template.metadata.get_or_insert_with(Default::default);
    if let Some(desired_meta) = &desired_spec.template.metadata {
        merge_labels(template_meta, desired_meta);
    }

    let Some(desired_pod) = &desired_spec.template.spec else {
        return;
    };
    let pod = spec.template.spec.get_or_insert_with(Default::default);

    if let Some(web) = desired_pod.containers.iter().find(|c| c.name == CONTAINER_NAME) {
        upsert_container(&mut pod.containers, web);
    }
    if let Some(html) = desired_pod
        .volumes
        .iter()
        .flatten()
        .find(|v| v.name == VOLUME_NAME)
    {
        upsert_by_name(pod.volumes.get_or_insert_with(Vec::new), html, |v: &Volume| &v.name);
    }
}

/// Service: type, selector and ports.
///
/// An allocated `nodePort` is carried over while the type still exposes node ports.
pub fn service(existing: &mut Service, desired: &Service) {
    merge_labels(&mut existing.metadata, &desired.metadata);

    let Some(desired_spec) = &desired.spec else {
        return;
    };
    let spec = existing.spec.get_or_insert_with(Default::default);
    let keeps_node_ports = matches!(desired_spec.type_.as_deref(), Some("NodePort" | "LoadBalancer"));

    let previous_ports = spec.ports.take().unwrap_or_default();
    let ports: Vec<ServicePort> = desired_spec
        .ports
        .iter()
        .flatten()
        .map(|port| {
            let mut port = port.clone();
            if keeps_node_ports && port.node_port.is_none() {
                port.node_port = previous_ports
                    .iter()
                    .find(|p| p.name == port.name)
                    .and_then(|p| p.node_port);
            }
            port
        })
        .collect();

    spec.type_ = desired_spec.type_.clone();
    spec.selector = desired_spec.selector.clone();
    spec.ports = Some(ports);
}

/// Updates the owned fields of the named container, or appends it.
fn upsert_container(containers: &mut Vec<Container>, desired: &Container) {
    match containers.iter_mut().find(|c| c.name == desired.name) {
        Some(container) => {
            container.image = desired.image.clone();
            container.ports = desired.ports.clone();
            let mounts = container.volume_mounts.get_or_insert_with(Vec::new);
            for mount in desired.volume_mounts.iter().flatten() {
                upsert_by_name(mounts, mount, |m: &VolumeMount| &m.name);
            }
        }
        None => containers.push(desired.clone()),
    }
}

fn upsert_by_name<T: Clone>(items: &mut Vec<T>, desired: &T, name: impl Fn(&T) -> &String) {
    match items.iter_mut().find(|item| name(item) == name(desired)) {
        Some(item) => *item = desired.clone(),
        None => items.push(desired.clone()),
    }
}

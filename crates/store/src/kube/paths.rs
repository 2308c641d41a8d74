//! REST paths for the resources the operator touches.

use autopsy_core::diagnosis::{GROUP, PLURAL, VERSION};
use autopsy_core::ObjectKey;

pub fn pods(namespace: Option<&str>) -> String {
    match namespace {
        Some(ns) => format!("/api/v1/namespaces/{ns}/pods"),
        None => "/api/v1/pods".to_string(),
    }
}

pub fn pod(key: &ObjectKey) -> String {
    format!("/api/v1/namespaces/{}/pods/{}", key.namespace, key.name)
}

pub fn pod_log(key: &ObjectKey) -> String {
    format!("{}/log", pod(key))
}

pub fn diagnoses(namespace: Option<&str>) -> String {
    match namespace {
        Some(ns) => format!("/apis/{GROUP}/{VERSION}/namespaces/{ns}/{PLURAL}"),
        None => format!("/apis/{GROUP}/{VERSION}/{PLURAL}"),
    }
}

pub fn diagnosis(key: &ObjectKey) -> String {
    format!("{}/{}", diagnoses(Some(&key.namespace)), key.name)
}

pub fn diagnosis_status(key: &ObjectKey) -> String {
    format!("{}/status", diagnosis(key))
}

pub fn events(namespace: &str) -> String {
    format!("/api/v1/namespaces/{namespace}/events")
}

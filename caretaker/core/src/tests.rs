use crate::{
    metrics::{GrantMetrics, SweepMetrics},
    testing::{FixedClock, InMemoryGateway},
    Backend, GatewayError, Grants, Ingress, NoRetry, OnConflict, ResourceId, Service, Sweeper,
    INGRESS_CLASS_ANNOTATION, MANAGED_ANNOTATION,
};
use k8s_openapi::{
    api::{
        core::v1::ServiceSpec,
        networking::v1::{IngressRule, IngressSpec},
    },
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};
use std::{collections::BTreeMap, sync::Arc};


fn mk_ingress(ns: &str, name: &str, hosts: &[&str], class: Option<&str>) -> Ingress {
    Ingress {
        metadata: ObjectMeta {
            namespace: Some(ns.to_string()),
            name: Some(name.to_string()),
            annotations: class.map(|c| {
                Some((INGRESS_CLASS_ANNOTATION.to_string(), c.to_string()))
                    .into_iter()
                    .collect()
            }),
            ..Default::default()
        },
        spec: Some(IngressSpec {
            rules: Some(
                hosts
                    .iter()
                    .map(|h| IngressRule {
                        host: Some(h.to_string()),
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn mk_service(
    ns: &str,
    name: &str,
    managed: bool,
    ranges: &[&str],
    rules: &[(&str, &str)],
) -> Service {
    let mut annotations = BTreeMap::new();
    if managed {
        annotations.insert(MANAGED_ANNOTATION.to_string(), "true".to_string());
    }
    for (range, deadline) in rules {
        annotations.insert(crate::rule::annotation_key(range), deadline.to_string());
    }
    Service {
        metadata: ObjectMeta {
            namespace: Some(ns.to_string()),
            name: Some(name.to_string()),
            annotations: Some(annotations),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("LoadBalancer".to_string()),
            load_balancer_source_ranges: if ranges.is_empty() {
                None
            } else {
                Some(ranges.iter().map(|r| r.to_string()).collect())
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn controller_id() -> ResourceId {
    Backend::default().service
}

fn mk_grants(
    gateway: &Arc<InMemoryGateway>,
    clock: &FixedClock,
    on_conflict: impl OnConflict,
) -> Grants<InMemoryGateway> {
    Grants::new(
        gateway.clone(),
        Backend::default(),
        Arc::new(clock.clone()),
        Arc::new(on_conflict),
        GrantMetrics::default(),
    )
}

fn mk_sweeper(gateway: &Arc<InMemoryGateway>, clock: &FixedClock) -> Sweeper<InMemoryGateway> {
    mk_sweeper_with(gateway, clock, NoRetry)
}

fn mk_sweeper_with(
    gateway: &Arc<InMemoryGateway>,
    clock: &FixedClock,
    on_conflict: impl OnConflict,
) -> Sweeper<InMemoryGateway> {
    Sweeper::new(
        gateway.clone(),
        Arc::new(clock.clone()),
        Arc::new(on_conflict),
        SweepMetrics::default(),
    )
}

fn conflict() -> GatewayError {
    GatewayError::Conflict("the object has been modified".into())
}

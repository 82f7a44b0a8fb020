//! Caretaker
//!
//! Caretaker grants a client address temporary access to the load balancer `Service` that fronts
//! an ingress host, and takes that access away again once it expires. No state is kept outside of
//! the cluster: each grant is an entry in the Service's `loadBalancerSourceRanges` paired with an
//! annotation recording its deadline.
//!
//! ```text
//! (domain, address) -> [ Ingress ] -> [ controller Service ] <- sweep every 30s
//!                                       spec.loadBalancerSourceRanges += address
//!                                       metadata.annotations[prefix.address] = deadline
//! ```
//!
//! Only Services carrying the [`MANAGED_ANNOTATION`] are ever written. Every write is a whole
//! object replace of a freshly read copy.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod clock;
mod error;
pub mod gateway;
pub mod grant;
pub mod metrics;
mod resource_id;
pub mod rule;
pub mod service;
pub mod sweep;
pub mod whitelist;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

#[cfg(test)]
mod tests;

pub use self::{
    clock::{Clock, LocalClock},
    error::Error,
    gateway::{GatewayError, NoRetry, OnConflict, ResourceGateway, RetryConflicts},
    grant::{Backend, Grant, Grants},
    resource_id::ResourceId,
    sweep::Sweeper,
};
pub use k8s_openapi::api::{core::v1::Service, networking::v1::Ingress};

/// Marks a Service as eligible for changes made by this controller. The value is ignored.
pub const MANAGED_ANNOTATION: &str = "service.caretaker.ipautomanaged";

/// Prefix of the annotations that record grant deadlines.
pub const RULE_ANNOTATION_PREFIX: &str = "service.caretaker.ipaddr";

/// Annotation naming the ingress controller that serves an ingress.
pub const INGRESS_CLASS_ANNOTATION: &str = "kubernetes.io/ingress.class";

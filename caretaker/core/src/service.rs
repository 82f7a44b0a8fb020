//! Accessors for the parts of a `Service` this controller reads and writes.

use crate::{Service, MANAGED_ANNOTATION};

/// Returns true if the Service has opted into being managed.
pub fn is_managed(svc: &Service) -> bool {
    svc.metadata
        .annotations
        .as_ref()
        .is_some_and(|anns| anns.contains_key(MANAGED_ANNOTATION))
}

/// Returns a copy of the Service's allowed source ranges.
pub fn source_ranges(svc: &Service) -> Vec<String> {
    svc.spec
        .as_ref()
        .and_then(|spec| spec.load_balancer_source_ranges.clone())
        .unwrap_or_default()
}

/// Replaces the Service's allowed source ranges. An empty list clears the field.
pub fn set_source_ranges(svc: &mut Service, ranges: Vec<String>) {
    let spec = svc.spec.get_or_insert_with(Default::default);
    spec.load_balancer_source_ranges = if ranges.is_empty() {
        None
    } else {
        Some(ranges)
    };
}

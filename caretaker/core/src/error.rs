use crate::{gateway::GatewayError, ResourceId};
use thiserror::Error;

/// Failures surfaced while granting or retracting access.
#[derive(Debug, Error)]
pub enum Error {
    #[error("no ingress found for domain {0}")]
    DomainNotFound(String),

    #[error("ingress {ingress} uses ingress class {class:?}; only the {supported} ingress controller is supported")]
    UnsupportedBackend {
        ingress: ResourceId,
        class: Option<String>,
        supported: String,
    },

    #[error("service {0} is not auto-managed")]
    NotManaged(ResourceId),

    #[error("address range {0} is already whitelisted")]
    DuplicateRule(String),

    #[error("address range {0} is not whitelisted")]
    RuleNotFound(String),

    #[error("invalid address range {address:?}: {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: ipnet::AddrParseError,
    },

    #[error("failed to query the cluster: {0}")]
    Lookup(#[source] GatewayError),

    #[error("failed to update service: {0}")]
    Persist(#[source] GatewayError),
}

impl Error {
    /// A short, stable name for the kind of failure, used as a metric label.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::DomainNotFound(_) => "domain_not_found",
            Self::UnsupportedBackend { .. } => "unsupported_backend",
            Self::NotManaged(_) => "not_managed",
            Self::DuplicateRule(_) => "duplicate_rule",
            Self::RuleNotFound(_) => "rule_not_found",
            Self::InvalidAddress { .. } => "invalid_address",
            Self::Lookup(_) => "lookup",
            Self::Persist(_) => "persist",
        }
    }
}

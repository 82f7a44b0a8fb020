use crate::{Ingress, ResourceId, Service};
use std::time::Duration;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("resource not found")]
    NotFound,

    #[error("conflicting write: {0}")]
    Conflict(#[source] BoxError),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Api(#[source] BoxError),
}

/// Synchronous-style access to the cluster objects the controller reads and writes.
#[async_trait::async_trait]
pub trait ResourceGateway: Send + Sync + 'static {
    /// Lists ingresses in all namespaces.
    async fn list_ingresses(&self) -> Result<Vec<Ingress>, GatewayError>;

    async fn get_service(&self, id: &ResourceId) -> Result<Service, GatewayError>;

    /// Lists Services in all namespaces.
    async fn list_services(&self) -> Result<Vec<Service>, GatewayError>;

    /// Replaces the stored Service with `svc`, returning the stored result.
    async fn update_service(&self, svc: &Service) -> Result<Service, GatewayError>;

    /// Returns the first ingress with a rule whose host is exactly `host`.
    async fn find_ingress(&self, host: &str) -> Result<Option<Ingress>, GatewayError> {
        let ingresses = self.list_ingresses().await?;
        Ok(ingresses.into_iter().find(|ing| {
            ing.spec
                .iter()
                .flat_map(|spec| spec.rules.iter().flatten())
                .any(|rule| rule.host.as_deref() == Some(host))
        }))
    }
}

/// Decides whether a write that lost a race with another writer is attempted again.
///
/// When a retry is allowed, the latest copy of the object is read and the whole change is
/// re-applied to it before writing.
pub trait OnConflict: Send + Sync + 'static {
    /// `attempt` counts the retries already made for this change.
    fn retry(&self, attempt: u32, error: &GatewayError) -> bool;
}

/// Never retries; the failed write is reported to the caller.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoRetry;

/// Retries conflicting writes up to a fixed number of times.
#[derive(Clone, Copy, Debug)]
pub struct RetryConflicts(pub u32);

// === impl GatewayError ===

impl GatewayError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

// === impl NoRetry ===

impl OnConflict for NoRetry {
    fn retry(&self, _: u32, _: &GatewayError) -> bool {
        false
    }
}

// === impl RetryConflicts ===

impl OnConflict for RetryConflicts {
    fn retry(&self, attempt: u32, error: &GatewayError) -> bool {
        error.is_conflict() && attempt < self.0
    }
}

/// Applies `change` to `svc` and writes the result, re-reading and re-applying on conflicts the
/// policy allows.
pub(crate) async fn write_with<G, T>(
    gateway: &G,
    on_conflict: &dyn OnConflict,
    mut svc: Service,
    mut change: impl FnMut(&mut Service) -> Result<T, crate::Error>,
) -> Result<(Service, T), crate::Error>
where
    G: ResourceGateway + ?Sized,
{
    let id = ResourceId::from_meta(&svc.metadata);
    let mut attempt = 0;
    loop {
        let out = change(&mut svc)?;
        match gateway.update_service(&svc).await {
            Ok(stored) => return Ok((stored, out)),
            Err(error) if error.is_conflict() && on_conflict.retry(attempt, &error) => {
                tracing::debug!(service = %id, %error, attempt, "Retrying conflicting write");
                attempt += 1;
                svc = gateway
                    .get_service(&id)
                    .await
                    .map_err(crate::Error::Persist)?;
            }
            Err(error) => return Err(crate::Error::Persist(error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conflict() -> GatewayError {
        GatewayError::Conflict("the object has been modified".into())
    }

    #[test]
    fn retry_policies() {
        assert!(!NoRetry.retry(0, &conflict()));

        let policy = RetryConflicts(2);
        assert!(policy.retry(0, &conflict()));
        assert!(policy.retry(1, &conflict()));
        assert!(!policy.retry(2, &conflict()));
        assert!(!policy.retry(0, &GatewayError::NotFound));
        assert!(!policy.retry(0, &GatewayError::Timeout(Duration::from_secs(1))));
    }
}

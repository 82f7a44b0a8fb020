use crate::{
    gateway::{self, OnConflict, ResourceGateway},
    metrics::GrantMetrics,
    rule, service, whitelist, Clock, Error, Ingress, ResourceId, INGRESS_CLASS_ANNOTATION,
};
use std::sync::Arc;
use tracing::{debug, info};

/// Identifies the one ingress controller whose Service receives grants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Backend {
    /// Ingress class served by the controller.
    pub ingress_class: String,
    /// The controller's load balancer Service.
    pub service: ResourceId,
}

/// A grant that has been written to the cluster.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Grant {
    pub service: ResourceId,
    pub range: String,
    pub deadline: String,
}

/// Applies grant requests against the cluster.
pub struct Grants<G: ?Sized> {
    gateway: Arc<G>,
    backend: Arc<Backend>,
    clock: Arc<dyn Clock>,
    on_conflict: Arc<dyn OnConflict>,
    metrics: GrantMetrics,
}

// === impl Backend ===

impl Default for Backend {
    fn default() -> Self {
        Self {
            ingress_class: "nginx".to_string(),
            service: ResourceId::new("default", "ingress-nginx"),
        }
    }
}

impl Backend {
    /// Returns true if the ingress is served by this controller.
    ///
    /// The legacy class annotation takes precedence over `spec.ingressClassName`.
    pub fn serves(&self, ing: &Ingress) -> bool {
        Self::class_of(ing).as_deref() == Some(self.ingress_class.as_str())
    }

    fn class_of(ing: &Ingress) -> Option<String> {
        ing.metadata
            .annotations
            .as_ref()
            .and_then(|anns| anns.get(INGRESS_CLASS_ANNOTATION))
            .or_else(|| ing.spec.as_ref()?.ingress_class_name.as_ref())
            .cloned()
    }
}

// === impl Grants ===

impl<G: ?Sized> Clone for Grants<G> {
    fn clone(&self) -> Self {
        Self {
            gateway: self.gateway.clone(),
            backend: self.backend.clone(),
            clock: self.clock.clone(),
            on_conflict: self.on_conflict.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl<G> Grants<G>
where
    G: ResourceGateway + ?Sized,
{
    pub fn new(
        gateway: Arc<G>,
        backend: Backend,
        clock: Arc<dyn Clock>,
        on_conflict: Arc<dyn OnConflict>,
        metrics: GrantMetrics,
    ) -> Self {
        Self {
            gateway,
            backend: Arc::new(backend),
            clock,
            on_conflict,
            metrics,
        }
    }

    /// Grants `address` access to the Service behind `domain` until two days from now.
    ///
    /// The Service is written at most once per successful call and never when an error is
    /// returned.
    pub async fn apply(&self, domain: &str, address: &str) -> Result<Grant, Error> {
        info!(%domain, %address, "Received grant request");
        let res = self.grant(domain, address).await;
        match &res {
            Ok(Grant {
                service, deadline, ..
            }) => {
                self.metrics.applied();
                info!(%domain, %address, %service, %deadline, "Granted access");
            }
            Err(error) => {
                self.metrics.failed(error);
                info!(%domain, %address, %error, "Refused grant");
            }
        }
        res
    }

    async fn grant(&self, domain: &str, address: &str) -> Result<Grant, Error> {
        if let Err(source) = address.parse::<ipnet::IpNet>() {
            return Err(Error::InvalidAddress {
                address: address.to_string(),
                source,
            });
        }

        let ing = self
            .gateway
            .find_ingress(domain)
            .await
            .map_err(Error::Lookup)?
            .ok_or_else(|| Error::DomainNotFound(domain.to_string()))?;
        let ingress = ResourceId::from_meta(&ing.metadata);
        debug!(%ingress, "Found ingress");

        if !self.backend.serves(&ing) {
            return Err(Error::UnsupportedBackend {
                ingress,
                class: Backend::class_of(&ing),
                supported: self.backend.ingress_class.clone(),
            });
        }

        let svc = self
            .gateway
            .get_service(&self.backend.service)
            .await
            .map_err(Error::Lookup)?;
        let id = ResourceId::from_meta(&svc.metadata);
        debug!(service = %id, "Found ingress controller service");

        let (_, deadline) =
            gateway::write_with(&*self.gateway, &*self.on_conflict, svc, |svc| {
                if !service::is_managed(svc) {
                    return Err(Error::NotManaged(id.clone()));
                }
                let ranges = whitelist::add(service::source_ranges(svc), address)?;
                service::set_source_ranges(svc, ranges);
                Ok(rule::stamp(svc, address, self.clock.now()))
            })
            .await?;

        Ok(Grant {
            service: id,
            range: address.to_string(),
            deadline,
        })
    }
}

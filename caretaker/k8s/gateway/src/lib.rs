#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

use caretaker_core::{GatewayError, Ingress, ResourceGateway, ResourceId, Service};
use kube::{
    api::{Api, ListParams, PostParams},
    Client, ResourceExt,
};
use std::future::Future;
use tokio::time;
use tracing::trace;

/// Bounds each API call. Must be less than the API server's own request timeout.
pub const DEFAULT_TIMEOUT: time::Duration = time::Duration::from_secs(10);

/// Reads and writes ingresses and Services through the Kubernetes API.
#[derive(Clone)]
pub struct KubeGateway {
    client: Client,
    timeout: time::Duration,
}

impl KubeGateway {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: time::Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn call<T>(
        &self,
        f: impl Future<Output = Result<T, kube::Error>>,
    ) -> Result<T, GatewayError> {
        time::timeout(self.timeout, f)
            .await
            .map_err(|_| GatewayError::Timeout(self.timeout))?
            .map_err(from_kube)
    }
}

#[async_trait::async_trait]
impl ResourceGateway for KubeGateway {
    async fn list_ingresses(&self) -> Result<Vec<Ingress>, GatewayError> {
        let api = Api::<Ingress>::all(self.client.clone());
        let list = self.call(api.list(&ListParams::default())).await?;
        trace!(ingresses = list.items.len(), "Listed ingresses");
        Ok(list.items)
    }

    async fn get_service(&self, id: &ResourceId) -> Result<Service, GatewayError> {
        let api = Api::<Service>::namespaced(self.client.clone(), &id.namespace);
        self.call(api.get(&id.name)).await
    }

    async fn list_services(&self) -> Result<Vec<Service>, GatewayError> {
        let api = Api::<Service>::all(self.client.clone());
        let list = self.call(api.list(&ListParams::default())).await?;
        trace!(services = list.items.len(), "Listed services");
        Ok(list.items)
    }

    async fn update_service(&self, svc: &Service) -> Result<Service, GatewayError> {
        let ns = svc.namespace().unwrap_or_default();
        let name = svc.name_any();
        let api = Api::<Service>::namespaced(self.client.clone(), &ns);
        // A replace carries the resource version that was read, so the API server rejects it
        // with a conflict if the Service changed in the meantime.
        self.call(api.replace(&name, &PostParams::default(), svc)).await
    }
}

fn from_kube(error: kube::Error) -> GatewayError {
    match error {
        kube::Error::Api(rsp) if rsp.code == 404 => GatewayError::NotFound,
        kube::Error::Api(rsp) if rsp.code == 409 => {
            GatewayError::Conflict(Box::new(kube::Error::Api(rsp)))
        }
        error => GatewayError::Api(Box::new(error)),
    }
}

//! In-memory stand-ins for the cluster and the clock.

use crate::{Clock, GatewayError, Ingress, ResourceGateway, ResourceId, Service};
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use parking_lot::Mutex;
use std::{
    collections::{BTreeMap, VecDeque},
    sync::Arc,
};

/// A gateway over in-memory ingresses and Services.
///
/// Every successful update is recorded. Failures may be queued for upcoming calls.
#[derive(Debug, Default)]
pub struct InMemoryGateway {
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    ingresses: Vec<Ingress>,
    services: BTreeMap<ResourceId, Service>,
    updates: Vec<Service>,
    fail_lists: usize,
    fail_updates: VecDeque<UpdateFailure>,
}

/// An injected update failure, optionally preceded by a concurrent change to the stored Service.
#[derive(Debug)]
struct UpdateFailure {
    id: ResourceId,
    error: fn() -> GatewayError,
    concurrent: Option<fn(&mut Service)>,
}

/// A clock that only moves when told to.
#[derive(Clone, Debug)]
pub struct FixedClock(Arc<Mutex<NaiveDateTime>>);

// === impl InMemoryGateway ===

impl InMemoryGateway {
    pub fn add_ingress(&self, ing: Ingress) {
        self.state.lock().ingresses.push(ing);
    }

    pub fn put_service(&self, svc: Service) {
        let id = ResourceId::from_meta(&svc.metadata);
        self.state.lock().services.insert(id, svc);
    }

    pub fn service(&self, id: &ResourceId) -> Option<Service> {
        self.state.lock().services.get(id).cloned()
    }

    /// Returns every Service written through [`ResourceGateway::update_service`], in order.
    pub fn updates(&self) -> Vec<Service> {
        self.state.lock().updates.clone()
    }

    /// Fails the next `n` list calls.
    pub fn fail_lists(&self, n: usize) {
        self.state.lock().fail_lists = n;
    }

    /// Fails the next update of the Service `id` with the error built by `error`.
    pub fn fail_next_update(&self, id: ResourceId, error: fn() -> GatewayError) {
        self.state.lock().fail_updates.push_back(UpdateFailure {
            id,
            error,
            concurrent: None,
        });
    }

    /// Like [`Self::fail_next_update`], but first applies `concurrent` to the stored Service, as
    /// another writer would have.
    pub fn fail_next_update_with(
        &self,
        id: ResourceId,
        error: fn() -> GatewayError,
        concurrent: fn(&mut Service),
    ) {
        self.state.lock().fail_updates.push_back(UpdateFailure {
            id,
            error,
            concurrent: Some(concurrent),
        });
    }

    fn list_failure(state: &mut State) -> Result<(), GatewayError> {
        if state.fail_lists > 0 {
            state.fail_lists -= 1;
            return Err(GatewayError::Api("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ResourceGateway for InMemoryGateway {
    async fn list_ingresses(&self) -> Result<Vec<Ingress>, GatewayError> {
        let mut state = self.state.lock();
        Self::list_failure(&mut state)?;
        Ok(state.ingresses.clone())
    }

    async fn get_service(&self, id: &ResourceId) -> Result<Service, GatewayError> {
        self.state
            .lock()
            .services
            .get(id)
            .cloned()
            .ok_or(GatewayError::NotFound)
    }

    async fn list_services(&self) -> Result<Vec<Service>, GatewayError> {
        let mut state = self.state.lock();
        Self::list_failure(&mut state)?;
        Ok(state.services.values().cloned().collect())
    }

    async fn update_service(&self, svc: &Service) -> Result<Service, GatewayError> {
        let id = ResourceId::from_meta(&svc.metadata);
        let mut state = self.state.lock();
        if let Some(pos) = state.fail_updates.iter().position(|f| f.id == id) {
            if let Some(UpdateFailure {
                error, concurrent, ..
            }) = state.fail_updates.remove(pos)
            {
                if let (Some(change), Some(stored)) = (concurrent, state.services.get_mut(&id)) {
                    change(stored);
                }
                return Err(error());
            }
        }
        if !state.services.contains_key(&id) {
            return Err(GatewayError::NotFound);
        }
        state.services.insert(id, svc.clone());
        state.updates.push(svc.clone());
        Ok(svc.clone())
    }
}

// === impl FixedClock ===

impl Default for FixedClock {
    fn default() -> Self {
        let t = NaiveDate::from_ymd_opt(2024, 5, 17)
            .and_then(|d| d.and_hms_opt(14, 30, 0))
            .unwrap_or_default();
        Self::at(t)
    }
}

impl FixedClock {
    pub fn at(t: NaiveDateTime) -> Self {
        Self(Arc::new(Mutex::new(t)))
    }

    pub fn advance(&self, by: TimeDelta) {
        *self.0.lock() += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        *self.0.lock()
    }
}

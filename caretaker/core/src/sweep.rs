use crate::{
    gateway::{self, OnConflict, ResourceGateway},
    metrics::SweepMetrics,
    rule, service, whitelist, Clock, Error, ResourceId, Service,
};
use chrono::NaiveDateTime;
use std::sync::Arc;
use tokio::time;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Interval between sweeps.
pub const SWEEP_INTERVAL: time::Duration = time::Duration::from_secs(30);

/// Periodically retracts expired grants from managed Services.
///
/// Each sweep reads all state from the cluster; nothing is carried between sweeps.
pub struct Sweeper<G: ?Sized> {
    gateway: Arc<G>,
    clock: Arc<dyn Clock>,
    on_conflict: Arc<dyn OnConflict>,
    metrics: SweepMetrics,
}

/// What a single sweep did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub services: usize,
    pub expired: usize,
    pub failed: usize,
}

impl<G> Sweeper<G>
where
    G: ResourceGateway + ?Sized,
{
    pub fn new(
        gateway: Arc<G>,
        clock: Arc<dyn Clock>,
        on_conflict: Arc<dyn OnConflict>,
        metrics: SweepMetrics,
    ) -> Self {
        Self {
            gateway,
            clock,
            on_conflict,
            metrics,
        }
    }

    /// Sweeps every `interval` until shutdown is signaled.
    ///
    /// A sweep in progress runs to completion before shutdown proceeds.
    pub async fn run(self, interval: time::Duration, drain: drain::Watch) {
        let mut timer = time::interval(interval);
        // Sweeps never overlap; a slow sweep pushes the next one back.
        timer.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        timer.tick().await;

        let shutdown = drain.signaled();
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = timer.tick() => {}
                release = &mut shutdown => {
                    debug!("Sweeper shutting down");
                    drop(release);
                    return;
                }
            }

            let summary = self.sweep().instrument(info_span!("sweep")).await;
            debug!(?summary, "Sweep complete");
        }
    }

    /// Retracts every expired grant on every managed Service.
    pub async fn sweep(&self) -> Summary {
        self.metrics.sweep();
        let mut summary = Summary::default();

        let services = match self.gateway.list_services().await {
            Ok(services) => services,
            Err(error) => {
                self.metrics.list_failed();
                warn!(%error, "Failed to list services; skipping sweep");
                return summary;
            }
        };

        for svc in services.into_iter().filter(service::is_managed) {
            summary.services += 1;
            let id = ResourceId::from_meta(&svc.metadata);
            self.sweep_service(svc, &mut summary)
                .instrument(info_span!("service", %id))
                .await;
        }

        summary
    }

    async fn sweep_service(&self, mut svc: Service, summary: &mut Summary) {
        let now = self.clock.now();
        let expired = rule::rules(&svc)
            .filter(|r| {
                let expired = rule::is_expired(r.deadline, now);
                if !expired {
                    debug!(range = %r.range, deadline = %r.deadline, "Grant has not expired");
                }
                expired
            })
            .map(|r| (r.range.to_string(), r.deadline.to_string()))
            .collect::<Vec<_>>();

        for (range, deadline) in expired {
            match self.retract(svc.clone(), &range, now).await {
                Ok(stored) => {
                    info!(%range, %deadline, "Retracted expired grant");
                    self.metrics.expired();
                    summary.expired += 1;
                    svc = stored;
                }
                Err(Error::RuleNotFound(_)) => {
                    debug!(%range, "Grant was renewed or retracted concurrently");
                }
                Err(error) => {
                    error!(%range, %deadline, %error, "Failed to retract expired grant");
                    self.metrics.expiry_failed();
                    summary.failed += 1;
                }
            }
        }
    }

    /// Removes `range` and its deadline from the Service.
    ///
    /// Every attempt re-checks the opt-in marker and the recorded deadline against the copy being
    /// written. A grant whose deadline is gone or no longer expired is left alone and reported as
    /// [`Error::RuleNotFound`].
    async fn retract(
        &self,
        svc: Service,
        range: &str,
        now: NaiveDateTime,
    ) -> Result<Service, Error> {
        let (stored, ()) = gateway::write_with(&*self.gateway, &*self.on_conflict, svc, |svc| {
            if !service::is_managed(svc) {
                return Err(Error::NotManaged(ResourceId::from_meta(&svc.metadata)));
            }
            if !rule::deadline(svc, range).is_some_and(|d| rule::is_expired(d, now)) {
                return Err(Error::RuleNotFound(range.to_string()));
            }
            match whitelist::remove(service::source_ranges(svc), range) {
                Ok(ranges) => service::set_source_ranges(svc, ranges),
                // The deadline annotation outlived its source range; drop the annotation so the
                // grant is not reported again on every sweep.
                Err(Error::RuleNotFound(_)) => {
                    warn!(%range, "Expired grant is not in the source ranges; removing its deadline");
                }
                Err(error) => return Err(error),
            }
            rule::erase(svc, range);
            Ok(())
        })
        .await?;
        Ok(stored)
    }
}

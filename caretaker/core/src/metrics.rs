use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};

#[derive(Clone, Debug, Default)]
pub struct GrantMetrics {
    applied: Counter,
    failed: Family<ReasonLabels, Counter>,
}

#[derive(Clone, Debug, Default)]
pub struct SweepMetrics {
    sweeps: Counter,
    list_failures: Counter,
    expired: Counter,
    expiry_failures: Counter,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ReasonLabels {
    reason: &'static str,
}

// === impl GrantMetrics ===

impl GrantMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let applied = Counter::default();
        reg.register(
            "grants_applied",
            "Count of address ranges granted access",
            applied.clone(),
        );

        let failed = Family::default();
        reg.register(
            "grants_failed",
            "Count of grant requests that were refused or failed",
            failed.clone(),
        );

        Self { applied, failed }
    }

    pub(crate) fn applied(&self) {
        self.applied.inc();
    }

    pub(crate) fn failed(&self, error: &crate::Error) {
        self.failed
            .get_or_create(&ReasonLabels {
                reason: error.reason(),
            })
            .inc();
    }
}

// === impl SweepMetrics ===

impl SweepMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let sweeps = Counter::default();
        reg.register("sweeps", "Count of expiry sweeps started", sweeps.clone());

        let list_failures = Counter::default();
        reg.register(
            "sweep_list_failures",
            "Count of sweeps skipped because Services could not be listed",
            list_failures.clone(),
        );

        let expired = Counter::default();
        reg.register(
            "rules_expired",
            "Count of expired grants retracted",
            expired.clone(),
        );

        let expiry_failures = Counter::default();
        reg.register(
            "rule_expiry_failures",
            "Count of expired grants that could not be retracted",
            expiry_failures.clone(),
        );

        Self {
            sweeps,
            list_failures,
            expired,
            expiry_failures,
        }
    }

    pub(crate) fn sweep(&self) {
        self.sweeps.inc();
    }

    pub(crate) fn list_failed(&self) {
        self.list_failures.inc();
    }

    pub(crate) fn expired(&self) {
        self.expired.inc();
    }

    pub(crate) fn expiry_failed(&self) {
        self.expiry_failures.inc();
    }
}

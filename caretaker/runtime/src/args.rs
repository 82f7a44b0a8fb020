use crate::{
    core::{
        metrics::{GrantMetrics, SweepMetrics},
        Backend, Clock, Grants, LocalClock, NoRetry, OnConflict, ResourceId, RetryConflicts,
        Sweeper,
    },
    gateway::KubeGateway,
    http,
};
use anyhow::{bail, Context, Result};
use clap::Parser;
use prometheus_client::registry::Registry;
use std::{net::SocketAddr, sync::Arc};
use tokio::{net::TcpListener, time::Duration};
use tracing::{info, info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(
    name = "caretaker",
    about = "Grants temporary access to ingress load balancers"
)]
pub struct Args {
    #[clap(long, default_value = "caretaker=info,warn", env = "CARETAKER_LOG")]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Address on which grant requests are served.
    #[clap(long, default_value = "0.0.0.0:8000")]
    listen_addr: SocketAddr,

    /// Seconds between sweeps for expired grants.
    #[clap(
        long,
        default_value = "30",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    sweep_interval_secs: u64,

    /// Ingress class served by the supported ingress controller.
    #[clap(long, default_value = "nginx")]
    ingress_class: String,

    #[clap(long, default_value = "default")]
    ingress_controller_namespace: String,

    /// Name of the ingress controller's load balancer Service.
    #[clap(long, default_value = "ingress-nginx")]
    ingress_controller_name: String,

    /// Number of times a write that conflicts with a concurrent change is re-applied to the
    /// latest copy of the Service. By default conflicting writes fail.
    #[clap(long, default_value = "0")]
    conflict_retries: u32,

    /// Upper bound on each Kubernetes API call.
    #[clap(long, default_value = "10000")]
    api_timeout_ms: u64,
}

/// The Kubernetes client could not be configured from in-cluster or kubeconfig credentials.
#[derive(Debug, thiserror::Error)]
#[error("failed to initialize the Kubernetes client; no usable credentials found")]
pub struct CredentialError;

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            client,
            admin,
            listen_addr,
            sweep_interval_secs,
            ingress_class,
            ingress_controller_namespace,
            ingress_controller_name,
            conflict_retries,
            api_timeout_ms,
        } = self;

        let mut prom = <Registry>::default();
        let caretaker = prom.sub_registry_with_prefix("caretaker");
        let grant_metrics = GrantMetrics::register(caretaker);
        let sweep_metrics = SweepMetrics::register(caretaker);
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await
            .map_err(build_error)?;

        // A single gateway is shared by the request handler and the sweeper.
        let gateway = Arc::new(
            KubeGateway::new(runtime.client())
                .with_timeout(Duration::from_millis(api_timeout_ms)),
        );
        let clock: Arc<dyn Clock> = Arc::new(LocalClock);
        let on_conflict: Arc<dyn OnConflict> = if conflict_retries == 0 {
            Arc::new(NoRetry)
        } else {
            Arc::new(RetryConflicts(conflict_retries))
        };
        let backend = Backend {
            ingress_class,
            service: ResourceId::new(ingress_controller_namespace, ingress_controller_name),
        };
        info!(
            ingress_class = %backend.ingress_class,
            service = %backend.service,
            "Managing ingress controller service"
        );

        let grants = Grants::new(
            gateway.clone(),
            backend,
            clock.clone(),
            on_conflict.clone(),
            grant_metrics,
        );
        let sweeper = Sweeper::new(gateway, clock, on_conflict, sweep_metrics);

        tokio::spawn(
            sweeper
                .run(
                    Duration::from_secs(sweep_interval_secs),
                    runtime.shutdown_handle(),
                )
                .instrument(info_span!("sweeper")),
        );

        let listener = TcpListener::bind(listen_addr)
            .await
            .with_context(|| format!("failed to bind {listen_addr}"))?;
        tokio::spawn(
            http::serve(
                listener,
                http::GrantService::new(grants),
                runtime.shutdown_handle(),
            )
            .instrument(info_span!("http", port = %listen_addr.port())),
        );

        // Block the main thread on the shutdown signal. Once it fires, wait for the background tasks to
        // complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}

/// Only client configuration failures are reported as missing credentials.
fn build_error(error: kubert::runtime::BuildError) -> anyhow::Error {
    match error {
        kubert::runtime::BuildError::Client(error) => {
            anyhow::Error::new(error).context(CredentialError)
        }
        error => anyhow::Error::new(error).context("failed to initialize the runtime"),
    }
}

//! Accepts grant requests over HTTP.
//!
//! A request is a `POST /` with a JSON body such as
//! `{"domain": "shop.example.com", "address": "203.0.113.7/32"}`. The response is plain text:
//! either a confirmation carrying the grant's deadline or the reason the grant was refused.

use crate::core::{Error as GrantError, Grant, Grants, ResourceGateway};
use futures::future;
use http_body_util::BodyExt;
use hyper::{server::conn::http1, Request, Response, StatusCode};
use hyper_util::{rt::TokioIo, service::TowerToHyperService};
use serde::Deserialize;
use thiserror::Error;
use tokio::{net::TcpListener, time};
use tracing::{debug, debug_span, info, trace, warn, Instrument};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

type Body = http_body_util::Full<bytes::Bytes>;

/// Grant requests are a few dozen bytes; larger bodies are refused.
const MAX_BODY_BYTES: usize = 4 * 1024;

/// Pause after a failed accept, e.g. when the process is out of file descriptors.
const ACCEPT_BACKOFF: time::Duration = time::Duration::from_millis(100);

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct GrantRequest {
    pub domain: String,
    #[serde(alias = "ipaddress")]
    pub address: String,
}

/// Serves grant requests with a [`Grants`] handle.
pub struct GrantService<G: ?Sized> {
    grants: Grants<G>,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read request body: {0}")]
    Request(#[source] BoxError),
}

/// Serves HTTP/1 connections from `listener` until shutdown is signaled. Open connections are
/// closed gracefully before the shutdown handle is released.
pub async fn serve<G>(listener: TcpListener, svc: GrantService<G>, drain: drain::Watch)
where
    G: ResourceGateway + ?Sized,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Grant request server listening");
    }

    let shutdown = drain.clone().signaled();
    tokio::pin!(shutdown);
    loop {
        let (io, client) = tokio::select! {
            res = listener.accept() => match res {
                Ok(conn) => conn,
                Err(error) => {
                    warn!(%error, "Failed to accept connection");
                    time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            },
            release = &mut shutdown => {
                debug!("Grant request server shutting down");
                drop(release);
                return;
            }
        };

        let svc = TowerToHyperService::new(svc.clone());
        let drain = drain.clone();
        tokio::spawn(
            async move {
                let conn = http1::Builder::new().serve_connection(TokioIo::new(io), svc);
                tokio::pin!(conn);
                let res = tokio::select! {
                    res = &mut conn => res,
                    release = drain.signaled() => {
                        conn.as_mut().graceful_shutdown();
                        release.release_after(conn).await
                    }
                };
                if let Err(error) = res {
                    debug!(%error, "Connection failed");
                }
            }
            .instrument(debug_span!("conn", %client)),
        );
    }
}

// === impl GrantService ===

impl<G: ?Sized> GrantService<G> {
    pub fn new(grants: Grants<G>) -> Self {
        Self { grants }
    }
}

impl<G: ?Sized> Clone for GrantService<G> {
    fn clone(&self) -> Self {
        Self {
            grants: self.grants.clone(),
        }
    }
}

impl<G, B> tower::Service<Request<B>> for GrantService<G>
where
    G: ResourceGateway + ?Sized,
    B: hyper::body::Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<BoxError>,
{
    type Response = Response<Body>;
    type Error = Error;
    type Future = future::BoxFuture<'static, Result<Response<Body>, Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        trace!(method = %req.method(), uri = %req.uri());
        if req.method() != http::Method::POST || req.uri().path() != "/" {
            return Box::pin(future::ok(text(StatusCode::NOT_FOUND, String::new())));
        }

        let grants = self.grants.clone();
        Box::pin(async move {
            let bytes = match http_body_util::Limited::new(req.into_body(), MAX_BODY_BYTES)
                .collect()
                .await
            {
                Ok(body) => body.to_bytes(),
                Err(error) if error.is::<http_body_util::LengthLimitError>() => {
                    info!(%error, "Request body too large");
                    return Ok(text(StatusCode::PAYLOAD_TOO_LARGE, format!("{error}\n")));
                }
                Err(error) => return Err(Error::Request(error)),
            };
            let GrantRequest { domain, address } = match serde_json::from_slice(&bytes) {
                Ok(req) => req,
                Err(error) => {
                    info!(%error, "Failed to parse request body");
                    return Ok(text(StatusCode::BAD_REQUEST, format!("{error}\n")));
                }
            };

            let rsp = match grants.apply(&domain, &address).await {
                Ok(Grant { deadline, .. }) => text(
                    StatusCode::OK,
                    format!(
                        "Change successfully applied! Access to {domain} from {address} expires at {deadline}\n"
                    ),
                ),
                Err(error) => text(status_of(&error), format!("{error}\n")),
            };
            Ok(rsp)
        })
    }
}

fn status_of(error: &GrantError) -> StatusCode {
    match error {
        GrantError::InvalidAddress { .. } => StatusCode::BAD_REQUEST,
        GrantError::DomainNotFound(_) => StatusCode::NOT_FOUND,
        GrantError::DuplicateRule(_) | GrantError::RuleNotFound(_) => StatusCode::CONFLICT,
        GrantError::NotManaged(_) | GrantError::UnsupportedBackend { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        GrantError::Lookup(_) | GrantError::Persist(_) => StatusCode::BAD_GATEWAY,
    }
}

fn text(status: StatusCode, body: String) -> Response<Body> {
    Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Body::from(body))
        .expect("text response must be valid")
}

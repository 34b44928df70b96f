// This file is part of PPE Compliance NVR, a workplace safety video
// monitoring system.
// Copyright (C) 2026 PPE Compliance NVR Authors.
// SPDX-License-Identifier: GPL-v3.0-or-later

//! HTTP surface (§6): a single WebSocket endpoint, `/ws/monitor/{camera_id}`.
//! There's no admin REST API, no sessions, and no CSRF tokens here — that
//! surface belongs to an external collaborator (§1); this module only needs
//! to route one upgrade request and answer health checks.

mod monitor;
mod websocket;

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::{header, Request, Response, StatusCode};
use http_body_util::{combinators::BoxBody, BodyExt, Empty, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::TcpListener;
use tracing::{info, warn};

use base::ErrorKind;
use db::Camera;

use crate::pipeline::PipelineManager;

pub type Body = BoxBody<Bytes, Infallible>;

fn full_body<B: Into<Bytes>>(chunk: B) -> Body {
    Full::new(chunk.into()).map_err(|never| match never {}).boxed()
}

fn empty_body() -> Body {
    Empty::new().map_err(|never| match never {}).boxed()
}

/// A response the router returns directly rather than handing to a
/// websocket upgrade. Mirrors `base::Error` at the HTTP boundary.
struct HttpError(Response<Body>);

impl From<Response<Body>> for HttpError {
    fn from(response: Response<Body>) -> Self {
        HttpError(response)
    }
}

impl From<base::Error> for HttpError {
    fn from(err: base::Error) -> Self {
        HttpError(from_base_error(err))
    }
}

type ResponseResult = Result<Response<Body>, HttpError>;

fn plain_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Body> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/plain")
        .body(full_body(body))
        .expect("hardcoded head should be valid")
}

fn not_found(body: impl Into<Bytes>) -> HttpError {
    HttpError(plain_response(StatusCode::NOT_FOUND, body))
}

fn bad_req(body: impl Into<Bytes>) -> HttpError {
    HttpError(plain_response(StatusCode::BAD_REQUEST, body))
}

fn from_base_error(err: base::Error) -> Response<Body> {
    let status = match err.kind() {
        ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
        ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
        ErrorKind::InvalidArgument | ErrorKind::FailedPrecondition => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    plain_response(status, err.to_string())
}

/// Constructor dependencies for the web server. The camera directory is
/// read straight from the database on every request (§3: "the core only
/// ever reads this table"), so the service itself holds no camera cache.
pub struct Service {
    db_path: std::path::PathBuf,
    pipeline: Arc<PipelineManager>,
}

impl Service {
    pub fn new(db_path: std::path::PathBuf, pipeline: Arc<PipelineManager>) -> Arc<Self> {
        Arc::new(Service { db_path, pipeline })
    }

    fn lookup_camera(&self, camera_id: &str) -> Result<Camera, base::Error> {
        let conn = db::schema::open(&self.db_path)?;
        db::sink::get_camera(&conn, camera_id)?
            .ok_or_else(|| base::err!(NotFound, msg("no such camera {camera_id}")))
    }

    async fn serve_inner(self: Arc<Self>, req: Request<Incoming>) -> ResponseResult {
        match (req.method(), req.uri().path()) {
            (&http::Method::GET, "/healthz") => Ok(plain_response(StatusCode::OK, "ok")),
            (&http::Method::GET, path) => match path.strip_prefix("/ws/monitor/") {
                Some(camera_id) if !camera_id.is_empty() => {
                    let camera = self.lookup_camera(camera_id)?;
                    let subscription = self.pipeline.subscribe(camera);
                    websocket::upgrade(req, move |ws| Box::pin(monitor::run(ws, subscription)))
                }
                _ => Err(not_found("no such endpoint")),
            },
            _ => Err(plain_response(StatusCode::METHOD_NOT_ALLOWED, "GET expected").into()),
        }
    }

    /// Serves a single HTTP request. Always returns `Ok`; error paths are
    /// turned into HTTP error responses rather than propagated to hyper,
    /// which would otherwise just drop the connection (§7).
    async fn serve(self: Arc<Self>, req: Request<Incoming>) -> Result<Response<Body>, Infallible> {
        Ok(self.serve_inner(req).await.unwrap_or_else(|e| e.0))
    }
}

/// Runs the HTTP server until `shutdown` resolves, then waits for
/// in-flight connections to finish (§6, §7 "Cancelled").
pub async fn serve(addr: SocketAddr, svc: Arc<Service>, shutdown: base::shutdown::Receiver) -> Result<(), base::Error> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| base::err!(Unavailable, msg("unable to bind --http-addr={addr}"), source(e)))?;
    info!(%addr, "listening for HTTP requests");

    let graceful = GracefulShutdown::new();
    let shutdown_future = shutdown.future();
    tokio::pin!(shutdown_future);

    loop {
        tokio::select! {
            _ = &mut shutdown_future => break,
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(err) => {
                        warn!(%err, "failed to accept connection");
                        continue;
                    }
                };
                let io = TokioIo::new(stream);
                let svc = Arc::clone(&svc);
                let conn = hyper::server::conn::http1::Builder::new()
                    .serve_connection(io, service_fn(move |req| Arc::clone(&svc).serve(req)))
                    .with_upgrades();
                let conn = graceful.watch(conn);
                tokio::spawn(async move {
                    if let Err(err) = conn.await {
                        warn!(%err, %peer, "connection error");
                    }
                });
            }
        }
    }

    info!("shutting down HTTP server, waiting for in-flight requests");
    graceful.shutdown().await;
    Ok(())
}

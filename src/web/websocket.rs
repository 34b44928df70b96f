// This file is part of PPE Compliance NVR, a workplace safety video
// monitoring system.
// Copyright (C) 2026 PPE Compliance NVR Authors.
// SPDX-License-Identifier: GPL-v3.0-or-later

//! Common WebSocket plumbing: the upgrade handshake and the CSWSH origin
//! check shared by every WebSocket endpoint this service exposes (today,
//! just the monitor feed).

use std::pin::Pin;

use futures::{Future, SinkExt};
use http::{header, Request, Response};
use hyper::body::Incoming;
use hyper_util::rt::TokioIo;
use tokio_tungstenite::{tungstenite, WebSocketStream};
use tracing::Instrument;

use super::{bad_req, empty_body, Body, ResponseResult};

/// Upgrades to WebSocket and runs the supplied stream handler in a separate
/// tokio task.
///
/// Fails on `Origin` mismatch with an HTTP-level error. If the handler
/// returns an error, tries to send it to the client before dropping the
/// stream.
pub(super) fn upgrade<H>(mut req: Request<Incoming>, handler: H) -> ResponseResult
where
    for<'a> H: FnOnce(
            &'a mut WebSocketStream<TokioIo<hyper::upgrade::Upgraded>>,
        ) -> Pin<Box<dyn Future<Output = Result<(), base::Error>> + Send + 'a>>
        + Send
        + 'static,
{
    // An `Origin` mismatch should be a HTTP-level error; this is likely a
    // cross-site attack, and using HTTP-level errors avoids giving any
    // information to the Javascript running in the browser.
    check_origin(req.headers())?;

    let response = tungstenite::handshake::server::create_response_with_body(&req, || empty_body())
        .map_err(|e| bad_req(e.to_string()))?;
    let (parts, body) = response.into_parts();
    let span = tracing::info_span!("websocket");
    tokio::spawn(
        async move {
            let upgraded = match hyper::upgrade::on(&mut req).await {
                Ok(u) => u,
                Err(err) => {
                    tracing::error!(%err, "upgrade failed");
                    return;
                }
            };
            let mut ws = WebSocketStream::from_raw_socket(
                TokioIo::new(upgraded),
                tungstenite::protocol::Role::Server,
                None,
            )
            .await;
            if let Err(err) = handler(&mut ws).await {
                tracing::error!(%err, "closing with error");
                let _ = ws.send(tungstenite::Message::Text(err.to_string().into())).await;
            } else {
                tracing::info!("closing");
            };
            let _ = ws.close(None).await;
        }
        .instrument(span),
    );
    Ok(Response::from_parts(parts, body))
}

/// Checks the `Host` and `Origin` headers match, if the latter is supplied.
///
/// Browsers must supply `Origin` per [RFC 6455 section
/// 4.1](https://datatracker.ietf.org/doc/html/rfc6455#section-4.1); this is
/// the sole protection against
/// [CSWSH](https://christian-schneider.net/CrossSiteWebSocketHijacking.html)
/// since there's no session cookie here to scope with `SameSite`.
fn check_origin(headers: &header::HeaderMap) -> Result<(), super::HttpError> {
    let origin_hdr = match headers.get(http::header::ORIGIN) {
        None => return Ok(()),
        Some(o) => o,
    };
    let host_hdr = headers
        .get(header::HOST)
        .ok_or_else(|| bad_req("missing Host header"))?;
    let host_str = host_hdr.to_str().map_err(|_| bad_req("bad Host header"))?;

    // Ignores the port number, matching the browser's same-origin rules
    // closely enough for this purpose.
    let host = match host_str.split_once(':') {
        Some((host, _port)) => host,
        None => host_str,
    };
    let origin_url = origin_hdr
        .to_str()
        .ok()
        .and_then(|o| url::Url::parse(o).ok())
        .ok_or_else(|| bad_req("bad Origin header"))?;
    let origin_host = origin_url.host_str().ok_or_else(|| bad_req("bad Origin header"))?;
    if host != origin_host {
        return Err(base::err!(
            PermissionDenied,
            msg("cross-origin request forbidden (request host {host_hdr:?}, origin {origin_hdr:?})")
        )
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::convert::TryInto;

    use super::*;

    #[test]
    fn origin_same_port_okay() {
        let mut hdrs = header::HeaderMap::new();
        hdrs.insert(header::HOST, "nvr:8080".try_into().unwrap());
        hdrs.insert(header::ORIGIN, "http://nvr:8080/".try_into().unwrap());
        assert!(check_origin(&hdrs).is_ok());
    }

    #[test]
    fn origin_missing_okay() {
        let mut hdrs = header::HeaderMap::new();
        hdrs.insert(header::HOST, "nvr".try_into().unwrap());
        assert!(check_origin(&hdrs).is_ok());
    }

    #[test]
    fn origin_mismatch_fails() {
        let mut hdrs = header::HeaderMap::new();
        hdrs.insert(header::HOST, "nvr".try_into().unwrap());
        hdrs.insert(header::ORIGIN, "http://evil/".try_into().unwrap());
        assert!(check_origin(&hdrs).is_err());
    }
}

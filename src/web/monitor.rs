// This file is part of PPE Compliance NVR, a workplace safety video
// monitoring system.
// Copyright (C) 2026 PPE Compliance NVR Authors.
// SPDX-License-Identifier: GPL-v3.0-or-later

//! The `/ws/monitor/{camera_id}` handler (§6): streams status/frame/alert
//! messages to one subscriber and answers its `"ping"` keepalives.

use std::time::Duration;

use base64::Engine;
use futures::{SinkExt, StreamExt};
use hyper_util::rt::TokioIo;
use tokio_tungstenite::{tungstenite, WebSocketStream};

use crate::hub::{Message as HubMessage, Subscription};
use crate::json::{AlertWire, ClientMessage, ServerMessage};

/// If nothing's been sent to the client in this long, ping it so idle
/// proxies don't time the connection out while a camera sits quiet.
const KEEPALIVE_AFTER_IDLE: Duration = Duration::from_secs(30);

fn to_server_message(msg: HubMessage) -> ServerMessage {
    match msg {
        HubMessage::Status { message } => ServerMessage::Status { message },
        HubMessage::Frame {
            camera_id,
            jpeg,
            aggregate,
            timestamp,
        } => ServerMessage::Frame {
            camera_id,
            frame: base64::engine::general_purpose::STANDARD.encode(jpeg.as_slice()),
            results: aggregate,
            timestamp: timestamp.to_string(),
        },
        HubMessage::Alert {
            camera_id,
            alert_id,
            severity,
            message,
            timestamp,
        } => ServerMessage::Alert {
            camera_id,
            alert: AlertWire {
                id: alert_id,
                severity: crate::json::severity_wire(severity).to_owned(),
                message,
                timestamp: timestamp.to_string(),
            },
        },
        HubMessage::Error { message } => ServerMessage::Error { message },
    }
}

fn send_err(e: tungstenite::Error) -> base::Error {
    base::err!(Aborted, msg("websocket send failed"), source(e))
}

async fn send_json(
    ws: &mut WebSocketStream<TokioIo<hyper::upgrade::Upgraded>>,
    msg: &ServerMessage,
) -> Result<(), base::Error> {
    let text = serde_json::to_string(msg).expect("ServerMessage always serializes");
    ws.send(tungstenite::Message::Text(text.into())).await.map_err(send_err)
}

/// Drives one client's monitor connection until it disconnects or the
/// camera's pipeline task exits (§7 "Cancelled"). `subscription` is dropped
/// at the end of this function either way, which unsubscribes it from the
/// hub and may stop the camera's pipeline if it was the last subscriber.
pub(super) async fn run(
    ws: &mut WebSocketStream<TokioIo<hyper::upgrade::Upgraded>>,
    mut subscription: Subscription,
) -> Result<(), base::Error> {
    send_json(
        ws,
        &ServerMessage::Status {
            message: "subscribed".to_owned(),
        },
    )
    .await?;

    loop {
        tokio::select! {
            biased;

            incoming = ws.next() => {
                match incoming {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        if let Some(ClientMessage::Ping) = ClientMessage::parse(&text) {
                            send_json(ws, &ServerMessage::Pong).await?;
                        }
                    }
                    Some(Ok(tungstenite::Message::Close(_))) | None => return Ok(()),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(base::err!(Aborted, msg("websocket receive failed"), source(e))),
                }
            }

            msg = subscription.rx.recv() => {
                match msg {
                    Some(hub_msg) => send_json(ws, &to_server_message(hub_msg)).await?,
                    None => return Ok(()),
                }
            }

            _ = tokio::time::sleep(KEEPALIVE_AFTER_IDLE) => {
                ws.send(tungstenite::Message::Ping(Vec::new().into())).await.map_err(send_err)?;
            }
        }
    }
}

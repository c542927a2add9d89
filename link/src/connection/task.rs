//! Background task owning one notification WebSocket.

use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant as TokioInstant;
use tokio_tungstenite::tungstenite::protocol::Message;

use super::websocket::{self, WebSocketStream};
use super::FAR_FUTURE;
use crate::auth::Credentials;
use crate::error::LinkError;
use crate::event_handlers::{ConnectionError, ConnectionHandlers};
use crate::models::{ConnectionState, NotificationMessage};
use crate::router::{EventRouter, RouteOutcome};
use crate::timeouts::LinkTimeouts;

/// Status sent when the connection handle is dropped without `close()`.
const GOING_AWAY: u16 = 1001;

/// Commands from [`BackendConnection`](super::BackendConnection).
pub(crate) enum ConnCmd {
    Close { status: u16 },
}

pub(crate) struct TaskContext {
    pub ws_url: String,
    pub credentials: Credentials,
    pub router: EventRouter,
    pub timeouts: LinkTimeouts,
    pub handlers: ConnectionHandlers,
    pub state_tx: watch::Sender<ConnectionState>,
}

impl TaskContext {
    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, next: ConnectionState) {
        let prev = self.state_tx.send_replace(next);
        if prev != next {
            log::debug!("[backend-link] Connection state {} -> {}", prev, next);
        }
    }

    /// Connecting -> Connected unless `close()` got there first.
    fn mark_connected(&self) -> bool {
        self.state_tx.send_if_modified(|state| {
            if *state == ConnectionState::Connecting {
                *state = ConnectionState::Connected;
                true
            } else {
                false
            }
        })
    }

    fn fail(&self, error: LinkError) {
        let state = self.state();
        log::warn!("[backend-link] Connection failed while {}: {}", state, error);
        self.handlers.emit_error(ConnectionError::new(error, state));
        // A pending close still ends in Closed; the state never moves backwards.
        if state.is_shutting_down() {
            self.set_state(ConnectionState::Closed);
        } else {
            self.set_state(ConnectionState::Disconnected);
        }
    }

    fn finish_closed(&self, status: u16) {
        self.set_state(ConnectionState::Closing);
        self.set_state(ConnectionState::Closed);
        log::info!("[backend-link] Connection closed with status {}", status);
        self.handlers.emit_data(&NotificationMessage::close(status));
        self.handlers.emit_closed(status);
    }
}

pub(crate) async fn connection_task(mut ctx: TaskContext, mut cmd_rx: mpsc::UnboundedReceiver<ConnCmd>) {
    let mut ws = match websocket::open(&ctx.ws_url, &ctx.credentials, &ctx.timeouts).await {
        Ok(ws) => ws,
        Err(e) => {
            ctx.fail(e);
            return;
        },
    };

    // close() during the upgrade skips the subscription entirely.
    let early_close = match cmd_rx.try_recv() {
        Ok(ConnCmd::Close { status }) => Some(status),
        Err(_) => None,
    };

    let mut close_deadline = TokioInstant::now() + FAR_FUTURE;
    let mut close_sent = false;

    match early_close {
        Some(status) => {
            if let Err(e) = websocket::send_close(&mut ws, status).await {
                ctx.fail(e);
                return;
            }
            close_sent = true;
            close_deadline = TokioInstant::now() + ctx.timeouts.close_timeout;
        },
        None => {
            let subscribed =
                websocket::send_subscribe(&mut ws, &ctx.credentials, ctx.router.filter(), &ctx.handlers).await;
            if let Err(e) = subscribed {
                ctx.fail(e);
                return;
            }
            if ctx.mark_connected() {
                log::info!("[backend-link] Subscribed to {}", ctx.ws_url);
                ctx.handlers.emit_connect();
            }
        },
    }

    run(&mut ctx, &mut ws, &mut cmd_rx, close_sent, close_deadline).await;
}

async fn run(
    ctx: &mut TaskContext,
    ws: &mut WebSocketStream,
    cmd_rx: &mut mpsc::UnboundedReceiver<ConnCmd>,
    mut close_sent: bool,
    mut close_deadline: TokioInstant,
) {
    let keepalive_dur = if ctx.timeouts.keepalive_interval.is_zero() {
        FAR_FUTURE
    } else {
        ctx.timeouts.keepalive_interval
    };
    let has_keepalive = !ctx.timeouts.keepalive_interval.is_zero();
    let mut idle_deadline = TokioInstant::now() + keepalive_dur;

    let pong_timeout_dur = ctx.timeouts.pong_timeout;
    let has_pong_timeout = has_keepalive && !pong_timeout_dur.is_zero();
    let mut awaiting_pong = false;
    let mut pong_deadline = TokioInstant::now() + FAR_FUTURE;

    let mut cmd_open = true;

    loop {
        let close_sleep = tokio::time::sleep_until(close_deadline);
        tokio::pin!(close_sleep);

        let pong_sleep = tokio::time::sleep_until(pong_deadline);
        tokio::pin!(pong_sleep);

        let idle_sleep = tokio::time::sleep_until(idle_deadline);
        tokio::pin!(idle_sleep);

        tokio::select! {
            biased;

            _ = &mut close_sleep, if close_sent => {
                ctx.fail(LinkError::TimeoutError(format!(
                    "Close not acknowledged within {:?}",
                    ctx.timeouts.close_timeout
                )));
                return;
            }

            _ = &mut pong_sleep, if has_pong_timeout && awaiting_pong => {
                ctx.fail(LinkError::TransportError(format!(
                    "Pong timeout ({:?}): backend unresponsive",
                    pong_timeout_dur
                )));
                return;
            }

            cmd = cmd_rx.recv(), if cmd_open => {
                let status = match cmd {
                    Some(ConnCmd::Close { status }) => status,
                    None => {
                        cmd_open = false;
                        GOING_AWAY
                    },
                };
                if close_sent {
                    continue;
                }
                ctx.state_tx.send_if_modified(|state| {
                    let shutting = matches!(state, ConnectionState::Connecting | ConnectionState::Connected);
                    if shutting {
                        *state = ConnectionState::Closing;
                    }
                    shutting
                });
                log::debug!("[backend-link] Sending close frame with status {}", status);
                if let Err(e) = websocket::send_close(ws, status).await {
                    ctx.fail(e);
                    return;
                }
                close_sent = true;
                close_deadline = TokioInstant::now() + ctx.timeouts.close_timeout;
            }

            _ = &mut idle_sleep, if has_keepalive && !awaiting_pong && !close_sent => {
                if let Err(e) = ws.send(Message::Ping(Bytes::new())).await {
                    ctx.fail(LinkError::TransportError(format!("Keepalive ping failed: {}", e)));
                    return;
                }
                ctx.handlers.emit_send("[ping]");
                if has_pong_timeout {
                    awaiting_pong = true;
                    pong_deadline = TokioInstant::now() + pong_timeout_dur;
                }
                idle_deadline = TokioInstant::now() + keepalive_dur;
            }

            frame = ws.next() => {
                idle_deadline = TokioInstant::now() + keepalive_dur;
                if awaiting_pong {
                    awaiting_pong = false;
                    pong_deadline = TokioInstant::now() + FAR_FUTURE;
                }

                let outcome = match frame {
                    Some(Ok(Message::Text(text))) => {
                        ctx.handlers.emit_receive(&text);
                        ctx.router.route_text(&text)
                    },
                    Some(Ok(Message::Close(frame))) => {
                        ctx.router.route_close_frame(frame.map(|f| u16::from(f.code)))
                    },
                    Some(Ok(Message::Binary(data))) => {
                        log::warn!("[backend-link] Ignoring binary frame ({} bytes)", data.len());
                        continue;
                    },
                    Some(Ok(Message::Pong(_))) => {
                        log::debug!("[backend-link] Keepalive: received Pong");
                        continue;
                    },
                    // Pings are answered by tungstenite on the next read or write.
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Frame(_))) => continue,
                    Some(Err(e)) => {
                        ctx.fail(LinkError::TransportError(format!("WebSocket error: {}", e)));
                        return;
                    },
                    None => {
                        ctx.fail(LinkError::TransportError("WebSocket stream ended".to_string()));
                        return;
                    },
                };

                match outcome {
                    RouteOutcome::Data(message) => ctx.handlers.emit_data(&message),
                    RouteOutcome::Closed(status) => {
                        if !close_sent {
                            // Acknowledge a peer-initiated close with the same status.
                            if let Err(e) = websocket::send_close(ws, status).await {
                                log::debug!("[backend-link] Close acknowledgement not sent: {}", e);
                            }
                        }
                        ctx.finish_closed(status);
                        drain(ws, ctx.timeouts.close_timeout).await;
                        return;
                    },
                    RouteOutcome::Filtered | RouteOutcome::Dropped(_) => {},
                }
            }
        }
    }
}

/// Let the transport-level close handshake finish before the socket drops.
async fn drain(ws: &mut WebSocketStream, limit: Duration) {
    let _ = tokio::time::timeout(limit, async {
        while let Some(Ok(_)) = ws.next().await {}
    })
    .await;
}

//! WebSocket server exposing the control document.

use super::protocol::{
    CMD_GET_STATE, CMD_HEALTH, CMD_SET_MODE, ERR_MALFORMED_REQUEST, ERR_UNKNOWN_COMMAND, WsRequest,
    WsResponse,
};
use crate::command::CommandRequest;
use crate::context::ControlContext;
use crate::controller::DeviceController;
use crate::error::ControlError;
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

pub struct ControlServer {
    ctx: Arc<ControlContext>,
    controller: DeviceController,
}

impl ControlServer {
    pub fn new(ctx: Arc<ControlContext>) -> Self {
        Self {
            controller: DeviceController::new(ctx.clone()),
            ctx,
        }
    }

    /// Dispatch one request to the controller.
    pub async fn handle_request(&self, request: WsRequest) -> WsResponse {
        let id = request.message_id;
        match request.command.as_str() {
            CMD_GET_STATE => match self.controller.read_state().await {
                Ok(state) => to_response(id, &state),
                Err(e) => WsResponse::from_error(id, &ControlError::from(e)),
            },
            CMD_SET_MODE => {
                let args = request.args.unwrap_or(serde_json::Value::Null);
                let command: CommandRequest = match serde_json::from_value(args) {
                    Ok(command) => command,
                    Err(e) => {
                        return WsResponse::error(
                            id,
                            ERR_MALFORMED_REQUEST,
                            format!("Invalid set_mode arguments: {}", e),
                        );
                    }
                };
                match self.controller.apply_request(&command).await {
                    Ok(outcome) => to_response(id, &outcome),
                    Err(e) => WsResponse::from_error(id, &e),
                }
            }
            CMD_HEALTH => to_response(id, &self.ctx.health().await),
            other => WsResponse::error(
                id,
                ERR_UNKNOWN_COMMAND,
                format!("Unknown command: {}", other),
            ),
        }
    }

    /// Parse a text frame and handle it.
    pub async fn handle_text(&self, text: &str) -> WsResponse {
        match serde_json::from_str::<WsRequest>(text) {
            Ok(request) => self.handle_request(request).await,
            Err(e) => {
                warn!("[Api] Malformed request: {}", e);
                WsResponse::error("", ERR_MALFORMED_REQUEST, format!("Malformed request: {}", e))
            }
        }
    }

    /// Accept connections until `cancel` fires.
    pub async fn serve(self: Arc<Self>, listener: TcpListener, cancel: CancellationToken) {
        if let Ok(addr) = listener.local_addr() {
            info!("[Api] Listening on ws://{}", addr);
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let server = self.clone();
                        let cancel = cancel.child_token();
                        tokio::spawn(async move {
                            server.handle_connection(stream, peer, cancel).await;
                        });
                    }
                    Err(e) => warn!("[Api] Accept failed: {}", e),
                },
            }
        }

        info!("[Api] Stopped accepting connections");
    }

    async fn handle_connection(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        cancel: CancellationToken,
    ) {
        let ws_stream = match accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                warn!("[Api] WebSocket handshake with {} failed: {}", peer, e);
                return;
            }
        };
        debug!("[Api] Client connected: {}", peer);

        let (mut write, mut read) = ws_stream.split();
        loop {
            let msg = tokio::select! {
                _ = cancel.cancelled() => break,
                msg = read.next() => msg,
            };

            let response = match msg {
                Some(Ok(Message::Text(text))) => {
                    let text_str: &str = &text;
                    self.handle_text(text_str).await
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    warn!("[Api] WebSocket error from {}: {}", peer, e);
                    break;
                }
            };

            let body = match serde_json::to_string(&response) {
                Ok(body) => body,
                Err(e) => {
                    warn!("[Api] Failed to encode response: {}", e);
                    continue;
                }
            };
            if let Err(e) = write.send(Message::Text(body.into())).await {
                warn!("[Api] Failed to reply to {}: {}", peer, e);
                break;
            }
        }

        debug!("[Api] Client disconnected: {}", peer);
    }
}

fn to_response<T: serde::Serialize>(id: String, value: &T) -> WsResponse {
    match serde_json::to_value(value) {
        Ok(result) => WsResponse::ok(id, result),
        Err(e) => WsResponse::error(id, ERR_MALFORMED_REQUEST, format!("Encoding failed: {}", e)),
    }
}

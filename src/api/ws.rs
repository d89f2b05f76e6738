use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;

use super::AppContext;

#[derive(Deserialize)]
pub(super) struct WsQuery {
    token: Option<String>,
}

/// The realtime channel: `GET /ws?token=...` (or an Authorization header).
///
/// Authentication happens after the upgrade so a rejected client gets a
/// proper WebSocket close with a policy-violation code instead of an HTTP
/// status the browser API cannot observe.
pub(super) async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(ctx): State<AppContext>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let credential = query.token.or_else(|| {
        headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(|token| token.to_string())
    });
    ws.on_upgrade(move |socket| handle_socket(socket, ctx, credential))
}

async fn handle_socket(mut socket: WebSocket, ctx: AppContext, credential: Option<String>) {
    // Verify the credential before the connection is registered anywhere.
    // A rejected handle is closed with the policy code and never sees a
    // single envelope.
    let identity = match credential.as_deref().map(|token| ctx.auth.verify(token)) {
        Some(Ok(claims)) => claims.sub,
        Some(Err(e)) => {
            tracing::warn!(error = %e, "realtime attach rejected: invalid credential");
            close_with_policy(&mut socket).await;
            return;
        }
        None => {
            tracing::warn!("realtime attach rejected: no credential");
            close_with_policy(&mut socket).await;
            return;
        }
    };

    let (_guard, mut shutdown_rx) = ctx.shutdown.register();
    let (client_id, mut outbound) = ctx.broadcaster.attach(&identity).await;
    tracing::info!(client = client_id, identity = %identity, "realtime client attached");

    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            // Broadcast fan-out -> socket. Queue order is envelope order.
            queued = outbound.recv() => {
                match queued {
                    Some(payload) => {
                        // Envelopes are serialized JSON; non-UTF-8 cannot happen.
                        let text = match String::from_utf8(payload.to_vec()) {
                            Ok(text) => text,
                            Err(_) => continue,
                        };
                        if ws_tx.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    // The broadcaster dropped this connection (slow client).
                    None => break,
                }
            }

            // Socket -> inbound message handling.
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        ctx.broadcaster.handle_client_message(client_id, &text);
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue, // Ping/Pong frames handled by axum.
                    Some(Err(_)) => break,
                }
            }

            // Server shutdown: flush a close frame, then exit.
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::debug!(client = client_id, "closing realtime client for shutdown");
                    let close_frame = CloseFrame {
                        code: close_code::NORMAL,
                        reason: "server shutting down".into(),
                    };
                    let _ = ws_tx.send(Message::Close(Some(close_frame))).await;
                    let _ = ws_tx.flush().await;
                    break;
                }
            }
        }
    }

    // Every exit path lands here exactly once; detach itself is idempotent.
    ctx.broadcaster.detach(client_id);
    tracing::debug!(client = client_id, "realtime client closed");
}

async fn close_with_policy(socket: &mut WebSocket) {
    let close_frame = CloseFrame {
        code: close_code::POLICY,
        reason: "authentication required".into(),
    };
    let _ = socket.send(Message::Close(Some(close_frame))).await;
}

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;
use warp::ws::{Message, WebSocket};

use crate::store::LogKind;
use crate::swap::events::{ClientEvent, ServerEvent};
use crate::swap::identity::{resolve_identity, IdentityHints};
use crate::swap::{EventHandler, ThoughtSwapServer};

pub async fn handle_swap_websocket(
    websocket: WebSocket,
    server: Arc<ThoughtSwapServer>,
    hints: IdentityHints,
) {
    let (mut ws_sender, mut ws_receiver) = websocket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    // Outbox pump: keeps per-connection sends strictly ordered while room
    // fan-out stays a non-blocking enqueue
    let sender_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if let Err(e) = ws_sender.send(message).await {
                tracing::debug!(error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    // Identity barrier: no inbound command is dispatched until the handshake
    // hints resolve to a stored user. Frames arriving early queue in the
    // socket, preserving per-connection order.
    let user = match resolve_identity(server.store().as_ref(), &hints).await {
        Ok(user) => user,
        Err(e) => {
            tracing::warn!(error = %e, "Handshake identity resolution failed");
            if let Ok(frame) = (ServerEvent::AuthError {
                message: e.client_message(),
            })
            .to_frame()
            {
                let _ = tx.send(frame);
            }
            // Let the pump flush the AUTH_ERROR before the socket closes
            drop(tx);
            let _ = sender_task.await;
            return;
        }
    };

    let connection_id = Uuid::new_v4();
    server.register_connection(connection_id, &user, tx).await;
    server
        .send(
            connection_id,
            &ServerEvent::ConsentStatus {
                consent_given: user.consent_given,
                consent_date: user.consent_date,
            },
        )
        .await;
    server.logger().log(
        LogKind::UserConnect,
        Some(user.id),
        serde_json::json!({ "email": user.email }),
    );

    let handler = EventHandler::new(server.clone(), connection_id, user);

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(message) => handle_frame(&handler, message).await,
            Err(e) => {
                tracing::debug!(connection_id = %connection_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    handler.cleanup().await;
    sender_task.abort();
}

async fn handle_frame(handler: &EventHandler, message: Message) {
    // Pings, pongs, and binary frames are not part of the protocol
    let text = match message.to_str() {
        Ok(text) => text,
        Err(_) => return,
    };

    match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => handler.handle_event(event).await,
        Err(e) => {
            tracing::debug!(error = %e, raw = %text, "Dropping unparseable frame");
        }
    }
}

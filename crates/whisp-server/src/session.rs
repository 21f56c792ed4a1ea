//! One WebSocket session: decode frames, run the matching relay
//! operation, write acknowledgments and pushed events back.
//!
//! The writer half drains a bounded channel shared with the relay, so a
//! session's own acks and the fan-out pushed at it leave through the same
//! queue in order.

use axum::extract::ws::{Message as WsMessage, WebSocket};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use whisp_core::{ConnectionId, Relay};
use whisp_shared::constants::PUSH_BUFFER;
use whisp_shared::protocol::{
    probe_seq, AckFrame, ClientRequest, InboundFrame, OutboundFrame, SearchUserAck,
};
use whisp_shared::RelayError;

/// Drive one connection until the peer hangs up.
pub async fn run(socket: WebSocket, relay: Relay) {
    let conn_id = ConnectionId::new();
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<OutboundFrame>(PUSH_BUFFER);

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let Ok(text) = serde_json::to_string(&frame) else {
                continue;
            };
            if sink.send(WsMessage::Text(text)).await.is_err() {
                break;
            }
        }
    });

    debug!(conn = %conn_id, "websocket session opened");

    while let Some(Ok(message)) = stream.next().await {
        match message {
            WsMessage::Text(raw) => {
                let ack = match serde_json::from_str::<InboundFrame>(&raw) {
                    Ok(frame) => dispatch(&relay, conn_id, &tx, frame).await,
                    Err(err) => {
                        debug!(conn = %conn_id, error = %err, "malformed frame");
                        Some(AckFrame::error(
                            probe_seq(&raw),
                            format!("malformed frame: {err}"),
                        ))
                    }
                };
                if let Some(ack) = ack {
                    if tx.send(OutboundFrame::Ack(ack)).await.is_err() {
                        break;
                    }
                }
            }
            WsMessage::Close(_) => break,
            // Pings are answered by the ws layer; binary frames are not
            // part of the protocol.
            _ => {}
        }
    }

    relay.disconnect(conn_id).await;
    writer.abort();
    debug!(conn = %conn_id, "websocket session closed");
}

/// Route one decoded request.  `None` means the request is fire-and-forget.
async fn dispatch(
    relay: &Relay,
    conn_id: ConnectionId,
    tx: &mpsc::Sender<OutboundFrame>,
    frame: InboundFrame,
) -> Option<AckFrame> {
    let seq = frame.seq;
    let ack = match frame.request {
        ClientRequest::Register(_) => {
            let ack = relay.register(conn_id, tx.clone()).await;
            ok_ack(seq, &ack)
        }
        ClientRequest::SearchUser(req) => {
            let user = relay.search_user(&req).await;
            let found = user.is_some();
            match AckFrame::with_success(seq, found, &SearchUserAck { user }) {
                Ok(ack) => ack,
                Err(err) => internal(seq, err),
            }
        }
        ClientRequest::CreateChat(req) => ok_ack(seq, &relay.create_chat(&req).await),
        ClientRequest::SendMessage(req) => result_ack(seq, relay.send_message(&req).await),
        ClientRequest::GetChatHistory(req) => {
            ok_ack(seq, &relay.get_chat_history(&req, Utc::now()).await)
        }
        ClientRequest::GetUserChats(req) => ok_ack(seq, &relay.get_user_chats(&req).await),
        ClientRequest::Typing(req) => {
            relay.typing(&req).await;
            return None;
        }
        ClientRequest::CreateAnonymousChat(req) => {
            result_ack(seq, relay.create_anonymous_chat(&req).await)
        }
        ClientRequest::SearchAnonymousChats(req) => {
            ok_ack(seq, &relay.search_anonymous_chats(&req).await)
        }
        ClientRequest::JoinAnonymousChat(req) => {
            result_ack(seq, relay.join_anonymous_chat(&req).await)
        }
        ClientRequest::UploadFile(req) => result_ack(seq, relay.upload_file(&req).await),
        ClientRequest::GetFile(req) => result_ack(seq, relay.get_file(&req, Utc::now()).await),
        ClientRequest::CreateCustomChannel(req) => {
            result_ack(seq, relay.create_custom_channel(&req).await)
        }
        ClientRequest::GetChatSettings(req) => result_ack(seq, relay.get_chat_settings(&req).await),
        ClientRequest::UpdateChatSettings(req) => {
            match relay.update_chat_settings(&req).await {
                Ok(()) => AckFrame::ok_empty(seq),
                Err(err) => AckFrame::error(seq, err.to_string()),
            }
        }
        ClientRequest::UploadVoiceMessage(req) => {
            result_ack(seq, relay.upload_voice_message(&req).await)
        }
    };
    Some(ack)
}

fn ok_ack<T: Serialize>(seq: Option<u64>, body: &T) -> AckFrame {
    AckFrame::ok(seq, body).unwrap_or_else(|err| internal(seq, err))
}

fn result_ack<T: Serialize>(seq: Option<u64>, result: Result<T, RelayError>) -> AckFrame {
    match result {
        Ok(body) => ok_ack(seq, &body),
        Err(err) => AckFrame::error(seq, err.to_string()),
    }
}

fn internal(seq: Option<u64>, err: serde_json::Error) -> AckFrame {
    AckFrame::error(seq, format!("internal error: {err}"))
}

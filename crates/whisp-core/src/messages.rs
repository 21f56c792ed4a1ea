//! Text relay, message expiry and typing indicators.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use whisp_shared::model::{Message, MessageBody};
use whisp_shared::protocol::{
    ChatHistoryAck, ChatHistoryRequest, SendMessageAck, SendMessageRequest, ServerEvent,
    TypingRequest,
};
use whisp_shared::RelayError;

use crate::state::Relay;

impl Relay {
    /// Relay a text message to every participant of the conversation
    /// (sender included) and start its self-destruct timer.
    pub async fn send_message(&self, req: &SendMessageRequest) -> Result<SendMessageAck, RelayError> {
        let mut state = self.lock().await;

        let conv = state
            .conversations
            .resolve(req.chat_id.as_str())
            .ok_or(RelayError::ChatNotFound)?;
        let participants = conv.participants();
        let ttl = conv.message_ttl(self.config.message_ttl);

        let sender = state
            .registry
            .get(req.user_id.as_str())
            .ok_or(RelayError::UserNotFound)?;
        let message = Message::new(
            MessageBody::Text {
                text: req.message.clone(),
            },
            req.user_id.clone(),
            sender.secret_id.clone(),
            Utc::now(),
            ttl,
        );
        let message_id = message.id;

        state
            .conversations
            .append_message(req.chat_id.as_str(), message.clone());
        let event = ServerEvent::NewMessage {
            chat_id: req.chat_id.clone(),
            message,
        };
        state.directory.broadcast(participants.iter(), None, &event);
        drop(state);

        self.schedule_message_expiry(req.chat_id.to_string(), message_id, ttl);
        debug!(chat = %req.chat_id, message = %message_id, "message relayed");
        Ok(SendMessageAck { message_id })
    }

    /// One-shot deletion timer.  The timer owns the `message_deleted`
    /// broadcast; sweeps and log removal just make it fire silently.
    pub(crate) fn schedule_message_expiry(
        &self,
        conversation: String,
        message_id: Uuid,
        ttl: Duration,
    ) {
        let relay = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            relay.expire_message(&conversation, message_id).await;
        });
    }

    /// Remove an expired message and announce the deletion.  A message
    /// already gone stays silent, so the event fires at most once.
    pub(crate) async fn expire_message(&self, conversation: &str, message_id: Uuid) {
        let mut state = self.lock().await;
        if !state.conversations.remove_message(conversation, message_id) {
            return;
        }
        let participants = state.conversations.participants_of(conversation);
        let event = ServerEvent::MessageDeleted {
            chat_id: conversation.to_owned(),
            message_id,
        };
        state.directory.broadcast(participants.iter(), None, &event);
        debug!(chat = conversation, message = %message_id, "message expired");
    }

    /// Unexpired history of a conversation; unknown ids read as empty.
    pub async fn get_chat_history(
        &self,
        req: &ChatHistoryRequest,
        now: DateTime<Utc>,
    ) -> ChatHistoryAck {
        let state = self.lock().await;
        ChatHistoryAck {
            messages: state.conversations.visible_history(req.chat_id.as_str(), now),
        }
    }

    /// Typing indicator fan-out to everyone else in the conversation.
    /// Fire-and-forget: unknown chats and users are dropped silently.
    pub async fn typing(&self, req: &TypingRequest) {
        let state = self.lock().await;
        let Some(conv) = state.conversations.resolve(req.chat_id.as_str()) else {
            return;
        };
        let participants = conv.participants();
        let Some(user) = state.registry.get(req.user_id.as_str()) else {
            return;
        };
        let event = ServerEvent::UserTyping {
            chat_id: req.chat_id.clone(),
            user_id: req.user_id.clone(),
            username: user.username.clone(),
            is_typing: req.is_typing,
        };
        state
            .directory
            .broadcast(participants.iter(), Some(&req.user_id), &event);
    }
}

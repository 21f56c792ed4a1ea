//! Direct one-to-one chats.

use chrono::Utc;
use tracing::info;

use whisp_shared::model::ChatListEntry;
use whisp_shared::protocol::{
    preview_of, CreateChatAck, CreateChatRequest, ServerEvent, UserChatsAck, UserChatsRequest,
};
use whisp_shared::types::ChatId;

use crate::conversations::DirectChat;
use crate::state::Relay;

impl Relay {
    /// Create the direct chat between two users, or find the existing
    /// one.  The pair key is order-independent, so both sides converge
    /// on the same chat no matter who asks first.
    pub async fn create_chat(&self, req: &CreateChatRequest) -> CreateChatAck {
        let chat_id = ChatId::direct(&req.current_user_id, &req.target_user_id);
        let mut state = self.lock().await;

        if !state.conversations.direct.contains_key(chat_id.as_str()) {
            let now = Utc::now();
            let (lo, hi) = if req.current_user_id.as_str() <= req.target_user_id.as_str() {
                (req.current_user_id.clone(), req.target_user_id.clone())
            } else {
                (req.target_user_id.clone(), req.current_user_id.clone())
            };
            state.conversations.direct.insert(
                chat_id.clone(),
                DirectChat {
                    chat_id: chat_id.clone(),
                    participants: [lo, hi],
                    created_at: now,
                    last_activity: now,
                },
            );

            // only the target is notified; the creator gets the ack
            let with_user = state
                .registry
                .get(req.current_user_id.as_str())
                .map(|user| user.summary());
            let event = ServerEvent::NewChat {
                chat_id: chat_id.clone(),
                with_user,
            };
            state.directory.push_event(req.target_user_id.as_str(), &event);
            info!(chat = %chat_id, "direct chat created");
        }

        CreateChatAck { chat_id }
    }

    /// Direct chat list for one user, newest activity first.
    pub async fn get_user_chats(&self, req: &UserChatsRequest) -> UserChatsAck {
        let state = self.lock().await;
        let mut chats: Vec<ChatListEntry> = state
            .conversations
            .direct
            .values()
            .filter(|chat| chat.involves(req.user_id.as_str()))
            .map(|chat| {
                let other = chat.other_participant(req.user_id.as_str());
                ChatListEntry {
                    chat_id: chat.chat_id.clone(),
                    other_user: state
                        .registry
                        .get(other.as_str())
                        .map(|user| user.peer_summary()),
                    last_message: state
                        .conversations
                        .last_message(chat.chat_id.as_str())
                        .map(preview_of),
                    last_activity: chat.last_activity,
                    unread_count: 0,
                }
            })
            .collect();
        chats.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        UserChatsAck { chats }
    }
}

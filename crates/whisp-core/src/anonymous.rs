//! Anonymous group chats: create, search, join.

use chrono::{TimeDelta, Utc};
use tracing::info;

use whisp_shared::model::AnonymousChatSearchEntry;
use whisp_shared::protocol::{
    CreateAnonymousChatAck, CreateAnonymousChatRequest, JoinAnonymousChatAck,
    JoinAnonymousChatRequest, SearchAnonymousChatsAck, SearchAnonymousChatsRequest, ServerEvent,
};
use whisp_shared::types::ChatId;
use whisp_shared::RelayError;

use crate::conversations::AnonymousChat;
use crate::state::Relay;

impl Relay {
    /// Open a new anonymous chat with the creator as its first member.
    pub async fn create_anonymous_chat(
        &self,
        req: &CreateAnonymousChatRequest,
    ) -> Result<CreateAnonymousChatAck, RelayError> {
        let mut state = self.lock().await;
        if state.registry.get(req.creator_id.as_str()).is_none() {
            return Err(RelayError::UserNotFound);
        }

        let chat_id = ChatId::anonymous();
        let now = Utc::now();
        let lifetime =
            TimeDelta::milliseconds(self.config.anonymous_chat_lifetime.as_millis() as i64);
        let name = req
            .chat_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .map(str::to_owned)
            .unwrap_or_else(|| format!("Anonymous chat {}", chat_id.short()));

        let chat = AnonymousChat {
            chat_id: chat_id.clone(),
            name,
            creator_id: req.creator_id.clone(),
            is_public: req.is_public,
            password: req.password.clone().filter(|p| !p.is_empty()),
            custom_id: req.custom_id.clone().filter(|id| !id.is_empty()),
            created_at: now,
            expires_at: now + lifetime,
            participants: std::iter::once(req.creator_id.clone()).collect(),
        };
        let info = chat.to_info();
        state.conversations.anonymous.insert(chat_id.clone(), chat);
        if let Some(user) = state.registry.get_mut(req.creator_id.as_str()) {
            user.anonymous_chat_memberships.insert(chat_id.clone());
        }

        info!(chat = %chat_id, "anonymous chat created");
        Ok(CreateAnonymousChatAck {
            invite_link: chat_id.to_string(),
            chat_id,
            chat: info,
        })
    }

    /// Case-insensitive substring search over public, unexpired chats.
    /// Newest first, capped.
    pub async fn search_anonymous_chats(
        &self,
        req: &SearchAnonymousChatsRequest,
    ) -> SearchAnonymousChatsAck {
        let state = self.lock().await;
        let now = Utc::now();
        let needle = req.query.to_lowercase();

        let mut chats: Vec<AnonymousChatSearchEntry> = state
            .conversations
            .anonymous
            .values()
            .filter(|chat| chat.is_public && !chat.is_expired(now))
            .filter(|chat| {
                chat.name.to_lowercase().contains(&needle)
                    || chat.chat_id.as_str().to_lowercase().contains(&needle)
                    || chat
                        .custom_id
                        .as_deref()
                        .is_some_and(|id| id.to_lowercase().contains(&needle))
            })
            .map(|chat| AnonymousChatSearchEntry {
                chat: chat.to_info(),
                is_member: chat.participants.contains(&req.user_id),
            })
            .collect();

        chats.sort_by(|a, b| b.chat.created_at.cmp(&a.chat.created_at));
        chats.truncate(self.config.search_result_cap);
        SearchAnonymousChatsAck { chats }
    }

    /// Join a chat (idempotently) and fetch its recent history.  Only a
    /// first-time join is announced to the other members.
    pub async fn join_anonymous_chat(
        &self,
        req: &JoinAnonymousChatRequest,
    ) -> Result<JoinAnonymousChatAck, RelayError> {
        let mut guard = self.lock().await;
        let state = &mut *guard;
        let now = Utc::now();

        let chat = state
            .conversations
            .anonymous
            .get_mut(req.chat_id.as_str())
            .filter(|chat| !chat.is_expired(now))
            .ok_or(RelayError::ChatUnavailable)?;

        if chat
            .password
            .as_deref()
            .is_some_and(|expected| req.password.as_deref() != Some(expected))
        {
            return Err(RelayError::InvalidPassword);
        }

        if chat.participants.insert(req.user_id.clone()) {
            if let Some(user) = state.registry.get_mut(req.user_id.as_str()) {
                user.anonymous_chat_memberships.insert(req.chat_id.clone());
            }
            let event = ServerEvent::UserJoinedAnonymousChat {
                chat_id: req.chat_id.clone(),
                user_id: req.user_id.clone(),
            };
            state
                .directory
                .broadcast(chat.participants.iter(), Some(&req.user_id), &event);
            info!(chat = %req.chat_id, user = %req.user_id, "joined anonymous chat");
        }

        let user_count = chat.participants.len();
        let info = chat.to_info();
        let messages = state.conversations.recent_history(
            req.chat_id.as_str(),
            now,
            self.config.join_history_cap,
        );

        Ok(JoinAnonymousChatAck {
            chat: info,
            messages,
            user_count,
        })
    }
}

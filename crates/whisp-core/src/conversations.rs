//! Conversation records and the shared message log.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use whisp_shared::model::{AnonymousChatInfo, ChannelInfo, ChannelKind, ChannelSettings, Message};
use whisp_shared::types::{ChannelId, ChatId, UserId};

/// One-to-one chat under a deterministic pair key.
#[derive(Debug, Clone)]
pub struct DirectChat {
    pub chat_id: ChatId,
    pub participants: [UserId; 2],
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl DirectChat {
    pub fn involves(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p.as_str() == user_id)
    }

    pub fn other_participant(&self, user_id: &str) -> &UserId {
        if self.participants[0].as_str() == user_id {
            &self.participants[1]
        } else {
            &self.participants[0]
        }
    }
}

/// Anonymous group chat with a fixed lifetime.
#[derive(Debug, Clone)]
pub struct AnonymousChat {
    pub chat_id: ChatId,
    pub name: String,
    pub creator_id: UserId,
    pub is_public: bool,
    pub password: Option<String>,
    pub custom_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub participants: HashSet<UserId>,
}

impl AnonymousChat {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Sanitized public view; the password itself never leaves the relay.
    pub fn to_info(&self) -> AnonymousChatInfo {
        AnonymousChatInfo {
            id: self.chat_id.clone(),
            name: self.name.clone(),
            creator_id: self.creator_id.clone(),
            is_public: self.is_public,
            has_password: self.password.is_some(),
            custom_id: self.custom_id.clone(),
            created_at: self.created_at,
            expires_at: self.expires_at,
            user_count: self.participants.len(),
        }
    }
}

/// Creator-configurable channel.  Channels have no expiry sweep; an
/// expired channel merely stops being advertised.
#[derive(Debug, Clone)]
pub struct Channel {
    pub channel_id: ChannelId,
    pub custom_id: Option<String>,
    pub name: String,
    pub description: String,
    pub kind: ChannelKind,
    pub creator_id: UserId,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub settings: ChannelSettings,
    pub members: HashSet<UserId>,
    pub is_active: bool,
}

impl Channel {
    pub fn to_info(&self) -> ChannelInfo {
        ChannelInfo {
            id: self.channel_id.clone(),
            custom_id: self.custom_id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            kind: self.kind,
            creator_id: self.creator_id.clone(),
            created_at: self.created_at,
            expires_at: self.expires_at,
            settings: self.settings.clone(),
            is_active: self.is_active,
        }
    }
}

/// A resolved conversation of any kind.
pub enum Conversation<'a> {
    Direct(&'a DirectChat),
    Anonymous(&'a AnonymousChat),
    Channel(&'a Channel),
}

impl Conversation<'_> {
    pub fn participants(&self) -> Vec<UserId> {
        match self {
            Conversation::Direct(chat) => chat.participants.to_vec(),
            Conversation::Anonymous(chat) => chat.participants.iter().cloned().collect(),
            Conversation::Channel(channel) => channel.members.iter().cloned().collect(),
        }
    }

    /// Channels override the message TTL through their settings.
    pub fn message_ttl(&self, default: Duration) -> Duration {
        match self {
            Conversation::Channel(channel) => channel.settings.message_ttl(),
            _ => default,
        }
    }

    pub fn is_channel(&self) -> bool {
        matches!(self, Conversation::Channel(_))
    }
}

/// Every conversation plus one message log keyed by conversation id.
/// The id spaces (pair keys, 12-char tokens) do not collide in practice.
#[derive(Debug, Default)]
pub struct ConversationStore {
    pub(crate) direct: HashMap<ChatId, DirectChat>,
    pub(crate) anonymous: HashMap<ChatId, AnonymousChat>,
    pub(crate) channels: HashMap<ChannelId, Channel>,
    logs: HashMap<String, Vec<Message>>,
}

impl ConversationStore {
    pub fn resolve(&self, id: &str) -> Option<Conversation<'_>> {
        if let Some(chat) = self.direct.get(id) {
            return Some(Conversation::Direct(chat));
        }
        if let Some(chat) = self.anonymous.get(id) {
            return Some(Conversation::Anonymous(chat));
        }
        self.channels.get(id).map(Conversation::Channel)
    }

    pub fn participants_of(&self, id: &str) -> Vec<UserId> {
        self.resolve(id)
            .map(|conv| conv.participants())
            .unwrap_or_default()
    }

    /// Append to the log; direct chats also track their latest activity.
    pub fn append_message(&mut self, id: &str, message: Message) {
        if let Some(chat) = self.direct.get_mut(id) {
            chat.last_activity = message.timestamp;
        }
        self.logs.entry(id.to_owned()).or_default().push(message);
    }

    /// Remove one message; `false` when it was already gone.
    pub fn remove_message(&mut self, id: &str, message_id: Uuid) -> bool {
        match self.logs.get_mut(id) {
            Some(log) => {
                let before = log.len();
                log.retain(|message| message.id != message_id);
                before != log.len()
            }
            None => false,
        }
    }

    /// Unexpired log entries, oldest first.  Unknown ids read as empty.
    pub fn visible_history(&self, id: &str, now: DateTime<Utc>) -> Vec<Message> {
        self.logs
            .get(id)
            .map(|log| {
                log.iter()
                    .filter(|message| message.is_visible(now))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Last `cap` unexpired entries, oldest first.
    pub fn recent_history(&self, id: &str, now: DateTime<Utc>, cap: usize) -> Vec<Message> {
        let mut history = self.visible_history(id, now);
        if history.len() > cap {
            history.drain(..history.len() - cap);
        }
        history
    }

    /// Latest log entry regardless of expiry; the timers prune the log,
    /// so a stale tail only shows up inside their firing jitter.
    pub fn last_message(&self, id: &str) -> Option<&Message> {
        self.logs.get(id).and_then(|log| log.last())
    }

    pub fn remove_log(&mut self, id: &str) {
        self.logs.remove(id);
    }

    pub fn chat_count(&self) -> usize {
        self.direct.len() + self.anonymous.len()
    }
}

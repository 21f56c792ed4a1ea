//! Domain records as they appear on the wire.
//!
//! Every struct serializes with camelCase keys and epoch-millisecond
//! timestamps.  Internal-only state (live connection handles, anonymous
//! chat passwords) never appears here; these are the sanitized shapes
//! handed to clients in acknowledgments and pushes.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{DEFAULT_AUTO_DELETE_MS, DEFAULT_MAX_USERS};
use crate::types::{AttachmentId, ChannelId, ChatId, SecretId, UserId};

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single chat message, uniform across direct chats, anonymous chats and
/// channels.  Exactly one payload kind; the payload fields are flattened
/// into the message object on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    #[serde(flatten)]
    pub body: MessageBody,
    pub sender_id: UserId,
    /// Snapshot of the sender's secret id at send time, kept for display
    /// stability.
    pub sender_secret_id: SecretId,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
    /// `HH:MM` rendering of the timestamp, snapshotted at creation.
    pub time_string: String,
}

/// Message payload: plain text, a file reference, or a voice reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MessageBody {
    Text {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    File {
        file_id: AttachmentId,
        file_name: String,
        file_type: String,
        file_size: u64,
    },
    #[serde(rename_all = "camelCase")]
    Voice {
        voice_id: AttachmentId,
        /// Recording length in seconds, as reported by the client.
        duration: f64,
    },
}

impl Message {
    /// Stamp a new message: fresh id, creation timestamp, expiry at
    /// `now + ttl`, display time snapshot.
    pub fn new(
        body: MessageBody,
        sender_id: UserId,
        sender_secret_id: SecretId,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            body,
            sender_id,
            sender_secret_id,
            timestamp: now,
            expires_at: saturating_after(now, ttl.as_millis()),
            time_string: now.format("%H:%M").to_string(),
        }
    }

    /// The text payload, if this is a text message.
    pub fn text(&self) -> Option<&str> {
        match &self.body {
            MessageBody::Text { text } => Some(text),
            _ => None,
        }
    }

    /// Visible in history iff its expiry lies strictly in the future.
    pub fn is_visible(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// `now + millis`, pinned to the calendar's end instead of overflowing.
/// Client-supplied lifetimes are unbounded u64 milliseconds; absurd values
/// mean "effectively never expires", not a dead connection.
pub fn saturating_after(now: DateTime<Utc>, millis: u128) -> DateTime<Utc> {
    now.checked_add_signed(TimeDelta::milliseconds(
        i64::try_from(millis).unwrap_or(i64::MAX),
    ))
    .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

// ---------------------------------------------------------------------------
// User summaries
// ---------------------------------------------------------------------------

/// Public view of a user, returned by secret-id search and chat creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub user_id: UserId,
    pub secret_id: SecretId,
    pub username: String,
    pub online: bool,
}

/// Counterpart annotation in a chat list entry; carries no user id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PeerSummary {
    pub secret_id: SecretId,
    pub username: String,
    pub online: bool,
}

// ---------------------------------------------------------------------------
// Chat list
// ---------------------------------------------------------------------------

/// One entry in a user's direct chat list, newest activity first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatListEntry {
    pub chat_id: ChatId,
    /// `null` when the counterpart is unknown to the registry.
    pub other_user: Option<PeerSummary>,
    /// `null` when the log is empty.
    pub last_message: Option<MessagePreview>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_activity: DateTime<Utc>,
    /// Read tracking is out of scope; always zero.
    pub unread_count: u32,
}

/// Preview of the most recent log entry: raw text (absent for file and
/// voice messages) plus its display time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessagePreview {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub time: String,
}

// ---------------------------------------------------------------------------
// Anonymous chat
// ---------------------------------------------------------------------------

/// Public view of an anonymous group chat.  The password itself is never
/// serialized, only whether one is set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AnonymousChatInfo {
    pub id: ChatId,
    pub name: String,
    pub creator_id: UserId,
    pub is_public: bool,
    pub has_password: bool,
    pub custom_id: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
    /// Live member count at the time the view was taken.
    pub user_count: usize,
}

/// Search result: the chat view plus whether the requester already joined.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AnonymousChatSearchEntry {
    #[serde(flatten)]
    pub chat: AnonymousChatInfo,
    pub is_member: bool,
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

/// Channel visibility.  Pure metadata; nothing gates on it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    #[default]
    Public,
    Private,
}

/// Public view of a channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChannelInfo {
    pub id: ChannelId,
    pub custom_id: Option<String>,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: ChannelKind,
    pub creator_id: UserId,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub expires_at: Option<DateTime<Utc>>,
    pub settings: ChannelSettings,
    pub is_active: bool,
}

/// Channel settings, mutable only by the creator.
///
/// The named fields are the documented ones; any extra keys a client
/// supplies survive merging and round-trip through the flattened tail.
/// Only `auto_delete_messages` changes server behavior (it sets the
/// message TTL for the channel); the rest is advisory client state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSettings {
    pub allow_files: bool,
    pub allow_voice: bool,
    pub max_users: u32,
    pub require_password: bool,
    pub password: Option<String>,
    /// Message TTL for this channel, in milliseconds.
    pub auto_delete_messages: u64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            allow_files: true,
            allow_voice: true,
            max_users: DEFAULT_MAX_USERS,
            require_password: false,
            password: None,
            auto_delete_messages: DEFAULT_AUTO_DELETE_MS,
            extra: serde_json::Map::new(),
        }
    }
}

impl ChannelSettings {
    /// Merge a patch key-by-key; absent keys keep their current value,
    /// unknown keys accumulate in the extensible tail.
    pub fn apply(&mut self, patch: ChannelSettingsPatch) {
        if let Some(v) = patch.allow_files {
            self.allow_files = v;
        }
        if let Some(v) = patch.allow_voice {
            self.allow_voice = v;
        }
        if let Some(v) = patch.max_users {
            self.max_users = v;
        }
        if let Some(v) = patch.require_password {
            self.require_password = v;
        }
        if let Some(v) = patch.password {
            self.password = Some(v);
        }
        if let Some(v) = patch.auto_delete_messages {
            self.auto_delete_messages = v;
        }
        self.extra.extend(patch.extra);
    }

    /// Defaults with a creation-time patch applied on top.
    pub fn merged(patch: ChannelSettingsPatch) -> Self {
        let mut settings = Self::default();
        settings.apply(patch);
        settings
    }

    pub fn message_ttl(&self) -> Duration {
        Duration::from_millis(self.auto_delete_messages)
    }
}

/// Partial settings update; every field optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSettingsPatch {
    pub allow_files: Option<bool>,
    pub allow_voice: Option<bool>,
    pub max_users: Option<u32>,
    pub require_password: Option<bool>,
    pub password: Option<String>,
    pub auto_delete_messages: Option<u64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The fixed settings reported for direct and anonymous chats, which have
/// no mutable configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BasicChatSettings {
    pub allow_files: bool,
    pub allow_voice: bool,
    pub auto_delete_messages: u64,
}

impl Default for BasicChatSettings {
    fn default() -> Self {
        Self {
            allow_files: true,
            allow_voice: true,
            auto_delete_messages: DEFAULT_AUTO_DELETE_MS,
        }
    }
}

// ---------------------------------------------------------------------------
// Attachment
// ---------------------------------------------------------------------------

/// A stored file or voice blob.  The payload stays in whatever transport
/// encoding the client sent; the relay never decodes it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: AttachmentId,
    pub name: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub size: u64,
    pub data: String,
    pub uploader_id: UserId,
    pub uploader_secret_id: SecretId,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub uploaded_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
}

impl Attachment {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn summary(&self) -> AttachmentSummary {
        AttachmentSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            mime_type: self.mime_type.clone(),
            size: self.size,
            url: format!("/file/{}", self.id),
        }
    }
}

/// Payload-free view of an attachment, pushed alongside file messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentSummary {
    pub id: AttachmentId,
    pub name: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub size: u64,
    /// Fetch path for the blob, `/file/<id>`.
    pub url: String,
}

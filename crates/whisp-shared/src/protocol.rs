//! Wire protocol for the WebSocket session.
//!
//! Clients send [`InboundFrame`]s: `{"seq": 3, "event": "...", "data": {...}}`.
//! The relay answers requests with [`AckFrame`]s echoing `seq`, and pushes
//! [`ServerEvent`]s (no `seq`) to everyone a state change concerns.  A frame
//! that cannot be decoded gets an error ack with whatever `seq` can still be
//! recovered from the raw text.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::model::{
    AnonymousChatInfo, AnonymousChatSearchEntry, Attachment, AttachmentSummary, BasicChatSettings,
    ChannelInfo, ChannelKind, ChannelSettings, ChannelSettingsPatch, ChatListEntry, Message,
    MessagePreview, UserSummary,
};
use crate::types::{AttachmentId, ChannelId, ChatId, SecretId, UserId};

// ---------------------------------------------------------------------------
// Client -> server
// ---------------------------------------------------------------------------

/// One decoded client frame: optional request correlation id plus the
/// request itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InboundFrame {
    pub seq: Option<u64>,
    #[serde(flatten)]
    pub request: ClientRequest,
}

/// Every request a client can issue, keyed by its `event` name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientRequest {
    Register(RegisterRequest),
    SearchUser(SearchUserRequest),
    CreateChat(CreateChatRequest),
    SendMessage(SendMessageRequest),
    GetChatHistory(ChatHistoryRequest),
    GetUserChats(UserChatsRequest),
    Typing(TypingRequest),
    CreateAnonymousChat(CreateAnonymousChatRequest),
    SearchAnonymousChats(SearchAnonymousChatsRequest),
    JoinAnonymousChat(JoinAnonymousChatRequest),
    UploadFile(UploadFileRequest),
    GetFile(GetFileRequest),
    CreateCustomChannel(CreateChannelRequest),
    GetChatSettings(GetChatSettingsRequest),
    UpdateChatSettings(UpdateChatSettingsRequest),
    UploadVoiceMessage(UploadVoiceRequest),
}

/// `register` carries no parameters; the relay mints both ids.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegisterRequest {}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SearchUserRequest {
    pub secret_id: SecretId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateChatRequest {
    pub current_user_id: UserId,
    pub target_user_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub chat_id: ChatId,
    pub message: String,
    pub user_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatHistoryRequest {
    pub chat_id: ChatId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserChatsRequest {
    pub user_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TypingRequest {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub is_typing: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateAnonymousChatRequest {
    pub chat_name: Option<String>,
    pub creator_id: UserId,
    #[serde(default)]
    pub is_public: bool,
    pub password: Option<String>,
    pub custom_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SearchAnonymousChatsRequest {
    pub query: String,
    pub user_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JoinAnonymousChatRequest {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub password: Option<String>,
}

/// File upload.  Exactly one of `chat_id` / `channel_id` names the target,
/// selected by `is_channel`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UploadFileRequest {
    pub file_name: String,
    pub file_type: String,
    /// Declared size in bytes; checked against the upload cap.
    pub file_size: u64,
    /// Blob payload in the client's transport encoding, stored opaquely.
    pub file_data: String,
    pub chat_id: Option<ChatId>,
    pub channel_id: Option<ChannelId>,
    #[serde(default)]
    pub is_channel: bool,
    pub user_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GetFileRequest {
    pub file_id: AttachmentId,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateChannelRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<ChannelKind>,
    pub settings: Option<ChannelSettingsPatch>,
    pub creator_id: UserId,
    pub custom_id: Option<String>,
    /// Lifetime in milliseconds; absent means the channel never expires.
    pub lifetime: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GetChatSettingsRequest {
    /// Chat or channel id, disambiguated by `is_channel`.
    pub chat_id: String,
    #[serde(default)]
    pub is_channel: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateChatSettingsRequest {
    pub chat_id: String,
    #[serde(default)]
    pub is_channel: bool,
    pub settings: ChannelSettingsPatch,
    pub user_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UploadVoiceRequest {
    /// Encoded recording, stored opaquely like file payloads.
    pub audio_data: String,
    /// Recording length in seconds.
    pub duration: f64,
    pub chat_id: Option<ChatId>,
    pub channel_id: Option<ChannelId>,
    #[serde(default)]
    pub is_channel: bool,
    pub user_id: UserId,
}

// ---------------------------------------------------------------------------
// Server -> client
// ---------------------------------------------------------------------------

/// Anything the relay writes to a socket: a request acknowledgment or an
/// unsolicited push.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum OutboundFrame {
    Ack(AckFrame),
    Event(ServerEvent),
}

impl From<AckFrame> for OutboundFrame {
    fn from(ack: AckFrame) -> Self {
        Self::Ack(ack)
    }
}

impl From<ServerEvent> for OutboundFrame {
    fn from(event: ServerEvent) -> Self {
        Self::Event(event)
    }
}

/// Request acknowledgment.  Success acks flatten their payload next to
/// `success`; error acks carry `error` and nothing else.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AckFrame {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl AckFrame {
    /// Success ack with a payload; the payload must serialize to an object.
    pub fn ok<T: Serialize>(seq: Option<u64>, body: &T) -> Result<Self, serde_json::Error> {
        Self::with_success(seq, true, body)
    }

    /// Payload-carrying ack with an explicit success flag, for requests
    /// whose miss case is not an error (user search).
    pub fn with_success<T: Serialize>(
        seq: Option<u64>,
        success: bool,
        body: &T,
    ) -> Result<Self, serde_json::Error> {
        let body = match serde_json::to_value(body)? {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(serde::ser::Error::custom(format!(
                    "ack body must serialize to an object, got {other}"
                )))
            }
        };
        Ok(Self {
            seq,
            success,
            error: None,
            body,
        })
    }

    /// Bare success ack.
    pub fn ok_empty(seq: Option<u64>) -> Self {
        Self {
            seq,
            success: true,
            error: None,
            body: Map::new(),
        }
    }

    /// Error ack.
    pub fn error(seq: Option<u64>, message: impl Into<String>) -> Self {
        Self {
            seq,
            success: false,
            error: Some(message.into()),
            body: Map::new(),
        }
    }
}

/// Unsolicited pushes, keyed by their `event` name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    /// A direct chat now exists; delivered to the other participant.
    NewChat {
        chat_id: ChatId,
        #[serde(skip_serializing_if = "Option::is_none")]
        with_user: Option<UserSummary>,
    },
    NewMessage {
        chat_id: ChatId,
        message: Message,
    },
    MessageDeleted {
        chat_id: String,
        message_id: Uuid,
    },
    UserTyping {
        chat_id: ChatId,
        user_id: UserId,
        username: String,
        is_typing: bool,
    },
    UserJoinedAnonymousChat {
        chat_id: ChatId,
        user_id: UserId,
    },
    NewFileMessage {
        chat_id: String,
        is_channel: bool,
        message: Message,
        file_info: AttachmentSummary,
    },
    NewVoiceMessage {
        chat_id: String,
        is_channel: bool,
        message: Message,
    },
    ChatSettingsUpdated {
        chat_id: String,
        is_channel: bool,
        settings: ChannelSettings,
    },
    UserStatusChanged {
        user_id: UserId,
        online: bool,
    },
}

// ---------------------------------------------------------------------------
// Ack payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RegisterAck {
    pub user_id: UserId,
    pub secret_id: SecretId,
}

/// `user` is always present, `null` on a miss.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchUserAck {
    pub user: Option<UserSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateChatAck {
    pub chat_id: ChatId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageAck {
    pub message_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatHistoryAck {
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserChatsAck {
    pub chats: Vec<ChatListEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateAnonymousChatAck {
    pub chat_id: ChatId,
    pub chat: AnonymousChatInfo,
    pub invite_link: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchAnonymousChatsAck {
    pub chats: Vec<AnonymousChatSearchEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JoinAnonymousChatAck {
    pub chat: AnonymousChatInfo,
    /// Unexpired recent history, oldest first.
    pub messages: Vec<Message>,
    pub user_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UploadFileAck {
    pub file_id: AttachmentId,
    pub message_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GetFileAck {
    /// Full record including the payload.
    pub file_info: Attachment,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateChannelAck {
    pub channel: ChannelInfo,
    pub channel_id: ChannelId,
    pub invite_link: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UploadVoiceAck {
    pub voice_id: AttachmentId,
}

/// `get_chat_settings` payload; channels report their live settings,
/// direct and anonymous chats a fixed read-only set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum SettingsSnapshot {
    Channel {
        settings: ChannelSettings,
        info: ChannelMeta,
    },
    Chat {
        settings: BasicChatSettings,
        info: BasicChatMeta,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChannelMeta {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: ChannelKind,
    pub user_count: usize,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BasicChatMeta {
    pub participants: usize,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Preview helper for chat list entries.
pub fn preview_of(message: &Message) -> MessagePreview {
    MessagePreview {
        text: message.text().map(str::to_owned),
        time: message.time_string.clone(),
    }
}

// ---------------------------------------------------------------------------
// Lenient decoding
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct SeqProbe {
    seq: Option<u64>,
}

/// Best-effort `seq` recovery from a frame that failed full decoding, so
/// the error ack can still be correlated.
pub fn probe_seq(raw: &str) -> Option<u64> {
    serde_json::from_str::<SeqProbe>(raw)
        .ok()
        .and_then(|probe| probe.seq)
}

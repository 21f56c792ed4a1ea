//! Attachment storage and the upload/download operations.
//!
//! Blobs live in memory next to the conversations and expire on their own
//! 24h clock, independent of the message that references them.  Uploads are
//! validated before anything is stored; a rejected upload leaves no trace.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info};

use whisp_shared::constants::{ALLOWED_MIME_PREFIXES, ALLOWED_MIME_TYPES};
use whisp_shared::model::{Attachment, Message, MessageBody};
use whisp_shared::protocol::{
    GetFileAck, GetFileRequest, ServerEvent, UploadFileAck, UploadFileRequest, UploadVoiceAck,
    UploadVoiceRequest,
};
use whisp_shared::types::{AttachmentId, ChannelId, ChatId, SecretId};
use whisp_shared::RelayError;

use crate::state::Relay;

/// In-memory blob store keyed by attachment id.
#[derive(Debug, Default)]
pub struct AttachmentStore {
    blobs: HashMap<AttachmentId, Attachment>,
}

impl AttachmentStore {
    pub fn insert(&mut self, attachment: Attachment) {
        self.blobs.insert(attachment.id.clone(), attachment);
    }

    pub fn get(&self, id: &str) -> Option<&Attachment> {
        self.blobs.get(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<Attachment> {
        self.blobs.remove(id)
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// Drop every expired blob, returning how many went.
    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.blobs.len();
        self.blobs.retain(|_, attachment| !attachment.is_expired(now));
        before - self.blobs.len()
    }
}

/// Whitelist check on the declared MIME type.
pub fn mime_allowed(mime: &str) -> bool {
    ALLOWED_MIME_PREFIXES
        .iter()
        .any(|prefix| mime.starts_with(prefix))
        || ALLOWED_MIME_TYPES.contains(&mime)
}

/// Pick the conversation an upload lands in.  A channel upload missing its
/// channel id falls back to the plain chat id.
fn upload_target<'a>(
    is_channel: bool,
    channel_id: Option<&'a ChannelId>,
    chat_id: Option<&'a ChatId>,
) -> Result<&'a str, RelayError> {
    if is_channel {
        if let Some(id) = channel_id {
            return Ok(id.as_str());
        }
    }
    match chat_id {
        Some(id) => Ok(id.as_str()),
        None => Err(RelayError::ChatNotFound),
    }
}

impl Relay {
    /// Store a file blob and relay the matching file message.
    pub async fn upload_file(&self, req: &UploadFileRequest) -> Result<UploadFileAck, RelayError> {
        if req.file_size > self.config.max_file_bytes {
            return Err(RelayError::PayloadTooLarge {
                size: req.file_size,
                max: self.config.max_file_bytes,
            });
        }
        if !mime_allowed(&req.file_type) {
            return Err(RelayError::UnsupportedType(req.file_type.clone()));
        }
        let target = upload_target(req.is_channel, req.channel_id.as_ref(), req.chat_id.as_ref())?;

        let mut guard = self.lock().await;
        let state = &mut *guard;
        let now = Utc::now();

        let conversation = state
            .conversations
            .resolve(target)
            .ok_or(RelayError::ChatNotFound)?;
        let participants = conversation.participants();
        let ttl = conversation.message_ttl(self.config.message_ttl);
        let in_channel = conversation.is_channel();

        let uploader_secret = state
            .registry
            .get(req.user_id.as_str())
            .map(|user| user.secret_id.clone())
            .unwrap_or_else(|| SecretId::from("unknown"));

        let attachment = Attachment {
            id: AttachmentId::file(),
            name: req.file_name.clone(),
            mime_type: req.file_type.clone(),
            size: req.file_size,
            data: req.file_data.clone(),
            uploader_id: req.user_id.clone(),
            uploader_secret_id: uploader_secret.clone(),
            uploaded_at: now,
            expires_at: now
                + TimeDelta::milliseconds(self.config.attachment_ttl.as_millis() as i64),
        };
        let file_id = attachment.id.clone();
        let file_info = attachment.summary();

        let message = Message::new(
            MessageBody::File {
                file_id: file_id.clone(),
                file_name: req.file_name.clone(),
                file_type: req.file_type.clone(),
                file_size: req.file_size,
            },
            req.user_id.clone(),
            uploader_secret,
            now,
            ttl,
        );
        let message_id = message.id;

        state.attachments.insert(attachment);
        state.conversations.append_message(target, message.clone());
        let event = ServerEvent::NewFileMessage {
            chat_id: target.to_owned(),
            is_channel: in_channel,
            message,
            file_info,
        };
        state.directory.broadcast(participants.iter(), None, &event);
        drop(guard);

        self.schedule_message_expiry(target.to_owned(), message_id, ttl);
        self.schedule_attachment_expiry(file_id.clone(), self.config.attachment_ttl);
        info!(file = %file_id, size = req.file_size, chat = target, "file stored");
        Ok(UploadFileAck {
            file_id,
            message_id,
        })
    }

    /// Store a voice recording and relay the matching voice message.
    pub async fn upload_voice_message(
        &self,
        req: &UploadVoiceRequest,
    ) -> Result<UploadVoiceAck, RelayError> {
        let size = req.audio_data.len() as u64;
        if size > self.config.max_voice_bytes {
            return Err(RelayError::PayloadTooLarge {
                size,
                max: self.config.max_voice_bytes,
            });
        }
        let target = upload_target(req.is_channel, req.channel_id.as_ref(), req.chat_id.as_ref())?;

        let mut guard = self.lock().await;
        let state = &mut *guard;
        let now = Utc::now();

        let conversation = state
            .conversations
            .resolve(target)
            .ok_or(RelayError::ChatNotFound)?;
        let participants = conversation.participants();
        let ttl = conversation.message_ttl(self.config.message_ttl);
        let in_channel = conversation.is_channel();

        let uploader_secret = state
            .registry
            .get(req.user_id.as_str())
            .map(|user| user.secret_id.clone())
            .unwrap_or_else(|| SecretId::from("unknown"));

        let attachment = Attachment {
            id: AttachmentId::voice(),
            name: "voice_message.ogg".to_owned(),
            mime_type: "audio/ogg".to_owned(),
            size,
            data: req.audio_data.clone(),
            uploader_id: req.user_id.clone(),
            uploader_secret_id: uploader_secret.clone(),
            uploaded_at: now,
            expires_at: now
                + TimeDelta::milliseconds(self.config.attachment_ttl.as_millis() as i64),
        };
        let voice_id = attachment.id.clone();

        let message = Message::new(
            MessageBody::Voice {
                voice_id: voice_id.clone(),
                duration: req.duration,
            },
            req.user_id.clone(),
            uploader_secret,
            now,
            ttl,
        );
        let message_id = message.id;

        state.attachments.insert(attachment);
        state.conversations.append_message(target, message.clone());
        let event = ServerEvent::NewVoiceMessage {
            chat_id: target.to_owned(),
            is_channel: in_channel,
            message,
        };
        state.directory.broadcast(participants.iter(), None, &event);
        drop(guard);

        self.schedule_message_expiry(target.to_owned(), message_id, ttl);
        self.schedule_attachment_expiry(voice_id.clone(), self.config.attachment_ttl);
        info!(voice = %voice_id, size, chat = target, "voice message stored");
        Ok(UploadVoiceAck { voice_id })
    }

    /// Fetch a stored blob.  Reading an expired blob purges it; the caller
    /// cannot tell a purged blob from one that never existed.
    pub async fn get_file(
        &self,
        req: &GetFileRequest,
        now: DateTime<Utc>,
    ) -> Result<GetFileAck, RelayError> {
        let mut state = self.lock().await;
        {
            let Some(attachment) = state.attachments.get(req.file_id.as_str()) else {
                return Err(RelayError::FileNotFound);
            };
            if !attachment.is_expired(now) {
                return Ok(GetFileAck {
                    file_info: attachment.clone(),
                });
            }
        }
        state.attachments.remove(req.file_id.as_str());
        debug!(file = %req.file_id, "expired attachment purged on read");
        Err(RelayError::FileNotFound)
    }

    /// Arm the deletion timer for one blob.  Blob expiry is silent; only
    /// message deletion is announced.
    pub(crate) fn schedule_attachment_expiry(&self, id: AttachmentId, ttl: Duration) {
        let relay = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let mut state = relay.lock().await;
            if state.attachments.remove(id.as_str()).is_some() {
                debug!(file = %id, "attachment expired");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeDelta;
    use serde_json::json;
    use tokio::sync::mpsc::{self, Receiver};

    use whisp_shared::protocol::{
        CreateChannelRequest, CreateChatRequest, OutboundFrame, RegisterAck,
    };

    use crate::directory::ConnectionId;
    use crate::state::RelayConfig;

    async fn connect(relay: &Relay) -> (RegisterAck, Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(256);
        let ack = relay.register(ConnectionId::new(), tx).await;
        (ack, rx)
    }

    async fn direct_pair(
        relay: &Relay,
    ) -> (RegisterAck, Receiver<OutboundFrame>, RegisterAck, Receiver<OutboundFrame>, ChatId) {
        let (a, rx_a) = connect(relay).await;
        let (b, mut rx_b) = connect(relay).await;
        let chat = relay
            .create_chat(&CreateChatRequest {
                current_user_id: a.user_id.clone(),
                target_user_id: b.user_id.clone(),
            })
            .await;
        let _ = rx_b.try_recv(); // swallow new_chat
        (a, rx_a, b, rx_b, chat.chat_id)
    }

    fn next_event(rx: &mut Receiver<OutboundFrame>) -> Option<ServerEvent> {
        match rx.try_recv() {
            Ok(OutboundFrame::Event(event)) => Some(event),
            _ => None,
        }
    }

    fn file_request(chat_id: &ChatId, user_id: &whisp_shared::types::UserId) -> UploadFileRequest {
        UploadFileRequest {
            file_name: "photo.png".into(),
            file_type: "image/png".into(),
            file_size: 2_048,
            file_data: "aGVsbG8=".into(),
            chat_id: Some(chat_id.clone()),
            channel_id: None,
            is_channel: false,
            user_id: user_id.clone(),
        }
    }

    #[test]
    fn test_mime_whitelist() {
        assert!(mime_allowed("image/png"));
        assert!(mime_allowed("image/webp"));
        assert!(mime_allowed("video/mp4"));
        assert!(mime_allowed("audio/ogg"));
        assert!(mime_allowed("application/pdf"));
        assert!(mime_allowed("text/plain"));
        assert!(mime_allowed("application/zip"));
        assert!(!mime_allowed("application/octet-stream"));
        assert!(!mime_allowed("text/html"));
        assert!(!mime_allowed(""));
    }

    #[tokio::test]
    async fn test_upload_validates_before_storing() {
        let relay = Relay::default();
        let (a, _rx_a, _b, _rx_b, chat_id) = direct_pair(&relay).await;
        let max = relay.config().max_file_bytes;

        let mut oversize = file_request(&chat_id, &a.user_id);
        oversize.file_size = max + 1;
        match relay.upload_file(&oversize).await {
            Err(RelayError::PayloadTooLarge { size, max: limit }) => {
                assert_eq!(size, max + 1);
                assert_eq!(limit, max);
            }
            other => panic!("expected PayloadTooLarge, got {other:?}"),
        }

        let mut binary = file_request(&chat_id, &a.user_id);
        binary.file_type = "application/octet-stream".into();
        assert!(matches!(
            relay.upload_file(&binary).await,
            Err(RelayError::UnsupportedType(_))
        ));

        let mut homeless = file_request(&chat_id, &a.user_id);
        homeless.chat_id = None;
        assert!(matches!(
            relay.upload_file(&homeless).await,
            Err(RelayError::ChatNotFound)
        ));

        let mut lost = file_request(&chat_id, &a.user_id);
        lost.chat_id = Some(ChatId::from("chat_nope"));
        assert!(matches!(
            relay.upload_file(&lost).await,
            Err(RelayError::ChatNotFound)
        ));

        // none of the rejected uploads left a blob behind
        assert!(relay.lock().await.attachments.is_empty());

        // the cap itself is inclusive
        let mut exact = file_request(&chat_id, &a.user_id);
        exact.file_size = max;
        relay.upload_file(&exact).await.unwrap();
    }

    #[tokio::test]
    async fn test_file_message_fans_out_and_blob_is_fetchable() {
        let relay = Relay::default();
        let (a, mut rx_a, _b, mut rx_b, chat_id) = direct_pair(&relay).await;

        let ack = relay.upload_file(&file_request(&chat_id, &a.user_id)).await.unwrap();
        assert!(ack.file_id.as_str().starts_with("file_"));

        for rx in [&mut rx_a, &mut rx_b] {
            match next_event(rx) {
                Some(ServerEvent::NewFileMessage {
                    chat_id: event_chat,
                    is_channel,
                    message,
                    file_info,
                }) => {
                    assert_eq!(event_chat, chat_id.to_string());
                    assert!(!is_channel);
                    assert_eq!(message.id, ack.message_id);
                    assert_eq!(message.sender_id, a.user_id);
                    assert_eq!(file_info.id, ack.file_id);
                    assert_eq!(file_info.name, "photo.png");
                    assert_eq!(file_info.mime_type, "image/png");
                    assert_eq!(file_info.size, 2_048);
                    assert_eq!(file_info.url, format!("/file/{}", ack.file_id));
                    match message.body {
                        MessageBody::File { file_id, file_size, .. } => {
                            assert_eq!(file_id, ack.file_id);
                            assert_eq!(file_size, 2_048);
                        }
                        other => panic!("expected file body, got {other:?}"),
                    }
                }
                other => panic!("expected new_file_message, got {other:?}"),
            }
        }

        let now = Utc::now();
        let fetched = relay
            .get_file(&GetFileRequest { file_id: ack.file_id.clone() }, now)
            .await
            .unwrap();
        assert_eq!(fetched.file_info.data, "aGVsbG8=");
        assert_eq!(fetched.file_info.uploader_id, a.user_id);
        assert_eq!(fetched.file_info.uploader_secret_id, a.secret_id);

        let history = relay
            .get_chat_history(
                &whisp_shared::protocol::ChatHistoryRequest { chat_id: chat_id.clone() },
                now,
            )
            .await;
        assert_eq!(history.messages.len(), 1);
        assert_eq!(history.messages[0].id, ack.message_id);
    }

    #[tokio::test]
    async fn test_voice_message_lifecycle() {
        let relay = Relay::default();
        let (a, _rx_a, _b, mut rx_b, chat_id) = direct_pair(&relay).await;

        let ack = relay
            .upload_voice_message(&UploadVoiceRequest {
                audio_data: "b2dnLWJ5dGVz".into(),
                duration: 3.5,
                chat_id: Some(chat_id.clone()),
                channel_id: None,
                is_channel: false,
                user_id: a.user_id.clone(),
            })
            .await
            .unwrap();
        assert!(ack.voice_id.as_str().starts_with("voice_"));

        match next_event(&mut rx_b) {
            Some(ServerEvent::NewVoiceMessage {
                chat_id: event_chat,
                is_channel,
                message,
            }) => {
                assert_eq!(event_chat, chat_id.to_string());
                assert!(!is_channel);
                match message.body {
                    MessageBody::Voice { voice_id, duration } => {
                        assert_eq!(voice_id, ack.voice_id);
                        assert_eq!(duration, 3.5);
                    }
                    other => panic!("expected voice body, got {other:?}"),
                }
            }
            other => panic!("expected new_voice_message, got {other:?}"),
        }

        let fetched = relay
            .get_file(&GetFileRequest { file_id: ack.voice_id.clone() }, Utc::now())
            .await
            .unwrap();
        assert_eq!(fetched.file_info.name, "voice_message.ogg");
        assert_eq!(fetched.file_info.mime_type, "audio/ogg");
        assert_eq!(fetched.file_info.size, "b2dnLWJ5dGVz".len() as u64);
    }

    #[tokio::test]
    async fn test_voice_size_cap_counts_encoded_bytes() {
        let relay = Relay::new(RelayConfig {
            max_voice_bytes: 8,
            ..RelayConfig::default()
        });
        let (a, _rx_a, _b, _rx_b, chat_id) = direct_pair(&relay).await;

        let err = relay
            .upload_voice_message(&UploadVoiceRequest {
                audio_data: "123456789".into(),
                duration: 1.0,
                chat_id: Some(chat_id.clone()),
                channel_id: None,
                is_channel: false,
                user_id: a.user_id.clone(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::PayloadTooLarge { size: 9, max: 8 }));
        assert!(relay.lock().await.attachments.is_empty());
    }

    #[tokio::test]
    async fn test_get_file_expires_on_read() {
        let relay = Relay::default();
        let (a, _rx_a, _b, _rx_b, chat_id) = direct_pair(&relay).await;

        let ack = relay.upload_file(&file_request(&chat_id, &a.user_id)).await.unwrap();
        let request = GetFileRequest { file_id: ack.file_id.clone() };

        let later = Utc::now() + TimeDelta::hours(25);
        assert!(matches!(
            relay.get_file(&request, later).await,
            Err(RelayError::FileNotFound)
        ));
        // the expired read purged the blob, so even a current-time read misses
        assert!(matches!(
            relay.get_file(&request, Utc::now()).await,
            Err(RelayError::FileNotFound)
        ));
    }

    #[tokio::test]
    async fn test_blob_expiry_leaves_message_in_history() {
        let relay = Relay::new(RelayConfig {
            attachment_ttl: Duration::ZERO,
            ..RelayConfig::default()
        });
        let (a, _rx_a, _b, _rx_b, chat_id) = direct_pair(&relay).await;

        let ack = relay.upload_file(&file_request(&chat_id, &a.user_id)).await.unwrap();

        let now = Utc::now();
        assert!(matches!(
            relay
                .get_file(&GetFileRequest { file_id: ack.file_id.clone() }, now)
                .await,
            Err(RelayError::FileNotFound)
        ));
        // the file message outlives its blob
        let history = relay
            .get_chat_history(
                &whisp_shared::protocol::ChatHistoryRequest { chat_id: chat_id.clone() },
                now,
            )
            .await;
        assert_eq!(history.messages.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_channel_upload_follows_channel_message_ttl() {
        let relay = Relay::default();
        let (creator, mut rx) = connect(&relay).await;

        let settings = serde_json::from_value(json!({ "autoDeleteMessages": 5_000 })).unwrap();
        let channel = relay
            .create_custom_channel(&CreateChannelRequest {
                creator_id: creator.user_id.clone(),
                settings: Some(settings),
                ..Default::default()
            })
            .await
            .unwrap();

        let ack = relay
            .upload_file(&UploadFileRequest {
                file_name: "notes.pdf".into(),
                file_type: "application/pdf".into(),
                file_size: 512,
                file_data: "cGRm".into(),
                chat_id: None,
                channel_id: Some(channel.channel_id.clone()),
                is_channel: true,
                user_id: creator.user_id.clone(),
            })
            .await
            .unwrap();

        match next_event(&mut rx) {
            Some(ServerEvent::NewFileMessage { is_channel, message, .. }) => {
                assert!(is_channel);
                let ttl = (message.expires_at - message.timestamp).num_milliseconds();
                assert_eq!(ttl, 5_000);
            }
            other => panic!("expected new_file_message, got {other:?}"),
        }

        // let the expiry task arm its sleep before the clock moves
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
        tokio::time::advance(Duration::from_secs(6)).await;
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
        match next_event(&mut rx) {
            Some(ServerEvent::MessageDeleted { message_id, .. }) => {
                assert_eq!(message_id, ack.message_id);
            }
            other => panic!("expected message_deleted, got {other:?}"),
        }
        // the blob runs on its own 24h clock and is still there
        let fetched = relay
            .get_file(&GetFileRequest { file_id: ack.file_id.clone() }, Utc::now())
            .await
            .unwrap();
        assert_eq!(fetched.file_info.name, "notes.pdf");
    }
}

//! Relay handle, shared state container and tunables.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};

use whisp_shared::constants::{
    ANONYMOUS_CHAT_LIFETIME_MS, ATTACHMENT_SWEEP_SECS, ATTACHMENT_TTL_MS, CHAT_SWEEP_SECS,
    JOIN_HISTORY_CAP, MAX_FILE_BYTES, MAX_VOICE_BYTES, MESSAGE_TTL_MS, SEARCH_RESULT_CAP,
};

use crate::attachments::AttachmentStore;
use crate::conversations::ConversationStore;
use crate::directory::ConnectionDirectory;
use crate::registry::IdentityRegistry;

/// Relay tunables.  Defaults mirror the wire-visible constants; tests
/// shrink the durations to drive expiry paths directly.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Message lifetime in direct and anonymous chats.  Channels override
    /// this through their `autoDeleteMessages` setting.
    pub message_ttl: Duration,
    pub anonymous_chat_lifetime: Duration,
    pub attachment_ttl: Duration,
    /// Cap on the declared size of file uploads, in bytes.
    pub max_file_bytes: u64,
    /// Cap on the encoded size of voice uploads, in bytes.
    pub max_voice_bytes: u64,
    pub attachment_sweep_period: Duration,
    pub chat_sweep_period: Duration,
    pub search_result_cap: usize,
    pub join_history_cap: usize,
    /// Host part of channel invite links.
    pub channel_invite_domain: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            message_ttl: Duration::from_millis(MESSAGE_TTL_MS),
            anonymous_chat_lifetime: Duration::from_millis(ANONYMOUS_CHAT_LIFETIME_MS),
            attachment_ttl: Duration::from_millis(ATTACHMENT_TTL_MS),
            max_file_bytes: MAX_FILE_BYTES,
            max_voice_bytes: MAX_VOICE_BYTES,
            attachment_sweep_period: Duration::from_secs(ATTACHMENT_SWEEP_SECS),
            chat_sweep_period: Duration::from_secs(CHAT_SWEEP_SECS),
            search_result_cap: SEARCH_RESULT_CAP,
            join_history_cap: JOIN_HISTORY_CAP,
            channel_invite_domain: "yourdomain.com".into(),
        }
    }
}

/// Everything the relay knows, guarded by one mutex.
#[derive(Default)]
pub struct RelayState {
    pub(crate) registry: IdentityRegistry,
    pub(crate) directory: ConnectionDirectory,
    pub(crate) conversations: ConversationStore,
    pub(crate) attachments: AttachmentStore,
}

/// Handle to the relay.  Clones share the same state and config.
#[derive(Clone)]
pub struct Relay {
    pub(crate) state: Arc<Mutex<RelayState>>,
    pub(crate) config: Arc<RelayConfig>,
}

impl Relay {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(RelayState::default())),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, RelayState> {
        self.state.lock().await
    }

    /// Counters for the status endpoint.
    pub async fn counts(&self) -> RelayCounts {
        let state = self.lock().await;
        RelayCounts {
            users: state.registry.len(),
            chats: state.conversations.chat_count(),
        }
    }
}

impl Default for Relay {
    fn default() -> Self {
        Self::new(RelayConfig::default())
    }
}

/// Point-in-time population counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayCounts {
    pub users: usize,
    /// Direct plus anonymous chats; channels are not counted.
    pub chats: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    use whisp_shared::protocol::{CreateAnonymousChatRequest, CreateChatRequest};

    use crate::directory::ConnectionId;

    #[tokio::test]
    async fn test_counts_track_users_and_chats() {
        let relay = Relay::default();
        assert_eq!(
            relay.counts().await,
            RelayCounts { users: 0, chats: 0 }
        );

        let (tx, _rx_a) = mpsc::channel(8);
        let a = relay.register(ConnectionId::new(), tx).await;
        let (tx, _rx_b) = mpsc::channel(8);
        let b = relay.register(ConnectionId::new(), tx).await;

        relay
            .create_chat(&CreateChatRequest {
                current_user_id: a.user_id.clone(),
                target_user_id: b.user_id.clone(),
            })
            .await;
        relay
            .create_anonymous_chat(&CreateAnonymousChatRequest {
                creator_id: a.user_id.clone(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(
            relay.counts().await,
            RelayCounts { users: 2, chats: 2 }
        );
    }
}

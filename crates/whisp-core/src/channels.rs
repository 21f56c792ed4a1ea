//! Channels: creation, settings snapshots, creator-only updates.

use chrono::Utc;
use tracing::info;

use whisp_shared::model::{saturating_after, BasicChatSettings, ChannelSettings};
use whisp_shared::protocol::{
    BasicChatMeta, ChannelMeta, CreateChannelAck, CreateChannelRequest, GetChatSettingsRequest,
    ServerEvent, SettingsSnapshot, UpdateChatSettingsRequest,
};
use whisp_shared::types::ChannelId;
use whisp_shared::RelayError;

use crate::conversations::Channel;
use crate::state::Relay;

impl Relay {
    /// Open a channel owned by its creator, merging any settings the
    /// request carries over the defaults.
    pub async fn create_custom_channel(
        &self,
        req: &CreateChannelRequest,
    ) -> Result<CreateChannelAck, RelayError> {
        let mut state = self.lock().await;
        if state.registry.get(req.creator_id.as_str()).is_none() {
            return Err(RelayError::UserNotFound);
        }

        let channel_id = ChannelId::generate();
        let now = Utc::now();
        let channel = Channel {
            channel_id: channel_id.clone(),
            custom_id: req.custom_id.clone().filter(|id| !id.is_empty()),
            name: req
                .name
                .as_deref()
                .filter(|name| !name.is_empty())
                .map(str::to_owned)
                .unwrap_or_else(|| format!("Channel {}", channel_id.short())),
            description: req.description.clone().unwrap_or_default(),
            kind: req.kind.unwrap_or_default(),
            creator_id: req.creator_id.clone(),
            created_at: now,
            expires_at: req
                .lifetime
                .map(|ms| saturating_after(now, ms as u128)),
            settings: ChannelSettings::merged(req.settings.clone().unwrap_or_default()),
            members: std::iter::once(req.creator_id.clone()).collect(),
            is_active: true,
        };
        let info = channel.to_info();
        state
            .conversations
            .channels
            .insert(channel_id.clone(), channel);
        if let Some(user) = state.registry.get_mut(req.creator_id.as_str()) {
            user.channel_memberships.insert(channel_id.clone());
        }

        info!(channel = %channel_id, creator = %req.creator_id, "channel created");
        Ok(CreateChannelAck {
            channel: info,
            invite_link: format!(
                "https://{}.{}",
                channel_id, self.config.channel_invite_domain
            ),
            channel_id,
        })
    }

    /// Snapshot the settings of a channel or plain chat.  Plain chats
    /// report a fixed read-only set.
    pub async fn get_chat_settings(
        &self,
        req: &GetChatSettingsRequest,
    ) -> Result<SettingsSnapshot, RelayError> {
        let state = self.lock().await;
        if req.is_channel {
            let channel = state
                .conversations
                .channels
                .get(req.chat_id.as_str())
                .ok_or(RelayError::ChannelNotFound)?;
            return Ok(SettingsSnapshot::Channel {
                settings: channel.settings.clone(),
                info: ChannelMeta {
                    name: channel.name.clone(),
                    description: channel.description.clone(),
                    kind: channel.kind,
                    user_count: channel.members.len(),
                    created_at: channel.created_at,
                },
            });
        }

        if let Some(chat) = state.conversations.direct.get(req.chat_id.as_str()) {
            return Ok(SettingsSnapshot::Chat {
                settings: BasicChatSettings::default(),
                info: BasicChatMeta {
                    participants: chat.participants.len(),
                    created_at: chat.created_at,
                },
            });
        }
        if let Some(chat) = state.conversations.anonymous.get(req.chat_id.as_str()) {
            return Ok(SettingsSnapshot::Chat {
                settings: BasicChatSettings::default(),
                info: BasicChatMeta {
                    participants: chat.participants.len(),
                    created_at: chat.created_at,
                },
            });
        }
        Err(RelayError::ChatNotFound)
    }

    /// Apply a settings patch to a channel the caller created and tell
    /// every member.  Updates against non-channels succeed without doing
    /// anything.
    pub async fn update_chat_settings(
        &self,
        req: &UpdateChatSettingsRequest,
    ) -> Result<(), RelayError> {
        if !req.is_channel {
            return Ok(());
        }

        let mut guard = self.lock().await;
        let state = &mut *guard;
        let channel = state
            .conversations
            .channels
            .get_mut(req.chat_id.as_str())
            .filter(|channel| channel.creator_id == req.user_id)
            .ok_or(RelayError::PermissionDenied)?;

        channel.settings.apply(req.settings.clone());
        let event = ServerEvent::ChatSettingsUpdated {
            chat_id: req.chat_id.clone(),
            is_channel: true,
            settings: channel.settings.clone(),
        };
        state.directory.broadcast(channel.members.iter(), None, &event);
        info!(channel = %req.chat_id, "channel settings updated");
        Ok(())
    }
}

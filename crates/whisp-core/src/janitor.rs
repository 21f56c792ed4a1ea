//! Periodic cleanup sweeps.
//!
//! The per-entry timers already delete almost everything on time; the
//! sweeps are the backstop behind them and the only path that reclaims a
//! whole anonymous chat once its seven days are up.

use chrono::{DateTime, Utc};
use tracing::debug;

use whisp_shared::types::ChatId;

use crate::state::Relay;

impl Relay {
    /// Drop every attachment past its expiry, returning the eviction count.
    pub async fn sweep_expired_attachments(&self, now: DateTime<Utc>) -> usize {
        let mut state = self.lock().await;
        let removed = state.attachments.purge_expired(now);
        if removed > 0 {
            debug!(removed, "swept expired attachments");
        }
        removed
    }

    /// Drop every anonymous chat past its expiry.  Removal cascades to the
    /// participant set and the message log.
    pub async fn sweep_expired_anonymous_chats(&self, now: DateTime<Utc>) -> usize {
        let mut guard = self.lock().await;
        let state = &mut *guard;

        let expired: Vec<ChatId> = state
            .conversations
            .anonymous
            .iter()
            .filter(|(_, chat)| chat.is_expired(now))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            state.conversations.anonymous.remove(id);
            state.conversations.remove_log(id.as_str());
        }
        if !expired.is_empty() {
            debug!(removed = expired.len(), "swept expired anonymous chats");
        }
        expired.len()
    }
}

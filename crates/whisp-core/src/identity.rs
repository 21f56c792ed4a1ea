//! Registration, secret-id search and disconnect handling.

use std::collections::HashSet;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use whisp_shared::model::UserSummary;
use whisp_shared::protocol::{OutboundFrame, RegisterAck, SearchUserRequest, ServerEvent};
use whisp_shared::types::UserId;

use crate::directory::ConnectionId;
use crate::registry::User;
use crate::state::Relay;

impl Relay {
    /// Mint a fresh anonymous identity for this socket.  Every register
    /// call creates a new user; there is no re-authentication.
    pub async fn register(
        &self,
        conn_id: ConnectionId,
        tx: mpsc::Sender<OutboundFrame>,
    ) -> RegisterAck {
        let mut state = self.lock().await;
        let user = state.registry.create(Utc::now());
        if let Some(displaced) = state.directory.bind(user.user_id.clone(), conn_id, tx) {
            // same socket registered again; the old identity goes dark
            state.registry.set_online(displaced.as_str(), false);
            debug!(user = %displaced, "identity displaced by re-registration");
        }
        info!(user = %user.user_id, conn = %conn_id, "registered anonymous user");
        RegisterAck {
            user_id: user.user_id,
            secret_id: user.secret_id,
        }
    }

    /// Look up a user by secret id.  Misses and offline users both read
    /// as not found.
    pub async fn search_user(&self, req: &SearchUserRequest) -> Option<UserSummary> {
        let state = self.lock().await;
        state
            .registry
            .find_online_by_secret(req.secret_id.as_str())
            .map(User::summary)
    }

    /// Socket closed: mark the user offline and tell everyone who shares
    /// a conversation with them, once each.
    pub async fn disconnect(&self, conn_id: ConnectionId) {
        let mut state = self.lock().await;
        let Some(user_id) = state.directory.unbind(conn_id) else {
            debug!(conn = %conn_id, "disconnect from unbound connection");
            return;
        };
        state.registry.set_online(user_id.as_str(), false);

        let mut peers: HashSet<UserId> = HashSet::new();
        for chat in state.conversations.direct.values() {
            if chat.involves(user_id.as_str()) {
                peers.insert(chat.other_participant(user_id.as_str()).clone());
            }
        }
        for chat in state.conversations.anonymous.values() {
            if chat.participants.contains(&user_id) {
                peers.extend(chat.participants.iter().cloned());
            }
        }
        for channel in state.conversations.channels.values() {
            if channel.members.contains(&user_id) {
                peers.extend(channel.members.iter().cloned());
            }
        }
        peers.remove(&user_id);

        let event = ServerEvent::UserStatusChanged {
            user_id: user_id.clone(),
            online: false,
        };
        state.directory.broadcast(peers.iter(), None, &event);
        info!(user = %user_id, "user disconnected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::Receiver;

    use whisp_shared::protocol::{
        CreateAnonymousChatRequest, CreateChatRequest, JoinAnonymousChatRequest,
    };
    use whisp_shared::types::SecretId;

    async fn connect(relay: &Relay) -> (RegisterAck, ConnectionId, Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(32);
        let conn_id = ConnectionId::new();
        let ack = relay.register(conn_id, tx).await;
        (ack, conn_id, rx)
    }

    fn next_event(rx: &mut Receiver<OutboundFrame>) -> Option<ServerEvent> {
        match rx.try_recv() {
            Ok(OutboundFrame::Event(event)) => Some(event),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_register_then_search_roundtrip() {
        let relay = Relay::default();
        let (ack, _conn, _rx) = connect(&relay).await;

        let found = relay
            .search_user(&SearchUserRequest {
                secret_id: ack.secret_id.clone(),
            })
            .await
            .unwrap();
        assert_eq!(found.user_id, ack.user_id);
        assert!(found.online);
        assert!(found.username.starts_with("Anon_"));
    }

    #[tokio::test]
    async fn test_search_misses_unknown_and_offline() {
        let relay = Relay::default();
        let (ack, conn, _rx) = connect(&relay).await;

        assert!(relay
            .search_user(&SearchUserRequest {
                secret_id: SecretId("zzzzzzzz".into()),
            })
            .await
            .is_none());

        relay.disconnect(conn).await;
        assert!(relay
            .search_user(&SearchUserRequest {
                secret_id: ack.secret_id,
            })
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_disconnect_notifies_conversation_peers_once() {
        let relay = Relay::default();
        let (a, conn_a, _rx_a) = connect(&relay).await;
        let (b, _conn_b, mut rx_b) = connect(&relay).await;

        // b shares both a direct chat and an anonymous chat with a
        relay
            .create_chat(&CreateChatRequest {
                current_user_id: a.user_id.clone(),
                target_user_id: b.user_id.clone(),
            })
            .await;
        let chat = relay
            .create_anonymous_chat(&CreateAnonymousChatRequest {
                creator_id: a.user_id.clone(),
                ..Default::default()
            })
            .await
            .unwrap();
        relay
            .join_anonymous_chat(&JoinAnonymousChatRequest {
                chat_id: chat.chat_id,
                user_id: b.user_id.clone(),
                password: None,
            })
            .await
            .unwrap();

        while rx_b.try_recv().is_ok() {}
        relay.disconnect(conn_a).await;

        match next_event(&mut rx_b) {
            Some(ServerEvent::UserStatusChanged { user_id, online }) => {
                assert_eq!(user_id, a.user_id);
                assert!(!online);
            }
            other => panic!("expected status change, got {other:?}"),
        }
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stale_disconnect_is_a_noop() {
        let relay = Relay::default();
        let (ack, _conn, _rx) = connect(&relay).await;

        relay.disconnect(ConnectionId::new()).await;
        assert!(relay
            .search_user(&SearchUserRequest {
                secret_id: ack.secret_id,
            })
            .await
            .is_some());
    }

    #[tokio::test]
    async fn test_reregistration_sends_old_identity_offline() {
        let relay = Relay::default();
        let (tx, _rx) = mpsc::channel(32);
        let conn = ConnectionId::new();
        let first = relay.register(conn, tx).await;

        let (tx, _rx2) = mpsc::channel(32);
        let second = relay.register(conn, tx).await;

        assert!(relay
            .search_user(&SearchUserRequest {
                secret_id: first.secret_id,
            })
            .await
            .is_none());
        assert!(relay
            .search_user(&SearchUserRequest {
                secret_id: second.secret_id,
            })
            .await
            .is_some());
    }
}

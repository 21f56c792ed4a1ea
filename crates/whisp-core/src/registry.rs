//! Anonymous identity registry.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use whisp_shared::model::{PeerSummary, UserSummary};
use whisp_shared::types::{ChannelId, ChatId, SecretId, UserId};

/// A registered identity.  Nothing here survives a restart and nothing
/// links it to the person behind the socket.
#[derive(Debug, Clone)]
pub struct User {
    pub user_id: UserId,
    pub secret_id: SecretId,
    pub username: String,
    pub online: bool,
    pub created_at: DateTime<Utc>,
    /// Conversations this user belongs to, kept for disconnect fan-out.
    pub channel_memberships: HashSet<ChannelId>,
    pub anonymous_chat_memberships: HashSet<ChatId>,
}

impl User {
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            user_id: self.user_id.clone(),
            secret_id: self.secret_id.clone(),
            username: self.username.clone(),
            online: self.online,
        }
    }

    pub fn peer_summary(&self) -> PeerSummary {
        PeerSummary {
            secret_id: self.secret_id.clone(),
            username: self.username.clone(),
            online: self.online,
        }
    }
}

/// All known identities, indexed by user id and by secret id.
#[derive(Debug, Default)]
pub struct IdentityRegistry {
    users: HashMap<UserId, User>,
    by_secret: HashMap<SecretId, UserId>,
}

impl IdentityRegistry {
    /// Mint a fresh identity and store it online.
    pub fn create(&mut self, now: DateTime<Utc>) -> User {
        let user_id = UserId::generate();
        let secret_id = SecretId::generate();
        let user = User {
            user_id: user_id.clone(),
            secret_id: secret_id.clone(),
            username: format!("Anon_{}", secret_id.short()),
            online: true,
            created_at: now,
            channel_memberships: HashSet::new(),
            anonymous_chat_memberships: HashSet::new(),
        };
        self.users.insert(user_id.clone(), user.clone());
        self.by_secret.insert(secret_id, user_id);
        user
    }

    pub fn get(&self, user_id: &str) -> Option<&User> {
        self.users.get(user_id)
    }

    pub fn get_mut(&mut self, user_id: &str) -> Option<&mut User> {
        self.users.get_mut(user_id)
    }

    /// Secret-id lookup is online-only; an offline user is unreachable.
    pub fn find_online_by_secret(&self, secret_id: &str) -> Option<&User> {
        let user_id = self.by_secret.get(secret_id)?;
        self.users.get(user_id).filter(|user| user.online)
    }

    /// Returns `false` for unknown users.
    pub fn set_online(&mut self, user_id: &str, online: bool) -> bool {
        match self.users.get_mut(user_id) {
            Some(user) => {
                user.online = online;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_mints_wellformed_identity() {
        let mut registry = IdentityRegistry::default();
        let user = registry.create(Utc::now());

        assert!(user.user_id.as_str().starts_with("user_"));
        assert!(user.secret_id.as_str().len() == 8 || user.secret_id.as_str().len() == 9);
        assert_eq!(user.username, format!("Anon_{}", user.secret_id.short()));
        assert!(user.online);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_secret_lookup_is_online_only() {
        let mut registry = IdentityRegistry::default();
        let user = registry.create(Utc::now());

        let found = registry
            .find_online_by_secret(user.secret_id.as_str())
            .unwrap();
        assert_eq!(found.user_id, user.user_id);

        assert!(registry.set_online(user.user_id.as_str(), false));
        assert!(registry
            .find_online_by_secret(user.secret_id.as_str())
            .is_none());

        assert!(registry.set_online(user.user_id.as_str(), true));
        assert!(registry
            .find_online_by_secret(user.secret_id.as_str())
            .is_some());
    }

    #[test]
    fn test_set_online_on_unknown_user() {
        let mut registry = IdentityRegistry::default();
        assert!(!registry.set_online("user_0_missing", true));
    }
}

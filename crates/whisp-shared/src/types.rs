use std::borrow::Borrow;

use chrono::Utc;
use rand::distributions::{Alphanumeric, DistString};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Opaque server-generated user identity: `user_<epoch millis>_<9 alnum>`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct UserId(pub String);

impl UserId {
    pub fn generate() -> Self {
        Self(format!(
            "user_{}_{}",
            Utc::now().timestamp_millis(),
            random_suffix(9)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Short shareable lookup code: 8 or 9 alphanumeric characters, chosen
/// 50/50.  Uniqueness is not enforced, only made implausible by the
/// keyspace size.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SecretId(pub String);

impl SecretId {
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let len = if rng.gen_bool(0.5) { 8 } else { 9 };
        Self(Alphanumeric.sample_string(&mut rng, len))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First four characters, used to derive the anonymous display name.
    pub fn short(&self) -> &str {
        &self.0[..4]
    }
}

/// Conversation identifier.
///
/// Direct chats use a deterministic key (the two participant ids sorted
/// and joined with `_`), so at most one direct chat exists per pair.
/// Anonymous chats use a 12-character random token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ChatId(pub String);

impl ChatId {
    /// Deterministic direct chat key: order-independent for the pair.
    pub fn direct(a: &UserId, b: &UserId) -> Self {
        let (lo, hi) = if a.as_str() <= b.as_str() {
            (a, b)
        } else {
            (b, a)
        };
        Self(format!("{}_{}", lo.as_str(), hi.as_str()))
    }

    pub fn anonymous() -> Self {
        Self(random_suffix(12))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First six characters, used for default chat names.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(6)]
    }
}

/// Channel identifier: 12-character random token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ChannelId(pub String);

impl ChannelId {
    pub fn generate() -> Self {
        Self(random_suffix(12))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(6)]
    }
}

/// Attachment identifier: `file_` or `voice_` prefix, epoch millis, 9 alnum.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct AttachmentId(pub String);

impl AttachmentId {
    pub fn file() -> Self {
        Self(format!(
            "file_{}_{}",
            Utc::now().timestamp_millis(),
            random_suffix(9)
        ))
    }

    pub fn voice() -> Self {
        Self(format!(
            "voice_{}_{}",
            Utc::now().timestamp_millis(),
            random_suffix(9)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn random_suffix(len: usize) -> String {
    Alphanumeric.sample_string(&mut rand::thread_rng(), len)
}

macro_rules! impl_string_id {
    ($($ty:ty),*) => {
        $(
            impl std::fmt::Display for $ty {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    write!(f, "{}", self.0)
                }
            }

            impl Borrow<str> for $ty {
                fn borrow(&self) -> &str {
                    &self.0
                }
            }

            impl From<&str> for $ty {
                fn from(s: &str) -> Self {
                    Self(s.to_string())
                }
            }
        )*
    };
}

impl_string_id!(UserId, SecretId, ChatId, ChannelId, AttachmentId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_chat_id_is_order_independent() {
        let a = UserId("user_1700000000000_aaaaaaaaa".into());
        let b = UserId("user_1700000000001_bbbbbbbbb".into());

        assert_eq!(ChatId::direct(&a, &b), ChatId::direct(&b, &a));
        assert_eq!(
            ChatId::direct(&a, &b).as_str(),
            "user_1700000000000_aaaaaaaaa_user_1700000000001_bbbbbbbbb"
        );
    }

    #[test]
    fn test_secret_id_shape() {
        for _ in 0..50 {
            let secret = SecretId::generate();
            assert!(secret.as_str().len() == 8 || secret.as_str().len() == 9);
            assert!(secret.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
        }
    }

    #[test]
    fn test_user_id_shape() {
        let id = UserId::generate();
        assert!(id.as_str().starts_with("user_"));
        assert_eq!(id.as_str().split('_').count(), 3);
    }

    #[test]
    fn test_attachment_id_prefixes() {
        assert!(AttachmentId::file().as_str().starts_with("file_"));
        assert!(AttachmentId::voice().as_str().starts_with("voice_"));
    }

    #[test]
    fn test_token_ids_are_twelve_chars() {
        assert_eq!(ChatId::anonymous().as_str().len(), 12);
        assert_eq!(ChannelId::generate().as_str().len(), 12);
    }

    #[test]
    fn test_ids_serialize_as_plain_strings() {
        let id = ChatId("abcDEF123456".into());
        assert_eq!(
            serde_json::to_value(&id).unwrap(),
            serde_json::json!("abcDEF123456")
        );
    }
}

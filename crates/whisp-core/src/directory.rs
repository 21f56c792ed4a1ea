//! Live connection tracking and push fan-out.

use std::collections::HashMap;
use std::fmt;

use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use whisp_shared::protocol::{OutboundFrame, ServerEvent};
use whisp_shared::types::UserId;

/// Opaque per-socket id, unrelated to user identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug)]
struct ConnectionHandle {
    conn_id: ConnectionId,
    tx: mpsc::Sender<OutboundFrame>,
}

/// Who is connected right now, and over which socket.
///
/// A socket speaks for at most one user and a user for at most one
/// socket; binding either side again displaces the old binding, so a
/// late unbind from a displaced socket is a no-op.
#[derive(Debug, Default)]
pub struct ConnectionDirectory {
    by_user: HashMap<UserId, ConnectionHandle>,
    by_conn: HashMap<ConnectionId, UserId>,
}

impl ConnectionDirectory {
    /// Bind `user_id` to `conn_id`.  Returns the user this socket was
    /// previously bound to, if re-registering displaced one.
    pub fn bind(
        &mut self,
        user_id: UserId,
        conn_id: ConnectionId,
        tx: mpsc::Sender<OutboundFrame>,
    ) -> Option<UserId> {
        let displaced = self.by_conn.remove(&conn_id).filter(|prev| *prev != user_id);
        if let Some(prev) = &displaced {
            self.by_user.remove(prev);
        }
        if let Some(old) = self.by_user.insert(user_id.clone(), ConnectionHandle { conn_id, tx }) {
            if old.conn_id != conn_id {
                self.by_conn.remove(&old.conn_id);
            }
        }
        self.by_conn.insert(conn_id, user_id);
        displaced
    }

    /// Drop whatever binding this socket holds.  `None` means the socket
    /// was already displaced by a newer binding.
    pub fn unbind(&mut self, conn_id: ConnectionId) -> Option<UserId> {
        let user_id = self.by_conn.remove(&conn_id)?;
        self.by_user.remove(&user_id);
        Some(user_id)
    }

    pub fn is_connected(&self, user_id: &str) -> bool {
        self.by_user.contains_key(user_id)
    }

    /// Queue a frame for one user.  Never blocks: a full buffer drops the
    /// frame instead of stalling the relay.
    pub fn push(&self, user_id: &str, frame: OutboundFrame) -> bool {
        let Some(handle) = self.by_user.get(user_id) else {
            return false;
        };
        if handle.tx.try_send(frame).is_err() {
            debug!(user = user_id, "dropping push for slow or gone connection");
            return false;
        }
        true
    }

    pub fn push_event(&self, user_id: &str, event: &ServerEvent) -> bool {
        self.push(user_id, OutboundFrame::Event(event.clone()))
    }

    /// Push an event to every recipient except `except`.  Returns how
    /// many queues accepted it.
    pub fn broadcast<'a, I>(
        &self,
        recipients: I,
        except: Option<&UserId>,
        event: &ServerEvent,
    ) -> usize
    where
        I: IntoIterator<Item = &'a UserId>,
    {
        let mut delivered = 0;
        for user_id in recipients {
            if except.is_some_and(|skip| skip == user_id) {
                continue;
            }
            if self.push_event(user_id.as_str(), event) {
                delivered += 1;
            }
        }
        delivered
    }
}

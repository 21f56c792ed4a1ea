//! # whisp-shared
//!
//! Wire protocol and domain model for the Whisp relay.
//!
//! Everything here is shared between the relay core and the server shell:
//! id newtypes and their generators, the message/chat/channel records as
//! they appear on the wire, the event protocol (client requests, server
//! pushes, acknowledgment frames), the error taxonomy, and the protocol
//! constants.  All wire structs serialize with camelCase field names and
//! epoch-millisecond timestamps, matching what clients expect.

pub mod constants;
pub mod error;
pub mod model;
pub mod protocol;
pub mod types;

pub use error::RelayError;
pub use model::*;
pub use protocol::{AckFrame, ClientRequest, InboundFrame, OutboundFrame, ServerEvent};
pub use types::{AttachmentId, ChannelId, ChatId, SecretId, UserId};

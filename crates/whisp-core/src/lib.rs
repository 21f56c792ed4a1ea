//! # whisp-core
//!
//! In-memory relay state and every operation the wire protocol exposes.
//!
//! All mutable state sits behind a single async mutex; [`Relay`] is a
//! cheap clonable handle over it.  Expiry is enforced three times over:
//! a one-shot timer per message and per blob, an expiry filter on every
//! read, and periodic janitor sweeps as the backstop.  Late timers find
//! their record already gone and stay silent.

pub mod attachments;
pub mod conversations;
pub mod directory;
pub mod registry;
pub mod state;

mod anonymous;
mod channels;
mod direct;
mod identity;
mod janitor;
mod messages;

pub use directory::ConnectionId;
pub use state::{Relay, RelayConfig, RelayCounts, RelayState};

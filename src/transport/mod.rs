//! Duplex message channel to the analysis backend.
//!
//! Two wire variants share one [`Channel`]: the stage-tagged WebSocket
//! (`{"stage": ..., "data": ...}`) with no automatic retry, and the
//! event-tagged pub/sub stream with bounded reconnection. Handlers are keyed
//! by event name and see decoded [`InboundEvent`]s.

mod channel;
mod dispatch;
mod reconnect;
pub mod wire;

pub use channel::{Channel, ChannelState};
pub use dispatch::{Dispatcher, EventHandler};
pub use reconnect::ReconnectPolicy;
pub use wire::InboundEvent;

pub use crate::config::TransportVariant;

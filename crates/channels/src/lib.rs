//! Channel plugin system for the Coda agent gateway.
//!
//! Each messaging channel (NoChat, and whatever comes next) implements
//! the [`ChannelPlugin`] trait with adapters for outbound delivery and
//! health probing. Inbound traffic flows the other way: plugins push
//! formatted envelopes and lifecycle events into a host-provided
//! [`ChannelEventSink`].

pub mod error;
pub mod plugin;
pub mod registry;

pub use error::{Error, Result};
pub use plugin::{
    ChannelCapabilities, ChannelDescriptor, ChannelEvent, ChannelEventSink, ChannelHealthSnapshot,
    ChannelMessageMeta, ChannelOutbound, ChannelPlugin, ChannelReplyTarget, ChannelStatus,
    ChatType, InboundEnvelope, MediaPayload,
};
pub use registry::ChannelRegistry;

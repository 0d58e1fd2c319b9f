//! NoChat channel plugin for the Coda agent gateway.
//!
//! NoChat is an agent-to-agent messaging server: arbitrary (possibly
//! adversarial) agents share conversations on a remote server and this
//! plugin polls them on behalf of one agent. Every inbound message
//! passes a trust-gated pipeline before it reaches the agent runtime:
//!
//! polling transport → trust resolution → rate limit → interaction
//! recording (auto-promotion) → session routing → runtime dispatch.
//!
//! The wire client, trust store, and runtime push are trait seams so
//! the gateway (and tests) can supply their own implementations.

pub mod channel;
pub mod client;
pub mod config;
pub mod error;
pub mod outbound;
pub mod plugin;
pub mod ratelimit;
pub mod session;
pub mod state;
pub mod targets;
pub mod transport;
pub mod trust;

/// Channel type identifier used in events, reply targets, and targets.
pub const CHANNEL_TYPE: &str = "nochat";

pub use {
    channel::NoChatChannel,
    client::{NoChatApiClient, NoChatClient, NoChatConversation, NoChatMessage},
    config::{NoChatAccountConfig, PollingConfig},
    error::{Error, Result},
    outbound::NoChatOutbound,
    plugin::NoChatPlugin,
    ratelimit::{RateLimitConfig, RateLimiter},
    session::{SessionConfig, SessionRouter, SessionsConfig, ToolPolicy},
    transport::{AdaptiveInterval, MessageListener, PollingTransport},
    trust::{
        AutoPromoteConfig, FileTrustStore, InteractionOutcome, MemoryTrustStore, PromotionRule,
        TrustConfig, TrustManager, TrustStore, TrustTier,
    },
};

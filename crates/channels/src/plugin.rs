use {anyhow::Result, async_trait::async_trait};

// ── Channel identity ────────────────────────────────────────────────────────

/// Chat shapes a channel can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    Direct,
    Group,
}

/// Capability flags advertised by a channel plugin.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct ChannelCapabilities {
    pub media: bool,
    pub reactions: bool,
    pub edit: bool,
    pub delete: bool,
}

/// Static identity descriptor for a channel plugin.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ChannelDescriptor {
    /// Channel identifier (e.g. "nochat").
    pub id: &'static str,
    /// Human-readable label.
    pub label: &'static str,
    /// Chat types the channel supports.
    pub chat_types: &'static [ChatType],
    pub capabilities: ChannelCapabilities,
}

// ── Channel events (pub/sub) ────────────────────────────────────────────────

/// Events emitted by channel plugins for real-time UI updates.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChannelEvent {
    InboundMessage {
        channel_type: String,
        account_id: String,
        peer_id: String,
        sender_name: Option<String>,
        /// Resolved trust tier, as its wire string (e.g. "sandboxed").
        tier: String,
        access_granted: bool,
    },
    /// A sender reached an auto-promotion threshold that requires
    /// manual approval; the tier is unchanged until the owner acts.
    PromotionPending {
        channel_type: String,
        account_id: String,
        peer_id: String,
        sender_name: Option<String>,
        from_tier: String,
        to_tier: String,
    },
}

/// Metadata about a channel message, used for UI display and tier-aware
/// decisions downstream.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ChannelMessageMeta {
    pub channel_type: String,
    pub sender_id: String,
    pub sender_name: Option<String>,
    /// Trust tier the message was admitted under.
    pub tier: String,
}

/// Where to send the agent's response back.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ChannelReplyTarget {
    pub channel_type: String,
    pub account_id: String,
    /// Conversation to send the reply to.
    pub conversation_id: String,
}

/// A fully formatted inbound message, ready for the host agent runtime.
///
/// The plugin resolves trust and session routing before building this;
/// the runtime only has to key the session and render the body.
#[derive(Debug, Clone, serde::Serialize)]
pub struct InboundEnvelope {
    /// Session the message routes to (stable per sender).
    pub session_key: String,
    /// Rendered envelope embedding sender identity and trust tier.
    pub body: String,
    /// Decoded message text without envelope framing, for command parsing.
    pub raw_body: String,
    /// Resolved per-tier session configuration.
    pub session_config: serde_json::Value,
    pub meta: ChannelMessageMeta,
}

/// Sink for channel events. The gateway provides the concrete
/// implementation.
#[async_trait]
pub trait ChannelEventSink: Send + Sync {
    /// Broadcast a channel event for real-time UI updates.
    async fn emit(&self, event: ChannelEvent);

    /// Push an inbound envelope into the agent session identified by
    /// `envelope.session_key`. The response is routed back to the
    /// originating channel via `reply_to`.
    async fn dispatch_to_session(&self, envelope: InboundEnvelope, reply_to: ChannelReplyTarget);
}

// ── Plugin traits ───────────────────────────────────────────────────────────

/// Core channel plugin trait. Each messaging platform implements this.
#[async_trait]
pub trait ChannelPlugin: Send + Sync {
    /// Static identity descriptor for this channel.
    fn descriptor(&self) -> ChannelDescriptor;

    /// Channel identifier (e.g. "nochat").
    fn id(&self) -> &str {
        self.descriptor().id
    }

    /// Human-readable channel name.
    fn name(&self) -> &str {
        self.descriptor().label
    }

    /// Start an account connection.
    async fn start_account(&mut self, account_id: &str, config: serde_json::Value) -> Result<()>;

    /// Stop an account connection.
    async fn stop_account(&mut self, account_id: &str) -> Result<()>;

    /// Get outbound adapter for sending messages.
    fn outbound(&self) -> Option<&dyn ChannelOutbound>;

    /// Get status adapter for health checks.
    fn status(&self) -> Option<&dyn ChannelStatus>;
}

/// Media attachment for channels that support it.
#[derive(Debug, Clone)]
pub struct MediaPayload {
    pub media_type: String,
    pub data: Vec<u8>,
}

/// Send messages to a channel.
#[async_trait]
pub trait ChannelOutbound: Send + Sync {
    async fn send_text(&self, account_id: &str, to: &str, text: &str) -> Result<()>;
    async fn send_media(&self, account_id: &str, to: &str, payload: &MediaPayload) -> Result<()>;
}

/// Probe channel account health.
#[async_trait]
pub trait ChannelStatus: Send + Sync {
    async fn probe(&self, account_id: &str) -> Result<ChannelHealthSnapshot>;
}

/// Channel health snapshot.
#[derive(Debug, Clone)]
pub struct ChannelHealthSnapshot {
    pub connected: bool,
    pub account_id: String,
    pub details: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_kind_tag() {
        let event = ChannelEvent::InboundMessage {
            channel_type: "nochat".into(),
            account_id: "default".into(),
            peer_id: "peer-1".into(),
            sender_name: Some("TXR".into()),
            tier: "trusted".into(),
            access_granted: true,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "inbound_message");
        assert_eq!(json["tier"], "trusted");
    }

    #[test]
    fn promotion_pending_carries_both_tiers() {
        let event = ChannelEvent::PromotionPending {
            channel_type: "nochat".into(),
            account_id: "default".into(),
            peer_id: "peer-1".into(),
            sender_name: None,
            from_tier: "sandboxed".into(),
            to_tier: "trusted".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "promotion_pending");
        assert_eq!(json["from_tier"], "sandboxed");
        assert_eq!(json["to_tier"], "trusted");
    }
}

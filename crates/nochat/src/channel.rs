//! Inbound pipeline for one account: trust gate, rate limit,
//! interaction recording, session routing, and runtime dispatch.

use std::sync::Arc;

use {
    async_trait::async_trait,
    coda_channels::{
        ChannelEvent, ChannelEventSink, ChannelMessageMeta, ChannelReplyTarget, InboundEnvelope,
    },
    tracing::{debug, info, warn},
};

use crate::{
    CHANNEL_TYPE,
    client::{NoChatMessage, decode_content},
    config::NoChatAccountConfig,
    ratelimit::RateLimiter,
    session::{SessionRouter, format_inbound_context},
    transport::MessageListener,
    trust::{InteractionOutcome, TrustManager, TrustStore},
};

/// Trust-gated message handler for one account. Implements
/// [`MessageListener`] so the polling transport can feed it directly.
pub struct NoChatChannel {
    account_id: String,
    agent_id: String,
    trust: TrustManager,
    limiter: RateLimiter,
    router: SessionRouter,
    sink: Option<Arc<dyn ChannelEventSink>>,
}

impl NoChatChannel {
    pub fn new(
        account_id: &str,
        config: &NoChatAccountConfig,
        store: Arc<dyn TrustStore>,
        sink: Option<Arc<dyn ChannelEventSink>>,
    ) -> Self {
        Self {
            account_id: account_id.to_string(),
            agent_id: config.effective_agent_id().to_string(),
            trust: TrustManager::new(config.trust.clone(), store),
            limiter: RateLimiter::new(config.rate_limits.clone()),
            router: SessionRouter::new(config.sessions.clone()),
            sink,
        }
    }

    /// Trust controls, exposed for owner commands (promote, demote,
    /// block, approvals, listing).
    pub fn trust(&self) -> &TrustManager {
        &self.trust
    }

    async fn emit(&self, event: ChannelEvent) {
        if let Some(sink) = &self.sink {
            sink.emit(event).await;
        }
    }

    /// Run one message through the full pipeline.
    ///
    /// Order matters: trust is resolved before any counter moves, the
    /// rate limit is charged before the interaction is recorded, and
    /// the message routes under the tier it was admitted with even if
    /// recording it just triggered a promotion.
    pub async fn handle_inbound(&self, message: NoChatMessage) {
        let sender_id = message.sender_id.clone();
        let sender_name = message.sender_name.clone();
        let tier = self
            .trust
            .resolve_trust(&sender_id, sender_name.as_deref(), None);

        if tier == crate::trust::TrustTier::Blocked {
            debug!(account_id = %self.account_id, peer_id = %sender_id, "dropping message from blocked sender");
            self.emit(ChannelEvent::InboundMessage {
                channel_type: CHANNEL_TYPE.to_string(),
                account_id: self.account_id.clone(),
                peer_id: sender_id,
                sender_name,
                tier: tier.to_string(),
                access_granted: false,
            })
            .await;
            return;
        }

        if !self.limiter.check(&sender_id, tier) {
            warn!(account_id = %self.account_id, peer_id = %sender_id, tier = %tier, "rate limited, dropping message");
            self.emit(ChannelEvent::InboundMessage {
                channel_type: CHANNEL_TYPE.to_string(),
                account_id: self.account_id.clone(),
                peer_id: sender_id,
                sender_name,
                tier: tier.to_string(),
                access_granted: false,
            })
            .await;
            return;
        }

        self.emit(ChannelEvent::InboundMessage {
            channel_type: CHANNEL_TYPE.to_string(),
            account_id: self.account_id.clone(),
            peer_id: sender_id.clone(),
            sender_name: sender_name.clone(),
            tier: tier.to_string(),
            access_granted: true,
        })
        .await;

        match self.trust.record_interaction(&sender_id) {
            InteractionOutcome::Promoted { from, to } => {
                info!(account_id = %self.account_id, peer_id = %sender_id, from = %from, to = %to, "sender auto-promoted");
            },
            InteractionOutcome::PendingApproval { from, to } => {
                info!(account_id = %self.account_id, peer_id = %sender_id, from = %from, to = %to, "promotion pending approval");
                self.emit(ChannelEvent::PromotionPending {
                    channel_type: CHANNEL_TYPE.to_string(),
                    account_id: self.account_id.clone(),
                    peer_id: sender_id.clone(),
                    sender_name: sender_name.clone(),
                    from_tier: from.to_string(),
                    to_tier: to.to_string(),
                })
                .await;
            },
            InteractionOutcome::None => {},
        }

        let Some(route) = self.router.route_message(&self.agent_id, &sender_id, tier) else {
            debug!(account_id = %self.account_id, peer_id = %sender_id, tier = %tier, "no session for tier, dropping message");
            return;
        };

        let text = decode_content(&message.encrypted_content);
        let body = format_inbound_context(&message, &text, tier);
        let envelope = InboundEnvelope {
            session_key: route.session_key,
            body,
            raw_body: text,
            session_config: serde_json::to_value(&route.config).unwrap_or_default(),
            meta: ChannelMessageMeta {
                channel_type: CHANNEL_TYPE.to_string(),
                sender_id: sender_id.clone(),
                sender_name,
                tier: tier.to_string(),
            },
        };
        let reply_to = ChannelReplyTarget {
            channel_type: CHANNEL_TYPE.to_string(),
            account_id: self.account_id.clone(),
            conversation_id: message.conversation_id.clone(),
        };

        match &self.sink {
            Some(sink) => sink.dispatch_to_session(envelope, reply_to).await,
            None => {
                warn!(account_id = %self.account_id, "no event sink configured, message not dispatched");
            },
        }
    }
}

#[async_trait]
impl MessageListener for NoChatChannel {
    async fn on_message(&self, message: NoChatMessage) {
        self.handle_inbound(message).await;
    }
}

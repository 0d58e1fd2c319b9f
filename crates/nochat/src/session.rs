//! Maps admitted messages to per-sender agent sessions with
//! tier-scoped capability profiles.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{client::NoChatMessage, trust::TrustTier};

/// What tools the agent runtime may use inside a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolPolicy {
    None,
    ReadOnly,
    Full,
}

/// Capability profile applied to one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub enabled: bool,
    pub tool_policy: ToolPolicy,
    pub max_context_messages: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tool_policy: ToolPolicy::ReadOnly,
            max_context_messages: 25,
        }
    }
}

/// Per-tier session profile overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    pub per_tier: HashMap<TrustTier, SessionConfig>,
}

/// A routed message destination: the session to deliver into and the
/// capability profile governing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRoute {
    pub session_key: String,
    pub config: SessionConfig,
}

/// Deterministic session key for a direct conversation. The same peer
/// always lands in the same session.
pub fn session_key(own_agent_id: &str, sender_id: &str) -> String {
    format!("nochat:{own_agent_id}:dm:{sender_id}")
}

/// Routes admitted messages to sessions.
pub struct SessionRouter {
    sessions: SessionsConfig,
}

impl SessionRouter {
    pub fn new(sessions: SessionsConfig) -> Self {
        Self { sessions }
    }

    /// Built-in profile for a tier, used when the configuration has no
    /// override.
    fn default_profile(tier: TrustTier) -> SessionConfig {
        match tier {
            TrustTier::Blocked => SessionConfig {
                enabled: false,
                tool_policy: ToolPolicy::None,
                max_context_messages: 0,
            },
            TrustTier::Untrusted => SessionConfig {
                enabled: true,
                tool_policy: ToolPolicy::None,
                max_context_messages: 10,
            },
            TrustTier::Sandboxed => SessionConfig {
                enabled: true,
                tool_policy: ToolPolicy::ReadOnly,
                max_context_messages: 25,
            },
            TrustTier::Trusted => SessionConfig {
                enabled: true,
                tool_policy: ToolPolicy::Full,
                max_context_messages: 50,
            },
            TrustTier::Owner => SessionConfig {
                enabled: true,
                tool_policy: ToolPolicy::Full,
                max_context_messages: 100,
            },
        }
    }

    /// Effective session profile for a tier, or `None` when sessions
    /// are disabled for it. `blocked` never gets a session, even via
    /// configuration.
    pub fn session_config(&self, tier: TrustTier) -> Option<SessionConfig> {
        if tier == TrustTier::Blocked {
            return None;
        }
        let config = self
            .sessions
            .per_tier
            .get(&tier)
            .cloned()
            .unwrap_or_else(|| Self::default_profile(tier));
        config.enabled.then_some(config)
    }

    pub fn route_message(
        &self,
        own_agent_id: &str,
        sender_id: &str,
        tier: TrustTier,
    ) -> Option<SessionRoute> {
        let config = self.session_config(tier)?;
        Some(SessionRoute {
            session_key: session_key(own_agent_id, sender_id),
            config,
        })
    }
}

/// Render an inbound message for the agent runtime: a provenance header
/// naming the sender and its trust tier, then the decoded body. The
/// runtime scopes its behavior on the stated tier.
pub fn format_inbound_context(message: &NoChatMessage, text: &str, tier: TrustTier) -> String {
    let sender = message
        .sender_name
        .as_deref()
        .unwrap_or(&message.sender_id);
    let mut header = format!("[NoChat] from {sender} (trust: {tier})");
    if let Some(created_at) = &message.created_at {
        header.push_str(&format!(" at {created_at}"));
    }
    format!("{header}\n{text}")
}

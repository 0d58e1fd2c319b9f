//! Per-account configuration for the NoChat channel.

use std::path::PathBuf;

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize, Serializer},
};

use crate::{
    error::{Error, Result},
    ratelimit::RateLimitConfig,
    session::SessionsConfig,
    trust::TrustConfig,
};

/// Polling cadence and fetch sizing.
///
/// The transport starts at `interval_ms` and adapts between
/// `active_interval_ms` and `idle_interval_ms` based on traffic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_ms: u64,
    pub active_interval_ms: u64,
    pub idle_interval_ms: u64,
    /// Messages fetched per conversation per poll.
    pub fetch_limit: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 15_000,
            active_interval_ms: 5_000,
            idle_interval_ms: 60_000,
            fetch_limit: 50,
        }
    }
}

/// Configuration for one NoChat account.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NoChatAccountConfig {
    /// Base URL of the NoChat server, e.g. `https://nochat.example.com`.
    pub server_url: String,
    #[serde(serialize_with = "serialize_secret")]
    pub api_key: Secret<String>,
    /// Display name this agent registers under.
    pub agent_name: String,
    /// Stable identifier used in session keys. Falls back to
    /// `agent_name` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    /// Server-side user ID of this agent, for self-message filtering.
    /// Resolved from the server when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub polling: PollingConfig,
    pub trust: TrustConfig,
    pub rate_limits: RateLimitConfig,
    pub sessions: SessionsConfig,
    /// When set, trust state persists to this JSON file across
    /// restarts; otherwise it is held in memory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trust_store_path: Option<PathBuf>,
}

impl Default for NoChatAccountConfig {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            api_key: Secret::new(String::new()),
            agent_name: String::new(),
            agent_id: None,
            user_id: None,
            polling: PollingConfig::default(),
            trust: TrustConfig::default(),
            rate_limits: RateLimitConfig::default(),
            sessions: SessionsConfig::default(),
            trust_store_path: None,
        }
    }
}

impl NoChatAccountConfig {
    pub fn validate(&self) -> Result<()> {
        if self.server_url.trim().is_empty() {
            return Err(Error::config("server_url is required"));
        }
        if self.api_key.expose_secret().is_empty() {
            return Err(Error::config("api_key is required"));
        }
        if self.agent_name.trim().is_empty() {
            return Err(Error::config("agent_name is required"));
        }
        Ok(())
    }

    /// Identifier used in session keys and events.
    pub fn effective_agent_id(&self) -> &str {
        self.agent_id.as_deref().unwrap_or(&self.agent_name)
    }
}

impl std::fmt::Debug for NoChatAccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoChatAccountConfig")
            .field("server_url", &self.server_url)
            .field("api_key", &"[REDACTED]")
            .field("agent_name", &self.agent_name)
            .field("agent_id", &self.agent_id)
            .field("user_id", &self.user_id)
            .field("polling", &self.polling)
            .finish_non_exhaustive()
    }
}

fn serialize_secret<S>(secret: &Secret<String>, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(secret.expose_secret())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_cadence() {
        let cfg = PollingConfig::default();
        assert_eq!(cfg.interval_ms, 15_000);
        assert_eq!(cfg.active_interval_ms, 5_000);
        assert_eq!(cfg.idle_interval_ms, 60_000);
        assert_eq!(cfg.fetch_limit, 50);
    }

    #[test]
    fn deserializes_partial_config() {
        let cfg: NoChatAccountConfig = serde_json::from_str(
            r#"{
                "server_url": "https://nochat.example.com",
                "api_key": "sk-test",
                "agent_name": "Coda",
                "polling": { "active_interval_ms": 2000 }
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.server_url, "https://nochat.example.com");
        assert_eq!(cfg.api_key.expose_secret(), "sk-test");
        assert_eq!(cfg.agent_name, "Coda");
        assert_eq!(cfg.polling.active_interval_ms, 2_000);
        // Untouched fields keep defaults.
        assert_eq!(cfg.polling.interval_ms, 15_000);
        assert!(cfg.agent_id.is_none());
    }

    #[test]
    fn effective_agent_id_prefers_explicit_id() {
        let mut cfg = NoChatAccountConfig {
            agent_name: "Coda".into(),
            ..Default::default()
        };
        assert_eq!(cfg.effective_agent_id(), "Coda");
        cfg.agent_id = Some("coda-primary".into());
        assert_eq!(cfg.effective_agent_id(), "coda-primary");
    }

    #[test]
    fn validate_rejects_missing_fields() {
        let valid = NoChatAccountConfig {
            server_url: "https://nochat.example.com".into(),
            api_key: Secret::new("sk-test".into()),
            agent_name: "Coda".into(),
            ..Default::default()
        };
        assert!(valid.validate().is_ok());

        let missing_url = NoChatAccountConfig {
            server_url: String::new(),
            ..valid.clone()
        };
        assert!(missing_url.validate().is_err());

        let missing_key = NoChatAccountConfig {
            api_key: Secret::new(String::new()),
            ..valid.clone()
        };
        assert!(missing_key.validate().is_err());

        let missing_name = NoChatAccountConfig {
            agent_name: "  ".into(),
            ..valid
        };
        assert!(missing_name.validate().is_err());
    }

    #[test]
    fn debug_redacts_api_key() {
        let cfg = NoChatAccountConfig {
            api_key: Secret::new("super-secret".into()),
            ..Default::default()
        };
        let rendered = format!("{cfg:?}");
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("super-secret"));
    }

    #[test]
    fn serializes_api_key_for_round_trip() {
        let cfg = NoChatAccountConfig {
            server_url: "https://nochat.example.com".into(),
            api_key: Secret::new("sk-test".into()),
            agent_name: "Coda".into(),
            ..Default::default()
        };
        let json = serde_json::to_value(&cfg).unwrap();
        assert_eq!(json["api_key"], "sk-test");
        let back: NoChatAccountConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back.api_key.expose_secret(), "sk-test");
    }
}

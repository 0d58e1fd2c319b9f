//! Trust tiers, the trust store, and the trust manager.
//!
//! Every sender resolves to a [`TrustTier`] from two layers: a static,
//! immutable configuration and a mutable runtime-override layer kept in
//! a [`TrustStore`]. Overrides win on conflict. Interaction counts feed
//! an optional auto-promotion ratchet that moves well-behaved senders
//! up one tier at a time, never past `trusted`.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use {
    serde::{Deserialize, Serialize},
    tracing::{info, warn},
};

// ── Tiers ───────────────────────────────────────────────────────────────────

/// Ordered privilege level for a message sender, lowest to highest.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TrustTier {
    Blocked,
    Untrusted,
    Sandboxed,
    Trusted,
    Owner,
}

impl TrustTier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Blocked => "blocked",
            Self::Untrusted => "untrusted",
            Self::Sandboxed => "sandboxed",
            Self::Trusted => "trusted",
            Self::Owner => "owner",
        }
    }

    /// One step up the tier order. `Owner` has nowhere to go.
    fn step_up(self) -> Self {
        match self {
            Self::Blocked => Self::Untrusted,
            Self::Untrusted => Self::Sandboxed,
            Self::Sandboxed => Self::Trusted,
            Self::Trusted | Self::Owner => self,
        }
    }

    /// One step down the tier order, floored at `Blocked`.
    fn step_down(self) -> Self {
        match self {
            Self::Blocked | Self::Untrusted => Self::Blocked,
            Self::Sandboxed => Self::Untrusted,
            Self::Trusted => Self::Sandboxed,
            Self::Owner => Self::Trusted,
        }
    }
}

impl std::fmt::Display for TrustTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Static configuration ────────────────────────────────────────────────────

/// Threshold for one auto-promotion step.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PromotionRule {
    /// Interactions required before the step fires.
    pub interactions: u64,
    /// When set, the step flags the sender for manual approval instead
    /// of changing the tier.
    pub require_approval: bool,
}

/// Auto-promotion thresholds.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AutoPromoteConfig {
    pub enabled: bool,
    pub untrusted_to_sandboxed: Option<PromotionRule>,
    pub sandboxed_to_trusted: Option<PromotionRule>,
}

/// Static trust configuration, immutable at runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TrustConfig {
    /// Tier for senders with no explicit entry.
    pub default: TrustTier,
    /// Identifier (user ID, display name, or fingerprint) → tier.
    pub agents: HashMap<String, TrustTier>,
    pub auto_promote: Option<AutoPromoteConfig>,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            default: TrustTier::Untrusted,
            agents: HashMap::new(),
            auto_promote: None,
        }
    }
}

// ── Store ───────────────────────────────────────────────────────────────────

/// Durable per-sender trust state: runtime overrides, interaction
/// counters, and pending-promotion flags.
pub trait TrustStore: Send + Sync {
    fn runtime_overrides(&self) -> HashMap<String, TrustTier>;
    fn runtime_override(&self, identifier: &str) -> Option<TrustTier>;
    fn set_runtime_override(&self, identifier: &str, tier: TrustTier);
    /// Increment and return the interaction counter.
    fn increment_interaction(&self, identifier: &str) -> u64;
    fn interaction_count(&self, identifier: &str) -> u64;
    fn set_pending_promotion(&self, identifier: &str, tier: TrustTier);
    fn pending_promotion(&self, identifier: &str) -> Option<TrustTier>;
    fn clear_pending_promotion(&self, identifier: &str);

    fn has_pending_promotion(&self, identifier: &str) -> bool {
        self.pending_promotion(identifier).is_some()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct StoreData {
    overrides: HashMap<String, TrustTier>,
    interactions: HashMap<String, u64>,
    pending: HashMap<String, TrustTier>,
}

/// In-memory trust store; state lives and dies with the process.
#[derive(Default)]
pub struct MemoryTrustStore {
    data: Mutex<StoreData>,
}

impl MemoryTrustStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreData> {
        self.data.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl TrustStore for MemoryTrustStore {
    fn runtime_overrides(&self) -> HashMap<String, TrustTier> {
        self.lock().overrides.clone()
    }

    fn runtime_override(&self, identifier: &str) -> Option<TrustTier> {
        self.lock().overrides.get(identifier).copied()
    }

    fn set_runtime_override(&self, identifier: &str, tier: TrustTier) {
        self.lock().overrides.insert(identifier.to_string(), tier);
    }

    fn increment_interaction(&self, identifier: &str) -> u64 {
        let mut data = self.lock();
        let count = data.interactions.entry(identifier.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    fn interaction_count(&self, identifier: &str) -> u64 {
        self.lock().interactions.get(identifier).copied().unwrap_or(0)
    }

    fn set_pending_promotion(&self, identifier: &str, tier: TrustTier) {
        self.lock().pending.insert(identifier.to_string(), tier);
    }

    fn pending_promotion(&self, identifier: &str) -> Option<TrustTier> {
        self.lock().pending.get(identifier).copied()
    }

    fn clear_pending_promotion(&self, identifier: &str) {
        self.lock().pending.remove(identifier);
    }
}

/// JSON-file-backed trust store. Persistence is best-effort: a missing
/// or corrupt file starts empty, and save failures are logged but never
/// surface to the pipeline.
pub struct FileTrustStore {
    path: PathBuf,
    data: Mutex<StoreData>,
}

impl FileTrustStore {
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(data) => data,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "trust store file corrupt, starting empty");
                    StoreData::default()
                },
            },
            Err(_) => StoreData::default(),
        };
        Self {
            path,
            data: Mutex::new(data),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreData> {
        self.data.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn persist(&self, data: &StoreData) {
        if let Some(parent) = self.path.parent()
            && let Err(e) = std::fs::create_dir_all(parent)
        {
            warn!(path = %self.path.display(), error = %e, "failed to create trust store dir");
            return;
        }
        let bytes = match serde_json::to_vec_pretty(data) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "failed to serialize trust store");
                return;
            },
        };
        if let Err(e) = std::fs::write(&self.path, bytes) {
            warn!(path = %self.path.display(), error = %e, "failed to save trust store");
        }
    }
}

impl TrustStore for FileTrustStore {
    fn runtime_overrides(&self) -> HashMap<String, TrustTier> {
        self.lock().overrides.clone()
    }

    fn runtime_override(&self, identifier: &str) -> Option<TrustTier> {
        self.lock().overrides.get(identifier).copied()
    }

    fn set_runtime_override(&self, identifier: &str, tier: TrustTier) {
        let mut data = self.lock();
        data.overrides.insert(identifier.to_string(), tier);
        self.persist(&data);
    }

    fn increment_interaction(&self, identifier: &str) -> u64 {
        let mut data = self.lock();
        let count = {
            let count = data.interactions.entry(identifier.to_string()).or_insert(0);
            *count += 1;
            *count
        };
        self.persist(&data);
        count
    }

    fn interaction_count(&self, identifier: &str) -> u64 {
        self.lock().interactions.get(identifier).copied().unwrap_or(0)
    }

    fn set_pending_promotion(&self, identifier: &str, tier: TrustTier) {
        let mut data = self.lock();
        data.pending.insert(identifier.to_string(), tier);
        self.persist(&data);
    }

    fn pending_promotion(&self, identifier: &str) -> Option<TrustTier> {
        self.lock().pending.get(identifier).copied()
    }

    fn clear_pending_promotion(&self, identifier: &str) {
        let mut data = self.lock();
        data.pending.remove(identifier);
        self.persist(&data);
    }
}

// ── Manager ─────────────────────────────────────────────────────────────────

/// An entry in the merged trust list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrustEntry {
    pub identifier: String,
    pub tier: TrustTier,
}

/// Result of recording one interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionOutcome {
    None,
    /// The sender was auto-promoted one step.
    Promoted { from: TrustTier, to: TrustTier },
    /// The sender reached a threshold that requires manual approval.
    PendingApproval { from: TrustTier, to: TrustTier },
}

/// Resolves and mutates sender trust.
///
/// The promoted-at snapshot is process-lifetime state owned by this
/// instance, so multiple accounts never share it.
pub struct TrustManager {
    config: TrustConfig,
    store: Arc<dyn TrustStore>,
    /// Interaction count at the moment of the last promotion, used to
    /// measure "interactions since promotion". Not persisted.
    promoted_at: Mutex<HashMap<String, u64>>,
}

impl TrustManager {
    pub fn new(config: TrustConfig, store: Arc<dyn TrustStore>) -> Self {
        Self {
            config,
            store,
            promoted_at: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve a sender's effective tier. First match wins:
    /// runtime override by fingerprint, then sender ID, then name
    /// (case-insensitive); the static config in the same order; the
    /// configured default. Fingerprints always outrank plain IDs and
    /// names since a display name can be spoofed. No side effects.
    pub fn resolve_trust(
        &self,
        sender_id: &str,
        sender_name: Option<&str>,
        fingerprint: Option<&str>,
    ) -> TrustTier {
        let overrides = self.store.runtime_overrides();

        if let Some(fp) = fingerprint
            && let Some(tier) = overrides.get(fp)
        {
            return *tier;
        }
        if let Some(tier) = overrides.get(sender_id) {
            return *tier;
        }
        if let Some(name) = sender_name
            && let Some(tier) = lookup_ci(&overrides, name)
        {
            return tier;
        }

        if let Some(fp) = fingerprint
            && let Some(tier) = self.config.agents.get(fp)
        {
            return *tier;
        }
        if let Some(tier) = self.config.agents.get(sender_id) {
            return *tier;
        }
        if let Some(name) = sender_name
            && let Some(tier) = lookup_ci(&self.config.agents, name)
        {
            return tier;
        }

        self.config.default
    }

    /// Set a runtime override. The static configuration is never
    /// rewritten.
    pub fn set_trust(&self, identifier: &str, tier: TrustTier) {
        self.store.set_runtime_override(identifier, tier);
    }

    /// Move one step up the tier order, capped at `trusted`; `owner`
    /// is only ever assigned explicitly.
    pub fn promote_trust(&self, identifier: &str) -> TrustTier {
        let current = self.resolve_trust(identifier, Some(identifier), None);
        let next = match current {
            TrustTier::Trusted | TrustTier::Owner => current,
            other => other.step_up(),
        };
        if next != current {
            self.store.set_runtime_override(identifier, next);
            info!(identifier, from = %current, to = %next, "trust promoted");
        }
        next
    }

    /// Move one step down the tier order, floored at `blocked`.
    pub fn demote_trust(&self, identifier: &str) -> TrustTier {
        let current = self.resolve_trust(identifier, Some(identifier), None);
        let next = current.step_down();
        if next != current {
            self.store.set_runtime_override(identifier, next);
            info!(identifier, from = %current, to = %next, "trust demoted");
        }
        next
    }

    pub fn block_agent(&self, identifier: &str) {
        self.store.set_runtime_override(identifier, TrustTier::Blocked);
        info!(identifier, "agent blocked");
    }

    /// Record one inbound interaction and apply at most one
    /// auto-promotion step.
    ///
    /// The tier is read once at the top; both threshold branches are
    /// guarded by that snapshot, so a single call can never promote
    /// twice even if both thresholds overlap.
    pub fn record_interaction(&self, sender_id: &str) -> InteractionOutcome {
        let count = self.store.increment_interaction(sender_id);

        let Some(auto) = self.config.auto_promote.as_ref().filter(|a| a.enabled) else {
            return InteractionOutcome::None;
        };

        let tier = self.resolve_trust(sender_id, None, None);
        match tier {
            TrustTier::Untrusted => {
                if let Some(rule) = &auto.untrusted_to_sandboxed
                    && count >= rule.interactions
                {
                    self.store.set_runtime_override(sender_id, TrustTier::Sandboxed);
                    self.note_promotion(sender_id, count);
                    return InteractionOutcome::Promoted {
                        from: TrustTier::Untrusted,
                        to: TrustTier::Sandboxed,
                    };
                }
            },
            TrustTier::Sandboxed => {
                if let Some(rule) = &auto.sandboxed_to_trusted {
                    let since = count.saturating_sub(self.promoted_at_count(sender_id));
                    if since >= rule.interactions {
                        if rule.require_approval {
                            if !self.store.has_pending_promotion(sender_id) {
                                self.store.set_pending_promotion(sender_id, TrustTier::Trusted);
                                return InteractionOutcome::PendingApproval {
                                    from: TrustTier::Sandboxed,
                                    to: TrustTier::Trusted,
                                };
                            }
                        } else {
                            self.store.set_runtime_override(sender_id, TrustTier::Trusted);
                            self.note_promotion(sender_id, count);
                            return InteractionOutcome::Promoted {
                                from: TrustTier::Sandboxed,
                                to: TrustTier::Trusted,
                            };
                        }
                    }
                }
            },
            // Blocked senders never ratchet; trusted/owner have nothing
            // left to auto-earn.
            TrustTier::Blocked | TrustTier::Trusted | TrustTier::Owner => {},
        }

        InteractionOutcome::None
    }

    /// Whether a sender is flagged for a manual promotion approval.
    pub fn should_auto_promote(&self, identifier: &str) -> bool {
        self.store.has_pending_promotion(identifier)
    }

    /// Apply a pending promotion (owner approval path). Returns the new
    /// tier when a flag was pending.
    pub fn approve_promotion(&self, identifier: &str) -> Option<TrustTier> {
        let tier = self.store.pending_promotion(identifier)?;
        self.store.set_runtime_override(identifier, tier);
        self.store.clear_pending_promotion(identifier);
        self.note_promotion(identifier, self.store.interaction_count(identifier));
        info!(identifier, to = %tier, "pending promotion approved");
        Some(tier)
    }

    /// Snapshot of static config entries overlaid with runtime
    /// overrides, deduplicated by identifier; overrides win.
    pub fn trust_list(&self) -> Vec<TrustEntry> {
        let mut merged: HashMap<String, TrustTier> = self.config.agents.clone();
        merged.extend(self.store.runtime_overrides());
        let mut entries: Vec<TrustEntry> = merged
            .into_iter()
            .map(|(identifier, tier)| TrustEntry { identifier, tier })
            .collect();
        entries.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        entries
    }

    fn promoted_at_count(&self, identifier: &str) -> u64 {
        self.promoted_at
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(identifier)
            .copied()
            .unwrap_or(0)
    }

    fn note_promotion(&self, identifier: &str, count: u64) {
        self.promoted_at
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(identifier.to_string(), count);
    }
}

/// Case-insensitive lookup by display name.
fn lookup_ci(map: &HashMap<String, TrustTier>, name: &str) -> Option<TrustTier> {
    map.iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, tier)| *tier)
}

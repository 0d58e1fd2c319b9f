//! NoChat channel plugin: account lifecycle, identity resolution, and
//! the gateway-facing trait surface.

use std::{collections::HashMap, sync::Arc};

use {
    async_trait::async_trait,
    coda_channels::{
        ChannelCapabilities, ChannelDescriptor, ChannelEventSink, ChannelHealthSnapshot,
        ChannelOutbound, ChannelPlugin, ChannelStatus, ChatType,
    },
    tokio::sync::RwLock,
    tracing::{info, warn},
};

use crate::{
    channel::NoChatChannel,
    client::{NoChatApiClient, NoChatClient},
    config::NoChatAccountConfig,
    outbound::NoChatOutbound,
    state::{AccountState, AccountStateMap},
    transport::PollingTransport,
    trust::{FileTrustStore, MemoryTrustStore, TrustStore},
};

pub struct NoChatPlugin {
    accounts: AccountStateMap,
    outbound: NoChatOutbound,
    event_sink: Option<Arc<dyn ChannelEventSink>>,
    /// Injected trust store shared across accounts; when unset, each
    /// account gets its own file- or memory-backed store.
    trust_store: Option<Arc<dyn TrustStore>>,
}

impl Default for NoChatPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl NoChatPlugin {
    pub fn new() -> Self {
        let accounts: AccountStateMap = Arc::new(RwLock::new(HashMap::new()));
        Self {
            outbound: NoChatOutbound::new(accounts.clone()),
            accounts,
            event_sink: None,
            trust_store: None,
        }
    }

    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn ChannelEventSink>) -> Self {
        self.event_sink = Some(sink);
        self
    }

    #[must_use]
    pub fn with_trust_store(mut self, store: Arc<dyn TrustStore>) -> Self {
        self.trust_store = Some(store);
        self
    }

    pub async fn account_ids(&self) -> Vec<String> {
        self.accounts.read().await.keys().cloned().collect()
    }

    /// Trust-gated channel for an account, for owner commands.
    pub async fn channel(&self, account_id: &str) -> Option<Arc<NoChatChannel>> {
        self.accounts
            .read()
            .await
            .get(account_id)
            .map(|state| state.channel.clone())
    }

    fn build_store(&self, config: &NoChatAccountConfig) -> Arc<dyn TrustStore> {
        if let Some(store) = &self.trust_store {
            return store.clone();
        }
        match &config.trust_store_path {
            Some(path) => Arc::new(FileTrustStore::load(path.clone())),
            None => Arc::new(MemoryTrustStore::new()),
        }
    }

    /// Resolve the agent's own server-side user ID for self-message
    /// filtering: explicit config, then the identity endpoint, then a
    /// participant scan matching the agent name. `None` disables
    /// filtering.
    async fn resolve_self_id(
        client: &dyn NoChatClient,
        config: &NoChatAccountConfig,
    ) -> Option<String> {
        if let Some(user_id) = &config.user_id {
            return Some(user_id.clone());
        }

        match client.whoami().await {
            Ok(Some(identity)) => return Some(identity.id),
            Ok(None) => {},
            Err(e) => warn!(error = %e, "identity lookup failed"),
        }

        let prefixed = format!("agent:{}", config.agent_name);
        if let Ok(conversations) = client.list_conversations().await {
            for conv in conversations {
                for participant in conv.participants {
                    let Some(username) = &participant.username else {
                        continue;
                    };
                    if username == &prefixed
                        || username.eq_ignore_ascii_case(&config.agent_name)
                    {
                        return Some(participant.user_id);
                    }
                }
            }
        }

        warn!("could not resolve own user id, self-message filtering disabled");
        None
    }
}

#[async_trait]
impl ChannelPlugin for NoChatPlugin {
    fn descriptor(&self) -> ChannelDescriptor {
        ChannelDescriptor {
            id: "nochat",
            label: "NoChat",
            chat_types: &[ChatType::Direct],
            capabilities: ChannelCapabilities {
                media: false,
                reactions: true,
                edit: true,
                delete: true,
            },
        }
    }

    async fn start_account(
        &mut self,
        account_id: &str,
        config: serde_json::Value,
    ) -> anyhow::Result<()> {
        let config: NoChatAccountConfig = serde_json::from_value(config)?;
        config.validate()?;

        // Restarting an account replaces its polling loop.
        if let Some(existing) = self.accounts.write().await.remove(account_id) {
            existing.transport.stop();
        }

        let client: Arc<dyn NoChatClient> = Arc::new(NoChatApiClient::new(
            &config.server_url,
            config.api_key.clone(),
        ));

        let self_id = Self::resolve_self_id(client.as_ref(), &config).await;
        let store = self.build_store(&config);
        let channel = Arc::new(NoChatChannel::new(
            account_id,
            &config,
            store,
            self.event_sink.clone(),
        ));

        let mut transport = PollingTransport::new(client.clone(), &config.polling, self_id);
        transport.add_listener(channel.clone());
        let transport = Arc::new(transport);
        transport.start();

        info!(account_id, agent_name = %config.agent_name, "nochat account started");
        self.accounts.write().await.insert(
            account_id.to_string(),
            AccountState {
                account_id: account_id.to_string(),
                config,
                client,
                transport,
                channel,
            },
        );
        Ok(())
    }

    async fn stop_account(&mut self, account_id: &str) -> anyhow::Result<()> {
        match self.accounts.write().await.remove(account_id) {
            Some(state) => {
                state.transport.stop();
                info!(account_id, "nochat account stopped");
            },
            None => {
                warn!(account_id, "stop requested for unknown account");
            },
        }
        Ok(())
    }

    fn outbound(&self) -> Option<&dyn ChannelOutbound> {
        Some(&self.outbound)
    }

    fn status(&self) -> Option<&dyn ChannelStatus> {
        Some(self)
    }
}

#[async_trait]
impl ChannelStatus for NoChatPlugin {
    async fn probe(&self, account_id: &str) -> anyhow::Result<ChannelHealthSnapshot> {
        let client = {
            let accounts = self.accounts.read().await;
            let Some(state) = accounts.get(account_id) else {
                return Ok(ChannelHealthSnapshot {
                    connected: false,
                    account_id: account_id.to_string(),
                    details: Some("account not started".to_string()),
                });
            };
            state.client.clone()
        };

        match client.whoami().await {
            Ok(_) => Ok(ChannelHealthSnapshot {
                connected: true,
                account_id: account_id.to_string(),
                details: None,
            }),
            Err(e) => Ok(ChannelHealthSnapshot {
                connected: false,
                account_id: account_id.to_string(),
                details: Some(e.to_string()),
            }),
        }
    }
}

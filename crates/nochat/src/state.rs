//! Shared per-account runtime state.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::RwLock;

use crate::{
    channel::NoChatChannel, client::NoChatClient, config::NoChatAccountConfig,
    transport::PollingTransport,
};

/// Live state for one started account.
pub struct AccountState {
    pub account_id: String,
    pub config: NoChatAccountConfig,
    pub client: Arc<dyn NoChatClient>,
    pub transport: Arc<PollingTransport>,
    pub channel: Arc<NoChatChannel>,
}

/// Account ID → state, shared between the plugin and its outbound
/// adapter.
pub type AccountStateMap = Arc<RwLock<HashMap<String, AccountState>>>;

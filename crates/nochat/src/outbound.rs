//! Outbound adapter: sends agent responses back to NoChat
//! conversations.

use std::sync::Arc;

use {
    async_trait::async_trait,
    coda_channels::{ChannelOutbound, MediaPayload},
    tracing::debug,
};

use crate::{
    client::NoChatClient,
    state::AccountStateMap,
    targets::{looks_like_target_id, normalize_target},
};

#[derive(Clone)]
pub struct NoChatOutbound {
    accounts: AccountStateMap,
}

impl NoChatOutbound {
    pub fn new(accounts: AccountStateMap) -> Self {
        Self { accounts }
    }

    async fn client(&self, account_id: &str) -> anyhow::Result<Arc<dyn NoChatClient>> {
        let accounts = self.accounts.read().await;
        accounts
            .get(account_id)
            .map(|state| state.client.clone())
            .ok_or_else(|| coda_channels::Error::unknown_account(account_id).into())
    }

    pub async fn add_reaction(
        &self,
        account_id: &str,
        conversation: &str,
        message_id: &str,
        emoji: &str,
    ) -> anyhow::Result<()> {
        let conversation = normalize_target(conversation)
            .ok_or_else(|| coda_channels::Error::invalid_input("empty conversation target"))?;
        let client = self.client(account_id).await?;
        client.add_reaction(&conversation, message_id, emoji).await?;
        Ok(())
    }

    pub async fn edit_message(
        &self,
        account_id: &str,
        conversation: &str,
        message_id: &str,
        text: &str,
    ) -> anyhow::Result<()> {
        let conversation = normalize_target(conversation)
            .ok_or_else(|| coda_channels::Error::invalid_input("empty conversation target"))?;
        let client = self.client(account_id).await?;
        client.edit_message(&conversation, message_id, text).await?;
        Ok(())
    }

    pub async fn delete_message(
        &self,
        account_id: &str,
        conversation: &str,
        message_id: &str,
    ) -> anyhow::Result<()> {
        let conversation = normalize_target(conversation)
            .ok_or_else(|| coda_channels::Error::invalid_input("empty conversation target"))?;
        let client = self.client(account_id).await?;
        client.delete_message(&conversation, message_id).await?;
        Ok(())
    }
}

#[async_trait]
impl ChannelOutbound for NoChatOutbound {
    async fn send_text(&self, account_id: &str, to: &str, text: &str) -> anyhow::Result<()> {
        let conversation = normalize_target(to)
            .ok_or_else(|| coda_channels::Error::invalid_input("empty conversation target"))?;
        if !looks_like_target_id(&conversation) {
            return Err(coda_channels::Error::invalid_input(format!(
                "not a nochat conversation id: {conversation}"
            ))
            .into());
        }
        let client = self.client(account_id).await?;
        let receipt = client.send_message(&conversation, text).await?;
        debug!(
            account_id,
            conversation_id = %conversation,
            message_id = receipt.message_id.as_deref().unwrap_or("?"),
            "message sent"
        );
        Ok(())
    }

    async fn send_media(
        &self,
        _account_id: &str,
        _to: &str,
        _payload: &MediaPayload,
    ) -> anyhow::Result<()> {
        Err(coda_channels::Error::unavailable("nochat does not support media attachments").into())
    }
}

//! Polling transport: fetches new messages from the server on an
//! adaptive interval and fans them out to listeners.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
    time::Duration,
};

use {
    async_trait::async_trait,
    futures::future::join_all,
    tokio_util::sync::CancellationToken,
    tracing::{debug, warn},
};

use crate::{
    client::{NoChatClient, NoChatMessage},
    config::PollingConfig,
};

/// Polling interval that tightens under traffic and backs off when the
/// channel goes quiet.
///
/// A cycle that delivered messages snaps to the active interval. The
/// first idle cycle returns to the default; each further idle cycle
/// adds a quarter of the default-to-idle span until the idle ceiling
/// is reached.
#[derive(Debug, Clone)]
pub struct AdaptiveInterval {
    active_ms: u64,
    default_ms: u64,
    idle_ms: u64,
    current_ms: u64,
}

impl AdaptiveInterval {
    pub fn new(polling: &PollingConfig) -> Self {
        Self {
            active_ms: polling.active_interval_ms,
            default_ms: polling.interval_ms,
            idle_ms: polling.idle_interval_ms.max(polling.interval_ms),
            current_ms: polling.interval_ms,
        }
    }

    pub fn record(&mut self, new_messages: usize) {
        if new_messages > 0 {
            self.current_ms = self.active_ms;
        } else if self.current_ms < self.default_ms {
            self.current_ms = self.default_ms;
        } else {
            let step = (self.idle_ms - self.default_ms) / 4;
            self.current_ms = (self.current_ms + step).min(self.idle_ms);
        }
    }

    pub fn current(&self) -> Duration {
        Duration::from_millis(self.current_ms)
    }
}

/// Receives each new inbound message exactly once.
#[async_trait]
pub trait MessageListener: Send + Sync {
    async fn on_message(&self, message: NoChatMessage);
}

/// Polls every conversation the account participates in, deduplicates
/// by message ID, filters the agent's own messages, and delivers the
/// rest to listeners.
pub struct PollingTransport {
    client: Arc<dyn NoChatClient>,
    /// Server-side user ID of this agent. `None` disables self-message
    /// filtering.
    self_id: Option<String>,
    listeners: Vec<Arc<dyn MessageListener>>,
    seen: Mutex<HashSet<String>>,
    interval: Mutex<AdaptiveInterval>,
    cancel: Mutex<Option<CancellationToken>>,
    fetch_limit: u32,
}

impl PollingTransport {
    pub fn new(
        client: Arc<dyn NoChatClient>,
        polling: &PollingConfig,
        self_id: Option<String>,
    ) -> Self {
        Self {
            client,
            self_id,
            listeners: Vec::new(),
            seen: Mutex::new(HashSet::new()),
            interval: Mutex::new(AdaptiveInterval::new(polling)),
            cancel: Mutex::new(None),
            fetch_limit: polling.fetch_limit,
        }
    }

    pub fn add_listener(&mut self, listener: Arc<dyn MessageListener>) {
        self.listeners.push(listener);
    }

    /// Run one poll cycle. Returns the number of new messages
    /// delivered. A failed conversation list is a zero-message cycle;
    /// a failed single conversation is skipped so one bad conversation
    /// never starves the rest.
    pub async fn poll(&self) -> usize {
        let conversations = match self.client.list_conversations().await {
            Ok(conversations) => conversations,
            Err(e) => {
                warn!(error = %e, "failed to list conversations");
                self.interval.lock().unwrap_or_else(|e| e.into_inner()).record(0);
                return 0;
            },
        };

        let fetches = conversations.iter().map(|conv| {
            let id = conv.id.clone();
            async move {
                let result = self.client.messages(&id, self.fetch_limit, 0).await;
                (id, result)
            }
        });

        let mut delivered = 0;
        for (conversation_id, result) in join_all(fetches).await {
            let messages = match result {
                Ok(messages) => messages,
                Err(e) => {
                    warn!(conversation_id, error = %e, "failed to fetch messages");
                    continue;
                },
            };
            for mut message in messages {
                if message.conversation_id.is_empty() {
                    message.conversation_id = conversation_id.clone();
                }
                if self.self_id.as_deref() == Some(message.sender_id.as_str()) {
                    continue;
                }
                {
                    let seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
                    if seen.contains(&message.id) {
                        continue;
                    }
                }
                let id = message.id.clone();
                for listener in &self.listeners {
                    listener.on_message(message.clone()).await;
                }
                // Marked seen only after delivery so a panic-free cycle
                // is exactly-once per transport lifetime.
                self.seen.lock().unwrap_or_else(|e| e.into_inner()).insert(id);
                delivered += 1;
            }
        }

        self.interval.lock().unwrap_or_else(|e| e.into_inner()).record(delivered);
        delivered
    }

    /// Next sleep between poll cycles.
    pub fn current_interval(&self) -> Duration {
        self.interval.lock().unwrap_or_else(|e| e.into_inner()).current()
    }

    /// Spawn the polling loop. Returns its cancellation token; a
    /// previous loop, if any, is cancelled first.
    pub fn start(self: &Arc<Self>) -> CancellationToken {
        let token = CancellationToken::new();
        {
            let mut slot = self.cancel.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(previous) = slot.replace(token.clone()) {
                previous.cancel();
            }
        }

        let transport = Arc::clone(self);
        let loop_token = token.clone();
        tokio::spawn(async move {
            debug!("polling loop started");
            loop {
                if loop_token.is_cancelled() {
                    break;
                }
                let delivered = transport.poll().await;
                if delivered > 0 {
                    debug!(delivered, "poll cycle delivered messages");
                }
                let wait = transport.current_interval();
                tokio::select! {
                    () = loop_token.cancelled() => break,
                    () = tokio::time::sleep(wait) => {},
                }
            }
            debug!("polling loop stopped");
        });
        token
    }

    /// Stop the polling loop. Idempotent; safe before `start`.
    pub fn stop(&self) {
        if let Some(token) = self.cancel.lock().unwrap_or_else(|e| e.into_inner()).take() {
            token.cancel();
        }
    }

    pub fn is_running(&self) -> bool {
        self.cancel
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|token| !token.is_cancelled())
    }
}

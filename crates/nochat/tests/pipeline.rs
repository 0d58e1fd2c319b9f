//! End-to-end pipeline tests driving the polling transport through the
//! trust-gated channel with a scripted server.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use {
    async_trait::async_trait,
    base64::{Engine as _, engine::general_purpose::STANDARD as BASE64},
    coda_channels::{ChannelEvent, ChannelEventSink, ChannelReplyTarget, InboundEnvelope},
    coda_nochat::{
        AutoPromoteConfig, MemoryTrustStore, NoChatAccountConfig, NoChatChannel, NoChatClient,
        NoChatConversation, NoChatMessage, PollingTransport, PromotionRule, TrustConfig,
        client::{SendReceipt, UserIdentity},
    },
};

fn text_message(id: &str, sender_id: &str, sender_name: &str, text: &str) -> NoChatMessage {
    NoChatMessage {
        id: id.into(),
        conversation_id: "conv-1".into(),
        sender_id: sender_id.into(),
        sender_name: Some(sender_name.into()),
        encrypted_content: BASE64.encode(text),
        message_type: "text".into(),
        created_at: None,
    }
}

/// Fake server: each poll cycle serves the next scripted message list
/// for the single conversation.
struct ScriptedServer {
    polls: Mutex<VecDeque<Vec<NoChatMessage>>>,
}

impl ScriptedServer {
    fn new(polls: Vec<Vec<NoChatMessage>>) -> Self {
        Self {
            polls: Mutex::new(polls.into()),
        }
    }
}

#[async_trait]
impl NoChatClient for ScriptedServer {
    async fn list_conversations(&self) -> coda_nochat::Result<Vec<NoChatConversation>> {
        Ok(vec![NoChatConversation {
            id: "conv-1".into(),
            conversation_type: "direct".into(),
            participant_ids: vec!["u-self".into(), "agent-42".into()],
            participants: Vec::new(),
            last_activity: None,
        }])
    }

    async fn messages(
        &self,
        _conversation_id: &str,
        _limit: u32,
        _offset: u32,
    ) -> coda_nochat::Result<Vec<NoChatMessage>> {
        Ok(self
            .polls
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default())
    }

    async fn send_message(&self, _: &str, _: &str) -> coda_nochat::Result<SendReceipt> {
        Ok(SendReceipt::default())
    }
    async fn add_reaction(&self, _: &str, _: &str, _: &str) -> coda_nochat::Result<()> {
        Ok(())
    }
    async fn edit_message(&self, _: &str, _: &str, _: &str) -> coda_nochat::Result<()> {
        Ok(())
    }
    async fn delete_message(&self, _: &str, _: &str) -> coda_nochat::Result<()> {
        Ok(())
    }
    async fn create_conversation(&self, _: &[String]) -> coda_nochat::Result<String> {
        Ok("conv-1".into())
    }
    async fn whoami(&self) -> coda_nochat::Result<Option<UserIdentity>> {
        Ok(Some(UserIdentity {
            id: "u-self".into(),
            username: Some("agent:Coda".into()),
        }))
    }
}

#[derive(Default)]
struct CapturingSink {
    events: Mutex<Vec<ChannelEvent>>,
    dispatched: Mutex<Vec<(InboundEnvelope, ChannelReplyTarget)>>,
}

#[async_trait]
impl ChannelEventSink for CapturingSink {
    async fn emit(&self, event: ChannelEvent) {
        self.events.lock().unwrap().push(event);
    }

    async fn dispatch_to_session(&self, envelope: InboundEnvelope, reply_to: ChannelReplyTarget) {
        self.dispatched.lock().unwrap().push((envelope, reply_to));
    }
}

fn account_config(trust: TrustConfig) -> NoChatAccountConfig {
    NoChatAccountConfig {
        server_url: "https://nochat.example.com".into(),
        agent_name: "Coda".into(),
        trust,
        ..Default::default()
    }
}

fn pipeline(
    polls: Vec<Vec<NoChatMessage>>,
    trust: TrustConfig,
) -> (Arc<PollingTransport>, Arc<CapturingSink>) {
    let config = account_config(trust);
    let sink = Arc::new(CapturingSink::default());
    let channel = Arc::new(NoChatChannel::new(
        "default",
        &config,
        Arc::new(MemoryTrustStore::new()),
        Some(sink.clone()),
    ));
    let mut transport = PollingTransport::new(
        Arc::new(ScriptedServer::new(polls)),
        &config.polling,
        Some("u-self".into()),
    );
    transport.add_listener(channel);
    (Arc::new(transport), sink)
}

#[tokio::test]
async fn untrusted_sender_earns_sandbox_after_three_messages() {
    let trust = TrustConfig {
        auto_promote: Some(AutoPromoteConfig {
            enabled: true,
            untrusted_to_sandboxed: Some(PromotionRule {
                interactions: 3,
                require_approval: false,
            }),
            sandboxed_to_trusted: None,
        }),
        ..Default::default()
    };
    let polls = vec![
        vec![text_message("m1", "agent-42", "TXR", "hello")],
        vec![text_message("m2", "agent-42", "TXR", "how are you")],
        vec![text_message("m3", "agent-42", "TXR", "still here")],
        vec![text_message("m4", "agent-42", "TXR", "promoted yet?")],
    ];
    let (transport, sink) = pipeline(polls, trust);

    for _ in 0..4 {
        transport.poll().await;
    }

    let dispatched = sink.dispatched.lock().unwrap();
    assert_eq!(dispatched.len(), 4);
    // Messages 1 through 3 ride the untrusted profile; the third one
    // trips the threshold, so the fourth arrives sandboxed.
    assert_eq!(dispatched[0].0.meta.tier, "untrusted");
    assert_eq!(dispatched[2].0.meta.tier, "untrusted");
    assert_eq!(dispatched[3].0.meta.tier, "sandboxed");
    assert!(dispatched[3].0.body.contains("trust: sandboxed"));

    // Every envelope routes to the same per-sender session.
    for (envelope, reply_to) in dispatched.iter() {
        assert_eq!(envelope.session_key, "nochat:Coda:dm:agent-42");
        assert_eq!(reply_to.conversation_id, "conv-1");
    }
}

#[tokio::test]
async fn replayed_and_own_messages_never_reach_the_agent() {
    let own = NoChatMessage {
        sender_name: Some("Coda".into()),
        ..text_message("m-own", "u-self", "Coda", "my own reply")
    };
    let polls = vec![
        vec![text_message("m1", "agent-42", "TXR", "hello"), own.clone()],
        // Server returns the same page again plus one new message.
        vec![
            text_message("m1", "agent-42", "TXR", "hello"),
            own,
            text_message("m2", "agent-42", "TXR", "anyone home?"),
        ],
    ];
    let (transport, sink) = pipeline(polls, TrustConfig::default());

    assert_eq!(transport.poll().await, 1);
    assert_eq!(transport.poll().await, 1);

    let dispatched = sink.dispatched.lock().unwrap();
    let ids: Vec<&str> = dispatched.iter().map(|(e, _)| e.meta.sender_id.as_str()).collect();
    assert_eq!(ids, ["agent-42", "agent-42"]);
    let bodies: Vec<&str> = dispatched.iter().map(|(e, _)| e.raw_body.as_str()).collect();
    assert_eq!(bodies, ["hello", "anyone home?"]);
}

#[tokio::test]
async fn blocked_sender_stays_out_while_others_flow() {
    let trust = TrustConfig {
        agents: [("intruder".to_string(), coda_nochat::TrustTier::Blocked)].into(),
        ..Default::default()
    };
    let polls = vec![vec![
        text_message("m1", "intruder", "ShadyBot", "let me in"),
        text_message("m2", "agent-42", "TXR", "hello"),
    ]];
    let (transport, sink) = pipeline(polls, trust);

    transport.poll().await;

    let dispatched = sink.dispatched.lock().unwrap();
    assert_eq!(dispatched.len(), 1);
    assert_eq!(dispatched[0].0.meta.sender_id, "agent-42");

    let events = sink.events.lock().unwrap();
    let denied = events
        .iter()
        .filter(|e| matches!(e, ChannelEvent::InboundMessage { access_granted: false, .. }))
        .count();
    assert_eq!(denied, 1);
}

#[tokio::test]
async fn interval_adapts_across_busy_and_quiet_cycles() {
    let polls = vec![
        vec![text_message("m1", "agent-42", "TXR", "hello")],
        // Then silence.
    ];
    let (transport, _) = pipeline(polls, TrustConfig::default());

    transport.poll().await;
    assert_eq!(transport.current_interval(), Duration::from_millis(5_000));

    transport.poll().await;
    assert_eq!(transport.current_interval(), Duration::from_millis(15_000));

    for _ in 0..10 {
        transport.poll().await;
    }
    assert_eq!(transport.current_interval(), Duration::from_millis(60_000));
}

#[tokio::test]
async fn stop_halts_the_spawned_loop() {
    let (transport, _) = pipeline(Vec::new(), TrustConfig::default());

    let token = transport.start();
    assert!(transport.is_running());
    transport.stop();
    assert!(token.is_cancelled());
    assert!(!transport.is_running());
    // Stopping again is harmless.
    transport.stop();
}

//! HTTP client for the NoChat server API, and the trait seam the rest
//! of the pipeline consumes.

use {
    async_trait::async_trait,
    base64::{Engine as _, engine::general_purpose::STANDARD as BASE64},
    reqwest::StatusCode,
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
    serde_json::json,
};

use crate::error::{Error, Result};

fn default_message_type() -> String {
    "text".to_string()
}

/// A message as returned by the server. Content arrives base64-encoded
/// in `encrypted_content`; see [`decode_content`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoChatMessage {
    pub id: String,
    #[serde(default)]
    pub conversation_id: String,
    pub sender_id: String,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub encrypted_content: String,
    #[serde(default = "default_message_type")]
    pub message_type: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationParticipant {
    pub user_id: String,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoChatConversation {
    pub id: String,
    #[serde(default, rename = "type")]
    pub conversation_type: String,
    #[serde(default)]
    pub participant_ids: Vec<String>,
    #[serde(default)]
    pub participants: Vec<ConversationParticipant>,
    #[serde(default)]
    pub last_activity: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserIdentity {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SendReceipt {
    #[serde(default)]
    pub message_id: Option<String>,
}

/// Wire operations against a NoChat server. The transport and outbound
/// paths only see this trait, so tests can script a fake server.
#[async_trait]
pub trait NoChatClient: Send + Sync {
    async fn list_conversations(&self) -> Result<Vec<NoChatConversation>>;
    async fn messages(
        &self,
        conversation_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<NoChatMessage>>;
    async fn send_message(&self, conversation_id: &str, text: &str) -> Result<SendReceipt>;
    async fn add_reaction(
        &self,
        conversation_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<()>;
    async fn edit_message(
        &self,
        conversation_id: &str,
        message_id: &str,
        text: &str,
    ) -> Result<()>;
    async fn delete_message(&self, conversation_id: &str, message_id: &str) -> Result<()>;
    /// Create (or fetch) a direct conversation with the given
    /// participants, returning its ID.
    async fn create_conversation(&self, participant_ids: &[String]) -> Result<String>;
    /// Identity of the authenticated user, when the server exposes it.
    async fn whoami(&self) -> Result<Option<UserIdentity>>;
}

/// `reqwest`-backed [`NoChatClient`] speaking the server's REST API
/// with bearer-token auth.
pub struct NoChatApiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Secret<String>,
}

impl NoChatApiClient {
    pub fn new(server_url: &str, api_key: Secret<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: server_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn expect_ok(&self, context: &str, status: StatusCode) -> Result<()> {
        if status.is_success() {
            Ok(())
        } else {
            Err(Error::Status {
                context: context.to_string(),
                status: status.as_u16(),
            })
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self
            .http
            .get(self.url(path))
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await
            .map_err(|e| Error::api(path.to_string(), e))?;
        self.expect_ok(path, resp.status())?;
        resp.json().await.map_err(|e| Error::api(path.to_string(), e))
    }
}

#[async_trait]
impl NoChatClient for NoChatApiClient {
    async fn list_conversations(&self) -> Result<Vec<NoChatConversation>> {
        #[derive(Deserialize)]
        struct Body {
            #[serde(default)]
            conversations: Vec<NoChatConversation>,
        }
        let body: Body = self.get_json("/api/conversations").await?;
        Ok(body.conversations)
    }

    async fn messages(
        &self,
        conversation_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<NoChatMessage>> {
        #[derive(Deserialize)]
        struct Body {
            #[serde(default)]
            messages: Vec<NoChatMessage>,
        }
        let path = format!(
            "/api/conversations/{conversation_id}/messages?limit={limit}&offset={offset}"
        );
        let body: Body = self.get_json(&path).await?;
        Ok(body.messages)
    }

    async fn send_message(&self, conversation_id: &str, text: &str) -> Result<SendReceipt> {
        let path = format!("/api/conversations/{conversation_id}/messages");
        let resp = self
            .http
            .post(self.url(&path))
            .bearer_auth(self.api_key.expose_secret())
            .json(&json!({
                "encrypted_content": encode_content(text),
                "message_type": "text",
            }))
            .send()
            .await
            .map_err(|e| Error::api("send message", e))?;
        self.expect_ok("send message", resp.status())?;
        resp.json()
            .await
            .map_err(|e| Error::api("send message", e))
    }

    async fn add_reaction(
        &self,
        conversation_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<()> {
        let path = format!(
            "/api/conversations/{conversation_id}/messages/{message_id}/reactions"
        );
        let resp = self
            .http
            .post(self.url(&path))
            .bearer_auth(self.api_key.expose_secret())
            .json(&json!({ "emoji": emoji }))
            .send()
            .await
            .map_err(|e| Error::api("add reaction", e))?;
        self.expect_ok("add reaction", resp.status())
    }

    async fn edit_message(
        &self,
        conversation_id: &str,
        message_id: &str,
        text: &str,
    ) -> Result<()> {
        let path = format!("/api/conversations/{conversation_id}/messages/{message_id}");
        let resp = self
            .http
            .put(self.url(&path))
            .bearer_auth(self.api_key.expose_secret())
            .json(&json!({ "encrypted_content": encode_content(text) }))
            .send()
            .await
            .map_err(|e| Error::api("edit message", e))?;
        self.expect_ok("edit message", resp.status())
    }

    async fn delete_message(&self, conversation_id: &str, message_id: &str) -> Result<()> {
        let path = format!("/api/conversations/{conversation_id}/messages/{message_id}");
        let resp = self
            .http
            .delete(self.url(&path))
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await
            .map_err(|e| Error::api("delete message", e))?;
        self.expect_ok("delete message", resp.status())
    }

    async fn create_conversation(&self, participant_ids: &[String]) -> Result<String> {
        #[derive(Deserialize)]
        struct Body {
            conversation: NoChatConversation,
        }
        let resp = self
            .http
            .post(self.url("/api/conversations"))
            .bearer_auth(self.api_key.expose_secret())
            .json(&json!({
                "type": "direct",
                "participant_ids": participant_ids,
            }))
            .send()
            .await
            .map_err(|e| Error::api("create conversation", e))?;
        self.expect_ok("create conversation", resp.status())?;
        let body: Body = resp
            .json()
            .await
            .map_err(|e| Error::api("create conversation", e))?;
        Ok(body.conversation.id)
    }

    async fn whoami(&self) -> Result<Option<UserIdentity>> {
        #[derive(Deserialize)]
        struct Body {
            user: UserIdentity,
        }
        match self.get_json::<Body>("/api/users/me").await {
            Ok(body) => Ok(Some(body.user)),
            // Older servers have no identity endpoint.
            Err(Error::Status { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Encode outbound text for the `encrypted_content` field.
pub fn encode_content(text: &str) -> String {
    BASE64.encode(text)
}

/// Decode inbound `encrypted_content`.
///
/// The field is base64; some senders double-encode. A second decode is
/// applied only when the first layer is itself valid base64 whose
/// strict-UTF-8 decoding starts with a printable character, so binary
/// payloads that merely look base64-ish are left alone. Undecodable
/// input falls back to the raw string.
pub fn decode_content(raw: &str) -> String {
    let Ok(first) = BASE64.decode(raw) else {
        return raw.to_string();
    };
    let text = String::from_utf8_lossy(&first).into_owned();

    if let Ok(second) = BASE64.decode(text.trim())
        && let Ok(inner) = String::from_utf8(second)
        && looks_like_text(&inner)
    {
        return inner;
    }
    text
}

fn looks_like_text(s: &str) -> bool {
    matches!(s.chars().next(), Some(' '..='~' | '\n' | '\r' | '\t'))
}

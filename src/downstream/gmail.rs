//! Gmail: recently sent messages

use super::{endpoint, send_json};
use crate::Result;
use crate::constants::GMAIL_MAX_RESULTS;
use base64::Engine;
use chrono::Utc;
use futures::future::try_join_all;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// A sent message as the dashboard shows it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Email {
    pub id: String,
    pub subject: String,
    pub to: String,
    pub date: String,
    pub body: String,
}

#[derive(Deserialize)]
struct MessageList {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Deserialize)]
struct Message {
    id: String,
    #[serde(default)]
    payload: Payload,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Payload {
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    headers: Vec<Header>,
    #[serde(default)]
    body: Option<Body>,
    #[serde(default)]
    parts: Vec<Payload>,
}

#[derive(Deserialize)]
struct Header {
    name: String,
    value: String,
}

#[derive(Deserialize)]
struct Body {
    #[serde(default)]
    data: Option<String>,
}

#[derive(Clone)]
pub struct GmailClient {
    http: Client,
    base_url: String,
}

impl GmailClient {
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    /// The user's most recent sent messages, newest first
    pub async fn sent_messages(&self, access_token: &str) -> Result<Vec<Email>> {
        let list: MessageList = send_json(
            "gmail",
            self.http
                .get(endpoint(&self.base_url, "users/me/messages"))
                .bearer_auth(access_token)
                .query(&[
                    ("q", "from:me".to_string()),
                    ("maxResults", GMAIL_MAX_RESULTS.to_string()),
                ]),
        )
        .await?;

        let fetches = list
            .messages
            .iter()
            .map(|message| self.message(access_token, &message.id));
        let messages = try_join_all(fetches).await?;

        Ok(messages.into_iter().map(to_email).collect())
    }

    async fn message(&self, access_token: &str, id: &str) -> Result<Message> {
        send_json(
            "gmail",
            self.http
                .get(endpoint(&self.base_url, &format!("users/me/messages/{}", id)))
                .bearer_auth(access_token)
                .query(&[("format", "full")]),
        )
        .await
    }
}

fn to_email(message: Message) -> Email {
    let header = |name: &str| {
        message
            .payload
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.clone())
    };

    Email {
        subject: header("Subject").unwrap_or_else(|| "No Subject".to_string()),
        to: header("To").unwrap_or_else(|| "Unknown".to_string()),
        date: header("Date").unwrap_or_else(|| Utc::now().to_rfc3339()),
        body: plain_text_body(&message.payload).unwrap_or_default(),
        id: message.id,
    }
}

/// First `text/plain` part, or the top-level body for single-part messages
fn plain_text_body(payload: &Payload) -> Option<String> {
    let data = if payload.parts.is_empty() {
        payload.body.as_ref()?.data.as_deref()?
    } else {
        payload
            .parts
            .iter()
            .find(|part| part.mime_type == "text/plain")?
            .body
            .as_ref()?
            .data
            .as_deref()?
    };

    decode_body(data)
}

fn decode_body(data: &str) -> Option<String> {
    let trimmed = data.trim_end_matches('=');
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(trimmed)
        .ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

//! Email summarization through the HuggingFace inference API

use super::{endpoint, send_json};
use crate::constants::{DEFAULT_SUMMARY_DURATION_HOURS, SUMMARIZATION_MODEL};
use crate::{EmailBillError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub summary: String,
    /// Suggested billable hours
    pub duration: f64,
}

#[derive(Deserialize)]
struct Generation {
    #[serde(default)]
    summary_text: Option<String>,
    #[serde(default)]
    generated_text: Option<String>,
}

#[derive(Clone)]
pub struct Summarizer {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl Summarizer {
    pub fn new(http: Client, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key,
        }
    }

    pub async fn summarize(&self, text: &str) -> Result<Summary> {
        if text.trim().is_empty() {
            return Err(EmailBillError::validation("Text is required"));
        }

        let mut request = self
            .http
            .post(endpoint(&self.base_url, &format!("models/{}", SUMMARIZATION_MODEL)))
            .json(&json!({ "inputs": text }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let generations: Vec<Generation> = send_json("huggingface", request).await?;
        let summary = generations
            .into_iter()
            .next()
            .and_then(|g| g.summary_text.or(g.generated_text))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "No summary generated".to_string());

        Ok(Summary {
            summary,
            duration: DEFAULT_SUMMARY_DURATION_HOURS,
        })
    }
}

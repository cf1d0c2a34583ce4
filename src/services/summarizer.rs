use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::error::{PosterError, PosterResult};
use crate::services::TextSummarizer;

/// Summarizer backed by an OpenAI-compatible chat-completions endpoint.
/// Authentication uses the `api-key` header (Azure deployment style).
pub struct ChatCompletionSummarizer {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

impl ChatCompletionSummarizer {
    pub fn new(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        ChatCompletionSummarizer {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl TextSummarizer for ChatCompletionSummarizer {
    async fn summarize(&self, text: &str, max_chars: usize) -> PosterResult<String> {
        // ~35 words keeps the result inside a typical summary band.
        let body = json!({
            "messages": [
                {
                    "role": "system",
                    "content": format!(
                        "Summarize event descriptions for a promotional poster. \
                         Reply with roughly 35 words and at most {max_chars} characters. \
                         No preamble, no quotes."
                    ),
                },
                { "role": "user", "content": text },
            ],
            "max_tokens": 120,
            "temperature": 0.4,
        });

        let resp = self
            .client
            .post(&self.endpoint)
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| PosterError::summarizer(format!("chat completion request: {e}")))?;
        if !resp.status().is_success() {
            return Err(PosterError::summarizer(format!(
                "chat completion returned {}",
                resp.status()
            )));
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| PosterError::summarizer(format!("chat completion body: {e}")))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| PosterError::summarizer("chat completion returned no choices"))?;

        Ok(clamp_to_chars(content.trim(), max_chars))
    }
}

/// Word-boundary clamp used when the model overshoots the character limit.
pub fn clamp_to_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out = String::new();
    for word in text.split_whitespace() {
        let next_len = if out.is_empty() {
            word.chars().count()
        } else {
            out.chars().count() + 1 + word.chars().count()
        };
        // Room for the trailing ellipsis.
        if next_len + 1 > max_chars {
            break;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out.push('…');
    out
}

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::LlmConfig;

/// Generation can run for minutes on small hardware.
const COMPLETION_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    num_ctx: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: Message,
}

/// Ask the chat model for a single non-streamed answer.
pub async fn complete(
    client: &reqwest::Client,
    config: &LlmConfig,
    system_prompt: Option<&str>,
    prompt: &str,
) -> Result<String> {
    let url = format!("{}/api/chat", config.base_url.trim_end_matches('/'));

    let mut messages = Vec::with_capacity(2);
    if let Some(system) = system_prompt {
        messages.push(Message {
            role: "system".to_string(),
            content: system.to_string(),
        });
    }
    messages.push(Message {
        role: "user".to_string(),
        content: prompt.to_string(),
    });

    let req = OllamaChatRequest {
        model: &config.model,
        messages,
        stream: false,
        options: OllamaOptions {
            num_ctx: config.num_ctx,
        },
    };

    let resp = client
        .post(&url)
        .timeout(COMPLETION_TIMEOUT)
        .json(&req)
        .send()
        .await
        .context("Failed to call Ollama chat API")?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("Ollama chat API returned {status}: {body}");
    }

    let body: OllamaChatResponse = resp
        .json()
        .await
        .context("Failed to parse Ollama chat response")?;
    Ok(body.message.content)
}

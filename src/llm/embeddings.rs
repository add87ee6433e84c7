use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::EmbeddingConfig;

/// Inputs sent per `/api/embed` call.
const BATCH_SIZE: usize = 32;

#[derive(Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
    /// Ask Ollama to silently truncate inputs that exceed the model's context
    /// length instead of returning a 400 error.
    truncate: bool,
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Embed `texts` with Ollama and check every vector against the configured
/// dimension.
///
/// Inputs are sent as given. Callers cut them to `max_token_size` first with
/// [`fit_to_token_limit`], off the async workers.
pub async fn embed_batch(
    client: &reqwest::Client,
    config: &EmbeddingConfig,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    let url = format!("{}/api/embed", config.base_url.trim_end_matches('/'));
    let mut all_embeddings = Vec::with_capacity(texts.len());

    for batch in texts.chunks(BATCH_SIZE) {
        let req = OllamaEmbedRequest {
            model: &config.model,
            input: batch,
            truncate: true,
        };

        let resp = client
            .post(&url)
            .json(&req)
            .send()
            .await
            .context("Failed to call Ollama embed API")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Ollama embed API returned {status}: {body}");
        }

        let body: OllamaEmbedResponse = resp
            .json()
            .await
            .context("Failed to parse Ollama embed response")?;

        if body.embeddings.len() != batch.len() {
            anyhow::bail!(
                "Ollama returned {} embeddings for {} inputs",
                body.embeddings.len(),
                batch.len()
            );
        }
        all_embeddings.extend(body.embeddings);
    }

    check_dimensions(&all_embeddings, config.dim)?;
    Ok(all_embeddings)
}

/// Embed a single text.
pub async fn embed_single(
    client: &reqwest::Client,
    config: &EmbeddingConfig,
    text: &str,
) -> Result<Vec<f32>> {
    let input = vec![text.to_string()];
    let max_tokens = config.max_token_size;
    let input =
        tokio::task::spawn_blocking(move || fit_to_token_limit(input, max_tokens)).await??;
    let results = embed_batch(client, config, &input).await?;
    results
        .into_iter()
        .next()
        .context("No embedding returned")
}

/// Cut each text to at most `max_tokens` cl100k tokens.
///
/// A token never covers less than one byte, so texts no longer than
/// `max_tokens` bytes are passed through without tokenizing.
pub fn fit_to_token_limit(texts: Vec<String>, max_tokens: usize) -> Result<Vec<String>> {
    texts
        .into_iter()
        .map(|text| {
            if text.len() <= max_tokens {
                Ok(text)
            } else {
                crate::chunking::truncate_to_tokens(&text, max_tokens)
            }
        })
        .collect()
}

fn check_dimensions(embeddings: &[Vec<f32>], expected: usize) -> Result<()> {
    if let Some(bad) = embeddings.iter().find(|e| e.len() != expected) {
        anyhow::bail!(
            "Embedding dimension mismatch: model returned {}, expected {expected}",
            bad.len()
        );
    }
    Ok(())
}

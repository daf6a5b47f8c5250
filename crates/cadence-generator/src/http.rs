//! [`HttpGenerator`], a client for OpenAI-compatible `/v1/completions`
//! servers (llama.cpp server, vLLM, OpenAI).

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use cadence_core::{GenerationError, TextGenerator, generate::Sampling};

use crate::{HttpConfig, Result};

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
  model:       &'a str,
  prompt:      &'a str,
  max_tokens:  u32,
  temperature: f32,
  n:           usize,
  #[serde(skip_serializing_if = "Option::is_none")]
  stop:        Option<&'a [String]>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
  #[serde(default)]
  choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
  #[serde(default)]
  text: String,
}

/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Debug, Clone)]
pub struct HttpGenerator {
  client: Client,
  config: HttpConfig,
}

impl HttpGenerator {
  pub fn new(config: HttpConfig) -> Result<Self> {
    let client = Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs.max(1)))
      .build()?;
    Ok(Self { client, config })
  }

  fn url(&self) -> String {
    format!("{}/v1/completions", self.config.base_url.trim_end_matches('/'))
  }

  async fn complete(
    &self,
    prompt: &str,
    n: usize,
    sampling: Sampling,
  ) -> Result<Vec<String>, GenerationError> {
    let body = CompletionRequest {
      model: &self.config.model,
      prompt,
      max_tokens: sampling.max_tokens,
      temperature: sampling.temperature,
      n: n.max(1),
      stop: (!self.config.stop.is_empty()).then_some(self.config.stop.as_slice()),
    };

    let mut req = self.client.post(self.url()).json(&body);
    if let Some(key) = &self.config.api_key {
      req = req.bearer_auth(key);
    }

    let resp = req.send().await.map_err(|e| {
      if e.is_connect() || e.is_timeout() {
        tracing::debug!(error = %e, "completion server unreachable");
        GenerationError::Unavailable
      } else {
        GenerationError::Backend(e.to_string())
      }
    })?;
    if !resp.status().is_success() {
      return Err(GenerationError::Backend(format!(
        "POST /v1/completions → {}",
        resp.status()
      )));
    }

    let parsed: CompletionResponse = resp
      .json()
      .await
      .map_err(|e| GenerationError::Backend(format!("decoding completion: {e}")))?;

    let texts: Vec<String> = parsed
      .choices
      .into_iter()
      .map(|c| c.text.trim().to_owned())
      .filter(|t| !t.is_empty())
      .collect();
    if texts.is_empty() {
      return Err(GenerationError::Empty);
    }
    Ok(texts)
  }
}

impl TextGenerator for HttpGenerator {
  async fn generate(
    &self,
    prompt: &str,
    sampling: Sampling,
  ) -> Result<String, GenerationError> {
    let mut texts = self.complete(prompt, 1, sampling).await?;
    Ok(texts.swap_remove(0))
  }

  async fn generate_variants(
    &self,
    prompt: &str,
    n: usize,
    temperature: f32,
  ) -> Result<Vec<String>, GenerationError> {
    let mut texts = self
      .complete(prompt, n, Sampling::with_temperature(temperature))
      .await?;
    texts.truncate(n.max(1));
    Ok(texts)
  }
}

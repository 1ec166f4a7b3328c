//! OpenAI-backed embedding and generation.
//!
//! This module is only available when the `openai` feature is enabled.

use std::ops::Range;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::Generator;

const PROVIDER: &str = "OpenAI";

/// The default OpenAI API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// The default model for OpenAI embeddings.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// The default dimensionality for `text-embedding-3-small`.
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 1536;

/// The default chat model used for answers.
pub const DEFAULT_CHAT_MODEL: &str = "gpt-3.5-turbo";

/// The default sampling temperature for answers.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// The default HTTP timeout for both collaborators.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Inputs sent per embeddings request unless overridden.
pub const DEFAULT_BATCH_SIZE: usize = 256;

/// The API rejects embeddings requests with more inputs than this.
pub const MAX_BATCH_SIZE: usize = 2048;

fn read_api_key() -> Result<String> {
    let key = std::env::var("OPENAI_API_KEY")
        .map_err(|_| RagError::Config("OPENAI_API_KEY environment variable not set".to_string()))?;
    check_api_key(key)
}

fn check_api_key(api_key: String) -> Result<String> {
    if api_key.trim().is_empty() {
        return Err(RagError::Config("OpenAI API key must not be empty".to_string()));
    }
    Ok(api_key)
}

fn build_client(timeout: Duration) -> std::result::Result<reqwest::Client, String> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| format!("failed to build HTTP client: {e}"))
}

/// Send a JSON request and decode the JSON reply, turning transport and API
/// failures into a message suitable for either error variant.
async fn post_json<B: Serialize, R: for<'de> Deserialize<'de>>(
    client: &reqwest::Client,
    url: &str,
    api_key: &str,
    body: &B,
) -> std::result::Result<R, String> {
    let response = client
        .post(url)
        .bearer_auth(api_key)
        .json(body)
        .send()
        .await
        .map_err(|e| format!("request failed: {e}"))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let detail =
            serde_json::from_str::<ErrorResponse>(&body).map(|e| e.error.message).unwrap_or(body);
        return Err(format!("API returned {status}: {detail}"));
    }

    response.json().await.map_err(|e| format!("failed to parse response: {e}"))
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

// ── Embeddings ─────────────────────────────────────────────────────

/// An [`EmbeddingProvider`] backed by the OpenAI embeddings API.
///
/// # Configuration
///
/// - `model` – defaults to `text-embedding-3-small`.
/// - `dimensions` – optional Matryoshka dimension override.
/// - `batch_size` – inputs per request, defaults to 256. Larger inputs are
///   split into consecutive requests.
/// - `api_key` – from the constructor or the `OPENAI_API_KEY` environment variable.
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::openai::OpenAIEmbeddingProvider;
///
/// let provider = OpenAIEmbeddingProvider::from_env()?.with_dimensions(384);
/// let embedding = provider.embed("hello world").await?;
/// ```
pub struct OpenAIEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dimensions: usize,
    /// If set, passed to the API for Matryoshka dimension truncation.
    request_dimensions: Option<usize>,
    batch_size: usize,
}

impl OpenAIEmbeddingProvider {
    /// Create a new provider with the given API key.
    ///
    /// # Errors
    ///
    /// - [`RagError::Config`] if the key is empty.
    /// - [`RagError::Embedding`] if the HTTP client cannot be built.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = check_api_key(api_key.into())?;
        let client = build_client(DEFAULT_TIMEOUT).map_err(embedding_error)?;

        Ok(Self {
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.into(),
            model: DEFAULT_EMBEDDING_MODEL.into(),
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
            request_dimensions: None,
            batch_size: DEFAULT_BATCH_SIZE,
        })
    }

    /// Create a new provider using the `OPENAI_API_KEY` environment variable.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if the variable is unset or empty.
    pub fn from_env() -> Result<Self> {
        Self::new(read_api_key()?)
    }

    /// Set the model name (e.g. `text-embedding-3-large`).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the output dimensions (Matryoshka support).
    ///
    /// This also updates the value returned by [`dimensions()`](EmbeddingProvider::dimensions).
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self.request_dimensions = Some(dims);
        self
    }

    /// Set how many inputs go into one request, clamped to `1..=2048`.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(1, MAX_BATCH_SIZE);
        self
    }

    /// Point at an OpenAI-compatible server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn request_batch(&self, batch: &[&str]) -> Result<Vec<EmbeddingData>> {
        debug!(provider = PROVIDER, batch_size = batch.len(), model = %self.model, "embedding batch");

        let request =
            EmbeddingRequest { model: &self.model, input: batch, dimensions: self.request_dimensions };
        let url = format!("{}/embeddings", self.base_url);
        let response: EmbeddingResponse =
            post_json(&self.client, &url, &self.api_key, &request).await.map_err(|message| {
                error!(provider = PROVIDER, error = %message, "embedding request failed");
                embedding_error(message)
            })?;
        Ok(response.data)
    }
}

/// Embed `len` inputs in consecutive batches of at most `batch_size`.
///
/// `send` receives the input range of each batch. The first failing batch
/// ends the run.
async fn embed_in_batches<F, Fut>(
    len: usize,
    batch_size: usize,
    mut send: F,
) -> Result<Vec<Vec<f32>>>
where
    F: FnMut(Range<usize>) -> Fut,
    Fut: Future<Output = Result<Vec<EmbeddingData>>>,
{
    let batch_size = batch_size.max(1);
    let mut vectors = Vec::with_capacity(len);
    let mut start = 0;
    while start < len {
        let end = len.min(start + batch_size);
        let data = send(start..end).await?;
        vectors.extend(into_ordered(data, end - start)?);
        start = end;
    }
    Ok(vectors)
}

/// Put one response's embeddings back in request order.
///
/// The API tags each embedding with the position of its input and does not
/// promise to return them in that order.
fn into_ordered(mut data: Vec<EmbeddingData>, expected: usize) -> Result<Vec<Vec<f32>>> {
    if data.len() != expected {
        error!(provider = PROVIDER, expected, actual = data.len(), "embedding count mismatch");
        return Err(embedding_error(format!(
            "expected {expected} embeddings, got {}",
            data.len()
        )));
    }

    data.sort_by_key(|d| d.index);
    if data.iter().enumerate().any(|(position, d)| d.index != position) {
        return Err(embedding_error("response indices do not cover every input exactly once"));
    }
    Ok(data.into_iter().map(|d| d.embedding).collect())
}

fn embedding_error(message: impl Into<String>) -> RagError {
    RagError::Embedding { provider: PROVIDER.into(), message: message.into() }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = PROVIDER, text_len = text.len(), "embedding single text");

        let results = self.embed_batch(&[text]).await?;
        results.into_iter().next().ok_or_else(|| embedding_error("API returned empty response"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        embed_in_batches(texts.len(), self.batch_size, move |range| self.request_batch(&texts[range]))
            .await
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}

// ── Chat completions ───────────────────────────────────────────────

/// A [`Generator`] backed by the OpenAI chat completions API.
///
/// Sends the rendered prompt as a single user message.
pub struct OpenAIGenerator {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
}

impl OpenAIGenerator {
    /// Create a generator with the given API key, using `gpt-3.5-turbo` at
    /// temperature 0.7.
    ///
    /// # Errors
    ///
    /// - [`RagError::Config`] if the key is empty.
    /// - [`RagError::Generation`] if the HTTP client cannot be built.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = check_api_key(api_key.into())?;
        let client = build_client(DEFAULT_TIMEOUT).map_err(generation_error)?;

        Ok(Self {
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.into(),
            model: DEFAULT_CHAT_MODEL.into(),
            temperature: DEFAULT_TEMPERATURE,
        })
    }

    /// Create a generator using the `OPENAI_API_KEY` environment variable.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if the variable is unset or empty.
    pub fn from_env() -> Result<Self> {
        Self::new(read_api_key()?)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Point at an OpenAI-compatible server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Replace the HTTP timeout.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Generation`] if the HTTP client cannot be rebuilt.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = build_client(timeout).map_err(generation_error)?;
        Ok(self)
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

fn generation_error(message: impl Into<String>) -> RagError {
    RagError::Generation { provider: PROVIDER.into(), message: message.into() }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl Generator for OpenAIGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        debug!(provider = PROVIDER, model = %self.model, prompt_len = prompt.len(), "chat completion");

        let request = ChatRequest {
            model: &self.model,
            messages: [ChatMessage { role: "user", content: prompt }],
            temperature: self.temperature,
        };
        let url = format!("{}/chat/completions", self.base_url);
        let response: ChatResponse =
            post_json(&self.client, &url, &self.api_key, &request).await.map_err(|message| {
                error!(provider = PROVIDER, error = %message, "chat completion failed");
                generation_error(message)
            })?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| generation_error("API returned no completion"))
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::error::ErrorKind;

    fn data(index: usize, value: f32) -> EmbeddingData {
        EmbeddingData { index, embedding: vec![value] }
    }

    #[test]
    fn empty_keys_are_configuration_errors() {
        let embedder = OpenAIEmbeddingProvider::new("").err().unwrap();
        assert!(matches!(embedder, RagError::Config(_)));
        assert_eq!(embedder.kind(), ErrorKind::Config);

        let generator = OpenAIGenerator::new("  ").err().unwrap();
        assert!(matches!(generator, RagError::Config(_)));
        assert_eq!(generator.kind(), ErrorKind::Config);
    }

    #[test]
    fn batch_size_is_clamped_to_the_api_limit() {
        let provider = OpenAIEmbeddingProvider::new("sk-test").unwrap();
        assert_eq!(provider.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(provider.with_batch_size(10_000).batch_size, MAX_BATCH_SIZE);

        let provider = OpenAIEmbeddingProvider::new("sk-test").unwrap().with_batch_size(0);
        assert_eq!(provider.batch_size, 1);
    }

    #[test]
    fn dimension_override_is_reported() {
        let provider = OpenAIEmbeddingProvider::new("sk-test").unwrap().with_dimensions(384);
        assert_eq!(provider.dimensions(), 384);
        assert_eq!(provider.request_dimensions, Some(384));
    }

    #[test]
    fn generator_defaults_to_gpt_35_at_temperature_0_7() {
        let generator = OpenAIGenerator::new("sk-test").unwrap();
        assert_eq!(generator.model(), "gpt-3.5-turbo");
        assert!((generator.temperature - 0.7).abs() < f32::EPSILON);

        let generator = generator.with_base_url("http://localhost:8080/v1/");
        assert_eq!(generator.base_url, "http://localhost:8080/v1");
    }

    #[test]
    fn chat_request_shape() {
        let request = ChatRequest {
            model: "gpt-3.5-turbo",
            messages: [ChatMessage { role: "user", content: "hi" }],
            temperature: 0.5,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "model": "gpt-3.5-turbo",
                "messages": [{"role": "user", "content": "hi"}],
                "temperature": 0.5
            })
        );
    }

    #[test]
    fn embedding_response_is_reordered_by_index() {
        let response: EmbeddingResponse = serde_json::from_str(
            r#"{"data":[{"index":1,"embedding":[2.0]},{"index":0,"embedding":[1.0]}]}"#,
        )
        .unwrap();
        let vectors = into_ordered(response.data, 2).unwrap();
        assert_eq!(vectors, vec![vec![1.0], vec![2.0]]);
    }

    #[test]
    fn malformed_responses_are_embedding_errors() {
        let short = into_ordered(vec![data(0, 1.0)], 2);
        assert!(matches!(short, Err(RagError::Embedding { .. })));

        let duplicated = into_ordered(vec![data(0, 1.0), data(0, 2.0)], 2);
        assert!(matches!(duplicated, Err(RagError::Embedding { .. })));
    }

    #[tokio::test]
    async fn large_inputs_are_split_into_ordered_batches() {
        let mut requests = Vec::new();
        let vectors = embed_in_batches(5, 2, |range: Range<usize>| {
            requests.push(range.clone());
            // Answer each batch in reverse, tagged with batch-local indices.
            let reply: Vec<EmbeddingData> =
                range.clone().rev().map(|i| data(i - range.start, i as f32)).collect();
            async move { Ok::<_, RagError>(reply) }
        })
        .await
        .unwrap();

        assert_eq!(requests, [0..2, 2..4, 4..5]);
        assert_eq!(vectors, vec![vec![0.0], vec![1.0], vec![2.0], vec![3.0], vec![4.0]]);
    }

    #[tokio::test]
    async fn a_failed_batch_stops_the_run() {
        let mut requests = 0;
        let result = embed_in_batches(6, 2, |range: Range<usize>| {
            requests += 1;
            let reply: Result<Vec<EmbeddingData>> = if range.start == 2 {
                Err(embedding_error("rate limited"))
            } else {
                Ok(range.clone().map(|i| data(i - range.start, 0.0)).collect())
            };
            async move { reply }
        })
        .await;

        assert!(matches!(result, Err(RagError::Embedding { .. })));
        assert_eq!(requests, 2);
    }

    #[tokio::test]
    async fn no_inputs_send_no_requests() {
        let mut requests = 0;
        let vectors = embed_in_batches(0, 4, |_| {
            requests += 1;
            let reply: Result<Vec<EmbeddingData>> = Ok(Vec::new());
            async move { reply }
        })
        .await
        .unwrap();
        assert!(vectors.is_empty());
        assert_eq!(requests, 0);
    }
}

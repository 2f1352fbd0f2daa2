use std::pin::Pin;

use async_stream::try_stream;
use async_trait::async_trait;
use bytes::BytesMut;
use futures::{Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::CompletionError;
use crate::types::{CompletionParams, Message};

/// Incremental text deltas from one streaming completion call.
pub type CompletionTextStream =
    Pin<Box<dyn Stream<Item = Result<String, CompletionError>> + Send>>;

/// A backend capable of issuing one streaming code-completion call.
#[async_trait]
pub trait CodeCompletionsClient: Send + Sync {
    async fn complete_stream(
        &self,
        params: &CompletionParams,
        cancel: CancellationToken,
    ) -> Result<CompletionTextStream, CompletionError>;
}

/// Streaming HTTP client for a Fireworks-style code-completion endpoint.
#[derive(Clone)]
pub struct HttpCompletionsClient {
    endpoint: Url,
    client: reqwest::Client,
}

impl HttpCompletionsClient {
    pub fn new(endpoint: Url, api_key: Option<String>) -> Result<Self, CompletionError> {
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key.as_deref() {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {key}"))
                    .map_err(|e| CompletionError::InvalidConfig(e.to_string()))?,
            );
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent("ember-complete/0.1.0")
            .build()?;
        Ok(Self { endpoint, client })
    }
}

#[async_trait]
impl CodeCompletionsClient for HttpCompletionsClient {
    async fn complete_stream(
        &self,
        params: &CompletionParams,
        cancel: CancellationToken,
    ) -> Result<CompletionTextStream, CompletionError> {
        let body = CompletionsRequestBody {
            model: &params.model,
            messages: &params.messages,
            temperature: params.temperature,
            top_k: params.top_k,
            max_tokens_to_sample: params.max_tokens_to_sample,
            stop_sequences: &params.stop_sequences,
            stream: true,
        };

        let request = self
            .client
            .post(self.endpoint.clone())
            .json(&body)
            .timeout(params.timeout);

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(CompletionError::Cancelled),
            resp = request.send() => resp?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::BadStatus { status, body });
        }

        let mut bytes_stream = response.bytes_stream();
        let timeout = params.timeout;

        let stream = try_stream! {
            let mut buffer = BytesMut::new();
            // Index of the next byte we haven't scanned yet for `\n`, so a
            // single SSE line split across many small chunks is not rescanned
            // from the start every time.
            let mut scan_start: usize = 0;

            loop {
                // Drain all complete lines already buffered before waiting
                // for more bytes.
                while let Some(rel_pos) = buffer[scan_start..].iter().position(|&b| b == b'\n') {
                    let newline_pos = scan_start + rel_pos;
                    let mut line = buffer.split_to(newline_pos + 1);
                    // `split_to` advances the start of `buffer`; the old scan
                    // offset is no longer meaningful.
                    scan_start = 0;
                    // Drop the trailing '\n' and handle CRLF line endings.
                    line.truncate(newline_pos);
                    if line.last() == Some(&b'\r') {
                        line.truncate(line.len() - 1);
                    }

                    let line = std::str::from_utf8(&line).map_err(|e| {
                        CompletionError::InvalidResponse(format!("invalid UTF-8 in SSE stream: {e}"))
                    })?;

                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    let Some(data) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let data = data.trim();
                    if data == "[DONE]" {
                        return;
                    }

                    let event: CompletionsStreamEvent = serde_json::from_str(data).map_err(|e| {
                        CompletionError::InvalidResponse(format!("invalid SSE payload: {e}"))
                    })?;
                    if let Some(delta) = event.completion {
                        if !delta.is_empty() {
                            yield delta;
                        }
                    }
                }
                // Everything buffered has been scanned without a newline.
                scan_start = buffer.len();

                let next = tokio::select! {
                    _ = cancel.cancelled() => Err(CompletionError::Cancelled),
                    chunk = tokio::time::timeout(timeout, bytes_stream.next()) => {
                        match chunk {
                            Ok(item) => Ok(item),
                            Err(_) => Err(CompletionError::Timeout),
                        }
                    }
                }?;

                let Some(chunk) = next else { break };
                let chunk = chunk?;
                buffer.extend_from_slice(&chunk);
            }
        };

        Ok(Box::pin(stream))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CompletionsRequestBody<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    top_k: u32,
    max_tokens_to_sample: u32,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    stop_sequences: &'a [String],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionsStreamEvent {
    completion: Option<String>,
}

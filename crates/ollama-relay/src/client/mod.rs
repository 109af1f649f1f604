//! Client for callers of the relay
//!
//! The relay passes upstream bytes through untouched, so decoding the NDJSON
//! stream and noticing a stream that ended without `done: true` happen here.

mod ndjson;

pub use ndjson::NdjsonDecoder;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use reqwest::Client;
use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::relay::{GenerationRequest, GenerationResponse, ModelStatus};

/// Errors surfaced to relay callers
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid relay URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The relay answered with a non-success status
    #[error("Relay returned {status}: {message}")]
    Relay { status: u16, message: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// The stream ended without a final `done: true` object
    #[error("Stream truncated: {0}")]
    Truncated(String),
}

/// Decoded generation stream
pub type GenerationStream =
    Pin<Box<dyn Stream<Item = Result<GenerationResponse, ClientError>> + Send>>;

/// HTTP client for the relay's endpoints
#[derive(Debug, Clone)]
pub struct GenerationClient {
    client: Client,
    base_url: Url,
    timeout: Duration,
}

impl GenerationClient {
    /// `timeout` bounds buffered calls; streams run until the relay closes them
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let base_url =
            Url::parse(base_url).map_err(|e| ClientError::InvalidUrl(format!("{base_url}: {e}")))?;

        Ok(Self {
            client: Client::new(),
            base_url,
            timeout,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        self.base_url
            .join(path)
            .map_err(|e| ClientError::InvalidUrl(format!("{path}: {e}")))
    }

    /// Ask the relay whether its upstream is reachable and what models it has
    pub async fn status(&self) -> Result<ModelStatus, ClientError> {
        let response = self
            .client
            .get(self.endpoint("/api/status")?)
            .timeout(self.timeout)
            .send()
            .await?;

        // 503 still carries a ModelStatus body describing the failure.
        let status = response.status();
        if status.is_success() || status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
            let text = response.text().await?;
            return serde_json::from_str(&text).map_err(|e| ClientError::Decode(e.to_string()));
        }

        Err(Self::relay_error(response).await)
    }

    /// Run a buffered generation and return the upstream's JSON document
    pub async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<serde_json::Value, ClientError> {
        let request = request.clone().with_stream(false);

        let response = self
            .client
            .post(self.endpoint("/api/generate")?)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::relay_error(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))
    }

    /// Run a streamed generation and decode it line by line
    pub async fn generate_stream(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationStream, ClientError> {
        let request = request.clone().with_stream(true);

        let response = self
            .client
            .post(self.endpoint("/api/generate")?)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::relay_error(response).await);
        }

        Ok(decode_stream(response.bytes_stream()))
    }

    async fn relay_error(response: reqwest::Response) -> ClientError {
        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();

        let message = serde_json::from_str::<serde_json::Value>(&text)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
            .unwrap_or(text);

        ClientError::Relay { status, message }
    }
}

struct DecodeState<S> {
    bytes: Pin<Box<S>>,
    decoder: NdjsonDecoder,
    pending: VecDeque<Result<GenerationResponse, ClientError>>,
    saw_done: bool,
    finished: bool,
}

impl<S> DecodeState<S> {
    fn push_line(&mut self, line: &str) {
        let item = serde_json::from_str::<GenerationResponse>(line)
            .map_err(|e| ClientError::Decode(format!("{e}: {line}")));
        if matches!(&item, Ok(r) if r.done) {
            self.saw_done = true;
        }
        self.pending.push_back(item);
    }

    fn end(&mut self, reason: &str) {
        self.finished = true;
        let mid_line = self.decoder.has_partial_line();
        if let Some(line) = self.decoder.finish() {
            self.push_line(&line);
        }
        if !self.saw_done {
            let reason = if mid_line {
                format!("{reason} (inside an unterminated line)")
            } else {
                reason.to_string()
            };
            self.pending.push_back(Err(ClientError::Truncated(reason)));
        }
    }
}

/// Decode a relayed NDJSON byte stream into generation responses.
///
/// Yields `ClientError::Truncated` as the last item when the bytes end, or
/// fail, before a `done: true` object has been seen.
pub fn decode_stream<S, E>(bytes: S) -> GenerationStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = DecodeState {
        bytes: Box::pin(bytes),
        decoder: NdjsonDecoder::new(),
        pending: VecDeque::new(),
        saw_done: false,
        finished: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    for line in state.decoder.push(&chunk) {
                        state.push_line(&line);
                    }
                }
                Some(Err(e)) => state.end(&e.to_string()),
                None => state.end("stream ended before a done marker"),
            }
        }
    }))
}

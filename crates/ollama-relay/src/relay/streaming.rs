//! Chunk-by-chunk relay of an upstream response body
//!
//! This module provides the streaming half of the relay:
//! - Forward each upstream chunk to the caller as soon as it is read, unmodified
//! - Turn an upstream read failure into an error on the outbound body
//! - Report how the relay ended once it is over

use bytes::Bytes;
use futures::stream::Stream;
use std::fmt::Display;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

use super::error::ProxyError;

/// Result of starting a relay - the stream to hand the caller and a handle to
/// learn how it ended
pub struct RelayResult<S> {
    /// Stream to forward to the caller (yields upstream chunks unchanged)
    pub client_stream: S,
    /// Resolves once the relay has finished, failed, or been dropped
    pub outcome: OutcomeHandle,
}

/// How a relayed stream ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEnd {
    /// Upstream signalled end of stream
    Completed,
    /// Upstream read failed after streaming began
    Interrupted(String),
    /// The caller went away before upstream finished
    Cancelled,
}

/// Summary reported when a relay ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOutcome {
    pub chunks: usize,
    pub bytes: usize,
    pub end: RelayEnd,
}

/// Handle to retrieve the relay outcome after the stream ends
pub struct OutcomeHandle {
    receiver: oneshot::Receiver<RelayOutcome>,
}

impl OutcomeHandle {
    pub async fn outcome(self) -> RelayOutcome {
        self.receiver.await.unwrap_or(RelayOutcome {
            chunks: 0,
            bytes: 0,
            end: RelayEnd::Cancelled,
        })
    }
}

/// A stream wrapper that passes upstream chunks through in order.
///
/// Dropping it before upstream finishes drops the upstream stream too, which
/// closes the upstream connection.
pub struct RelayStream<S> {
    inner: S,
    chunks: usize,
    bytes: usize,
    reporter: Option<oneshot::Sender<RelayOutcome>>,
}

impl<S> RelayStream<S> {
    fn finish(&mut self, end: RelayEnd) {
        if let Some(reporter) = self.reporter.take() {
            let _ = reporter.send(RelayOutcome {
                chunks: self.chunks,
                bytes: self.bytes,
                end,
            });
        }
    }

    fn is_finished(&self) -> bool {
        self.reporter.is_none()
    }
}

impl<S, E> Stream for RelayStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Display,
{
    type Item = Result<Bytes, std::io::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        if this.is_finished() {
            return Poll::Ready(None);
        }

        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(bytes))) => {
                this.chunks += 1;
                this.bytes += bytes.len();
                Poll::Ready(Some(Ok(bytes)))
            }
            Poll::Ready(Some(Err(e))) => {
                let reason = e.to_string();
                tracing::warn!(
                    chunks = this.chunks,
                    bytes = this.bytes,
                    error = %reason,
                    "Upstream stream failed mid-relay, aborting caller stream"
                );
                this.finish(RelayEnd::Interrupted(reason.clone()));
                Poll::Ready(Some(Err(std::io::Error::other(
                    ProxyError::StreamInterrupted(reason),
                ))))
            }
            Poll::Ready(None) => {
                this.finish(RelayEnd::Completed);
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<S> Drop for RelayStream<S> {
    fn drop(&mut self) {
        if !self.is_finished() {
            tracing::debug!(
                chunks = self.chunks,
                bytes = self.bytes,
                "Caller stream dropped before upstream finished, cancelling upstream read"
            );
            self.finish(RelayEnd::Cancelled);
        }
    }
}

/// Streaming relay functionality
pub struct StreamRelay;

impl StreamRelay {
    /// Wrap an upstream byte stream for relaying to the caller
    ///
    /// # Returns
    /// A `RelayResult` containing:
    /// - `client_stream` - Use this as the outbound response body
    /// - `outcome` - Resolves with chunk/byte counts and how the relay ended
    pub fn relay<S, E>(incoming: S) -> RelayResult<RelayStream<S>>
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin,
        E: Display,
    {
        let (tx, rx) = oneshot::channel();

        RelayResult {
            client_stream: RelayStream {
                inner: incoming,
                chunks: 0,
                bytes: 0,
                reporter: Some(tx),
            },
            outcome: OutcomeHandle { receiver: rx },
        }
    }
}

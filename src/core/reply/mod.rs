//! Streaming ingestion of a single bot reply.
//!
//! [`ReplyStream`] owns one pending bot message from the moment the request
//! is sent until the body ends. Every fragment is folded into a
//! [`StreamAccumulator`] and the full text so far is handed to a
//! [`ReplySink`] before the next fragment is read. The run ends in exactly
//! one terminal [`ReplyOutcome`].

mod phase;

pub use phase::{ReplyPhase, Transition};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::accumulator::StreamAccumulator;
use super::types::{ChatId, MessageId};
use crate::backend::error::BackendError;

/// The message a reply stream is allowed to write to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReplyTarget {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

impl ReplyTarget {
    #[must_use]
    pub const fn new(chat_id: ChatId, message_id: MessageId) -> Self {
        Self {
            chat_id,
            message_id,
        }
    }
}

/// Receives each snapshot of the reply text, in order.
pub trait ReplySink: Send + Sync {
    fn on_text(&self, target: &ReplyTarget, text: &str);
}

#[derive(Debug)]
pub enum ReplyOutcome {
    Completed {
        text: String,
        fragments: usize,
    },
    /// `text` is the failure notice that replaced whatever had arrived.
    Failed {
        text: String,
        fragments: usize,
        error: BackendError,
    },
    Cancelled {
        fragments: usize,
    },
}

impl ReplyOutcome {
    #[must_use]
    pub const fn phase(&self) -> ReplyPhase {
        match self {
            Self::Completed { .. } => ReplyPhase::Completed,
            Self::Failed { .. } => ReplyPhase::Failed,
            Self::Cancelled { .. } => ReplyPhase::Cancelled,
        }
    }

    /// Text the message ends with, `None` when the stream was cancelled.
    #[must_use]
    pub fn final_text(&self) -> Option<&str> {
        match self {
            Self::Completed { text, .. } | Self::Failed { text, .. } => Some(text),
            Self::Cancelled { .. } => None,
        }
    }

    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

enum Step<T> {
    Ready(T),
    Cancelled,
    TimedOut(Duration),
}

pub struct ReplyStream {
    target: ReplyTarget,
    failure_text: &'static str,
    idle_timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl ReplyStream {
    #[must_use]
    pub fn new(target: ReplyTarget, failure_text: &'static str) -> Self {
        Self {
            target,
            failure_text,
            idle_timeout: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Longest wait for the response head or for the next fragment.
    #[must_use]
    pub const fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    #[must_use]
    pub const fn target(&self) -> &ReplyTarget {
        &self.target
    }

    /// Drives the reply to its terminal phase.
    ///
    /// `open` resolves to the response body; failing to open counts as a
    /// transport failure with zero fragments. Dropping the body on
    /// cancellation closes the underlying connection.
    #[tracing::instrument(
        name = "reply_stream",
        skip_all,
        fields(chat_id = %self.target.chat_id, message_id = %self.target.message_id)
    )]
    pub async fn run<F, S>(self, open: F, sink: &dyn ReplySink) -> ReplyOutcome
    where
        F: Future<Output = Result<S, BackendError>>,
        S: Stream<Item = Result<Bytes, BackendError>> + Unpin,
    {
        let mut phase = ReplyPhase::Pending;

        let mut source = match self.step(open).await {
            Step::Ready(Ok(source)) => source,
            Step::Ready(Err(error)) => return self.fail(phase, 0, error, sink),
            Step::TimedOut(limit) => {
                return self.fail(phase, 0, BackendError::Timeout(limit), sink);
            }
            Step::Cancelled => return Self::cancelled(phase, 0),
        };

        let mut accumulator = StreamAccumulator::new();

        loop {
            match self.step(source.next()).await {
                Step::Ready(Some(Ok(fragment))) => {
                    phase = Self::advance(phase, Transition::Fragment);
                    let text = accumulator.push(&fragment);
                    tracing::trace!(bytes = fragment.len(), total = text.len(), "Reply fragment");
                    sink.on_text(&self.target, text);
                }
                Step::Ready(Some(Err(error))) => {
                    return self.fail(phase, accumulator.fragments(), error, sink);
                }
                Step::Ready(None) => {
                    Self::advance(phase, Transition::EndOfStream);
                    let fragments = accumulator.fragments();
                    let had_tail = accumulator.has_pending_bytes();
                    let text = accumulator.finish();
                    if had_tail {
                        sink.on_text(&self.target, &text);
                    }
                    tracing::debug!(fragments, chars = text.chars().count(), "Reply completed");
                    return ReplyOutcome::Completed { text, fragments };
                }
                Step::TimedOut(limit) => {
                    let error = BackendError::Timeout(limit);
                    return self.fail(phase, accumulator.fragments(), error, sink);
                }
                Step::Cancelled => return Self::cancelled(phase, accumulator.fragments()),
            }
        }
    }

    async fn step<F: Future>(&self, fut: F) -> Step<F::Output> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Step::Cancelled,
            result = bounded(self.idle_timeout, fut) => match result {
                Ok(value) => Step::Ready(value),
                Err(limit) => Step::TimedOut(limit),
            },
        }
    }

    fn fail(
        &self,
        phase: ReplyPhase,
        fragments: usize,
        error: BackendError,
        sink: &dyn ReplySink,
    ) -> ReplyOutcome {
        Self::advance(phase, Transition::TransportError);
        tracing::warn!(fragments, error = %error, "Reply transport failed");
        sink.on_text(&self.target, self.failure_text);
        ReplyOutcome::Failed {
            text: self.failure_text.to_string(),
            fragments,
            error,
        }
    }

    fn cancelled(phase: ReplyPhase, fragments: usize) -> ReplyOutcome {
        Self::advance(phase, Transition::Cancel);
        tracing::info!(fragments, "Reply cancelled");
        ReplyOutcome::Cancelled { fragments }
    }

    fn advance(from: ReplyPhase, transition: Transition) -> ReplyPhase {
        let to = from.on(transition);
        if to != from {
            tracing::debug!(%from, %to, "Reply phase changed");
        }
        to
    }
}

async fn bounded<F: Future>(limit: Option<Duration>, fut: F) -> Result<F::Output, Duration> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| limit),
        None => Ok(fut.await),
    }
}

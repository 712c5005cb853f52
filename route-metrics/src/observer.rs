//! Pass-through response observation.
//!
//! A [`ResponseObserver`] sits between a handler's response and the server.
//! It shadows the status established by the response head and counts the
//! data bytes streamed through the body, forwarding every frame untouched.
//! Once the response is finished (end of stream, or the body is dropped
//! early) the collected [`ObservedOutcome`] is handed to a [`Completion`]
//! exactly once.

use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::Buf;
use http::StatusCode;
use http_body::{Body, Frame, SizeHint};
use pin_project::{pin_project, pinned_drop};

/// Status assumed when a handler never sets one explicitly.
pub const DEFAULT_STATUS: StatusCode = StatusCode::OK;

/// What a single request's response looked like from the outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObservedOutcome {
    status: StatusCode,
    header_sent: bool,
    bytes_written: u64,
}

impl Default for ObservedOutcome {
    fn default() -> Self {
        Self {
            status: DEFAULT_STATUS,
            header_sent: false,
            bytes_written: 0,
        }
    }
}

impl ObservedOutcome {
    /// Record an explicit status. The last call wins.
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
        self.header_sent = true;
    }

    /// Record `len` bytes written. Writing before any status was set
    /// implicitly establishes [`DEFAULT_STATUS`], like a real response sink
    /// does on its first write.
    pub fn record_write(&mut self, len: usize) {
        if !self.header_sent {
            self.set_status(DEFAULT_STATUS);
        }
        self.bytes_written = self.bytes_written.saturating_add(len as u64);
    }

    /// Status to report; [`DEFAULT_STATUS`] when none was ever established.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn header_sent(&self) -> bool {
        self.header_sent
    }

    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

/// Receives the final outcome of an observed response.
pub trait Completion {
    fn complete(self, outcome: ObservedOutcome);
}

/// Response body wrapper that observes without altering.
///
/// Frames, errors, size hints and end-of-stream signals of the wrapped body
/// are forwarded unchanged.
#[pin_project(PinnedDrop)]
pub struct ResponseObserver<B, C: Completion> {
    #[pin]
    inner: B,
    outcome: ObservedOutcome,
    completion: Option<C>,
}

impl<B, C: Completion> ResponseObserver<B, C> {
    pub fn new(inner: B, completion: C) -> Self {
        Self {
            inner,
            outcome: ObservedOutcome::default(),
            completion: Some(completion),
        }
    }

    /// Shadow the status carried by the response head.
    pub fn set_status(&mut self, status: StatusCode) {
        self.outcome.set_status(status);
    }

    #[must_use]
    pub fn outcome(&self) -> &ObservedOutcome {
        &self.outcome
    }
}

fn finish<C: Completion>(outcome: &ObservedOutcome, completion: &mut Option<C>) {
    if let Some(completion) = completion.take() {
        completion.complete(*outcome);
    }
}

impl<B, C> Body for ResponseObserver<B, C>
where
    B: Body,
    C: Completion,
{
    type Data = B::Data;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();
        let frame = ready!(this.inner.poll_frame(cx));

        match &frame {
            Some(Ok(frame)) => {
                if let Some(data) = frame.data_ref() {
                    this.outcome.record_write(data.remaining());
                }
            }
            // Errors are the caller's business; the outcome is still
            // reported when the body is dropped.
            Some(Err(_)) => {}
            None => finish(this.outcome, this.completion),
        }

        Poll::Ready(frame)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

#[pinned_drop]
impl<B, C: Completion> PinnedDrop for ResponseObserver<B, C> {
    fn drop(self: Pin<&mut Self>) {
        // A body torn down by a panic is an abnormal termination: nothing is
        // reported for it.
        if std::thread::panicking() {
            return;
        }
        let this = self.project();
        finish(this.outcome, this.completion);
    }
}

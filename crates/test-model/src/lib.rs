//! A local fake model for testing purpose.

mod preset;

use std::collections::VecDeque;
use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use sgpt_model::{
    ErrorKind, ModelFinishReason, ModelProvider, ModelProviderError,
    ModelRequest, ModelResponse, ModelResponseEvent,
};
use tokio::time::{Sleep, sleep};

pub use preset::*;

#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Error {
    #[inline]
    fn new<S: Into<String>>(message: S, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", self.message, self.kind)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

pub struct TestModelResponse {
    preset: PresetResponse,
    event_idx: usize,
    delay: Duration,
    sleep: Option<Pin<Box<Sleep>>>,
    open_responses: Arc<AtomicUsize>,
}

impl TestModelResponse {
    fn finish_reason(&self) -> ModelFinishReason {
        let has_function_call = self
            .preset
            .events
            .iter()
            .any(|event| matches!(event, PresetEvent::FunctionCallDelta(_)));
        if has_function_call {
            ModelFinishReason::FunctionCall
        } else {
            ModelFinishReason::Stop
        }
    }
}

impl ModelResponse for TestModelResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        // SAFETY: This type does not require to be pinned.
        let this = unsafe { self.get_unchecked_mut() };

        if let Some(sleep) = &mut this.sleep {
            let sleep = sleep.as_mut();
            ready!(sleep.poll(cx));
            this.sleep = None;

            let events = &this.preset.events;
            let explicitly_finished =
                matches!(events.last(), Some(PresetEvent::Finish(_)));
            if this.event_idx < events.len() {
                let event = match &events[this.event_idx] {
                    PresetEvent::MessageDelta(msg) => {
                        ModelResponseEvent::MessageDelta(msg.clone())
                    }
                    PresetEvent::FunctionCallDelta(delta) => {
                        ModelResponseEvent::FunctionCallDelta(delta.clone())
                    }
                    PresetEvent::Finish(reason) => {
                        ModelResponseEvent::Completed(*reason)
                    }
                    PresetEvent::Error(message) => {
                        // Errors are terminal.
                        this.event_idx = usize::MAX;
                        return Poll::Ready(Err(Error::new(
                            message.clone(),
                            ErrorKind::Other,
                        )));
                    }
                };
                this.event_idx += 1;
                return Poll::Ready(Ok(Some(event)));
            } else if this.event_idx == events.len() && !explicitly_finished {
                this.event_idx += 1;
                return Poll::Ready(Ok(Some(ModelResponseEvent::Completed(
                    this.finish_reason(),
                ))));
            } else {
                // In case this method is called after completion.
                return Poll::Ready(Ok(None));
            }
        }
        this.sleep = Some(Box::pin(sleep(this.delay)));
        Pin::new(this).poll_next_event(cx)
    }
}

impl Drop for TestModelResponse {
    fn drop(&mut self) {
        self.open_responses.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A local fake model for testing purpose.
///
/// Before sending requests, you need to setup the script, which is how the
/// model should respond to each request. Responses are handed out in the
/// order they were added, one per request. If the script runs out, an
/// error will be returned.
///
/// Every request received is recorded, so tests can inspect what the
/// model has been asked. Clones share the same script and records.
///
/// # Note
///
/// This type is not optimized for production use, there are heavy memory
/// copies involved. You should only use it for testing.
#[derive(Clone, Default)]
pub struct TestModelProvider {
    script: Arc<Mutex<VecDeque<PresetResponse>>>,
    requests: Arc<Mutex<Vec<ModelRequest>>>,
    open_responses: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

impl TestModelProvider {
    #[inline]
    pub fn add_response(&mut self, preset: PresetResponse) {
        lock(&self.script).push_back(preset);
    }

    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    /// Returns all requests received so far.
    #[inline]
    pub fn requests(&self) -> Vec<ModelRequest> {
        lock(&self.requests).clone()
    }

    /// Returns the number of responses that are still alive.
    #[inline]
    pub fn open_responses(&self) -> usize {
        self.open_responses.load(Ordering::SeqCst)
    }
}

impl Debug for TestModelProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestModelProvider")
            .field("remaining", &lock(&self.script).len())
            .field("received", &lock(&self.requests).len())
            .finish_non_exhaustive()
    }
}

impl ModelProvider for TestModelProvider {
    type Error = crate::Error;
    type Response = TestModelResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        lock(&self.requests).push(req.clone());

        let result = match lock(&self.script).pop_front() {
            None => Err(Error::new("no enough steps", ErrorKind::Other)),
            Some(PresetResponse {
                rejection: Some(message),
                ..
            }) => Err(Error::new(message, ErrorKind::RateLimitExceeded)),
            Some(preset) => {
                self.open_responses.fetch_add(1, Ordering::SeqCst);
                Ok(TestModelResponse {
                    preset,
                    event_idx: 0,
                    delay: self.delay.unwrap_or(Duration::from_millis(1)),
                    sleep: None,
                    open_responses: Arc::clone(&self.open_responses),
                })
            }
        };
        ready(result)
    }
}

#[inline]
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    // The data stays consistent even if a test panicked while holding it.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

//! The streaming completion interface shared by the engine and the cache.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures_util::Stream;
use sgpt_model::ModelRequest;

use crate::Error;

/// A lazy sequence of text fragments.
///
/// The consumer drives progress: nothing happens between two polls, and
/// dropping the stream releases the underlying channel.
pub type Fragments = Pin<Box<dyn Stream<Item = Result<String, Error>> + Send>>;

/// Counts the functions run while producing a stream.
///
/// Clones share one count, so whoever hands a counter to a completer can
/// read it back once the stream is over.
#[derive(Clone, Debug, Default)]
pub struct FunctionCalls(Arc<AtomicUsize>);

impl FunctionCalls {
    /// Creates a counter at zero.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one function call.
    #[inline]
    pub fn record(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    /// Returns the number of recorded calls.
    #[inline]
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-call options of [`Completer::stream`].
#[derive(Clone, Debug)]
pub struct StreamOptions {
    /// Whether the exchange may be answered from, and recorded into, the
    /// response cache.
    pub caching: bool,
    /// Where a completer that runs functions records them.
    pub function_calls: Option<FunctionCalls>,
}

impl StreamOptions {
    /// Options that bypass the cache entirely.
    pub const UNCACHED: Self = Self {
        caching: false,
        function_calls: None,
    };
}

impl Default for StreamOptions {
    #[inline]
    fn default() -> Self {
        Self {
            caching: true,
            function_calls: None,
        }
    }
}

/// Something that turns a request into a stream of fragments.
pub trait Completer: Send + Sync {
    /// Starts streaming the completion of `req`.
    ///
    /// The request is taken by value: the returned stream owns its copy of
    /// the conversation and may extend it, the caller's copy stays intact.
    ///
    /// A completer that runs a function on the model's behalf records it in
    /// `options.function_calls` before yielding anything that depends on
    /// its result.
    fn stream(&self, req: ModelRequest, options: StreamOptions) -> Fragments;
}

impl<C: Completer + ?Sized> Completer for Arc<C> {
    #[inline]
    fn stream(&self, req: ModelRequest, options: StreamOptions) -> Fragments {
        (**self).stream(req, options)
    }
}

impl<C: Completer + ?Sized> Completer for Box<C> {
    #[inline]
    fn stream(&self, req: ModelRequest, options: StreamOptions) -> Fragments {
        (**self).stream(req, options)
    }
}

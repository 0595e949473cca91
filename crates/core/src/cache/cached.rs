use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use futures_util::{Stream, stream};
use pin_project_lite::pin_project;
use sgpt_model::ModelRequest;

use super::{CacheKey, CacheStore, FileCacheStore};
use crate::completion::{Completer, Fragments, FunctionCalls, StreamOptions};
use crate::Error;

/// A [`Completer`] that answers repeated requests from a [`CacheStore`].
///
/// With caching enabled, a request whose key is stored is replayed from
/// the store without touching the wrapped completer. Otherwise the live
/// stream is recorded, and stored only once it has been fully consumed
/// without errors and without running any function. With caching disabled,
/// the store is neither read nor written.
///
/// Store failures never fail the request: they are logged, and the
/// request is served as a cache miss.
pub struct CachedCompleter<C, S = FileCacheStore> {
    inner: C,
    store: Arc<S>,
}

impl<C, S> CachedCompleter<C, S> {
    /// Wraps `inner`, storing completed responses in `store`.
    #[inline]
    pub fn new(inner: C, store: Arc<S>) -> Self {
        Self { inner, store }
    }

    /// Returns the wrapped completer.
    #[inline]
    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Returns the store.
    #[inline]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}

impl<C, S> Completer for CachedCompleter<C, S>
where
    C: Completer,
    S: CacheStore + 'static,
{
    fn stream(&self, req: ModelRequest, options: StreamOptions) -> Fragments {
        if !options.caching {
            return self.inner.stream(req, options);
        }

        // The key must be taken before the completer gets the request,
        // since it extends its conversation on function calls.
        let key = match CacheKey::of(&req) {
            Ok(key) => key,
            Err(err) => {
                warn!("failed to compute cache key, bypassing cache: {err}");
                let options = StreamOptions {
                    caching: false,
                    ..options
                };
                return self.inner.stream(req, options);
            }
        };

        match self.store.get(&key) {
            Ok(Some(fragments)) => {
                debug!("cache hit: {key}");
                return Box::pin(stream::iter(fragments.into_iter().map(Ok)));
            }
            Ok(None) => trace!("cache miss: {key}"),
            Err(err) => warn!("failed to read cache entry {key}: {err}"),
        }

        let function_calls = options.function_calls.clone().unwrap_or_default();
        let options = StreamOptions {
            function_calls: Some(function_calls.clone()),
            ..options
        };
        Box::pin(Recording {
            inner: self.inner.stream(req, options),
            key,
            store: Arc::clone(&self.store),
            function_calls,
            recorded: Some(vec![]),
        })
    }
}

pin_project! {
    /// Forwards a stream while keeping a copy of its fragments, and stores
    /// them when the stream ends cleanly without having called a function.
    struct Recording<St, S> {
        #[pin]
        inner: St,
        key: CacheKey,
        store: Arc<S>,
        function_calls: FunctionCalls,
        // `None` once the stream failed.
        recorded: Option<Vec<String>>,
    }
}

impl<St, S> Stream for Recording<St, S>
where
    St: Stream<Item = Result<String, Error>>,
    S: CacheStore,
{
    type Item = Result<String, Error>;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        let this = self.project();
        match ready!(this.inner.poll_next(cx)) {
            Some(Ok(fragment)) => {
                if let Some(recorded) = this.recorded {
                    recorded.push(fragment.clone());
                }
                Poll::Ready(Some(Ok(fragment)))
            }
            Some(Err(err)) => {
                *this.recorded = None;
                Poll::Ready(Some(Err(err)))
            }
            None => {
                let calls = this.function_calls.count();
                if calls > 0 {
                    debug!("not caching {}: {calls} function call(s)", this.key);
                } else if let Some(recorded) = this.recorded.take() {
                    match this.store.put(this.key, &recorded) {
                        Ok(()) => debug!("cached response: {}", this.key),
                        Err(err) => {
                            warn!("failed to write cache entry {}: {err}", this.key)
                        }
                    }
                }
                Poll::Ready(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use futures_util::StreamExt;
    use sgpt_test_model::{PresetEvent, PresetResponse, TestModelProvider};

    use super::*;
    use crate::engine::CompletionEngine;
    use crate::testing::{GetTime, drain, registry_with, request};

    struct Fixture {
        provider: TestModelProvider,
        get_time: GetTime,
        store: Arc<FileCacheStore>,
        completer: CachedCompleter<CompletionEngine<TestModelProvider>>,
        _dir: tempfile::TempDir,
    }

    fn fixture(responses: impl IntoIterator<Item = PresetResponse>) -> Fixture {
        let mut provider = TestModelProvider::default();
        for response in responses {
            provider.add_response(response);
        }
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileCacheStore::new(dir.path(), 10));
        let get_time = GetTime::new();
        let engine = CompletionEngine::new(provider.clone())
            .with_functions(registry_with(&get_time));
        Fixture {
            provider,
            get_time,
            store: Arc::clone(&store),
            completer: CachedCompleter::new(engine, store),
            _dir: dir,
        }
    }

    fn hello() -> PresetResponse {
        PresetResponse::with_events([
            PresetEvent::delta("Hel"),
            PresetEvent::delta("lo"),
        ])
    }

    #[tokio::test]
    async fn test_replay() {
        let f = fixture([hello()]);

        let (fragments, err) =
            drain(f.completer.stream(request("Hi"), StreamOptions::default()))
                .await;
        assert!(err.is_none());
        assert_eq!(fragments, ["Hel", "lo"]);
        assert_eq!(f.store.len().unwrap(), 1);

        // A freshly built, equal request is served from the store.
        let (fragments, err) =
            drain(f.completer.stream(request("Hi"), StreamOptions::default()))
                .await;
        assert!(err.is_none());
        assert_eq!(fragments, ["Hel", "lo"]);
        assert_eq!(f.provider.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_bypass() {
        let f = fixture([hello(), hello()]);
        let key = CacheKey::of(&request("Hi")).unwrap();
        f.store.put(&key, &["stale".to_owned()]).unwrap();

        let (fragments, err) =
            drain(f.completer.stream(request("Hi"), StreamOptions::UNCACHED))
                .await;
        assert!(err.is_none());
        assert_eq!(fragments, ["Hel", "lo"]);
        assert_eq!(f.store.get(&key).unwrap(), Some(vec!["stale".to_owned()]));

        let (_, err) =
            drain(f.completer.stream(request("Bye"), StreamOptions::UNCACHED))
                .await;
        assert!(err.is_none());
        assert_eq!(f.store.len().unwrap(), 1);
        assert_eq!(f.provider.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_stream_is_not_cached() {
        let f = fixture([
            PresetResponse::with_events([
                PresetEvent::delta("Hel"),
                PresetEvent::Error("connection reset".to_owned()),
            ]),
            PresetResponse::rejected("slow down"),
        ]);

        let (fragments, err) =
            drain(f.completer.stream(request("Hi"), StreamOptions::default()))
                .await;
        assert_eq!(fragments, ["Hel"]);
        assert!(err.is_some());
        assert_eq!(f.store.len().unwrap(), 0);

        let (_, err) =
            drain(f.completer.stream(request("Hi"), StreamOptions::default()))
                .await;
        assert!(err.is_some());
        assert_eq!(f.store.len().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_dropped_stream_is_not_cached() {
        let f = fixture([hello()]);

        let mut fragments =
            f.completer.stream(request("Hi"), StreamOptions::default());
        assert!(fragments.next().await.is_some());
        drop(fragments);

        assert_eq!(f.store.len().unwrap(), 0);
        assert_eq!(f.provider.open_responses(), 0);
    }

    #[tokio::test]
    async fn test_function_call_exchange_is_not_cached() {
        let call = || {
            PresetResponse::with_events([PresetEvent::function_call(
                Some("get_time"),
                Some("{\"tz\":\"UTC\"}"),
            )])
        };
        let answer = || PresetResponse::with_events([PresetEvent::delta("12:00")]);
        let f = fixture([call(), answer(), call(), answer()]);
        let mut req = request("What time is it?");
        req.functions = Some(registry_with(&f.get_time).definitions());

        for round in 1..=2 {
            let (live, err) =
                drain(f.completer.stream(req.clone(), StreamOptions::default()))
                    .await;
            assert!(err.is_none());
            assert_eq!(
                live,
                ["\n", "> @FunctionCall `get_time(tz=\"UTC\")` \n\n", "12:00"]
            );
            assert_eq!(f.store.len().unwrap(), 0);
            assert_eq!(f.get_time.calls(), round);
        }
        assert_eq!(f.provider.requests().len(), 4);
        assert_eq!(f.store.get(&CacheKey::of(&req).unwrap()).unwrap(), None);
    }

    #[tokio::test]
    async fn test_caller_counter_is_shared() {
        let f = fixture([
            PresetResponse::with_events([PresetEvent::function_call(
                Some("get_time"),
                None,
            )]),
            hello(),
        ]);
        let mut req = request("What time is it?");
        req.functions = Some(registry_with(&f.get_time).definitions());
        let function_calls = FunctionCalls::new();
        let options = StreamOptions {
            function_calls: Some(function_calls.clone()),
            ..StreamOptions::default()
        };

        let (_, err) = drain(f.completer.stream(req, options)).await;
        assert!(err.is_none());
        assert_eq!(function_calls.count(), 1);
        assert_eq!(f.store.len().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss() {
        let f = fixture([hello()]);
        let key = CacheKey::of(&request("Hi")).unwrap();
        fs::write(f.store.dir().join(format!("{key}.json")), b"garbage").unwrap();

        let (fragments, err) =
            drain(f.completer.stream(request("Hi"), StreamOptions::default()))
                .await;
        assert!(err.is_none());
        assert_eq!(fragments, ["Hel", "lo"]);
        assert_eq!(f.store.get(&key).unwrap(), Some(fragments));
    }
}

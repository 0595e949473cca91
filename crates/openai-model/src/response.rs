use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use pin_project_lite::pin_project;
use sgpt_model::{ErrorKind, ModelResponse, ModelResponseEvent};

use crate::Error;
use crate::io::{ChunksError, Sse, SseError};
use crate::proto::{self, ChatCompletionChunk};

struct PartialState {
    sse: Sse,
    id: Option<String>,
    // A single chunk may carry content, a function call fragment and a
    // finish reason at once. They are queued here and handed out one by
    // one before the next chunk is read.
    pending_events: VecDeque<ModelResponseEvent>,
}

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type NextEvent = Result<(Option<ModelResponseEvent>, PartialState), Error>;

pin_project! {
    /// A streaming chat completion.
    pub struct OpenAIResponse {
        next_event_fut: Option<PinnedFuture<NextEvent>>,
    }
}

impl OpenAIResponse {
    #[inline]
    pub(crate) fn from_sse(sse: Sse) -> Self {
        let partial_state = PartialState {
            sse,
            id: None,
            pending_events: Default::default(),
        };
        let next_event_fut = async move { next_event(partial_state).await };
        Self {
            next_event_fut: Some(Box::pin(next_event_fut)),
        }
    }
}

impl ModelResponse for OpenAIResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.project();
        let Some(next_event_fut) = this.next_event_fut else {
            return Poll::Ready(Ok(None));
        };
        let (event, partial_state) =
            match ready!(next_event_fut.as_mut().poll(cx)) {
                Ok((Some(event), partial_state)) => (event, partial_state),
                Ok((None, _)) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Ok(None));
                }
                Err(err) => {
                    *this.next_event_fut = None;
                    return Poll::Ready(Err(err));
                }
            };

        // The stream may still have more data to pull, create a new future for
        // the next event.
        let next_event_fut = async move { next_event(partial_state).await };
        *this.next_event_fut = Some(Box::pin(next_event_fut));

        Poll::Ready(Ok(Some(event)))
    }
}

async fn next_event(
    mut partial_state: PartialState,
) -> Result<(Option<ModelResponseEvent>, PartialState), Error> {
    loop {
        if let Some(event) = partial_state.pending_events.pop_front() {
            return Ok((Some(event), partial_state));
        }

        let sse_event = match partial_state.sse.next_event().await {
            Ok(Some(event)) => event,
            Ok(None) => return Ok((None, partial_state)),
            Err(SseError::ChunksError(ChunksError::Timeout)) => {
                return Err(Error::new("stream timed out", ErrorKind::Timeout));
            }
            Err(err) => {
                return Err(Error::new(format!("{err:?}"), ErrorKind::Other));
            }
        };
        trace!("got sse event: {sse_event}");
        if sse_event == "[DONE]" {
            return Ok((None, partial_state));
        }

        let mut chunk = serde_json::from_str::<ChatCompletionChunk>(&sse_event)
            .map_err(|err| Error::new(format!("{err}"), ErrorKind::Other))?;
        if let Some(id) = chunk.id.take() {
            if partial_state.id.get_or_insert_with(|| id.clone()) != &id {
                return Err(Error::new("chunk id mismatch", ErrorKind::Other));
            }
        }

        // Usage-only chunks carry no choices.
        let Some(choice) = chunk.choices.pop() else {
            continue;
        };

        // The order of events is important. Always emit the message delta
        // first, then the function call fragment, and finally the finish
        // reason if any.
        let pending = &mut partial_state.pending_events;
        if let Some(content) = choice.delta.content {
            pending.push_back(ModelResponseEvent::MessageDelta(content));
        }
        if let Some(function_call) = choice.delta.function_call {
            pending.push_back(ModelResponseEvent::FunctionCallDelta(
                function_call,
            ));
        }
        if let Some(finish_reason) = choice.finish_reason {
            pending.push_back(ModelResponseEvent::Completed(
                proto::finish_reason(&finish_reason),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use bytes::Bytes;
    use sgpt_model::{ModelFinishReason, ModelProviderError};

    use super::*;
    use crate::io::Chunks;

    async fn collect_events(
        chunks: Chunks,
    ) -> Result<Vec<ModelResponseEvent>, Error> {
        let mut resp = pin!(OpenAIResponse::from_sse(Sse::new(chunks)));
        let mut events = vec![];
        while let Some(event) =
            poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await?
        {
            events.push(event);
        }
        Ok(events)
    }

    #[tokio::test]
    async fn test_function_call_events() {
        let chunks = Chunks::from_vec_deque(
            vec![Bytes::from_static(include_bytes!(
                "../fixtures/function_call_response.txt"
            ))]
            .into(),
        );
        let events = collect_events(chunks).await.unwrap();

        let mut name = String::new();
        let mut arguments = String::new();
        for event in &events {
            if let ModelResponseEvent::FunctionCallDelta(delta) = event {
                if let Some(n) = &delta.name {
                    name.push_str(n);
                }
                if let Some(a) = &delta.arguments {
                    arguments.push_str(a);
                }
            }
        }
        assert_eq!(name, "get_time");
        assert_eq!(arguments, r#"{"tz":"UTC"}"#);
        assert_eq!(
            events.last(),
            Some(&ModelResponseEvent::Completed(
                ModelFinishReason::FunctionCall
            ))
        );
    }

    #[tokio::test]
    async fn test_content_with_finish_reason() {
        let chunks = Chunks::from_vec_deque(
            vec![
                Bytes::from_static(
                    br#"data: {"id":"a","choices":[{"delta":{"role":"assistant","content":""},"finish_reason":null}]}

"#,
                ),
                Bytes::from_static(
                    br#"data: {"id":"a","choices":[{"delta":{"content":"Hel"},"finish_reason":null}]}

data: {"id":"a","choices":[{"delta":{"content":"lo"},"finish_reason":"stop"}]}

data: {"id":"a","choices":[],"usage":{"total_tokens":3}}

data: [DONE]

"#,
                ),
            ]
            .into(),
        );
        let events = collect_events(chunks).await.unwrap();
        assert_eq!(
            events,
            vec![
                ModelResponseEvent::MessageDelta(String::new()),
                ModelResponseEvent::MessageDelta("Hel".to_owned()),
                ModelResponseEvent::MessageDelta("lo".to_owned()),
                ModelResponseEvent::Completed(ModelFinishReason::Stop),
            ]
        );
    }

    #[tokio::test]
    async fn test_id_mismatch() {
        let chunks = Chunks::from_vec_deque(
            vec![Bytes::from_static(
                br#"data: {"id":"a","choices":[{"delta":{"content":"x"},"finish_reason":null}]}

data: {"id":"b","choices":[{"delta":{"content":"y"},"finish_reason":null}]}

"#,
            )]
            .into(),
        );
        let err = collect_events(chunks).await.unwrap_err();
        assert_eq!(err.message(), "chunk id mismatch");
    }

    #[tokio::test]
    async fn test_timeout_mid_stream() {
        let chunks = Chunks::from_results(
            vec![
                Ok(Bytes::from_static(
                    br#"data: {"id":"a","choices":[{"delta":{"content":"x"},"finish_reason":null}]}

"#,
                )),
                Err(ChunksError::Timeout),
            ]
            .into(),
        );
        let mut resp = pin!(OpenAIResponse::from_sse(Sse::new(chunks)));
        let first = poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await;
        assert_eq!(
            first.unwrap(),
            Some(ModelResponseEvent::MessageDelta("x".to_owned()))
        );
        let err = poll_fn(|cx| resp.as_mut().poll_next_event(cx))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        // Exhausted after the error.
        let after = poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await;
        assert_eq!(after.unwrap(), None);
    }
}

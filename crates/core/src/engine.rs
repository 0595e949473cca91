//! The completion stream engine.


use std::collections::VecDeque;
use std::fmt::{self, Debug};
use std::future::poll_fn;
use std::mem;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::StreamExt;
use futures_util::stream::try_unfold;
use serde_json::{Map, Value};
use sgpt_model::{
    FunctionCallDelta, MessageRole, ModelFinishReason, ModelMessage,
    ModelProvider, ModelRequest, ModelResponse, ModelResponseEvent,
};

use crate::completion::{Completer, Fragments, FunctionCalls, StreamOptions};
use crate::function::{self, FunctionRegistry};
use crate::role::Role;
use crate::Error;

const DEFAULT_MAX_FUNCTION_TURNS: usize = 8;

/// Streams completions from a model provider, calling functions on the
/// model's behalf.
///
/// When a response finishes with a function call, the engine records the
/// call in its own copy of the conversation, runs the function, appends the
/// result and streams a continuation request in place of the original
/// response. Every call is recorded in the stream's [`FunctionCalls`], which
/// is how a [`CachedCompleter`] in front of the engine knows to leave such
/// exchanges out of the cache.
///
/// [`CachedCompleter`]: crate::CachedCompleter
pub struct CompletionEngine<P> {
    provider: Arc<P>,
    functions: Arc<FunctionRegistry>,
    role: Role,
    show_functions_output: bool,
    max_function_turns: usize,
}

impl<P: ModelProvider + 'static> CompletionEngine<P> {
    /// Creates an engine with no functions, under the default role.
    pub fn new(provider: P) -> Self {
        Self {
            provider: Arc::new(provider),
            functions: Arc::new(FunctionRegistry::new()),
            role: Role::default(),
            show_functions_output: false,
            max_function_turns: DEFAULT_MAX_FUNCTION_TURNS,
        }
    }

    /// Sets the functions the model may call.
    #[inline]
    pub fn with_functions(mut self, functions: Arc<FunctionRegistry>) -> Self {
        self.functions = functions;
        self
    }

    /// Sets the role of the exchange.
    #[inline]
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    /// Echoes the raw output of every called function into the stream.
    #[inline]
    pub fn with_show_functions_output(mut self, show: bool) -> Self {
        self.show_functions_output = show;
        self
    }

    /// Sets how many function calls may be chained in one exchange.
    #[inline]
    pub fn with_max_function_turns(mut self, turns: usize) -> Self {
        self.max_function_turns = turns;
        self
    }

    /// Returns the role of the exchange.
    #[inline]
    pub fn role(&self) -> &Role {
        &self.role
    }

    fn stream_turn(
        &self,
        mut req: ModelRequest,
        depth: usize,
        function_calls: Option<FunctionCalls>,
    ) -> Fragments {
        if !self.role.tools_allowed() && req.functions.take().is_some() {
            debug!("role `{}` forbids functions, dropping them", self.role.name());
        }
        let turn = Turn {
            engine: self.clone(),
            req,
            depth,
            function_calls,
            pending: VecDeque::new(),
            phase: Phase::Request,
        };
        Box::pin(try_unfold(turn, next_fragment))
    }
}

impl<P> Clone for CompletionEngine<P> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            functions: Arc::clone(&self.functions),
            role: self.role.clone(),
            show_functions_output: self.show_functions_output,
            max_function_turns: self.max_function_turns,
        }
    }
}

impl<P> Debug for CompletionEngine<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionEngine")
            .field("functions", &self.functions)
            .field("role", &self.role.name())
            .field("show_functions_output", &self.show_functions_output)
            .field("max_function_turns", &self.max_function_turns)
            .finish_non_exhaustive()
    }
}

impl<P: ModelProvider + 'static> Completer for CompletionEngine<P> {
    /// Streams `req`. The engine itself never caches, only the function
    /// call counter of `options` is used.
    #[inline]
    fn stream(&self, req: ModelRequest, options: StreamOptions) -> Fragments {
        self.stream_turn(req, 0, options.function_calls)
    }
}

/// The state of one turn, i.e. one request and whatever it leads to.
struct Turn<P: ModelProvider> {
    engine: CompletionEngine<P>,
    req: ModelRequest,
    depth: usize,
    function_calls: Option<FunctionCalls>,
    /// Fragments produced by the engine itself, yielded before anything
    /// else.
    pending: VecDeque<String>,
    phase: Phase<P::Response>,
}

enum Phase<R> {
    Request,
    Receive {
        resp: Pin<Box<R>>,
        call: PendingCall,
    },
    Announce {
        name: String,
        arguments: String,
    },
    Invoke {
        name: String,
        arguments: Map<String, Value>,
    },
    Continue(Fragments),
    Done,
}

/// A function call being assembled from deltas.
#[derive(Default)]
struct PendingCall {
    name: Option<String>,
    arguments: String,
    suppressed: bool,
}

impl PendingCall {
    fn push(&mut self, delta: FunctionCallDelta) {
        if self.name.is_none() {
            self.name = delta.name.filter(|name| !name.is_empty());
        }
        if let Some(arguments) = delta.arguments {
            self.arguments.push_str(&arguments);
        }
    }
}

async fn next_fragment<P: ModelProvider + 'static>(
    mut turn: Turn<P>,
) -> Result<Option<(String, Turn<P>)>, Error> {
    loop {
        if let Some(fragment) = turn.pending.pop_front() {
            return Ok(Some((fragment, turn)));
        }

        match mem::replace(&mut turn.phase, Phase::Done) {
            Phase::Request => {
                trace!("sending request at depth {}", turn.depth);
                let resp = turn
                    .engine
                    .provider
                    .send_request(&turn.req)
                    .await
                    .map_err(|err| {
                        error!("failed to send request: {err}");
                        Error::provider(err)
                    })?;
                turn.phase = Phase::Receive {
                    resp: Box::pin(resp),
                    call: PendingCall::default(),
                };
            }
            Phase::Receive { mut resp, mut call } => {
                let event = poll_fn(|cx| resp.as_mut().poll_next_event(cx))
                    .await
                    .map_err(|err| {
                        error!("response broke: {err}");
                        Error::provider(err)
                    })?;
                let Some(event) = event else {
                    trace!("response ended at depth {}", turn.depth);
                    return Ok(None);
                };

                let tools_allowed = turn.engine.role.tools_allowed();
                match event {
                    ModelResponseEvent::MessageDelta(content) => {
                        turn.phase = Phase::Receive { resp, call };
                        return Ok(Some((content, turn)));
                    }
                    ModelResponseEvent::FunctionCallDelta(delta) => {
                        if tools_allowed {
                            call.push(delta);
                        } else if !call.suppressed {
                            warn!(
                                "ignoring function call under role `{}`",
                                turn.engine.role.name()
                            );
                            call.suppressed = true;
                        }
                        turn.phase = Phase::Receive { resp, call };
                    }
                    ModelResponseEvent::Completed(
                        ModelFinishReason::FunctionCall,
                    ) if tools_allowed => {
                        // The original response is superseded by the
                        // continuation, release it first.
                        drop(resp);
                        turn.begin_call(call)?;
                    }
                    ModelResponseEvent::Completed(reason) => {
                        trace!("response completed: {reason:?}");
                        turn.phase = Phase::Receive { resp, call };
                    }
                }
            }
            Phase::Announce { name, arguments } => {
                let arguments = parse_arguments(&arguments)?;
                turn.pending.push_back(format_trace(&name, &arguments));
                turn.phase = Phase::Invoke { name, arguments };
            }
            Phase::Invoke { name, arguments } => {
                if let Some(function_calls) = &turn.function_calls {
                    function_calls.record();
                }
                let result =
                    turn.engine.functions.call(&name, arguments).await?;
                debug!("function `{name}` returned {} bytes", result.len());
                if turn.engine.show_functions_output {
                    turn.pending.push_back(format!("```text\n{result}\n```\n"));
                }
                turn.req
                    .messages
                    .push(ModelMessage::function_result(name, result));
                let continuation = turn.engine.stream_turn(
                    turn.req.clone(),
                    turn.depth + 1,
                    turn.function_calls.clone(),
                );
                turn.phase = Phase::Continue(continuation);
            }
            Phase::Continue(mut continuation) => {
                return match continuation.next().await {
                    Some(fragment) => {
                        let fragment = fragment?;
                        turn.phase = Phase::Continue(continuation);
                        Ok(Some((fragment, turn)))
                    }
                    None => Ok(None),
                };
            }
            Phase::Done => return Ok(None),
        }
    }
}

impl<P: ModelProvider> Turn<P> {
    fn begin_call(&mut self, call: PendingCall) -> Result<(), Error> {
        let limit = self.engine.max_function_turns;
        if self.depth >= limit {
            error!("function call limit ({limit}) exceeded");
            return Err(Error::TooManyFunctionCalls(limit));
        }
        let Some(name) = call.name else {
            return Err(function::Error::not_found()
                .with_reason("the model asked for a function without a name")
                .into());
        };
        debug!("model requested function `{name}`");

        self.req
            .messages
            .push(ModelMessage::function_call(&name, &call.arguments));
        if self
            .req
            .messages
            .last()
            .is_some_and(|msg| msg.role == MessageRole::Assistant)
        {
            self.pending.push_back("\n".to_owned());
        }
        self.phase = Phase::Announce {
            name,
            arguments: call.arguments,
        };
        Ok(())
    }
}

fn parse_arguments(raw: &str) -> Result<Map<String, Value>, function::Error> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str(raw) {
        Ok(Value::Object(arguments)) => Ok(arguments),
        Ok(other) => Err(function::Error::invalid_arguments()
            .with_reason(format!("expected an object, got `{other}`"))),
        Err(err) => {
            Err(function::Error::invalid_arguments().with_reason(err.to_string()))
        }
    }
}

fn format_trace(name: &str, arguments: &Map<String, Value>) -> String {
    let arguments = arguments
        .iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                v => v.to_string(),
            };
            format!("{key}=\"{value}\"")
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("> @FunctionCall `{name}({arguments})` \n\n")
}

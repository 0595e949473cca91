use serde::{Deserialize, Serialize};
use sgpt_model::{FunctionCallDelta, ModelFinishReason};

/// The events in a preset response.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PresetEvent {
    #[serde(rename = "message_delta")]
    MessageDelta(String),
    #[serde(rename = "function_call_delta")]
    FunctionCallDelta(FunctionCallDelta),
    /// Ends the response with an explicit finish reason. Without it, the
    /// response finishes with `FunctionCall` if it contains any function
    /// call fragment, or `Stop` otherwise.
    #[serde(rename = "finish")]
    Finish(ModelFinishReason),
    /// Breaks the stream with a transport error.
    #[serde(rename = "error")]
    Error(String),
}

impl PresetEvent {
    /// Shorthand for a message delta.
    #[inline]
    pub fn delta<S: Into<String>>(content: S) -> Self {
        Self::MessageDelta(content.into())
    }

    /// Shorthand for a function call fragment.
    #[inline]
    pub fn function_call(name: Option<&str>, arguments: Option<&str>) -> Self {
        Self::FunctionCallDelta(FunctionCallDelta {
            name: name.map(ToOwned::to_owned),
            arguments: arguments.map(ToOwned::to_owned),
        })
    }
}

/// The preset response for an assistant step.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PresetResponse {
    /// Events in this response.
    pub events: Vec<PresetEvent>,
    /// If set, the request itself fails with this message and no
    /// response is streamed.
    pub rejection: Option<String>,
}

impl PresetResponse {
    /// Creates a `PresetResponse` with the specified events.
    #[inline]
    pub fn with_events(events: impl Into<Vec<PresetEvent>>) -> Self {
        Self {
            events: events.into(),
            rejection: None,
        }
    }

    /// Creates a `PresetResponse` whose request is rejected.
    #[inline]
    pub fn rejected<S: Into<String>>(message: S) -> Self {
        Self {
            events: vec![],
            rejection: Some(message.into()),
        }
    }
}

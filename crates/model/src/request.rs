use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A request to be sent to the model provider.
///
/// Every field takes part in the request fingerprint, so two requests
/// with equal field values always describe the same completion.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelRequest {
    /// Identifier of the model to sample from.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Nucleus sampling mass.
    pub top_p: f32,
    /// The input messages.
    pub messages: Vec<ModelMessage>,
    /// Functions that are available to the model, `None` when the model
    /// must not call any.
    pub functions: Option<Vec<ModelFunction>>,
}

/// The author of a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// The system instructions.
    System,
    /// The user input.
    User,
    /// The model output.
    Assistant,
    /// A function call result.
    Function,
}

/// A complete message in the conversation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelMessage {
    /// Who wrote the message.
    pub role: MessageRole,
    /// Text of the message, empty for function call records.
    pub content: String,
    /// Name of the function that produced this message. Only set for
    /// [`MessageRole::Function`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// The function the assistant asked to call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
}

impl ModelMessage {
    /// Creates a system message.
    #[inline]
    pub fn system<S: Into<String>>(content: S) -> Self {
        Self::text(MessageRole::System, content)
    }

    /// Creates a user message.
    #[inline]
    pub fn user<S: Into<String>>(content: S) -> Self {
        Self::text(MessageRole::User, content)
    }

    /// Creates an assistant message.
    #[inline]
    pub fn assistant<S: Into<String>>(content: S) -> Self {
        Self::text(MessageRole::Assistant, content)
    }

    /// Creates an assistant message that records a function call request.
    pub fn function_call<S1, S2>(name: S1, arguments: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        Self {
            role: MessageRole::Assistant,
            content: String::new(),
            name: None,
            function_call: Some(FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            }),
        }
    }

    /// Creates a message carrying the result of a function call.
    pub fn function_result<S1, S2>(name: S1, content: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        Self {
            role: MessageRole::Function,
            content: content.into(),
            name: Some(name.into()),
            function_call: None,
        }
    }

    #[inline]
    fn text<S: Into<String>>(role: MessageRole, content: S) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
            function_call: None,
        }
    }
}

/// A function call request recorded in the conversation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Name of the function.
    pub name: String,
    /// Raw argument payload, a serialized JSON object.
    pub arguments: String,
}

/// Describes a function that can be called by the model.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelFunction {
    /// Name of the function.
    pub name: String,
    /// Description of the function.
    pub description: String,
    /// Parameters definition of the function.
    ///
    /// For most model providers, the parameters should typically be
    /// defined by a [JSON schema](https://json-schema.org/).
    pub parameters: Value,
}

use serde::{Deserialize, Serialize};
use sgpt_model::{
    FunctionCallDelta, ModelFinishReason, ModelFunction, ModelMessage,
    ModelRequest,
};

// ------------------------------
// Types received from the server
// ------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub delta: Delta,
    pub finish_reason: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
pub struct Delta {
    pub content: Option<String>,
    pub function_call: Option<FunctionCallDelta>,
}

// ------------------------
// Types sent to the server
// ------------------------

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChatCompletionRequest {
    model: String,
    temperature: f32,
    top_p: f32,
    messages: Vec<ModelMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    functions: Option<Vec<ModelFunction>>,
    stream: bool,
}

// -----------
// Conversions
// -----------

#[inline]
pub fn create_request(req: &ModelRequest) -> ChatCompletionRequest {
    ChatCompletionRequest {
        model: req.model.clone(),
        temperature: req.temperature,
        top_p: req.top_p,
        messages: req.messages.clone(),
        // An empty list is rejected by the API, it means the same as none.
        functions: req.functions.clone().filter(|f| !f.is_empty()),
        stream: true,
    }
}

#[inline]
pub fn finish_reason(reason: &str) -> ModelFinishReason {
    match reason {
        "function_call" => ModelFinishReason::FunctionCall,
        "stop" => ModelFinishReason::Stop,
        "length" => ModelFinishReason::Length,
        _ => ModelFinishReason::Other,
    }
}

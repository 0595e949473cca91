use std::future::ready;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::json;
use sgpt_model::{ModelMessage, ModelRequest};

use crate::completion::Fragments;
use crate::function::{
    Function, FunctionRegistry, FunctionResult, ModelFunction,
};
use crate::Error;

#[derive(Deserialize)]
pub struct GetTimeArguments {
    #[serde(default)]
    #[allow(dead_code)]
    pub tz: Option<String>,
}

/// Always answers "12:00", counting its calls.
#[derive(Clone)]
pub struct GetTime {
    calls: Arc<AtomicUsize>,
}

impl GetTime {
    pub fn new() -> Self {
        Self {
            calls: Arc::default(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Function for GetTime {
    type Arguments = GetTimeArguments;

    fn definition(&self) -> ModelFunction {
        ModelFunction {
            name: "get_time".to_owned(),
            description: "Returns the current time".to_owned(),
            parameters: json!({
                "type": "object",
                "properties": { "tz": { "type": "string" } }
            }),
        }
    }

    fn call(
        &self,
        _arguments: Self::Arguments,
    ) -> impl Future<Output = FunctionResult> + Send + 'static {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ready(Ok("12:00".to_owned()))
    }
}

pub fn registry_with(get_time: &GetTime) -> Arc<FunctionRegistry> {
    Arc::new(FunctionRegistry::new().with_function(get_time.clone()))
}

pub fn request(prompt: &str) -> ModelRequest {
    ModelRequest {
        model: "gpt-4o".to_owned(),
        temperature: 0.0,
        top_p: 1.0,
        messages: vec![
            ModelMessage::system("You are a test."),
            ModelMessage::user(prompt),
        ],
        functions: None,
    }
}

/// Collects fragments until the stream ends or fails.
pub async fn drain(mut fragments: Fragments) -> (Vec<String>, Option<Error>) {
    let mut collected = vec![];
    while let Some(fragment) = fragments.next().await {
        match fragment {
            Ok(fragment) => collected.push(fragment),
            Err(err) => return (collected, Some(err)),
        }
    }
    (collected, None)
}

//! One prompt, one answer.

use std::sync::Arc;

use sgpt_model::{ModelProvider, ModelRequest};

use crate::cache::{CachedCompleter, FileCacheStore};
use crate::completion::{Completer, StreamOptions};
use crate::config::Config;
use crate::conversation::{ConversationBuilder, DefaultConversation};
use crate::engine::CompletionEngine;
use crate::function::FunctionRegistry;
use crate::printer::Printer;
use crate::role::Role;
use crate::Error;

/// Options of a single exchange.
#[derive(Clone, Debug, PartialEq)]
pub struct HandleOptions {
    /// Identifier of the model.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Nucleus sampling mass.
    pub top_p: f32,
    /// Whether the answer may come from, and go to, the cache.
    pub caching: bool,
    /// Whether the model is offered the registered functions.
    pub functions: bool,
}

impl HandleOptions {
    /// Creates options for `model` with deterministic sampling, caching
    /// and functions enabled.
    pub fn new<S: Into<String>>(model: S) -> Self {
        Self {
            model: model.into(),
            temperature: 0.0,
            top_p: 1.0,
            caching: true,
            functions: true,
        }
    }
}

/// Runs whole exchanges: builds the conversation for a prompt, streams the
/// completion and prints it.
pub struct Handler<C, B = DefaultConversation> {
    completer: C,
    functions: Arc<FunctionRegistry>,
    conversation: B,
    role: Role,
}

impl<C: Completer> Handler<C> {
    /// Creates a handler using the default conversation builder.
    pub fn new(completer: C, functions: Arc<FunctionRegistry>, role: Role) -> Self {
        Self {
            completer,
            functions,
            conversation: DefaultConversation,
            role,
        }
    }
}

impl<P: ModelProvider + 'static> Handler<CachedCompleter<CompletionEngine<P>>> {
    /// Creates a handler talking to `provider` through an engine and a
    /// disk cache set up from `config`.
    pub fn from_config(
        provider: P,
        functions: Arc<FunctionRegistry>,
        role: Role,
        config: &Config,
    ) -> Self {
        let engine = CompletionEngine::new(provider)
            .with_functions(Arc::clone(&functions))
            .with_role(role.clone())
            .with_show_functions_output(config.show_functions_output())
            .with_max_function_turns(config.max_function_turns());
        let store = FileCacheStore::new(config.cache_path(), config.cache_length());
        Self::new(CachedCompleter::new(engine, Arc::new(store)), functions, role)
    }
}

impl<C: Completer, B: ConversationBuilder> Handler<C, B> {
    /// Replaces the conversation builder.
    pub fn with_conversation<B2: ConversationBuilder>(
        self,
        conversation: B2,
    ) -> Handler<C, B2> {
        Handler {
            completer: self.completer,
            functions: self.functions,
            conversation,
            role: self.role,
        }
    }

    /// Returns the role of the handler.
    #[inline]
    pub fn role(&self) -> &Role {
        &self.role
    }

    /// Builds the request for `prompt`.
    pub fn make_request(&self, prompt: &str, options: &HandleOptions) -> ModelRequest {
        let functions = (options.functions && !self.functions.is_empty())
            .then(|| self.functions.definitions());
        ModelRequest {
            model: options.model.clone(),
            temperature: options.temperature,
            top_p: options.top_p,
            messages: self.conversation.make_messages(prompt.trim(), &self.role),
            functions,
        }
    }

    /// Answers `prompt`, printing the answer with `printer`, and returns
    /// the full text of the answer.
    pub async fn handle<Pr: Printer>(
        &self,
        prompt: &str,
        options: &HandleOptions,
        printer: &mut Pr,
    ) -> Result<String, Error> {
        let req = self.make_request(prompt, options);
        debug!(
            "handling prompt with role `{}` and model `{}`",
            self.role.name(),
            req.model
        );
        let fragments = self.completer.stream(
            req,
            StreamOptions {
                caching: options.caching,
                ..StreamOptions::default()
            },
        );
        printer.print(fragments).await
    }
}

#[cfg(test)]
mod tests {
    use sgpt_model::ModelMessage;
    use sgpt_test_model::{PresetEvent, PresetResponse, TestModelProvider};

    use super::*;
    use crate::config::ConfigBuilder;
    use crate::printer::TextPrinter;
    use crate::testing::{GetTime, registry_with};

    fn config(dir: &tempfile::TempDir) -> Config {
        ConfigBuilder::new()
            .with_cache_path(dir.path())
            .with_cache_length(10)
            .build()
    }

    #[tokio::test]
    async fn test_handle_with_function_call() {
        let mut provider = TestModelProvider::default();
        for _ in 0..2 {
            provider.add_response(PresetResponse::with_events([
                PresetEvent::function_call(
                    Some("get_time"),
                    Some("{\"tz\":\"UTC\"}"),
                ),
            ]));
            provider.add_response(PresetResponse::with_events([
                PresetEvent::delta("It is "),
                PresetEvent::delta("12:00."),
            ]));
        }
        let dir = tempfile::tempdir().unwrap();
        let get_time = GetTime::new();
        let handler = Handler::from_config(
            provider.clone(),
            registry_with(&get_time),
            Role::Default,
            &config(&dir),
        );
        let options = HandleOptions::new("gpt-4o");

        let mut printer = TextPrinter::new(vec![]);
        let text = handler
            .handle("  What time is it?\n", &options, &mut printer)
            .await
            .unwrap();
        let expected =
            "\n> @FunctionCall `get_time(tz=\"UTC\")` \n\nIt is 12:00.";
        assert_eq!(text, expected);
        assert_eq!(printer.into_inner(), format!("{expected}\n").into_bytes());

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].messages.len(), 2);
        assert_eq!(
            requests[0].messages[1],
            ModelMessage::user("What time is it?")
        );
        assert_eq!(requests[1].messages.len(), 4);

        // Asked again, the function runs again.
        let mut printer = TextPrinter::new(vec![]).with_live(false);
        let text = handler
            .handle("What time is it?", &options, &mut printer)
            .await
            .unwrap();
        assert_eq!(text, expected);
        assert_eq!(provider.requests().len(), 4);
        assert_eq!(get_time.calls(), 2);
    }

    #[tokio::test]
    async fn test_handle_shell_role() {
        let mut provider = TestModelProvider::default();
        provider.add_response(PresetResponse::with_events([
            PresetEvent::delta("ls -la"),
        ]));
        let dir = tempfile::tempdir().unwrap();
        let get_time = GetTime::new();
        let handler = Handler::from_config(
            provider.clone(),
            registry_with(&get_time),
            Role::Shell,
            &config(&dir),
        );
        let options = HandleOptions {
            caching: false,
            ..HandleOptions::new("gpt-4o")
        };

        let mut printer = TextPrinter::new(vec![]);
        let text = handler
            .handle("list all files", &options, &mut printer)
            .await
            .unwrap();
        assert_eq!(text, "ls -la");

        let requests = provider.requests();
        assert_eq!(requests[0].functions, None);
        assert_eq!(requests[0].messages[0].content, Role::Shell.instructions());
        assert_eq!(FileCacheStore::new(dir.path(), 10).len().unwrap(), 0);
    }

    #[test]
    fn test_make_request() {
        let get_time = GetTime::new();
        let handler = Handler::new(
            CompletionEngine::new(TestModelProvider::default()),
            registry_with(&get_time),
            Role::Default,
        );
        let options = HandleOptions::new("gpt-4o");
        let req = handler.make_request("Hi", &options);
        assert_eq!(req.functions.map(|f| f.len()), Some(1));

        let options = HandleOptions {
            functions: false,
            ..options
        };
        assert_eq!(handler.make_request("Hi", &options).functions, None);
    }
}

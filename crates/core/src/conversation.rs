//! Conversation-related types.

use sgpt_model::ModelMessage;

use crate::role::Role;

/// Turns a prompt into the messages sent to the model.
///
/// Implementations must return the role's system instructions first and
/// end with a user message holding the prompt.
pub trait ConversationBuilder: Send + Sync {
    /// Builds the messages for `prompt` under `role`.
    fn make_messages(&self, prompt: &str, role: &Role) -> Vec<ModelMessage>;
}

/// A single-shot conversation: system instructions, then the prompt.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultConversation;

impl ConversationBuilder for DefaultConversation {
    fn make_messages(&self, prompt: &str, role: &Role) -> Vec<ModelMessage> {
        vec![
            ModelMessage::system(role.instructions()),
            ModelMessage::user(prompt),
        ]
    }
}

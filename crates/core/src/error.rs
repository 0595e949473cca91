use sgpt_model::{ErrorKind, ModelProviderError};

use crate::function;

/// Errors that abort an exchange.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The model provider failed to open or continue the stream.
    #[error("model provider error ({kind:?}): {message}")]
    Provider {
        /// What went wrong, as classified by the provider.
        kind: ErrorKind,
        /// The provider's description of the failure.
        message: String,
    },

    /// A function requested by the model could not be called.
    #[error("function call failed: {0}")]
    Function(#[from] function::Error),

    /// The model kept calling functions past the configured limit.
    #[error("too many consecutive function calls (limit is {0})")]
    TooManyFunctionCalls(usize),

    /// The output could not be written.
    #[error("failed to write output: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn provider<E: ModelProviderError>(err: E) -> Self {
        Self::Provider {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// Returns the provider error kind, if this error came from the
    /// model provider.
    #[inline]
    pub fn provider_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Provider { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

//! Functions the model may call during an exchange.
//!
//! A function is described to the model by a [`ModelFunction`] definition.
//! When the model calls it, the keyword arguments it sent are deserialized
//! into [`Function::Arguments`] and the function answers with plain text,
//! which is handed back to the model as the result of the call.

mod error;
mod registry;

pub use error::{Error, ErrorKind};
pub use registry::FunctionRegistry;
pub use sgpt_model::ModelFunction;

use serde::de::DeserializeOwned;

/// The text a function answers with, or why it could not.
pub type FunctionResult = Result<String, Error>;

/// A function that can be called by the model.
pub trait Function: Send + Sync + 'static {
    /// The keyword arguments of the function.
    type Arguments: DeserializeOwned;

    /// Returns the definition advertised to the model. Its `parameters`
    /// must be a JSON schema `Arguments` can be read from.
    ///
    /// Called once, when the function is registered.
    fn definition(&self) -> ModelFunction;

    /// Runs the function.
    ///
    /// The returned future must not borrow `self`: it may outlive the
    /// registry the function lives in.
    fn call(
        &self,
        arguments: Self::Arguments,
    ) -> impl Future<Output = FunctionResult> + Send + 'static;
}

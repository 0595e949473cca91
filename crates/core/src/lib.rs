//! Core logic including the completion engine, function calls, response
//! caching, roles, configurations, etc.
//!
//! An exchange flows through three stages: a [`ConversationBuilder`] turns
//! the prompt into messages, a [`Completer`] streams the answer as text
//! fragments, and a [`Printer`] renders them. [`Handler`] wires them
//! together.
//!
//! The [`CompletionEngine`] is the completer talking to a model provider.
//! It runs the functions the model asks for and resumes the answer with
//! their results. A [`CachedCompleter`] can be put in front of any
//! completer to replay repeated exchanges from disk.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

pub mod cache;
mod completion;
pub mod config;
pub mod conversation;
mod engine;
mod error;
pub mod function;
mod handler;
pub mod printer;
pub mod role;
#[cfg(test)]
mod testing;

pub use cache::{CacheKey, CacheStore, CachedCompleter, FileCacheStore};
pub use completion::{Completer, Fragments, FunctionCalls, StreamOptions};
pub use config::{Config, ConfigBuilder};
pub use conversation::{ConversationBuilder, DefaultConversation};
pub use engine::CompletionEngine;
pub use error::Error;
pub use function::{Function, FunctionRegistry, FunctionResult};
pub use handler::{HandleOptions, Handler};
pub use printer::{Printer, TextPrinter};
pub use role::Role;

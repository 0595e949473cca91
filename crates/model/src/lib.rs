//! An abstraction layer for chat completion services.
//!
//! This crate establishes the protocol the completion engine speaks with
//! remote text-generation services: what a request carries, and what
//! events a streaming response is made of. Concrete services live in
//! their own crates and translate these types to their wire formats.
//!
//! Types in this crate don't define any behavior, instead they are the
//! constraints that the implementors should adhere to.

#![deny(missing_docs)]

mod error;
mod provider;
mod request;
mod response;

pub use error::*;
pub use provider::*;
pub use request::*;
pub use response::*;

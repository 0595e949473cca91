//! A command-line assistant that streams answers from chat completion
//! models, calling local functions on their behalf.
//!
//! The crate includes a CLI tool for using in the terminal. And you can also
//! use it as a library to bring the same functionality into your own apps.

#![deny(missing_docs)]

#[allow(unused_imports)]
#[macro_use]
extern crate tracing;

pub mod functions;

/// Re-exports of [`sgpt_core`] crate.
pub mod core {
    pub use sgpt_core::*;
}

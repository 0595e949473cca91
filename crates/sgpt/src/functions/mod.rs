//! A set of built-in functions that models can call.

mod shell;

use sgpt_core::FunctionRegistry;

pub use shell::ExecuteShellCommand;

/// Returns a registry holding every built-in function.
pub fn builtin_functions() -> FunctionRegistry {
    FunctionRegistry::new().with_function(ExecuteShellCommand)
}

use std::collections::BTreeMap;
use std::fmt::{self, Debug};
use std::future::ready;
use std::pin::Pin;

use serde::Deserialize;
use serde::de::IntoDeserializer;
use serde_json::{Map, Value};
use sgpt_model::ModelFunction;
use tracing::Instrument;

use super::{Error, Function, FunctionResult};

type Invocation = Pin<Box<dyn Future<Output = FunctionResult> + Send>>;

/// A registered function, with its concrete argument type erased.
struct Entry {
    definition: ModelFunction,
    invoke: Box<dyn Fn(Map<String, Value>) -> Invocation + Send + Sync>,
}

/// The functions the model may call, by name.
///
/// Definitions are listed in name order, so requests built from the same
/// registry always carry the same `functions` payload.
#[derive(Default)]
pub struct FunctionRegistry {
    entries: BTreeMap<String, Entry>,
}

impl FunctionRegistry {
    /// Creates an empty registry.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a function, replacing any function of the same name.
    pub fn register<T: Function>(&mut self, function: T) {
        let definition = function.definition();
        let name = definition.name.clone();
        let invoke = move |arguments: Map<String, Value>| -> Invocation {
            match T::Arguments::deserialize(arguments.into_deserializer()) {
                Ok(arguments) => Box::pin(function.call(arguments)),
                Err(err) => Box::pin(ready(Err(
                    Error::invalid_arguments().with_reason(err.to_string())
                ))),
            }
        };
        let entry = Entry {
            definition,
            invoke: Box::new(invoke),
        };
        if self.entries.insert(name.clone(), entry).is_some() {
            warn!("function `{name}` was registered twice");
        }
    }

    /// Registers a function, builder style.
    #[inline]
    pub fn with_function<T: Function>(mut self, function: T) -> Self {
        self.register(function);
        self
    }

    /// Returns whether a function named `name` exists.
    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Returns the number of registered functions.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether no function is registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the definitions to advertise to the model.
    pub fn definitions(&self) -> Vec<ModelFunction> {
        self.entries
            .values()
            .map(|entry| entry.definition.clone())
            .collect()
    }

    /// Calls the function named `name` with keyword `arguments`.
    ///
    /// The returned future does not borrow the registry.
    pub fn call(&self, name: &str, arguments: Map<String, Value>) -> Invocation {
        let Some(entry) = self.entries.get(name) else {
            warn!("function not found: {name}");
            return Box::pin(ready(Err(
                Error::not_found().with_reason(format!("`{name}` is not registered"))
            )));
        };
        trace!("calling function `{name}` with args: {arguments:?}");
        let span = debug_span!("function call", name);
        Box::pin((entry.invoke)(arguments).instrument(span))
    }
}

impl Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

//! Callable names: engine built-ins and instrument factories

use super::arg::{Arg, ReturnValue};
use crate::engine::Engine;
use crate::error::Result;
use crate::instrument::InstrumentFactory;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// An engine function taking marshaled arguments
pub type BuiltinFn = fn(&mut Engine, &[Arg]) -> Result<ReturnValue>;

#[derive(Clone)]
pub enum Callable {
    Builtin(BuiltinFn),
    Instrument(InstrumentFactory),
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Builtin(_) => f.write_str("Builtin"),
            Callable::Instrument(_) => f.write_str("Instrument"),
        }
    }
}

/// Name lookup for dispatch. Registering an existing name replaces it.
#[derive(Debug, Default, Clone)]
pub struct FunctionRegistry {
    entries: BTreeMap<String, Callable>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_builtin(&mut self, name: &str, func: BuiltinFn) {
        debug!("registered built-in {}", name);
        self.entries.insert(name.to_owned(), Callable::Builtin(func));
    }

    pub fn register_instrument(&mut self, name: &str, factory: InstrumentFactory) {
        if self
            .entries
            .insert(name.to_owned(), Callable::Instrument(factory))
            .is_some()
        {
            debug!("instrument {} replaces an earlier registration", name);
        } else {
            debug!("registered instrument {}", name);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Callable> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Instrument names only
    pub fn instruments(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|(_, c)| matches!(c, Callable::Instrument(_)))
            .map(|(name, _)| name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::library::builtin_instruments;

    fn noop(_: &mut Engine, _: &[Arg]) -> Result<ReturnValue> {
        Ok(ReturnValue::Float(0.0))
    }

    #[test]
    fn test_lookup_and_kinds() {
        let mut registry = FunctionRegistry::new();
        registry.register_builtin("noop", noop);
        for (name, factory) in builtin_instruments() {
            registry.register_instrument(name, factory);
        }

        assert!(matches!(registry.get("noop"), Some(Callable::Builtin(_))));
        assert!(matches!(registry.get("WAVETABLE"), Some(Callable::Instrument(_))));
        assert!(registry.get("nope").is_none());
        assert!(!registry.instruments().any(|n| n == "noop"));
    }

    #[test]
    fn test_names_are_sorted() {
        let mut registry = FunctionRegistry::new();
        registry.register_builtin("b", noop);
        registry.register_builtin("a", noop);
        let names: Vec<&str> = registry.names().collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}

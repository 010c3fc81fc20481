//! Process-wide table of stencil definitions, keyed by name.
//!
//! The table is populated once at startup (each stencil module registers
//! its factory) and only read afterwards, so the lock is uncontended.

use std::{
    collections::BTreeMap,
    sync::{Arc, RwLock},
};

use itertools::Itertools;
use once_cell::sync::Lazy;

use super::stencil::Stencil;
use crate::error::{CompileError, Result};

/// Builds a fresh copy of a stencil definition. Stencils whose shape
/// depends on an access radius receive the requested one, if any.
pub type StencilFactory = fn(Option<u32>) -> Stencil;

#[derive(Debug, Default)]
pub struct StencilRegistry {
    factories: RwLock<BTreeMap<&'static str, StencilFactory>>,
}

pub static STENCIL_REGISTRY: Lazy<Arc<StencilRegistry>> =
    Lazy::new(|| Arc::new(StencilRegistry::default()));

impl StencilRegistry {
    pub fn register(&self, name: &'static str, factory: StencilFactory) -> Result<()> {
        let mut factories = self
            .factories
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if factories.contains_key(name) {
            return Err(CompileError::DuplicateStencil(name.to_owned()));
        }

        factories.insert(name, factory);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains_key(name)
    }

    /// Sorted names of every registered stencil
    pub fn names(&self) -> Vec<&'static str> {
        self.factories
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .copied()
            .collect()
    }

    /// Builds the stencil registered under `name`
    pub fn build(&self, name: &str, radius: Option<u32>) -> Result<Stencil> {
        let factory = self
            .factories
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(name)
            .copied();

        match factory {
            Some(factory) => Ok(factory(radius)),
            None => Err(CompileError::UnknownStencil {
                name: name.to_owned(),
                known: self.names().iter().join(", "),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty(_radius: Option<u32>) -> Stencil {
        Stencil::new("empty")
    }

    #[test]
    fn lookup_failure_lists_known_names() {
        let registry = StencilRegistry::default();
        registry.register("b", empty).unwrap();
        registry.register("a", empty).unwrap();

        match registry.build("c", None) {
            Err(CompileError::UnknownStencil { name, known }) => {
                assert_eq!(name, "c");
                assert_eq!(known, "a, b");
            }
            other => panic!("expected an unknown stencil error, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let registry = StencilRegistry::default();
        registry.register("a", empty).unwrap();

        assert!(matches!(
            registry.register("a", empty),
            Err(CompileError::DuplicateStencil(_))
        ));
        assert!(registry.build("a", Some(2)).is_ok());
    }
}

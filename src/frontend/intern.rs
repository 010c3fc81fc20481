use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;

/// Process wide table of dimension, grid and stencil names. Strings are
/// leaked so symbols can hand out `&'static str` without holding the lock.
#[derive(Debug, Default)]
pub struct InterningTable {
    strings: RwLock<Vec<&'static str>>,
}

pub static INTERNING_TABLE: Lazy<Arc<InterningTable>> = Lazy::new(Default::default);

impl InterningTable {
    pub fn get(&self, index: u32) -> Option<&'static str> {
        let strings = self.strings.read().unwrap_or_else(|e| e.into_inner());

        strings.get(index as usize).copied()
    }

    pub fn insert_if_absent(&self, string: &str) -> u32 {
        let mut strings = self.strings.write().unwrap_or_else(|e| e.into_inner());

        if let Some(index) = strings.iter().position(|s| *s == string) {
            return index as _;
        }

        strings.push(Box::leak(Box::new(string.to_owned())));
        (strings.len() - 1) as _
    }
}

/// An index into the string interning table
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct InternedSymbol(u32);

impl InternedSymbol {
    pub fn new(value: &str) -> Self {
        let index = INTERNING_TABLE.insert_if_absent(value);

        Self(index)
    }

    pub fn value(&self) -> &'static str {
        INTERNING_TABLE.get(self.0).expect("Once an interned symbol is created, the string it references should never be removed from the table")
    }
}

// Symbols order by their text, not by interning order, so that anything
// sorted by name is stable no matter which thread interned it first.
impl Ord for InternedSymbol {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        if self.0 == other.0 {
            return std::cmp::Ordering::Equal;
        }

        self.value().cmp(other.value())
    }
}

impl PartialOrd for InternedSymbol {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl core::fmt::Debug for InternedSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("InternedSymbol")
            .field(&self.0)
            .field(&self.value())
            .finish()
    }
}

impl core::fmt::Display for InternedSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.value())
    }
}

//! Argument normalization.
//!
//! Maps alternate field spellings onto one canonical spelling. Unknown keys
//! pass through untouched and no type or presence checking happens here.

use serde_json::{Map, Value};

/// Raw or canonical argument bag for a tool invocation.
pub type ArgBag = Map<String, Value>;

/// Fixed `(alternate, canonical)` rename table for one tool.
#[derive(Debug, Clone, Copy)]
pub struct RenameTable {
    entries: &'static [(&'static str, &'static str)],
}

impl RenameTable {
    #[must_use]
    pub const fn new(entries: &'static [(&'static str, &'static str)]) -> Self {
        Self { entries }
    }

    #[must_use]
    pub const fn entries(&self) -> &'static [(&'static str, &'static str)] {
        self.entries
    }

    /// Canonical spelling for `key`, if `key` is a declared alternate.
    #[must_use]
    pub fn canonical_for(&self, key: &str) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|(alternate, _)| *alternate == key)
            .map(|(_, canonical)| *canonical)
    }

    /// Rewrites alternate spellings to canonical ones.
    ///
    /// When both spellings are present the alternate's value is applied last
    /// and wins.
    #[must_use]
    pub fn normalize(&self, mut args: ArgBag) -> ArgBag {
        for (alternate, canonical) in self.entries {
            if let Some(value) = args.remove(*alternate) {
                args.insert((*canonical).to_string(), value);
            }
        }
        args
    }

    /// True when no canonical name is also declared as an alternate, which is
    /// what keeps `normalize` idempotent.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.entries
            .iter()
            .all(|(_, canonical)| self.canonical_for(canonical).is_none())
    }
}

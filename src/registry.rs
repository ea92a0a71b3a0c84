// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module registry: per-module lifecycle records
//!
//! The registry is the single source of truth for lifecycle state,
//! dependency lists, and exports. Records are created lazily on first
//! reference and never removed for the life of the loader.

use crate::require::{Exports, Factory};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Lifecycle state of a module record.
///
/// The variants carry an explicit total order; a record only ever moves
/// forward through [`ModuleRecord::advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ModuleState {
    /// The record exists and its locator is known; nothing is loaded yet
    Declaring,
    /// The backing resource is downloading or executing
    Loading,
    /// Identifier, dependencies and factory have been registered
    Defined,
    /// The record's dependencies are being resolved
    Resolving,
    /// Dependencies are settled; the factory is ready to execute
    Ready,
}

/// One entry in the registry, keyed by canonical registry key.
pub(crate) struct ModuleRecord {
    /// Resolved address of the backing resource; absent for records
    /// defined purely as dependencies + factory.
    pub locator: Option<String>,
    pub state: ModuleState,
    pub dependencies: Option<Vec<String>>,
    pub factory: Option<Factory>,
    /// Materialized exports; set at most once. A record with exports is
    /// terminal regardless of `state`.
    pub exports: Option<Exports>,
    /// Callbacks waiting on this record reaching Ready, drained exactly
    /// once, in registration order.
    pub waiters: Vec<oneshot::Sender<()>>,
    pub is_style: bool,
    /// Grouping tag inherited from the requiring context; resolves
    /// home-relative identifiers.
    pub namespace: Option<String>,
    /// Serializes factory execution for this record. Held across the
    /// factory run so a racing materialization blocks until the exports
    /// are stored, then reads them.
    pub init_lock: Arc<Mutex<()>>,
}

impl ModuleRecord {
    fn new() -> Self {
        Self {
            locator: None,
            state: ModuleState::Declaring,
            dependencies: None,
            factory: None,
            exports: None,
            waiters: Vec::new(),
            is_style: false,
            namespace: None,
            init_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Moves the state forward. Downgrades are ignored, so racing
    /// resolution attempts cannot rewind a record.
    pub(crate) fn advance(&mut self, next: ModuleState) -> bool {
        if next > self.state {
            self.state = next;
            true
        } else {
            false
        }
    }

    /// Whether the record needs no further resolution.
    pub(crate) fn is_settled(&self) -> bool {
        self.exports.is_some() || self.state == ModuleState::Ready
    }

    /// Drops transient bookkeeping once exports exist, leaving only the
    /// key and the exports alive.
    pub(crate) fn tidy(&mut self) {
        if self.exports.is_some() {
            self.dependencies = None;
            self.factory = None;
            self.locator = None;
            self.namespace = None;
        }
    }
}

/// Partial record produced by a registration call, merged into the
/// registry entry for its computed key.
pub(crate) struct RecordSeed {
    pub state: ModuleState,
    pub locator: Option<String>,
    pub dependencies: Option<Vec<String>>,
    pub factory: Option<Factory>,
    pub exports: Option<Exports>,
    pub is_style: bool,
}

/// Mapping from canonical registry key to module record.
pub(crate) struct Registry {
    records: DashMap<String, ModuleRecord>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    /// Runs `f` against the record for `key`, creating an empty record in
    /// the Declaring state first if none exists.
    ///
    /// The record lock is held only for the duration of `f`; callers must
    /// not re-enter the registry for the same key from inside `f`.
    pub(crate) fn with<R>(&self, key: &str, f: impl FnOnce(&mut ModuleRecord) -> R) -> R {
        let mut record = self
            .records
            .entry(key.to_string())
            .or_insert_with(ModuleRecord::new);
        f(record.value_mut())
    }

    /// Whether a record exists for `key`.
    #[cfg(test)]
    pub(crate) fn contains(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    /// Merges a registration into the record for `key`.
    ///
    /// Explicit re-declarations of locator, dependencies, and factory
    /// always overwrite; exports are set only if previously absent; state
    /// advances monotonically.
    pub(crate) fn merge(&self, key: &str, seed: RecordSeed) {
        self.with(key, |record| {
            if seed.locator.is_some() {
                record.locator = seed.locator;
            }
            if seed.dependencies.is_some() {
                record.dependencies = seed.dependencies;
            }
            if seed.factory.is_some() {
                record.factory = seed.factory;
            }
            if record.exports.is_none() {
                if let Some(exports) = seed.exports {
                    record.exports = Some(exports);
                }
            }
            if seed.is_style {
                record.is_style = true;
            }
            record.advance(seed.state);
            record.tidy();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn state_order_is_total() {
        use ModuleState::*;
        assert!(Declaring < Loading);
        assert!(Loading < Defined);
        assert!(Defined < Resolving);
        assert!(Resolving < Ready);
    }

    #[test]
    fn advance_never_moves_backward() {
        let mut record = ModuleRecord::new();
        assert!(record.advance(ModuleState::Resolving));
        assert!(!record.advance(ModuleState::Loading));
        assert_eq!(record.state, ModuleState::Resolving);
        assert!(record.advance(ModuleState::Ready));
        assert!(!record.advance(ModuleState::Ready));
    }

    #[test]
    fn records_are_created_lazily() {
        let registry = Registry::new();
        assert!(!registry.contains("/lib/a.js"));
        registry.with("/lib/a.js", |record| {
            assert_eq!(record.state, ModuleState::Declaring);
        });
        assert!(registry.contains("/lib/a.js"));
    }

    #[test]
    fn merge_overwrites_declarations_but_not_exports() {
        let registry = Registry::new();
        registry.merge(
            "/lib/a.js",
            RecordSeed {
                state: ModuleState::Declaring,
                locator: Some("/lib/a.js".to_string()),
                dependencies: None,
                factory: None,
                exports: Some(Arc::new(1u32)),
                is_style: false,
            },
        );
        registry.merge(
            "/lib/a.js",
            RecordSeed {
                state: ModuleState::Defined,
                locator: Some("/cdn/lib/a.js".to_string()),
                dependencies: Some(vec!["./b".to_string()]),
                factory: None,
                exports: Some(Arc::new(2u32)),
                is_style: false,
            },
        );
        registry.with("/lib/a.js", |record| {
            // first exports value wins; the record is terminal
            let exports = record.exports.clone().unwrap();
            assert_eq!(*exports.downcast_ref::<u32>().unwrap(), 1);
            // terminal records are tidied
            assert!(record.locator.is_none());
            assert!(record.dependencies.is_none());
        });
    }

    #[test]
    fn settled_via_exports_regardless_of_state() {
        let mut record = ModuleRecord::new();
        assert!(!record.is_settled());
        record.exports = Some(Arc::new(()));
        assert!(record.is_settled());
        assert_eq!(record.state, ModuleState::Declaring);
    }
}

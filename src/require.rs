// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Exports generation and the module-scoped require
//!
//! A factory runs exactly once, on first need, receiving the loader API, a
//! require function scoped to its own locator and namespace, and a fresh
//! exports container it may populate in place.

use crate::error::Result;
use crate::loader::Loader;
use crate::provide::Env;
use crate::registry::ModuleState;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// Materialized exports of a module.
///
/// Exports are opaque to the loader; hosts downcast to their own types.
pub type Exports = Arc<dyn Any + Send + Sync>;

/// The in-place exports container handed to a factory.
pub type ExportsTable = HashMap<String, Exports>;

/// Deferred computation producing a module's exports.
///
/// Receives the loader API, a scoped [`Require`], and a fresh
/// [`ExportsTable`]; a `Some` return value supersedes the table.
pub type Factory =
    Arc<dyn Fn(&Loader, &Require, &mut ExportsTable) -> Option<Exports> + Send + Sync>;

/// A fresh, empty exports value.
pub fn empty_exports() -> Exports {
    Arc::new(ExportsTable::new())
}

/// Require function scoped to one module's locator and namespace, so
/// relative identifiers inside its factory resolve correctly.
pub struct Require {
    pub(crate) loader: Loader,
    pub(crate) locator: Option<String>,
    pub(crate) namespace: Option<String>,
}

impl Require {
    /// Resolves `identifier` relative to the owning module and returns its
    /// exports.
    ///
    /// A module that is not yet ready yields an empty exports table; this
    /// is what a dependent inside a broken cycle observes.
    pub fn call(&self, identifier: &str) -> Result<Exports> {
        let env = Env {
            locator: self.locator.clone(),
            namespace: self.namespace.clone(),
            parent: None,
        };
        let target = self.loader.get_or_define(identifier, &env)?;
        Ok(self.loader.materialize(&target.key))
    }
}

// Outcome of inspecting a record before materialization.
enum Step {
    Cached(Exports),
    Run {
        factory: Factory,
        locator: Option<String>,
        namespace: Option<String>,
    },
    Unready,
}

impl Loader {
    /// Computes or retrieves the materialized exports for `key`.
    ///
    /// The factory is taken out of the record before execution, so it can
    /// never run twice; afterwards the record's transient bookkeeping is
    /// discarded, leaving only the key and the exports. A caller racing a
    /// factory already in flight blocks on the record's initialization
    /// lock and then reads the stored exports.
    pub(crate) fn materialize(&self, key: &str) -> Exports {
        let (cached, init_lock) = self
            .registry()
            .with(key, |record| (record.exports.clone(), record.init_lock.clone()));
        if let Some(exports) = cached {
            return exports;
        }

        let _running = init_lock.lock();

        let step = self.registry().with(key, |record| {
            if let Some(exports) = &record.exports {
                return Step::Cached(exports.clone());
            }
            if record.state == ModuleState::Ready {
                if let Some(factory) = record.factory.take() {
                    return Step::Run {
                        factory,
                        locator: record.locator.clone(),
                        namespace: record.namespace.clone(),
                    };
                }
            }
            Step::Unready
        });

        match step {
            Step::Cached(exports) => exports,
            Step::Unready => empty_exports(),
            Step::Run {
                factory,
                locator,
                namespace,
            } => {
                let require = Require {
                    loader: self.clone(),
                    locator,
                    namespace,
                };
                let mut table = ExportsTable::new();
                let returned = factory(self, &require, &mut table);
                let exports: Exports = match returned {
                    Some(value) => value,
                    None => Arc::new(table),
                };
                self.registry().with(key, |record| {
                    if record.exports.is_none() {
                        record.exports = Some(exports.clone());
                    }
                    record.tidy();
                    record.exports.clone().unwrap_or_else(empty_exports)
                })
            }
        }
    }
}

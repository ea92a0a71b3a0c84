// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Resource fetching with per-locator de-duplication
//!
//! At most one underlying host load runs per distinct locator; every other
//! interested party registers a waiter and is notified, in registration
//! order, when the load finishes. Completion is the only signal; the
//! model has no distinct failure channel for resource loads.
//!
//! The [`attribution`] submodule decides which fetch an anonymously
//! self-registering resource belongs to; that is the most fragile part of
//! the design and is kept as its own testable unit.

use crate::error::{LoaderError, Result};
use crate::loader::Loader;
use crate::registry::ModuleState;
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::oneshot;

pub(crate) use attribution::Attribution;

/// What kind of resource a locator points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// Code that registers modules while executing
    Executable,
    /// A style-sheet-like resource: loaded for its side effect only
    Stylesheet,
}

/// Opaque token identifying one executable fetch.
///
/// The host brackets evaluation of the fetched code with
/// [`Loader::begin_executing`] / [`Loader::finish_executing`] so that
/// anonymous registrations made during evaluation land on the right
/// record.
#[derive(Debug, Clone)]
pub struct LoadToken {
    pub(crate) key: String,
}

/// Host collaborator that injects loadable resources.
///
/// `load_executable` must not return before the fetched code has finished
/// executing; `load_stylesheet` must not return before the style resource
/// is available. Neither reports failure: a resource that never completes
/// leaves its dependents pending, which is an accepted limitation.
#[async_trait]
pub trait ResourceHost: Send + Sync {
    /// Fetches and executes a code resource.
    async fn load_executable(&self, loader: &Loader, locator: &str, token: LoadToken);

    /// Fetches a style resource.
    async fn load_stylesheet(&self, loader: &Loader, locator: &str);
}

enum FetchEntry {
    InFlight(Vec<oneshot::Sender<()>>),
    Done,
}

/// De-duplicating fetch table, one entry per distinct locator.
pub(crate) struct Fetcher {
    entries: DashMap<String, FetchEntry>,
    pub(crate) attribution: Attribution,
}

enum Role {
    Initiator,
    Waiter(oneshot::Receiver<()>),
    Complete,
}

impl Fetcher {
    pub(crate) fn new(attribute_by_recent_load: bool) -> Self {
        Self {
            entries: DashMap::new(),
            attribution: Attribution::new(attribute_by_recent_load),
        }
    }

    /// Ensures the resource behind `locator` has been loaded, initiating
    /// the underlying host load only if no fetch for it exists yet.
    ///
    /// Returns `true` for the caller that initiated the load.
    pub(crate) async fn fetch(
        &self,
        loader: &Loader,
        locator: &str,
        key: &str,
        kind: ResourceKind,
    ) -> bool {
        let role = match self.entries.entry(locator.to_string()) {
            Entry::Occupied(mut occupied) => match occupied.get_mut() {
                FetchEntry::Done => Role::Complete,
                FetchEntry::InFlight(waiters) => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    Role::Waiter(rx)
                }
            },
            Entry::Vacant(vacant) => {
                vacant.insert(FetchEntry::InFlight(Vec::new()));
                Role::Initiator
            }
        };

        match role {
            Role::Complete => false,
            Role::Waiter(rx) => {
                // Sender dropped without completing means the load hung;
                // either way there is nothing further to do here.
                let _ = rx.await;
                false
            }
            Role::Initiator => {
                tracing::debug!(locator, ?kind, "fetching resource");
                self.attribution.record_initiated(key);
                match kind {
                    ResourceKind::Executable => {
                        let token = LoadToken {
                            key: key.to_string(),
                        };
                        loader.host().load_executable(loader, locator, token).await;
                    }
                    ResourceKind::Stylesheet => {
                        loader.host().load_stylesheet(loader, locator).await;
                    }
                }
                self.attribution.clear_initiated(key);

                let waiters = match self.entries.insert(locator.to_string(), FetchEntry::Done) {
                    Some(FetchEntry::InFlight(waiters)) => waiters,
                    _ => Vec::new(),
                };
                for tx in waiters {
                    let _ = tx.send(());
                }
                true
            }
        }
    }
}

impl Loader {
    /// Loads the backing resource for a record and settles the post-load
    /// bookkeeping: style promotion, or the anonymous-registration claim.
    pub(crate) async fn fetch_resource(
        &self,
        locator: &str,
        key: &str,
        kind: ResourceKind,
    ) -> Result<()> {
        let initiated = self.fetcher().fetch(self, locator, key, kind).await;

        if kind == ResourceKind::Stylesheet {
            // Style resources skip exports generation entirely.
            let waiters = self.registry().with(key, |record| {
                record.advance(ModuleState::Ready);
                record.locator = None;
                std::mem::take(&mut record.waiters)
            });
            for tx in waiters {
                let _ = tx.send(());
            }
            return Ok(());
        }

        let undefined = self
            .registry()
            .with(key, |record| !record.is_settled() && record.state < ModuleState::Defined);
        if !undefined {
            return Ok(());
        }

        // The resource executed without registering anything under this
        // key. In compatibility mode the initiating fetch claims a parked
        // anonymous registration; otherwise this is surfaced loudly.
        if initiated && self.config().attribute_by_recent_load {
            if let Some(seed) = self.fetcher().attribution.take_parked() {
                if seed.state < ModuleState::Defined {
                    return Err(LoaderError::IncompleteAnonymousDefinition {
                        locator: locator.to_string(),
                    });
                }
                self.registry().merge(key, seed);
                return Ok(());
            }
        }
        Err(LoaderError::UndefinedResource {
            locator: locator.to_string(),
        })
    }
}

pub(crate) mod attribution {
    //! Attribution of anonymously-registered modules to their fetch.
    //!
    //! Primary strategy: an explicit token stack maintained by the host
    //! around evaluation of fetched code. Compatibility fallback: the most
    //! recently initiated fetch, recorded immediately before the host load
    //! starts and cleared when it completes. A registration neither
    //! bracket nor heuristic can place is parked for the next completing
    //! fetch to claim.

    use crate::fetch::LoadToken;
    use crate::registry::RecordSeed;
    use parking_lot::Mutex;

    pub(crate) struct Attribution {
        /// Keys of resources currently executing, innermost last.
        executing: Mutex<Vec<String>>,
        /// Key of the most recently initiated fetch (compatibility mode).
        last_initiated: Mutex<Option<String>>,
        /// Anonymous registration awaiting a claim.
        parked: Mutex<Option<RecordSeed>>,
        attribute_by_recent_load: bool,
    }

    impl Attribution {
        pub(crate) fn new(attribute_by_recent_load: bool) -> Self {
            Self {
                executing: Mutex::new(Vec::new()),
                last_initiated: Mutex::new(None),
                parked: Mutex::new(None),
                attribute_by_recent_load,
            }
        }

        pub(crate) fn begin(&self, token: &LoadToken) {
            self.executing.lock().push(token.key.clone());
        }

        pub(crate) fn finish(&self) {
            self.executing.lock().pop();
        }

        pub(crate) fn record_initiated(&self, key: &str) {
            if self.attribute_by_recent_load {
                *self.last_initiated.lock() = Some(key.to_string());
            }
        }

        pub(crate) fn clear_initiated(&self, key: &str) {
            if self.attribute_by_recent_load {
                let mut last = self.last_initiated.lock();
                if last.as_deref() == Some(key) {
                    *last = None;
                }
            }
        }

        /// The registry key an anonymous registration should land on right
        /// now, if any strategy can tell.
        pub(crate) fn current_target(&self) -> Option<String> {
            if let Some(key) = self.executing.lock().last() {
                return Some(key.clone());
            }
            if self.attribute_by_recent_load {
                return self.last_initiated.lock().clone();
            }
            None
        }

        pub(crate) fn park(&self, seed: RecordSeed) {
            *self.parked.lock() = Some(seed);
        }

        pub(crate) fn take_parked(&self) -> Option<RecordSeed> {
            self.parked.lock().take()
        }
    }

}

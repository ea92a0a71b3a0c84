// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The loader instance
//!
//! One [`Loader`] owns its registry, fetch table, and resolver outright.
//! There is no process-global state, so independent loader instances can
//! coexist without contaminating each other.

use crate::config::LoaderConfig;
use crate::error::{Result, Warning};
use crate::fetch::{Fetcher, LoadToken, ResourceHost};
use crate::registry::Registry;
use crate::resolve::PathResolver;
use std::sync::Arc;

/// An asynchronous module-dependency loader.
///
/// Cheap to clone; clones share the same registry and fetch table.
///
/// ```rust,ignore
/// use skyhook::{Loader, LoaderConfig};
///
/// #[tokio::main]
/// async fn main() -> skyhook::Result<()> {
///     let loader = Loader::new(LoaderConfig::default(), host)?;
///     let exports = loader.provide(&["io/ajax", "event/live"]).await?;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Loader {
    inner: Arc<LoaderInner>,
}

struct LoaderInner {
    config: Arc<LoaderConfig>,
    resolver: PathResolver,
    registry: Registry,
    fetcher: Fetcher,
    host: Arc<dyn ResourceHost>,
}

impl Loader {
    /// Creates a loader over the given host collaborator.
    ///
    /// Fails with [`LoaderError::BasesConflict`] when the configured
    /// library and application bases are the same prefix.
    ///
    /// [`LoaderError::BasesConflict`]: crate::LoaderError::BasesConflict
    pub fn new(config: LoaderConfig, host: Arc<dyn ResourceHost>) -> Result<Self> {
        let config = Arc::new(config.validated()?);
        Ok(Self {
            inner: Arc::new(LoaderInner {
                resolver: PathResolver::new(config.clone()),
                registry: Registry::new(),
                fetcher: Fetcher::new(config.attribute_by_recent_load),
                host,
                config,
            }),
        })
    }

    /// Marks the resource identified by `token` as currently executing.
    ///
    /// Hosts call this immediately before evaluating fetched executable
    /// code, so anonymous registrations made during evaluation attribute
    /// to the right record. Every `begin_executing` must be paired with a
    /// [`Loader::finish_executing`].
    pub fn begin_executing(&self, token: &LoadToken) {
        self.inner.fetcher.attribution.begin(token);
    }

    /// Closes the innermost [`Loader::begin_executing`] bracket.
    pub fn finish_executing(&self) {
        self.inner.fetcher.attribution.finish();
    }

    pub(crate) fn config(&self) -> &LoaderConfig {
        &self.inner.config
    }

    pub(crate) fn resolver(&self) -> &PathResolver {
        &self.inner.resolver
    }

    pub(crate) fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub(crate) fn fetcher(&self) -> &Fetcher {
        &self.inner.fetcher
    }

    pub(crate) fn host(&self) -> &dyn ResourceHost {
        self.inner.host.as_ref()
    }

    pub(crate) fn warn(&self, warning: Warning) {
        (self.inner.config.on_warning)(&warning);
    }
}

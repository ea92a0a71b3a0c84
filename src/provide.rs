// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Dependency provision: the recursive resolution algorithm
//!
//! `provide` ensures each requested module is fetched, fully resolved
//! (including its transitive dependencies), and its exports computed.
//! Dependencies always settle before their dependent, except across a
//! detected cycle, where the back-edge is treated as already satisfied:
//! a warning is emitted and resolution proceeds rather than deadlocking.

use crate::error::{LoaderError, Result, Warning};
use crate::fetch::ResourceKind;
use crate::loader::Loader;
use crate::registry::ModuleState;
use crate::require::Exports;
use crate::resolve::is_relative;
use futures::future::{BoxFuture, join_all};
use std::sync::Arc;
use tokio::sync::oneshot;

/// Splits a namespaced identifier: `Checkin::index`.
const NAMESPACE_SPLITTER: &str = "::";
/// Marks a home-relative identifier within an application namespace.
const HOME_PREFIX: &str = "~/";

/// Resolution environment: the chain of in-progress resolutions, used for
/// cycle detection and for resolving identifiers relative to their
/// requiring module.
#[derive(Clone, Default)]
pub(crate) struct Env {
    /// Locator of the module whose dependencies are being resolved.
    pub locator: Option<String>,
    /// Namespace of the requiring context.
    pub namespace: Option<String>,
    /// Environment of the parent resolution.
    pub parent: Option<Arc<Env>>,
}

fn is_cyclic(env: &Env, locator: &str) -> bool {
    let mut current = Some(env);
    while let Some(e) = current {
        if e.locator.as_deref() == Some(locator) {
            return true;
        }
        current = e.parent.as_deref();
    }
    false
}

/// A resolved reference to a registry record.
pub(crate) struct Target {
    pub key: String,
    pub locator: String,
    pub is_style: bool,
    pub namespace: Option<String>,
}

impl Loader {
    /// Resolves every identifier in `identifiers` and returns their
    /// exports, positionally, in input order.
    ///
    /// Style resources are resolved for their side effect and occupy no
    /// slot in the result. An empty input returns immediately with an
    /// empty result.
    pub async fn provide(&self, identifiers: &[&str]) -> Result<Vec<Exports>> {
        let identifiers = identifiers.iter().map(|s| s.to_string()).collect();
        self.provide_in(identifiers, Env::default()).await
    }

    /// Recursive worker behind [`Loader::provide`], carrying the
    /// resolution environment of the requiring module.
    pub(crate) fn provide_in(
        &self,
        identifiers: Vec<String>,
        env: Env,
    ) -> BoxFuture<'static, Result<Vec<Exports>>> {
        let loader = self.clone();
        Box::pin(async move {
            if identifiers.is_empty() {
                return Ok(Vec::new());
            }

            let env = Arc::new(env);
            let mut tasks = Vec::new();
            for identifier in identifiers {
                let loader = loader.clone();
                let env = env.clone();
                tasks.push(async move {
                    let target = loader.get_or_define(&identifier, &env)?;
                    if is_cyclic(&env, &target.locator) {
                        // Break the cycle: the back-edge counts as already
                        // satisfied, so its dependent may observe exports
                        // that are not yet fully populated.
                        loader.warn(Warning::CircularDependency {
                            locator: target.locator.clone(),
                        });
                    } else {
                        let child = Env {
                            locator: Some(target.locator.clone()),
                            namespace: target.namespace.clone(),
                            parent: Some(env.clone()),
                        };
                        loader.provide_one(target.key.clone(), child).await?;
                    }
                    if target.is_style {
                        Ok(None)
                    } else {
                        Ok(Some(loader.materialize(&target.key)))
                    }
                });
            }

            let mut exports = Vec::new();
            for result in join_all(tasks).await {
                if let Some(value) = result? {
                    exports.push(value);
                }
            }
            Ok(exports)
        })
    }

    /// Pushes one record to at least the Ready state.
    ///
    /// Does not initialize the module or execute its factory; that happens
    /// on first require.
    fn provide_one(&self, key: String, env: Env) -> BoxFuture<'static, Result<()>> {
        let loader = self.clone();
        Box::pin(async move {
            loop {
                enum Step {
                    Settled,
                    Resolve(Vec<String>),
                    Wait(oneshot::Receiver<()>),
                    Fetch(Option<String>, ResourceKind),
                }

                let step = loader.registry().with(&key, |record| {
                    if record.is_settled() {
                        return Step::Settled;
                    }
                    match record.state {
                        ModuleState::Resolving => {
                            // A concurrent resolution is in flight; attach
                            // rather than restarting it.
                            let (tx, rx) = oneshot::channel();
                            record.waiters.push(tx);
                            Step::Wait(rx)
                        }
                        ModuleState::Defined => {
                            record.advance(ModuleState::Resolving);
                            Step::Resolve(record.dependencies.clone().unwrap_or_default())
                        }
                        _ => {
                            record.advance(ModuleState::Loading);
                            let kind = if record.is_style {
                                ResourceKind::Stylesheet
                            } else {
                                ResourceKind::Executable
                            };
                            Step::Fetch(record.locator.clone(), kind)
                        }
                    }
                });

                match step {
                    Step::Settled => return Ok(()),
                    Step::Wait(rx) => {
                        // Reassess on wakeup: the resolution in flight may
                        // have failed and been rolled back.
                        let _ = rx.await;
                    }
                    Step::Resolve(dependencies) => {
                        let outcome = loader.provide_in(dependencies, env.clone()).await;
                        let waiters = loader.registry().with(&key, |record| {
                            if outcome.is_ok() {
                                record.advance(ModuleState::Ready);
                            } else if record.exports.is_none() {
                                // Roll back so waiters and later callers
                                // reattempt the resolution and surface the
                                // same failure instead of hanging.
                                record.state = ModuleState::Defined;
                            }
                            std::mem::take(&mut record.waiters)
                        });
                        for tx in waiters {
                            let _ = tx.send(());
                        }
                        outcome?;
                        return Ok(());
                    }
                    Step::Fetch(locator, kind) => {
                        let locator = locator.ok_or_else(|| LoaderError::UndefinedResource {
                            locator: key.clone(),
                        })?;
                        loader.fetch_resource(&locator, &key, kind).await?;
                        // reassess the record now that the load settled
                    }
                }
            }
        })
    }

    /// Resolves an identifier to its registry record, creating an empty
    /// declaring record (with its locator) on first reference.
    pub(crate) fn get_or_define(&self, identifier: &str, env: &Env) -> Result<Target> {
        let mut name = identifier;
        let mut namespace: Option<String> = None;

        // 'Checkin::index' -> namespace 'checkin', name 'index'
        if let Some((prefix, rest)) = identifier.split_once(NAMESPACE_SPLITTER) {
            if !rest.is_empty() {
                namespace = Some(prefix.to_lowercase());
                name = rest;
            }
        }

        // '~/dom', './dom' and '../dom' stay within the requiring
        // module's own namespace
        let home_relative = name.strip_prefix(HOME_PREFIX);
        if let Some(rest) = home_relative {
            name = rest;
        }
        if home_relative.is_some() || is_relative(name) {
            namespace = env.namespace.clone();
        }

        let base = namespace
            .as_ref()
            .map(|ns| format!("{}{ns}/", self.config().app_base));
        let resolved = self
            .resolver()
            .resolve(name, env.locator.as_deref(), base.as_deref())?;

        self.registry().with(&resolved.key, |record| {
            if record.locator.is_none() && record.exports.is_none() {
                record.locator = Some(resolved.locator.clone());
            }
            if resolved.is_style {
                record.is_style = true;
            }
            if namespace.is_some() {
                record.namespace = namespace.clone();
            }
        });

        Ok(Target {
            key: resolved.key,
            locator: resolved.locator,
            is_style: resolved.is_style,
            namespace,
        })
    }
}

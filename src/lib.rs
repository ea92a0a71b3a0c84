// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # skyhook
//!
//! An asynchronous module-dependency loader: resolves named modules, loads
//! their backing resources on demand, tracks per-module lifecycle state,
//! detects circular dependencies, and exposes resolved exports to
//! dependents, all without blocking the caller.
//!
//! The moving parts, leaf to root:
//!
//! - **Path resolution**: identifier + requiring locator -> canonical
//!   resource locator + decoration-stripped registry key
//! - **Module registry**: one record per registry key, carrying the
//!   five-state lifecycle machine and the materialized exports
//! - **Resource fetching**: at most one underlying load per distinct
//!   locator, fanning completion out to every waiter
//! - **Dependency provision**: the recursive resolution algorithm, with
//!   cycle breaking and single-resolution de-duplication
//! - **Exports generation**: factories execute exactly once, on first
//!   need, with a require scoped to their own locator
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use skyhook::{DefineArg, Loader, LoaderConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> skyhook::Result<()> {
//!     let loader = Loader::new(LoaderConfig::default(), Arc::new(host))?;
//!
//!     // modules registered by fetched resources via `define`:
//!     loader.define(vec![
//!         DefineArg::str("greeting"),
//!         DefineArg::exports("hello"),
//!     ])?;
//!
//!     let exports = loader.provide(&["greeting"]).await?;
//!     assert_eq!(exports[0].downcast_ref::<&str>(), Some(&"hello"));
//!     Ok(())
//! }
//! ```
//!
//! Concurrency model: cooperative and callback-driven. Nothing inside the
//! loader runs in parallel; concurrency arises only from multiple resource
//! loads being in flight at once. Suspension happens solely at "wait for a
//! resource to load" and "wait for a record to settle", both implemented
//! as completion signaling, never polling.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod config;
mod define;
mod error;
mod fetch;
mod loader;
mod provide;
mod registry;
mod require;
mod resolve;

pub use config::{
    AddressTransform, KeySanitizer, LoaderConfig, WarningHook, default_key_sanitizer,
};
pub use define::DefineArg;
pub use error::{LoaderError, Result, Warning};
pub use fetch::{LoadToken, ResourceHost, ResourceKind};
pub use loader::Loader;
pub use registry::ModuleState;
pub use require::{Exports, ExportsTable, Factory, Require, empty_exports};

/// Version of the loader crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

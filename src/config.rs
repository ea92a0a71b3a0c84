// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Loader configuration
//!
//! A [`LoaderConfig`] is handed to [`Loader::new`] and owned by that one
//! loader instance; there is no process-global configuration.
//!
//! [`Loader::new`]: crate::Loader::new

use crate::error::{LoaderError, Result, Warning};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;

/// Maps a locator to the address prefix it should be fetched under.
///
/// The second argument tells whether the locator refers to a library
/// resource (as opposed to an application resource), so hosts can shard
/// the two across different servers.
pub type AddressTransform = Arc<dyn Fn(&str, bool) -> String + Send + Sync>;

/// Reduces a locator path to its canonical registry key.
pub type KeySanitizer = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Receives non-fatal [`Warning`]s.
pub type WarningHook = Arc<dyn Fn(&Warning) + Send + Sync>;

// Decoration markers stripped by the default sanitizer. Each is removed at
// its first occurrence only, matching how decorated filenames are produced.
static MINIFY_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\.min").expect("minify marker pattern"));
static HASH_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\.[a-z0-9]{32}").expect("hash marker pattern"));
static VERSION_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\.v(?:\d+\.)*\d+").expect("version marker pattern"));

/// Strips cache-busting decorations from a locator path.
///
/// `lib/foo.min.js`, `lib/foo.<32-char-hash>.js` and `lib/foo.v1.2.3.js`
/// all reduce to `lib/foo.js`, so differently-decorated references to the
/// same logical module share one registry record.
pub fn default_key_sanitizer(path: &str) -> String {
    let path = MINIFY_MARKER.replace(path, "");
    let path = HASH_MARKER.replace(&path, "");
    VERSION_MARKER.replace(&path, "").into_owned()
}

/// Configuration for one [`Loader`](crate::Loader) instance
#[derive(Clone)]
pub struct LoaderConfig {
    /// Path prefix for library-relative identifiers.
    ///
    /// Normalized to exactly one leading and one trailing slash. Must
    /// differ from `app_base` or [`Loader::new`](crate::Loader::new) fails.
    pub lib_base: String,

    /// Path prefix for namespaced application identifiers.
    pub app_base: String,

    /// Address prefix applied to non-absolute locators before fetching.
    ///
    /// Defaults to the empty prefix, leaving locators root-relative.
    pub address_transform: AddressTransform,

    /// Canonicalizes a locator path into a registry key.
    ///
    /// Defaults to [`default_key_sanitizer`].
    pub key_sanitizer: KeySanitizer,

    /// Hook for non-fatal warnings. Defaults to `tracing::warn!`.
    pub on_warning: WarningHook,

    /// Compatibility mode: attribute anonymous registrations to the most
    /// recently initiated fetch when the host does not bracket execution
    /// with [`Loader::begin_executing`](crate::Loader::begin_executing).
    ///
    /// This heuristic misfires when several executable fetches are in
    /// flight at once; prefer the token bracket where the host allows it.
    pub attribute_by_recent_load: bool,

    /// Unrecognized options, passed through untouched for host use.
    pub extra: HashMap<String, String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            lib_base: "/lib/".to_string(),
            app_base: "/app/".to_string(),
            address_transform: Arc::new(|_: &str, _: bool| String::new()),
            key_sanitizer: Arc::new(|path: &str| default_key_sanitizer(path)),
            on_warning: Arc::new(|warning: &Warning| {
                tracing::warn!(code = warning.code(), "{warning}");
            }),
            attribute_by_recent_load: false,
            extra: HashMap::new(),
        }
    }
}

impl LoaderConfig {
    /// Normalizes the base prefixes and rejects conflicting ones.
    pub(crate) fn validated(mut self) -> Result<Self> {
        self.lib_base = normalize_base(&self.lib_base);
        self.app_base = normalize_base(&self.app_base);
        if self.lib_base == self.app_base {
            return Err(LoaderError::BasesConflict {
                base: self.lib_base,
            });
        }
        Ok(self)
    }
}

fn normalize_base(base: &str) -> String {
    format!("/{}/", base.trim_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizer_strips_each_decoration() {
        assert_eq!(default_key_sanitizer("lib/foo.min.js"), "lib/foo.js");
        assert_eq!(
            default_key_sanitizer("lib/foo.3f9a0b1c2d3e4f5a6b7c8d9e0f1a2b3c.js"),
            "lib/foo.js"
        );
        assert_eq!(default_key_sanitizer("lib/foo.v1.2.3.js"), "lib/foo.js");
        assert_eq!(default_key_sanitizer("lib/foo.js"), "lib/foo.js");
    }

    #[test]
    fn decorated_variants_share_one_key() {
        let variants = [
            "lib/foo.min.js",
            "lib/foo.3f9a0b1c2d3e4f5a6b7c8d9e0f1a2b3c.js",
            "lib/foo.v1.2.3.js",
        ];
        for v in variants {
            assert_eq!(default_key_sanitizer(v), "lib/foo.js");
        }
    }

    #[test]
    fn bases_are_normalized() {
        let config = LoaderConfig {
            lib_base: "lib".to_string(),
            app_base: "app/".to_string(),
            ..Default::default()
        }
        .validated()
        .unwrap();
        assert_eq!(config.lib_base, "/lib/");
        assert_eq!(config.app_base, "/app/");
    }

    #[test]
    fn equal_bases_are_rejected() {
        let config = LoaderConfig {
            lib_base: "shared/".to_string(),
            app_base: "/shared".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validated(),
            Err(LoaderError::BasesConflict { .. })
        ));
    }
}

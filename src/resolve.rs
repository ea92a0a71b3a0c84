// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Path resolution: module identifier -> resource locator + registry key

use crate::config::LoaderConfig;
use crate::error::{LoaderError, Result};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use url::Url;

// Identifiers that already carry an explicit extension, a cache-buster
// marker (`?`) or a fragment marker (`#`) skip the implicit `.js` suffix:
//
//   abc          -> abc.js
//   abc.js       -> abc.js
//   abc.css      -> abc.css
//   abc#         -> abc#
//   abc?123      -> abc?123
static NO_SUFFIX_NEEDED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\.(?:js|css)$|#|\?").expect("suffix pattern"));
static STYLE_EXTENSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\.css(?:$|#|\?)").expect("style pattern"));

/// Outcome of resolving one module identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    /// Full address the backing resource is fetched from
    pub locator: String,
    /// Canonical, decoration-stripped registry key
    pub key: String,
    /// Whether the identifier names a non-executable style resource
    pub is_style: bool,
}

/// Turns identifiers into locators and locators into registry keys.
///
/// Locator-to-key results are memoized per raw input; the same uri is
/// never string-processed twice.
pub(crate) struct PathResolver {
    config: Arc<LoaderConfig>,
    memo: DashMap<String, (String, String)>,
}

impl PathResolver {
    pub(crate) fn new(config: Arc<LoaderConfig>) -> Self {
        Self {
            config,
            memo: DashMap::new(),
        }
    }

    /// Resolves `identifier` against the locator of the requiring module
    /// and an optional base override (used for namespaced identifiers).
    pub(crate) fn resolve(
        &self,
        identifier: &str,
        reference: Option<&str>,
        base_override: Option<&str>,
    ) -> Result<Resolved> {
        let uri = self.name_to_locator(identifier, reference, base_override)?;
        let (locator, key) = self.locate(&uri);
        Ok(Resolved {
            locator,
            key,
            is_style: STYLE_EXTENSION.is_match(&uri),
        })
    }

    /// Applies the implicit `.js` suffix rule, then joins.
    pub(crate) fn name_to_locator(
        &self,
        name: &str,
        reference: Option<&str>,
        base_override: Option<&str>,
    ) -> Result<String> {
        let suffixed = if NO_SUFFIX_NEEDED.is_match(name) {
            name.to_string()
        } else {
            format!("{name}.js")
        };
        self.apply_relative(&suffixed, reference, base_override)
    }

    /// Joins a uri against its reference locator or base prefix.
    ///
    /// Absolute uris pass through unchanged; `./` and `../` uris are
    /// joined against the directory of the reference and canonicalized;
    /// everything else is joined against the base (library base unless
    /// overridden).
    pub(crate) fn apply_relative(
        &self,
        uri: &str,
        reference: Option<&str>,
        base_override: Option<&str>,
    ) -> Result<String> {
        let base = base_override.unwrap_or(&self.config.lib_base);
        let reference = reference.unwrap_or(base);

        if is_absolute(uri) {
            Ok(uri.to_string())
        } else if is_relative(uri) {
            let joined = format!("{}{}", dir_of(reference), uri);
            realpath(&joined).ok_or_else(|| LoaderError::PathUnderflow {
                identifier: uri.to_string(),
                reference: reference.to_string(),
            })
        } else {
            Ok(format!("{}{}", base, uri.trim_start_matches('/')))
        }
    }

    /// Expands a uri into its fetch address and canonical registry key.
    pub(crate) fn locate(&self, uri: &str) -> (String, String) {
        if let Some(hit) = self.memo.get(uri) {
            return hit.clone();
        }

        let address = if is_absolute(uri) {
            uri.to_string()
        } else {
            let is_library = uri.contains(&self.config.lib_base);
            format!("{}{uri}", (self.config.address_transform)(uri, is_library))
        };

        // The key is derived from the path component only; a root-relative
        // address is already all path.
        let path = match Url::parse(&address) {
            Ok(url) => url.path().to_string(),
            Err(_) => address.clone(),
        };
        let key = (self.config.key_sanitizer)(&path);

        self.memo
            .insert(uri.to_string(), (address.clone(), key.clone()));
        (address, key)
    }
}

/// Whether a uri carries a scheme separator.
pub(crate) fn is_absolute(uri: &str) -> bool {
    uri.contains("://")
}

/// Whether an identifier is reference-relative.
pub(crate) fn is_relative(uri: &str) -> bool {
    uri.starts_with("./") || uri.starts_with("../")
}

/// Whether a uri names a style resource.
pub(crate) fn is_style_uri(uri: &str) -> bool {
    STYLE_EXTENSION.is_match(uri)
}

// Everything up to and including the last slash; `.` when there is none.
fn dir_of(uri: &str) -> String {
    match uri.rfind('/') {
        Some(i) => uri[..=i].to_string(),
        None => "./".to_string(),
    }
}

/// Canonicalizes a joined path: `..` pops one prior segment, `.` segments
/// drop, empty segments are preserved (`a//b/c` is a valid uri).
///
/// Returns `None` when `..` would pop past the root of the reference path;
/// that is a configuration error, not a recoverable condition.
fn realpath(path: &str) -> Option<String> {
    let mut out: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            ".." => {
                out.pop()?;
                if out.is_empty() {
                    return None;
                }
            }
            "." => {}
            _ => out.push(part),
        }
    }
    Some(out.join("/"))
}

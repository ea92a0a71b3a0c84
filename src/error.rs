// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error and warning types for the loader
//!
//! Diagnostics come in three tiers:
//! - [`Warning`]: non-fatal, reported through the configured warning hook
//! - [`LoaderError`]: fatal, returned as typed `Err` values
//! - silent no-ops: malformed registration calls are dropped without error

use std::fmt;
use thiserror::Error;

/// Result type for loader operations
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Fatal loader errors
///
/// These are configuration or registration mistakes, not transient runtime
/// conditions; there is no retry path for any of them.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// The library base and the application base resolve to the same prefix
    #[error("libBase and appBase are both '{base}', which is forbidden")]
    BasesConflict {
        /// The conflicting prefix
        base: String,
    },

    /// A relative identifier popped past the root of its reference locator
    #[error("relative identifier '{identifier}' escapes the root of '{reference}'")]
    PathUnderflow {
        /// The offending relative identifier
        identifier: String,
        /// The locator it was resolved against
        reference: String,
    },

    /// An anonymously-registered module was claimed by a finished fetch but
    /// carried neither a factory nor exports
    #[error("anonymous registration claimed by '{locator}' has no factory or exports")]
    IncompleteAnonymousDefinition {
        /// Locator of the fetch that claimed the registration
        locator: String,
    },

    /// An executable resource finished loading without registering a module
    #[error("resource '{locator}' finished loading without defining a module")]
    UndefinedResource {
        /// Locator of the resource
        locator: String,
    },
}

/// Non-fatal diagnostics, delivered through [`LoaderConfig::on_warning`]
///
/// Each variant carries a stable numeric code so hosts can filter on it.
///
/// [`LoaderConfig::on_warning`]: crate::LoaderConfig
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// A registered module identifier contains a path separator where none
    /// was expected (code 100)
    AmbiguousIdentifier {
        /// The identifier as registered
        identifier: String,
    },

    /// A circular dependency was detected; resolution proceeds by treating
    /// the back-edge as already satisfied (code 120)
    CircularDependency {
        /// Locator of the module closing the cycle
        locator: String,
    },
}

impl Warning {
    /// Stable numeric code for this warning
    pub fn code(&self) -> u16 {
        match self {
            Warning::AmbiguousIdentifier { .. } => 100,
            Warning::CircularDependency { .. } => 120,
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::AmbiguousIdentifier { identifier } => {
                write!(f, "module identifier '{identifier}' contains a path separator")
            }
            Warning::CircularDependency { locator } => {
                write!(f, "circular dependency detected at '{locator}'")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warning_codes_are_stable() {
        let w = Warning::AmbiguousIdentifier {
            identifier: "a/b".to_string(),
        };
        assert_eq!(w.code(), 100);

        let w = Warning::CircularDependency {
            locator: "/lib/a.js".to_string(),
        };
        assert_eq!(w.code(), 120);
    }

    #[test]
    fn errors_render_their_context() {
        let err = LoaderError::PathUnderflow {
            identifier: "../x.js".to_string(),
            reference: "a/b.js".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("../x.js"));
        assert!(msg.contains("a/b.js"));
    }
}

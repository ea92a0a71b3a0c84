// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The public registration surface: `define`
//!
//! Registration calls arrive as a loosely-shaped argument vector, the way
//! loaded resources actually issue them; overload resolution reshapes the
//! vector into a record seed. A call whose value argument matches none of
//! the recognized shapes is dropped silently, tolerating malformed or
//! legacy registrations without failing the host.

use crate::error::{Result, Warning};
use crate::loader::Loader;
use crate::registry::{ModuleState, RecordSeed};
use crate::require::{Exports, ExportsTable, Factory, Require};
use std::any::Any;
use std::collections::VecDeque;
use std::sync::Arc;

/// One argument of a registration call.
pub enum DefineArg {
    /// An identifier or a resource locator, depending on position
    Str(String),
    /// A dependency list
    List(Vec<String>),
    /// A factory computing the module's exports on first need
    Factory(Factory),
    /// A directly-supplied exports value
    Exports(Exports),
    /// Sentinel; a trailing `true` declares a batch of resource-only
    /// registrations
    Bool(bool),
}

impl DefineArg {
    /// Convenience constructor for [`DefineArg::Str`].
    pub fn str(value: impl Into<String>) -> Self {
        DefineArg::Str(value.into())
    }

    /// Convenience constructor for [`DefineArg::List`].
    pub fn list<I, S>(identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        DefineArg::List(identifiers.into_iter().map(Into::into).collect())
    }

    /// Convenience constructor for [`DefineArg::Factory`].
    pub fn factory<F>(factory: F) -> Self
    where
        F: Fn(&Loader, &Require, &mut ExportsTable) -> Option<Exports> + Send + Sync + 'static,
    {
        DefineArg::Factory(Arc::new(factory))
    }

    /// Convenience constructor for [`DefineArg::Exports`].
    pub fn exports<T: Any + Send + Sync>(value: T) -> Self {
        DefineArg::Exports(Arc::new(value))
    }
}

// The value position of a registration after overload resolution.
enum DefineValue {
    Locator(String),
    Factory(Factory),
    Exports(Exports),
}

impl Loader {
    /// Registers a module: `define(identifier?, dependencies?, value)`.
    ///
    /// Overload resolution follows the argument shapes: a leading string
    /// is the identifier; if the next argument is not a list it shifts
    /// into the value position; a sole string argument registers a
    /// resource locator. A trailing `Bool(true)` after a run of locator
    /// strings registers each of them as a resource-only module.
    ///
    /// Returns `Ok(())` for silently-dropped malformed calls; `Err` only
    /// for fatal path-resolution failures.
    pub fn define(&self, args: Vec<DefineArg>) -> Result<()> {
        let mut args = VecDeque::from(args);

        if matches!(args.back(), Some(DefineArg::Bool(true))) {
            args.pop_back();
            for arg in args {
                if let DefineArg::Str(locator) = arg {
                    let uri = self.resolver().apply_relative(&locator, None, Some("/"))?;
                    self.register(None, None, DefineValue::Locator(uri))?;
                }
            }
            return Ok(());
        }

        let mut name = match args.front() {
            Some(DefineArg::Str(_)) => match args.pop_front() {
                Some(DefineArg::Str(name)) => Some(name),
                _ => None,
            },
            _ => None,
        };

        let dependencies = match args.front() {
            Some(DefineArg::List(_)) => match args.pop_front() {
                Some(DefineArg::List(list)) => Some(list),
                _ => None,
            },
            // anything else stays put and becomes the value argument
            _ => None,
        };

        let value = match args.pop_front() {
            Some(DefineArg::Str(locator)) => Some(DefineValue::Locator(locator)),
            Some(DefineArg::Factory(factory)) => Some(DefineValue::Factory(factory)),
            Some(DefineArg::Exports(exports)) => Some(DefineValue::Exports(exports)),
            // a list in value position, a stray bool, or nothing at all
            Some(DefineArg::List(_)) | Some(DefineArg::Bool(_)) | None => None,
        };

        let value = match value {
            Some(value) => value,
            // define(locator): a single string registers a resource
            None if name.is_some() && dependencies.is_none() => {
                let locator = name.take().unwrap_or_default();
                let uri = self.resolver().apply_relative(&locator, None, None)?;
                DefineValue::Locator(uri)
            }
            // fail silently
            None => return Ok(()),
        };

        self.register(name, dependencies, value)
    }

    fn register(
        &self,
        name: Option<String>,
        dependencies: Option<Vec<String>>,
        value: DefineValue,
    ) -> Result<()> {
        let mut seed = RecordSeed {
            state: ModuleState::Declaring,
            locator: None,
            dependencies: None,
            factory: None,
            exports: None,
            is_style: false,
        };
        // key computed from the locator value, when there is one
        let mut value_key = None;

        match value {
            DefineValue::Locator(uri) => {
                let (address, key) = self.resolver().locate(&uri);
                seed.is_style = crate::resolve::is_style_uri(&uri);
                seed.locator = Some(address);
                value_key = Some(key);
            }
            DefineValue::Factory(factory) => {
                seed.factory = Some(factory);
                match &dependencies {
                    Some(deps) if !deps.is_empty() => {
                        seed.state = ModuleState::Defined;
                        seed.dependencies = dependencies;
                    }
                    // a standalone module; nothing further to resolve
                    _ => seed.state = ModuleState::Ready,
                }
            }
            DefineValue::Exports(exports) => {
                seed.state = ModuleState::Ready;
                seed.exports = Some(exports);
            }
        }

        let key = match name {
            Some(name) => {
                if name.contains('/') {
                    self.warn(Warning::AmbiguousIdentifier {
                        identifier: name.clone(),
                    });
                }
                let uri = self.resolver().name_to_locator(&name, None, None)?;
                let (address, key) = self.resolver().locate(&uri);
                if seed.locator.is_none() {
                    seed.locator = Some(address);
                }
                key
            }
            None => match value_key {
                Some(key) => key,
                // anonymous: attribute to the executing fetch, or park for
                // the next completing one
                None => match self.fetcher().attribution.current_target() {
                    Some(key) => key,
                    None => {
                        self.fetcher().attribution.park(seed);
                        return Ok(());
                    }
                },
            },
        };

        tracing::debug!(key, state = ?seed.state, "registering module");
        self.registry().merge(&key, seed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoaderConfig;
    use crate::fetch::{LoadToken, ResourceHost};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct NullHost;

    #[async_trait]
    impl ResourceHost for NullHost {
        async fn load_executable(&self, _loader: &Loader, _locator: &str, _token: LoadToken) {}
        async fn load_stylesheet(&self, _loader: &Loader, _locator: &str) {}
    }

    fn loader() -> Loader {
        Loader::new(LoaderConfig::default(), Arc::new(NullHost)).unwrap()
    }

    #[test]
    fn single_string_registers_a_resource() {
        let loader = loader();
        // a sole string is a locator, not an identifier: no implicit suffix
        loader.define(vec![DefineArg::str("widget")]).unwrap();
        loader.registry().with("/lib/widget", |record| {
            assert_eq!(record.state, ModuleState::Declaring);
            assert_eq!(record.locator.as_deref(), Some("/lib/widget"));
        });
    }

    #[test]
    fn named_exports_create_a_terminal_record() {
        let loader = loader();
        loader
            .define(vec![DefineArg::str("answer"), DefineArg::exports(42u32)])
            .unwrap();
        loader.registry().with("/lib/answer.js", |record| {
            let exports = record.exports.clone().unwrap();
            assert_eq!(*exports.downcast_ref::<u32>().unwrap(), 42);
        });
    }

    #[test]
    fn factory_with_dependencies_is_defined() {
        let loader = loader();
        loader
            .define(vec![
                DefineArg::str("widget"),
                DefineArg::list(["./base"]),
                DefineArg::factory(|_, _, _| None),
            ])
            .unwrap();
        loader.registry().with("/lib/widget.js", |record| {
            assert_eq!(record.state, ModuleState::Defined);
            assert_eq!(
                record.dependencies.as_deref(),
                Some(&["./base".to_string()][..])
            );
        });
    }

    #[test]
    fn factory_without_dependencies_is_ready() {
        let loader = loader();
        loader
            .define(vec![
                DefineArg::str("standalone"),
                DefineArg::factory(|_, _, _| None),
            ])
            .unwrap();
        loader.registry().with("/lib/standalone.js", |record| {
            assert_eq!(record.state, ModuleState::Ready);
        });
    }

    #[test]
    fn dependency_list_shifts_when_name_is_absent() {
        let loader = loader();
        // define(deps, factory): anonymous, parked since nothing executes
        loader
            .define(vec![
                DefineArg::list(["./base"]),
                DefineArg::factory(|_, _, _| None),
            ])
            .unwrap();
        let parked = loader.fetcher().attribution.take_parked().unwrap();
        assert_eq!(parked.state, ModuleState::Defined);
    }

    #[test]
    fn unrecognized_value_shapes_fail_silently() {
        let loader = loader();
        loader.define(vec![DefineArg::Bool(false)]).unwrap();
        loader
            .define(vec![DefineArg::str("odd"), DefineArg::list(["x"])])
            .unwrap();
        assert!(!loader.registry().contains("/lib/odd.js"));
    }

    #[test]
    fn trailing_true_registers_a_batch_of_resources() {
        let loader = loader();
        loader
            .define(vec![
                DefineArg::str("http://cdn.example.com/lib/a.js"),
                DefineArg::str("http://cdn.example.com/lib/b.js"),
                DefineArg::Bool(true),
            ])
            .unwrap();
        loader.registry().with("/lib/a.js", |record| {
            assert_eq!(
                record.locator.as_deref(),
                Some("http://cdn.example.com/lib/a.js")
            );
        });
        assert!(loader.registry().contains("/lib/b.js"));
    }

    #[test]
    fn path_separator_in_identifier_warns() {
        let captured = Arc::new(Mutex::new(Vec::new()));
        let sink = captured.clone();
        let config = LoaderConfig {
            on_warning: Arc::new(move |warning: &Warning| {
                sink.lock().unwrap().push(warning.clone());
            }),
            ..Default::default()
        };
        let loader = Loader::new(config, Arc::new(NullHost)).unwrap();
        loader
            .define(vec![DefineArg::str("io/ajax"), DefineArg::exports(())])
            .unwrap();
        let warnings = captured.lock().unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].code(), 100);
    }

    #[test]
    fn bracketed_anonymous_registration_lands_on_the_token_record() {
        let loader = loader();
        let token = LoadToken {
            key: "/lib/widget.js".to_string(),
        };
        loader.begin_executing(&token);
        loader
            .define(vec![DefineArg::factory(|_, _, _| None)])
            .unwrap();
        loader.finish_executing();
        loader.registry().with("/lib/widget.js", |record| {
            assert_eq!(record.state, ModuleState::Ready);
            assert!(record.factory.is_some());
        });
    }
}

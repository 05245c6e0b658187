// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::collections::HashMap;

use tracing::debug;

use catsync_app::normalize_name;
use catsync_core::rig::RigDriver;
use catsync_core::DynResult;

mod dummy;

pub use dummy::DummyRig;

/// Opens a driver. Only simulated rigs are built in, so factories take no
/// transport settings.
pub type BackendFactory = fn() -> DynResult<Box<dyn RigDriver>>;

/// Name to factory map used to open the configured driver.
#[derive(Clone)]
pub struct RegistrationContext {
    factories: HashMap<String, BackendFactory>,
}

impl RegistrationContext {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a factory under a stable name (e.g. "dummy").
    pub fn register_backend(&mut self, name: &str, factory: BackendFactory) {
        self.factories.insert(normalize_name(name), factory);
    }

    pub fn is_backend_registered(&self, name: &str) -> bool {
        self.factories.contains_key(&normalize_name(name))
    }

    /// Registered names, sorted.
    pub fn registered_backends(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Open the driver registered as `name`.
    pub fn build_rig(&self, name: &str) -> DynResult<Box<dyn RigDriver>> {
        let factory = self
            .factories
            .get(&normalize_name(name))
            .ok_or_else(|| format!("Unknown rig backend: {}", name))?;
        debug!("Building driver for {}", normalize_name(name));
        factory()
    }
}

impl Default for RegistrationContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Register every driver built into this crate.
pub fn register_builtin_backends_on(context: &mut RegistrationContext) {
    context.register_backend("dummy", dummy_factory);
}

fn dummy_factory() -> DynResult<Box<dyn RigDriver>> {
    Ok(Box::new(DummyRig::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_names_are_normalized() {
        let mut ctx = RegistrationContext::new();
        register_builtin_backends_on(&mut ctx);
        assert!(ctx.is_backend_registered("Dummy"));
        assert!(ctx.is_backend_registered("du-mmy"));
        assert_eq!(ctx.registered_backends(), vec!["dummy".to_string()]);
    }

    #[test]
    fn test_build_known_and_unknown() {
        let mut ctx = RegistrationContext::default();
        register_builtin_backends_on(&mut ctx);
        let rig = ctx.build_rig("dummy").unwrap();
        assert_eq!(rig.caps().model_name, "Dummy");

        let err = ctx.build_rig("ic7300").err().unwrap();
        assert_eq!(err.to_string(), "Unknown rig backend: ic7300");
    }
}

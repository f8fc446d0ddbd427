//! The brain: owner of every registered ability.
//!
//! Registration runs the ability's one-time init, applies configured option
//! overrides and honours `auto_start`. After that the brain only forwards
//! on/off requests to the per-ability [`AbilitySupervisor`].

use crate::ability::{Ability, AbilityOptions, AbilitySupervisor, CapabilityKind, EventSink};
use crate::config::BrainConfig;
use crate::error::{BrainError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{info, warn};

/// Snapshot of one registered ability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityStatus {
    pub name: String,
    pub capability: CapabilityKind,
    pub on: bool,
    pub auto_start: bool,
}

pub struct Brain {
    sink: Arc<dyn EventSink>,
    config: BrainConfig,
    abilities: RwLock<BTreeMap<String, AbilitySupervisor>>,
}

impl Brain {
    pub fn new(sink: Arc<dyn EventSink>, config: BrainConfig) -> Self {
        Self {
            sink,
            config,
            abilities: RwLock::new(BTreeMap::new()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &BrainConfig {
        &self.config
    }

    /// Register an ability under `name`.
    ///
    /// `options` applies unless the config carries an override for `name`.
    /// When the effective options ask for auto-start the ability is switched
    /// on before this returns, so a tokio runtime must be running.
    ///
    /// # Errors
    ///
    /// Returns [`BrainError::AbilityExists`] for a duplicate name, or the
    /// error from the ability's `init`.
    pub fn register(
        &self,
        name: impl Into<String>,
        implementation: Arc<dyn Ability>,
        options: AbilityOptions,
    ) -> Result<()> {
        let name = name.into();
        if self.read().contains_key(&name) {
            return Err(BrainError::AbilityExists(name));
        }

        if let Some(initializable) = Arc::clone(&implementation).as_initializable() {
            initializable.init().inspect_err(|e| {
                warn!(ability = %name, error = %e, "ability init failed");
            })?;
        }

        let options = self.config.ability_options(&name, options);
        let mut abilities = self.write();
        let supervisor = match abilities.entry(name) {
            Entry::Occupied(entry) => return Err(BrainError::AbilityExists(entry.key().clone())),
            Entry::Vacant(entry) => {
                let key = entry.key().clone();
                entry.insert(AbilitySupervisor::new(
                    key,
                    implementation,
                    Arc::clone(&self.sink),
                    options,
                ))
            }
        };

        info!(
            ability = %supervisor.name(),
            capability = %supervisor.capability_kind(),
            auto_start = options.auto_start,
            "ability registered"
        );

        if options.auto_start {
            supervisor.on();
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`BrainError::UnknownAbility`] if `name` is not registered.
    pub fn on(&self, name: &str) -> Result<()> {
        self.with_ability(name, AbilitySupervisor::on)
    }

    /// # Errors
    ///
    /// Returns [`BrainError::UnknownAbility`] if `name` is not registered.
    pub fn off(&self, name: &str) -> Result<()> {
        self.with_ability(name, AbilitySupervisor::off)
    }

    /// # Errors
    ///
    /// Returns [`BrainError::UnknownAbility`] if `name` is not registered.
    pub fn is_on(&self, name: &str) -> Result<bool> {
        self.with_ability(name, AbilitySupervisor::is_on)
    }

    /// # Errors
    ///
    /// Returns [`BrainError::UnknownAbility`] if `name` is not registered.
    pub fn status(&self, name: &str) -> Result<AbilityStatus> {
        self.with_ability(name, status_of)
    }

    /// Status of every registered ability, sorted by name.
    #[must_use]
    pub fn abilities(&self) -> Vec<AbilityStatus> {
        self.read().values().map(status_of).collect()
    }

    /// Request every ability to switch off.
    pub fn off_all(&self) {
        for supervisor in self.read().values() {
            supervisor.off();
        }
    }

    fn with_ability<T>(&self, name: &str, f: impl FnOnce(&AbilitySupervisor) -> T) -> Result<T> {
        let abilities = self.read();
        let supervisor = abilities
            .get(name)
            .ok_or_else(|| BrainError::UnknownAbility(name.to_owned()))?;
        Ok(f(supervisor))
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, AbilitySupervisor>> {
        self.abilities.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, AbilitySupervisor>> {
        self.abilities.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn status_of(supervisor: &AbilitySupervisor) -> AbilityStatus {
    AbilityStatus {
        name: supervisor.name().to_owned(),
        capability: supervisor.capability_kind(),
        on: supervisor.is_on(),
        auto_start: supervisor.options().auto_start,
    }
}

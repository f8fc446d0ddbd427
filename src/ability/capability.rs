//! Capability shapes an ability implementation may expose.
//!
//! An ability value implements [`Ability`] and opts into any of the three
//! shapes by overriding the matching accessor. The supervisor resolves the
//! shape it drives exactly once, at construction, via [`Capability::resolve`].

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// One-time setup, invoked by the owner before the ability is registered.
pub trait Initializable: Send + Sync {
    fn init(&self) -> Result<()>;
}

/// Synchronous on/off toggle. Must not block for long.
pub trait Activable: Send + Sync {
    fn activate(&self, enabled: bool);
}

/// Long-running task that returns when `cancel` fires or when it finishes or
/// fails on its own.
#[async_trait]
pub trait Runnable: Send + Sync {
    async fn run(&self, cancel: CancellationToken) -> Result<()>;
}

/// A pluggable ability implementation.
///
/// Every accessor defaults to `None`. Implementations return `Some(self)` for
/// each shape they support:
///
/// ```rust,ignore
/// impl Ability for Recorder {
///     fn as_activable(self: Arc<Self>) -> Option<Arc<dyn Activable>> {
///         Some(self)
///     }
/// }
/// ```
pub trait Ability: Send + Sync + 'static {
    fn as_initializable(self: Arc<Self>) -> Option<Arc<dyn Initializable>> {
        None
    }

    fn as_activable(self: Arc<Self>) -> Option<Arc<dyn Activable>> {
        None
    }

    fn as_runnable(self: Arc<Self>) -> Option<Arc<dyn Runnable>> {
        None
    }
}

/// Which shape the supervisor drives for an ability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    Activable,
    Runnable,
    Inert,
}

impl CapabilityKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Activable => "activable",
            Self::Runnable => "runnable",
            Self::Inert => "inert",
        }
    }
}

impl std::fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The resolved capability an ability is driven through.
#[derive(Clone)]
pub enum Capability {
    Activable(Arc<dyn Activable>),
    Runnable(Arc<dyn Runnable>),
    /// Neither shape is present: switching on does no work.
    Inert,
}

impl Capability {
    /// Resolve the capability of `ability`.
    ///
    /// Activable wins over Runnable when an implementation exposes both.
    #[must_use]
    pub fn resolve(ability: &Arc<dyn Ability>) -> Self {
        if let Some(activable) = Arc::clone(ability).as_activable() {
            return Self::Activable(activable);
        }
        if let Some(runnable) = Arc::clone(ability).as_runnable() {
            return Self::Runnable(runnable);
        }
        Self::Inert
    }

    #[must_use]
    pub fn kind(&self) -> CapabilityKind {
        match self {
            Self::Activable(_) => CapabilityKind::Activable,
            Self::Runnable(_) => CapabilityKind::Runnable,
            Self::Inert => CapabilityKind::Inert,
        }
    }
}

impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Capability").field(&self.kind()).finish()
    }
}

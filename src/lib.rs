//! Brain: supervision of named, pluggable abilities.
//!
//! An ability is an independently controllable unit of behaviour hosted by a
//! long-lived process. Each ability exposes one capability shape:
//! - **Activable**: a synchronous on/off toggle
//! - **Runnable**: a long-running task that ends when cancelled, or on its own
//!
//! [`AbilitySupervisor`] switches a single ability on and off, watches it
//! terminate and reports `ability.started` / `ability.stopped` /
//! `ability.crashed` events to an [`EventSink`]. [`Brain`] owns every
//! registered ability, and the [`host`] module exposes it over a JSON-lines
//! command/event bridge.

pub mod abilities;
pub mod ability;
pub mod brain;
pub mod config;
pub mod error;
pub mod host;

pub use ability::{
    Ability, AbilityEvent, AbilityEventKind, AbilityOptions, AbilitySupervisor, Activable,
    BroadcastEventSink, EventSink, Initializable, NoopEventSink, Runnable,
};
pub use brain::{AbilityStatus, Brain};
pub use config::BrainConfig;
pub use error::{BrainError, Result};

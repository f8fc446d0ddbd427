//! Ability capabilities, lifecycle events and the on/off supervisor.

pub mod capability;
pub mod event;
pub mod supervisor;

pub use capability::{Ability, Activable, Capability, CapabilityKind, Initializable, Runnable};
pub use event::{
    AbilityEvent, AbilityEventKind, BroadcastEventSink, EventSink, NoopEventSink,
};
pub use supervisor::{AbilityOptions, AbilitySupervisor};

//! Built-in abilities.

pub mod memory_pressure;
pub mod understanding;

pub use memory_pressure::MemoryPressure;
pub use understanding::{EnergySilenceDetector, SilenceDetector, SpeechParser, Understanding};

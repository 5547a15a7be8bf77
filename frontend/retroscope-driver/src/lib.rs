//! Debugger driver: the execution controller and everything it orchestrates
//! around the emulator host — the machine-state mirror, the time-travel state
//! ring, input recording/playback, the external symbolizer, and persisted
//! configuration.

pub mod config;
pub mod corehost;
pub mod elf;
pub mod input_record;
pub mod machine;
pub mod mainloop;
pub mod source;
pub mod state_ring;
pub mod symbolizer;

#[cfg(test)]
mod testutil;

pub use config::{AppConfig, ConfigError};
pub use corehost::CoreHost;
pub use input_record::{InputRecord, InputRecordError};
pub use machine::{Breakpoint, MachineModel, Register, StackFrame, SystemKind};
pub use mainloop::{Debugger, RunMode, SeekPhase, TickReport};
pub use state_ring::StateRing;
pub use symbolizer::SymbolizerClient;

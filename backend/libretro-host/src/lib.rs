//! Adapter around an opaque emulator plug-in.
//!
//! The plug-in is a dynamic library exporting C entry points; the host loads
//! it at runtime, mediates its environment callback, drives one emulated
//! frame at a time, and captures its serialized machine state. All FFI is
//! confined to this crate: the trampolines in `shared` parse raw pointers
//! into owned data and everything above them is safe Rust.

pub mod abi;
mod audio;
mod debug;
mod environment;
mod host;
mod input;
pub mod options;
mod probe;
mod shared;
mod symbols;
mod video;

pub use audio::AudioRingHandle;
pub use debug::SectionBases;
pub use host::{CoreState, FrameReport, HostConfig, LibretroHost};
pub use input::{KeyEvent, MAX_PORTS};
pub use options::{CoreOptionCatalog, CoreOptionDefinition, CoreOptionValue};
pub use probe::probe_core_options;
pub use video::{FrameView, PixelFormat};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LibretroHostError {
    #[error("Failed to load core library from '{path}': {source}")]
    LoadLibrary {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },
    #[error("Core library is missing required symbol '{name}': {source}")]
    MissingSymbol {
        name: String,
        #[source]
        source: libloading::Error,
    },
    #[error("Core implements plug-in API version {actual}, expected {expected}")]
    ApiVersionMismatch { expected: u32, actual: u32 },
    #[error("Path contains an interior NUL byte: '{0}'")]
    InvalidPath(String),
    #[error("Core failed to load content from '{path}'")]
    LoadGameFailed { path: String },
    #[error("Core does not support state serialization")]
    SerializeUnsupported,
    #[error("Core failed to serialize state ({size} bytes)")]
    SerializeFailed { size: usize },
    #[error("Core failed to restore state ({size} bytes)")]
    UnserializeFailed { size: usize },
}

//! The emulator host: owns the loaded plug-in library and drives it one frame
//! at a time.

use crate::audio::AudioRingHandle;
use crate::input::KeyEvent;
use crate::options::CoreOptionCatalog;
use crate::shared::{self, HostShared};
use crate::symbols::CoreSymbols;
use crate::video::FrameView;
use crate::{LibretroHostError, abi, debug::SectionBases};
use libloading::Library;
use std::ffi::CString;
use std::path::Path;
use std::ptr;

/// Host-side configuration applied before the plug-in starts.
#[derive(Debug, Clone, Default)]
pub struct HostConfig {
    pub system_dir: Option<String>,
    pub save_dir: Option<String>,
    pub audio_enabled: bool,
    pub audio_buffer_ms: u32,
    pub option_overrides: Vec<(String, String)>,
}

/// Lifecycle state after a successful load. `Unloaded` has no representation:
/// it is the absence of a host value, and shutdown consumes the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreState {
    Loaded,
    Running,
    Paused,
}

/// What happened during one `retro_run` call.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameReport {
    pub breakpoint_hit: Option<u32>,
    pub vblank: bool,
}

pub struct LibretroHost {
    symbols: CoreSymbols,
    shared: Box<HostShared>,
    scratch: Vec<u8>,
    av_info: Option<abi::retro_system_av_info>,
    audio_buffer_ms: u32,
    state: CoreState,
    started: bool,
    vblank_callback_active: bool,
    // The library must outlive every resolved function pointer, so it is
    // declared last and dropped last
    library: Library,
}

impl LibretroHost {
    /// Load the plug-in library and resolve its entry points. The emulated
    /// machine is not started yet; call [`Self::start`] next.
    ///
    /// # Errors
    ///
    /// Returns an error if the library cannot be loaded, a required symbol is
    /// missing, or the plug-in targets an unsupported ABI version.
    pub fn load(core_path: &Path, config: &HostConfig) -> Result<Self, LibretroHostError> {
        // SAFETY: loading a conforming plug-in; its initializers follow the
        // adopted ABI contract
        let library = unsafe { Library::new(core_path) }.map_err(|source| {
            LibretroHostError::LoadLibrary { path: core_path.to_path_buf(), source }
        })?;

        // SAFETY: the plug-in exports entry points with the declared signatures
        let symbols = unsafe { CoreSymbols::resolve(&library)? };

        // SAFETY: retro_api_version is callable at any time
        let api_version = unsafe { (symbols.api_version)() };
        if api_version != abi::RETRO_API_VERSION {
            return Err(LibretroHostError::ApiVersionMismatch {
                expected: abi::RETRO_API_VERSION,
                actual: api_version,
            });
        }

        let mut shared = HostShared::new(config.audio_enabled, config.audio_buffer_ms);
        shared.env.set_directories(config.system_dir.as_deref(), config.save_dir.as_deref());
        for (key, value) in &config.option_overrides {
            shared.env.set_option_override(key, Some(value));
        }

        log::info!("Loaded core library from '{}'", core_path.display());

        Ok(Self {
            symbols,
            shared,
            scratch: Vec::new(),
            av_info: None,
            audio_buffer_ms: config.audio_buffer_ms,
            state: CoreState::Loaded,
            started: false,
            vblank_callback_active: false,
            library,
        })
    }

    /// Run the environment handshake, initialize the plug-in, and load the
    /// content at `rom_path`. On success the host is in the `Running` state.
    ///
    /// # Errors
    ///
    /// Returns an error if the content path cannot be represented or the
    /// plug-in rejects the content.
    pub fn start(&mut self, rom_path: &Path) -> Result<(), LibretroHostError> {
        let symbols = self.symbols;
        let shared_ptr: *mut HostShared = &mut *self.shared;

        let path_str = rom_path.display().to_string();
        let c_path = CString::new(path_str.clone())
            .map_err(|_| LibretroHostError::InvalidPath(path_str.clone()))?;
        let game_info = abi::retro_game_info {
            path: c_path.as_ptr(),
            data: ptr::null(),
            size: 0,
            meta: ptr::null(),
        };

        shared::activate(shared_ptr);
        // SAFETY: the standard startup sequence; the environment callback and
        // AV/input callbacks stay valid for the life of the process, and the
        // shared block is active for the duration of every call
        let load_result = unsafe {
            (symbols.set_environment)(shared::environment_callback);
            (symbols.set_video_refresh)(shared::video_refresh_callback);
            (symbols.set_audio_sample)(shared::audio_sample_callback);
            (symbols.set_audio_sample_batch)(shared::audio_sample_batch_callback);
            (symbols.set_input_poll)(shared::input_poll_callback);
            (symbols.set_input_state)(shared::input_state_callback);
            (symbols.init)();
            (symbols.load_game)(&raw const game_info)
        };

        if !load_result {
            // SAFETY: init succeeded, so deinit is the correct unwind
            unsafe {
                (symbols.deinit)();
            }
            shared::deactivate(shared_ptr);
            return Err(LibretroHostError::LoadGameFailed { path: path_str });
        }

        // SAFETY: valid out-pointer, game is loaded
        let av_info = unsafe {
            let mut av_info = std::mem::zeroed::<abi::retro_system_av_info>();
            (symbols.get_system_av_info)(&raw mut av_info);
            av_info
        };
        self.shared.audio.configure(av_info.timing.sample_rate, self.audio_buffer_ms);
        self.av_info = Some(av_info);

        // SAFETY: debug extension symbols follow the declared signatures
        unsafe {
            if let Some(set_hook) = symbols.debug.set_instruction_hook {
                set_hook(Some(shared::instruction_hook));
            }
            self.vblank_callback_active = symbols
                .debug
                .set_vblank_callback
                .is_some_and(|set| set(Some(shared::vblank_callback), ptr::null_mut()));
            if let Some(set_base) = symbols.debug.set_base_callback {
                set_base(Some(shared::debug_base_callback));
            }
        }
        shared::deactivate(shared_ptr);

        self.started = true;
        self.state = CoreState::Running;
        log::info!(
            "Core started: {}x{} @ {:.2} fps",
            av_info.geometry.base_width,
            av_info.geometry.base_height,
            av_info.timing.fps
        );

        Ok(())
    }

    pub fn state(&self) -> CoreState {
        self.state
    }

    /// Whether the plug-in registered a vblank callback during startup. When
    /// it did not, [`Self::run_frame`] reports vblank unconditionally so
    /// end-of-frame snapshots still happen.
    pub fn vblank_callback_active(&self) -> bool {
        self.vblank_callback_active
    }

    pub fn target_fps(&self) -> f64 {
        self.av_info.map_or(60.0, |av_info| av_info.timing.fps)
    }

    /// Advance the emulated machine by one frame: deliver queued key events,
    /// call the plug-in's `run`, and collect the breakpoint/vblank latches the
    /// trampolines raised during the call.
    pub fn run_frame(&mut self) -> FrameReport {
        let symbols = self.symbols;
        let shared_ptr: *mut HostShared = &mut *self.shared;

        let key_events: Vec<KeyEvent> = self.shared.input.drain_key_events().collect();
        let keyboard_callback =
            self.shared.env.keyboard_callback.and_then(|keyboard| keyboard.callback);

        shared::activate(shared_ptr);
        // SAFETY: key events go through the callback the plug-in registered;
        // run executes one frame with the shared block active
        unsafe {
            if let Some(callback) = keyboard_callback {
                for event in key_events {
                    callback(event.pressed, event.keycode, event.character, event.modifiers);
                }
            }
            (symbols.run)();
        }
        shared::deactivate(shared_ptr);

        let breakpoint_hit = self.shared.debug.take_breakpoint_hit();
        let vblank =
            if self.vblank_callback_active { self.shared.debug.take_vblank() } else { true };

        if breakpoint_hit.is_some() {
            self.state = CoreState::Paused;
        }

        FrameReport { breakpoint_hit, vblank }
    }

    /// Serialize the machine into the host's scratch buffer and return it.
    /// The scratch buffer is reused across frames and only ever grows.
    ///
    /// # Errors
    ///
    /// Returns an error if the plug-in does not support serialization or the
    /// serialize call fails.
    pub fn serialize_snapshot(&mut self) -> Result<&[u8], LibretroHostError> {
        let symbols = self.symbols;
        let shared_ptr: *mut HostShared = &mut *self.shared;

        // SAFETY: callable between frames
        let size = unsafe { (symbols.serialize_size)() };
        if size == 0 {
            return Err(LibretroHostError::SerializeUnsupported);
        }

        if self.scratch.len() < size {
            self.scratch.resize(size, 0);
        }

        shared::activate(shared_ptr);
        // SAFETY: the buffer holds at least `size` bytes
        let ok = unsafe { (symbols.serialize)(self.scratch.as_mut_ptr().cast(), size) };
        shared::deactivate(shared_ptr);

        if !ok {
            return Err(LibretroHostError::SerializeFailed { size });
        }
        Ok(&self.scratch[..size])
    }

    /// Restore a snapshot previously produced by [`Self::serialize_snapshot`].
    ///
    /// # Errors
    ///
    /// Returns an error if the plug-in rejects the snapshot bytes.
    pub fn unserialize(&mut self, bytes: &[u8]) -> Result<(), LibretroHostError> {
        let symbols = self.symbols;
        let shared_ptr: *mut HostShared = &mut *self.shared;

        shared::activate(shared_ptr);
        // SAFETY: the snapshot is self-contained and sized by its producer
        let ok = unsafe { (symbols.unserialize)(bytes.as_ptr().cast(), bytes.len()) };
        shared::deactivate(shared_ptr);

        if !ok {
            return Err(LibretroHostError::UnserializeFailed { size: bytes.len() });
        }
        Ok(())
    }

    /// Pause or resume the emulated machine, mirroring the state to the
    /// plug-in's debug extension when it exposes one.
    pub fn set_paused(&mut self, paused: bool) {
        if !self.started {
            return;
        }

        self.shared.debug.paused = paused;
        self.state = if paused { CoreState::Paused } else { CoreState::Running };

        if let Some(set_paused) = self.symbols.debug.set_paused {
            let shared_ptr: *mut HostShared = &mut *self.shared;
            shared::activate(shared_ptr);
            // SAFETY: debug extension call
            unsafe {
                set_paused(paused);
            }
            shared::deactivate(shared_ptr);
        }
    }

    /// The plug-in's own notion of paused, when exposed.
    pub fn plugin_paused(&mut self) -> Option<bool> {
        let is_paused = self.symbols.debug.is_paused?;
        let shared_ptr: *mut HostShared = &mut *self.shared;
        shared::activate(shared_ptr);
        // SAFETY: debug extension call
        let paused = unsafe { is_paused() };
        shared::deactivate(shared_ptr);
        Some(paused)
    }

    pub fn read_registers(&mut self, out: &mut [u32]) -> usize {
        self.debug_read(self.symbols.debug.read_registers, out)
    }

    /// Return-address trail from the emulated stack, outermost return site
    /// first, as delivered by the plug-in.
    pub fn read_callstack(&mut self, out: &mut [u32]) -> usize {
        self.debug_read(self.symbols.debug.read_callstack, out)
    }

    pub fn read_vram(&mut self, out: &mut [u8]) -> usize {
        self.debug_read(self.symbols.debug.read_vram, out)
    }

    /// Profiler checkpoint histograms. The bytes are opaque to the host.
    pub fn read_checkpoints(&mut self, out: &mut [u8]) -> usize {
        self.debug_read(self.symbols.debug.read_checkpoints, out)
    }

    fn debug_read<T>(
        &mut self,
        symbol: Option<unsafe extern "C" fn(*mut T, usize) -> usize>,
        out: &mut [T],
    ) -> usize {
        let Some(read) = symbol else { return 0 };
        let shared_ptr: *mut HostShared = &mut *self.shared;

        shared::activate(shared_ptr);
        // SAFETY: the plug-in writes at most `cap` elements
        let count = unsafe { read(out.as_mut_ptr(), out.len()) };
        shared::deactivate(shared_ptr);

        count.min(out.len())
    }

    pub fn set_breakpoint(&mut self, addr: u32, enabled: bool) {
        self.shared.debug.set_breakpoint(addr, enabled);
    }

    pub fn remove_breakpoint(&mut self, addr: u32) {
        self.shared.debug.remove_breakpoint(addr);
    }

    /// Temporarily lift the breakpoint at `addr` for one instruction; the
    /// instruction hook rearms it at the next differing PC.
    pub fn suppress_breakpoint_at(&mut self, addr: u32) -> bool {
        self.shared.debug.suppress_breakpoint(addr)
    }

    pub fn section_bases(&self) -> SectionBases {
        self.shared.debug.section_bases()
    }

    pub fn set_joypad(&mut self, port: u32, button_id: u32, pressed: bool) {
        self.shared.input.set_joypad(port, button_id, pressed);
    }

    pub fn clear_joypad_state(&mut self) {
        self.shared.input.clear_all();
    }

    pub fn queue_key_event(&mut self, event: KeyEvent) {
        self.shared.input.queue_key_event(event);
    }

    pub fn frame(&self) -> Option<FrameView<'_>> {
        self.shared.video.frame()
    }

    pub fn audio_handle(&self) -> AudioRingHandle {
        self.shared.audio.handle()
    }

    pub fn set_audio_enabled(&mut self, enabled: bool) {
        self.shared.audio.set_enabled(enabled);
    }

    pub fn options(&self) -> &CoreOptionCatalog {
        &self.shared.env.options
    }

    pub fn set_core_option(&mut self, key: &str, value: Option<&str>) {
        self.shared.env.set_option_override(key, value);
    }

    pub fn checkpoint_enabled(&mut self) -> Option<bool> {
        let get_enabled = self.symbols.debug.checkpoint_get_enabled?;
        // SAFETY: debug extension call
        Some(unsafe { get_enabled() })
    }

    pub fn set_checkpoint_enabled(&mut self, enabled: bool) {
        if let Some(set_enabled) = self.symbols.debug.checkpoint_set_enabled {
            // SAFETY: debug extension call
            unsafe {
                set_enabled(enabled);
            }
        }
    }

    pub fn reset_checkpoints(&mut self) {
        if let Some(reset) = self.symbols.debug.checkpoint_reset {
            // SAFETY: debug extension call
            unsafe {
                reset();
            }
        }
    }

    pub fn profiler_enabled(&mut self) -> Option<bool> {
        let get_enabled = self.symbols.debug.profiler_get_enabled?;
        // SAFETY: debug extension call
        Some(unsafe { get_enabled() })
    }

    fn shutdown_internal(&mut self) {
        if !self.started {
            return;
        }
        self.started = false;

        let symbols = self.symbols;
        let shared_ptr: *mut HostShared = &mut *self.shared;

        shared::activate(shared_ptr);
        // SAFETY: unload/deinit are the inverse of the startup sequence and
        // are always called exactly once
        unsafe {
            if let Some(set_hook) = symbols.debug.set_instruction_hook {
                set_hook(None);
            }
            (symbols.unload_game)();
            (symbols.deinit)();
        }
        shared::deactivate(shared_ptr);

        log::info!("Core shut down");
    }

    /// Shut down the plug-in and unload the library. Reachable from any
    /// state; `Drop` performs the same sequence if this is never called.
    pub fn shutdown(mut self) {
        self.shutdown_internal();
    }
}

impl Drop for LibretroHost {
    fn drop(&mut self) {
        self.shutdown_internal();
    }
}

impl std::fmt::Debug for LibretroHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibretroHost")
            .field("state", &self.state)
            .field("started", &self.started)
            .field("library", &self.library)
            .finish_non_exhaustive()
    }
}

//! Host state reachable from the plug-in's C callbacks, plus the trampolines
//! themselves.
//!
//! The plug-in ABI carries no user-data pointer on its callbacks, so the host
//! installs a pointer to its [`HostShared`] block in a thread-local slot for
//! the duration of every call into the plug-in. The core contract is
//! single-threaded: every plug-in entry point is invoked from the main thread,
//! and every callback arrives synchronously from within one of those calls.

use crate::audio::AudioSink;
use crate::environment::{self, EnvironmentState};
use crate::input::InputState;
use crate::video::VideoBuffer;
use crate::{abi, debug::DebugState};
use retroscope_common::addr::mask_code_address;
use std::cell::Cell;
use std::ffi::{CStr, c_char, c_void};
use std::ptr;
use std::slice;

pub(crate) struct HostShared {
    pub env: EnvironmentState,
    pub video: VideoBuffer,
    pub audio: AudioSink,
    pub input: InputState,
    pub debug: DebugState,
}

impl HostShared {
    pub fn new(audio_enabled: bool, audio_buffer_ms: u32) -> Box<Self> {
        Box::new(Self {
            env: EnvironmentState::default(),
            video: VideoBuffer::default(),
            audio: AudioSink::new(audio_enabled, audio_buffer_ms),
            input: InputState::default(),
            debug: DebugState::default(),
        })
    }
}

thread_local! {
    static ACTIVE: Cell<*mut HostShared> = const { Cell::new(ptr::null_mut()) };
}

/// Install `shared` as the callback target. The pointer must stay valid until
/// [`deactivate`] is called with the same pointer.
pub(crate) fn activate(shared: *mut HostShared) {
    ACTIVE.with(|active| active.set(shared));
}

pub(crate) fn deactivate(shared: *mut HostShared) {
    ACTIVE.with(|active| {
        if active.get() == shared {
            active.set(ptr::null_mut());
        }
    });
}

/// Run `f` against the active shared block, or return `None` when no host is
/// active (a callback arriving outside any plug-in call).
pub(crate) fn with_active<R>(f: impl FnOnce(&mut HostShared) -> R) -> Option<R> {
    ACTIVE.with(|active| {
        let ptr = active.get();
        if ptr.is_null() {
            return None;
        }

        // SAFETY: the host guarantees the installed pointer outlives its
        // activation window, and no Rust reference to the block is live while
        // control is inside the plug-in
        Some(f(unsafe { &mut *ptr }))
    })
}

pub(crate) unsafe extern "C" fn environment_callback(cmd: u32, data: *mut c_void) -> bool {
    with_active(|shared| unsafe { environment::dispatch(shared, cmd, data) }).unwrap_or(false)
}

pub(crate) unsafe extern "C" fn video_refresh_callback(
    data: *const c_void,
    width: u32,
    height: u32,
    pitch: usize,
) {
    // Null data is a dupe frame: the previous framebuffer still applies
    if data.is_null() {
        return;
    }

    with_active(|shared| {
        let len = pitch * height as usize;
        // SAFETY: the plug-in hands us pitch * height valid bytes for the
        // duration of this call
        let pixels = unsafe { slice::from_raw_parts(data.cast::<u8>(), len) };
        shared.video.publish(pixels, width, height, pitch);
    });
}

pub(crate) unsafe extern "C" fn audio_sample_callback(left: i16, right: i16) {
    with_active(|shared| shared.audio.push_pair(left, right));
}

pub(crate) unsafe extern "C" fn audio_sample_batch_callback(
    data: *const i16,
    frames: usize,
) -> usize {
    if data.is_null() {
        return 0;
    }

    with_active(|shared| {
        // SAFETY: the plug-in hands us `frames` interleaved stereo frames
        let samples = unsafe { slice::from_raw_parts(data, frames * 2) };
        shared.audio.push_batch(samples);
        frames
    })
    .unwrap_or(0)
}

pub(crate) unsafe extern "C" fn input_poll_callback() {
    // Input is delivered ahead of each frame; nothing to latch here
}

pub(crate) unsafe extern "C" fn input_state_callback(
    port: u32,
    device: u32,
    _index: u32,
    id: u32,
) -> i16 {
    if device != abi::RETRO_DEVICE_JOYPAD {
        return 0;
    }

    with_active(|shared| i16::from(shared.input.joypad_pressed(port, id))).unwrap_or(0)
}

/// Per-instruction breakpoint test. Returning `true` tells the plug-in to stop
/// before executing the instruction at `pc`.
pub(crate) unsafe extern "C" fn instruction_hook(pc: u32) -> bool {
    with_active(|shared| {
        let pc = mask_code_address(pc);
        shared.debug.instruction_at(pc)
    })
    .unwrap_or(false)
}

pub(crate) unsafe extern "C" fn vblank_callback(_user: *mut c_void) {
    with_active(|shared| shared.debug.note_vblank());
}

pub(crate) unsafe extern "C" fn debug_base_callback(section: u32, base: u32) {
    with_active(|shared| shared.debug.set_section_base(section, base));
}

unsafe extern "C" fn core_log_stub(level: u32, fmt: *const c_char) {
    if fmt.is_null() {
        return;
    }

    // Varargs cannot be expanded portably from stable Rust; log the raw
    // format string, which is still useful for core diagnostics
    // SAFETY: the plug-in passes a NUL-terminated format string
    let message = unsafe { CStr::from_ptr(fmt) }.to_string_lossy();
    let message = message.trim_end();
    match level {
        0 => log::debug!("core: {message}"),
        2 => log::warn!("core: {message}"),
        3 => log::error!("core: {message}"),
        _ => log::info!("core: {message}"),
    }
}

pub(crate) fn log_printf_fn() -> abi::retro_log_printf_t {
    // SAFETY: a variadic C function may be entered through a non-variadic
    // pointer as long as the callee only reads its named parameters, which the
    // stub guarantees
    unsafe {
        std::mem::transmute::<unsafe extern "C" fn(u32, *const c_char), abi::retro_log_printf_t>(
            core_log_stub,
        )
    }
}

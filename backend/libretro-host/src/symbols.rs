//! Entry point resolution for a loaded plug-in library.

use crate::{LibretroHostError, abi};
use libloading::Library;

/// The required C entry points of a conforming plug-in, resolved once at load
/// time. Function pointers are copied out of the `libloading` symbols; they
/// remain valid for as long as the owning [`Library`] stays loaded, which the
/// host guarantees by dropping the library last.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CoreSymbols {
    pub set_environment: abi::RetroSetEnvironmentFn,
    pub set_video_refresh: abi::RetroSetVideoRefreshFn,
    pub set_audio_sample: abi::RetroSetAudioSampleFn,
    pub set_audio_sample_batch: abi::RetroSetAudioSampleBatchFn,
    pub set_input_poll: abi::RetroSetInputPollFn,
    pub set_input_state: abi::RetroSetInputStateFn,
    pub init: abi::RetroInitFn,
    pub deinit: abi::RetroDeinitFn,
    pub api_version: abi::RetroApiVersionFn,
    pub get_system_av_info: abi::RetroGetSystemAvInfoFn,
    pub run: abi::RetroRunFn,
    pub serialize_size: abi::RetroSerializeSizeFn,
    pub serialize: abi::RetroSerializeFn,
    pub unserialize: abi::RetroUnserializeFn,
    pub load_game: abi::RetroLoadGameFn,
    pub unload_game: abi::RetroUnloadGameFn,
    pub debug: DebugSymbols,
}

/// Debug extension entry points. All optional: a plug-in without them still
/// runs, but the corresponding debugger features degrade.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct DebugSymbols {
    pub read_registers: Option<abi::RetroDebugReadRegistersFn>,
    pub read_callstack: Option<abi::RetroDebugReadCallstackFn>,
    pub read_vram: Option<abi::RetroDebugReadVramFn>,
    pub read_checkpoints: Option<abi::RetroDebugReadCheckpointsFn>,
    pub set_paused: Option<abi::RetroDebugSetPausedFn>,
    pub is_paused: Option<abi::RetroDebugIsPausedFn>,
    pub set_instruction_hook: Option<abi::RetroDebugSetInstructionHookFn>,
    pub set_vblank_callback: Option<abi::RetroDebugSetVblankCallbackFn>,
    pub set_base_callback: Option<abi::RetroDebugSetBaseCallbackFn>,
    pub checkpoint_set_enabled: Option<abi::RetroDebugCheckpointSetEnabledFn>,
    pub checkpoint_get_enabled: Option<abi::RetroDebugCheckpointGetEnabledFn>,
    pub checkpoint_reset: Option<abi::RetroDebugCheckpointResetFn>,
    pub profiler_get_enabled: Option<abi::RetroDebugProfilerGetEnabledFn>,
}

impl CoreSymbols {
    /// # Safety
    ///
    /// The library must export the standard plug-in entry points with the
    /// signatures declared in [`abi`].
    pub unsafe fn resolve(library: &Library) -> Result<Self, LibretroHostError> {
        // SAFETY: signatures guaranteed by caller
        unsafe {
            Ok(Self {
                set_environment: required(library, "retro_set_environment")?,
                set_video_refresh: required(library, "retro_set_video_refresh")?,
                set_audio_sample: required(library, "retro_set_audio_sample")?,
                set_audio_sample_batch: required(library, "retro_set_audio_sample_batch")?,
                set_input_poll: required(library, "retro_set_input_poll")?,
                set_input_state: required(library, "retro_set_input_state")?,
                init: required(library, "retro_init")?,
                deinit: required(library, "retro_deinit")?,
                api_version: required(library, "retro_api_version")?,
                get_system_av_info: required(library, "retro_get_system_av_info")?,
                run: required(library, "retro_run")?,
                serialize_size: required(library, "retro_serialize_size")?,
                serialize: required(library, "retro_serialize")?,
                unserialize: required(library, "retro_unserialize")?,
                load_game: required(library, "retro_load_game")?,
                unload_game: required(library, "retro_unload_game")?,
                debug: DebugSymbols::resolve(library),
            })
        }
    }
}

impl DebugSymbols {
    /// # Safety
    ///
    /// Any debug extension symbols the library exports must have the
    /// signatures declared in [`abi`].
    pub unsafe fn resolve(library: &Library) -> Self {
        // SAFETY: signatures guaranteed by caller
        unsafe {
            Self {
                read_registers: optional(library, "retro_debug_read_registers"),
                read_callstack: optional(library, "retro_debug_read_callstack"),
                read_vram: optional(library, "retro_debug_read_vram"),
                read_checkpoints: optional(library, "retro_debug_read_checkpoints"),
                set_paused: optional(library, "retro_debug_set_paused"),
                is_paused: optional(library, "retro_debug_is_paused"),
                set_instruction_hook: optional(library, "retro_debug_set_instruction_hook"),
                set_vblank_callback: optional(library, "retro_debug_set_vblank_callback"),
                set_base_callback: optional(library, "retro_debug_set_base_callback"),
                checkpoint_set_enabled: optional(library, "retro_debug_checkpoint_set_enabled"),
                checkpoint_get_enabled: optional(library, "retro_debug_checkpoint_get_enabled"),
                checkpoint_reset: optional(library, "retro_debug_checkpoint_reset"),
                profiler_get_enabled: optional(library, "retro_debug_profiler_is_enabled"),
            }
        }
    }
}

/// # Safety
///
/// `T` must be the correct function pointer type for the named symbol.
unsafe fn required<T: Copy>(library: &Library, name: &str) -> Result<T, LibretroHostError> {
    // SAFETY: guaranteed by caller
    let symbol = unsafe {
        library.get::<T>(name.as_bytes()).map_err(|source| LibretroHostError::MissingSymbol {
            name: name.to_owned(),
            source,
        })?
    };
    Ok(*symbol)
}

/// # Safety
///
/// `T` must be the correct function pointer type for the named symbol.
unsafe fn optional<T: Copy>(library: &Library, name: &str) -> Option<T> {
    // SAFETY: guaranteed by caller
    unsafe { library.get::<T>(name.as_bytes()).ok().map(|symbol| *symbol) }
}

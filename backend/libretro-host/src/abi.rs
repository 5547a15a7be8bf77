//! Raw C ABI of the emulator plug-in contract.
//!
//! These definitions mirror the plug-in's `libretro.h` plus the debug
//! extension entry points. They are adopted, not defined here: a conforming
//! plug-in exports the entry-point symbols and calls the environment callback
//! with these command numbers and structures.

#![allow(non_camel_case_types)]

use std::ffi::{c_char, c_void};

pub const RETRO_API_VERSION: u32 = 1;

// Environment commands recognized by the host
pub const RETRO_ENVIRONMENT_SET_ROTATION: u32 = 1;
pub const RETRO_ENVIRONMENT_SET_PERFORMANCE_LEVEL: u32 = 8;
pub const RETRO_ENVIRONMENT_GET_SYSTEM_DIRECTORY: u32 = 9;
pub const RETRO_ENVIRONMENT_SET_PIXEL_FORMAT: u32 = 10;
pub const RETRO_ENVIRONMENT_SET_INPUT_DESCRIPTORS: u32 = 11;
pub const RETRO_ENVIRONMENT_SET_KEYBOARD_CALLBACK: u32 = 12;
pub const RETRO_ENVIRONMENT_SET_DISK_CONTROL_INTERFACE: u32 = 13;
pub const RETRO_ENVIRONMENT_GET_VARIABLE: u32 = 15;
pub const RETRO_ENVIRONMENT_SET_SUPPORT_NO_GAME: u32 = 18;
pub const RETRO_ENVIRONMENT_GET_LOG_INTERFACE: u32 = 27;
pub const RETRO_ENVIRONMENT_GET_SAVE_DIRECTORY: u32 = 31;
pub const RETRO_ENVIRONMENT_SET_CONTROLLER_INFO: u32 = 35;
pub const RETRO_ENVIRONMENT_GET_CORE_OPTIONS_VERSION: u32 = 52;
pub const RETRO_ENVIRONMENT_SET_CORE_OPTIONS: u32 = 53;
pub const RETRO_ENVIRONMENT_SET_CORE_OPTIONS_INTL: u32 = 54;
pub const RETRO_ENVIRONMENT_SET_CORE_OPTIONS_DISPLAY: u32 = 55;
pub const RETRO_ENVIRONMENT_GET_DISK_CONTROL_INTERFACE_VERSION: u32 = 57;
pub const RETRO_ENVIRONMENT_SET_DISK_CONTROL_EXT_INTERFACE: u32 = 58;
pub const RETRO_ENVIRONMENT_SET_CORE_OPTIONS_V2: u32 = 67;
pub const RETRO_ENVIRONMENT_SET_CORE_OPTIONS_V2_INTL: u32 = 68;
pub const RETRO_ENVIRONMENT_SET_CORE_OPTIONS_UPDATE_DISPLAY_CALLBACK: u32 = 69;

pub const RETRO_DEVICE_JOYPAD: u32 = 1;

pub const RETRO_DEVICE_ID_JOYPAD_B: u32 = 0;
pub const RETRO_DEVICE_ID_JOYPAD_Y: u32 = 1;
pub const RETRO_DEVICE_ID_JOYPAD_SELECT: u32 = 2;
pub const RETRO_DEVICE_ID_JOYPAD_START: u32 = 3;
pub const RETRO_DEVICE_ID_JOYPAD_UP: u32 = 4;
pub const RETRO_DEVICE_ID_JOYPAD_DOWN: u32 = 5;
pub const RETRO_DEVICE_ID_JOYPAD_LEFT: u32 = 6;
pub const RETRO_DEVICE_ID_JOYPAD_RIGHT: u32 = 7;
pub const RETRO_DEVICE_ID_JOYPAD_A: u32 = 8;
pub const RETRO_DEVICE_ID_JOYPAD_X: u32 = 9;

pub const RETRO_NUM_CORE_OPTION_VALUES_MAX: usize = 32;

pub const RETRO_PIXEL_FORMAT_0RGB1555: u32 = 0;
pub const RETRO_PIXEL_FORMAT_XRGB8888: u32 = 1;
pub const RETRO_PIXEL_FORMAT_RGB565: u32 = 2;

pub type retro_environment_t = unsafe extern "C" fn(cmd: u32, data: *mut c_void) -> bool;
pub type retro_video_refresh_t =
    unsafe extern "C" fn(data: *const c_void, width: u32, height: u32, pitch: usize);
pub type retro_audio_sample_t = unsafe extern "C" fn(left: i16, right: i16);
pub type retro_audio_sample_batch_t =
    unsafe extern "C" fn(data: *const i16, frames: usize) -> usize;
pub type retro_input_poll_t = unsafe extern "C" fn();
pub type retro_input_state_t =
    unsafe extern "C" fn(port: u32, device: u32, index: u32, id: u32) -> i16;
pub type retro_log_printf_t = unsafe extern "C" fn(level: u32, fmt: *const c_char, ...);
pub type retro_keyboard_event_t =
    unsafe extern "C" fn(down: bool, keycode: u32, character: u32, key_modifiers: u16);

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct retro_log_callback {
    pub log: retro_log_printf_t,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct retro_keyboard_callback {
    pub callback: Option<retro_keyboard_event_t>,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct retro_variable {
    pub key: *const c_char,
    pub value: *const c_char,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct retro_game_info {
    pub path: *const c_char,
    pub data: *const c_void,
    pub size: usize,
    pub meta: *const c_char,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct retro_game_geometry {
    pub base_width: u32,
    pub base_height: u32,
    pub max_width: u32,
    pub max_height: u32,
    pub aspect_ratio: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct retro_system_timing {
    pub fps: f64,
    pub sample_rate: f64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct retro_system_av_info {
    pub geometry: retro_game_geometry,
    pub timing: retro_system_timing,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct retro_core_option_value {
    pub value: *const c_char,
    pub label: *const c_char,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct retro_core_option_definition {
    pub key: *const c_char,
    pub desc: *const c_char,
    pub info: *const c_char,
    pub values: [retro_core_option_value; RETRO_NUM_CORE_OPTION_VALUES_MAX + 1],
    pub default_value: *const c_char,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct retro_core_options_intl {
    pub us: *const retro_core_option_definition,
    pub local: *const retro_core_option_definition,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct retro_core_option_v2_category {
    pub key: *const c_char,
    pub desc: *const c_char,
    pub info: *const c_char,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct retro_core_option_v2_definition {
    pub key: *const c_char,
    pub desc: *const c_char,
    pub desc_categorized: *const c_char,
    pub info: *const c_char,
    pub info_categorized: *const c_char,
    pub category_key: *const c_char,
    pub values: [retro_core_option_value; RETRO_NUM_CORE_OPTION_VALUES_MAX + 1],
    pub default_value: *const c_char,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct retro_core_options_v2 {
    pub categories: *mut retro_core_option_v2_category,
    pub definitions: *mut retro_core_option_v2_definition,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct retro_core_options_v2_intl {
    pub us: *mut retro_core_options_v2,
    pub local: *mut retro_core_options_v2,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct retro_disk_control_callback {
    pub set_eject_state: Option<unsafe extern "C" fn(ejected: bool) -> bool>,
    pub get_eject_state: Option<unsafe extern "C" fn() -> bool>,
    pub get_image_index: Option<unsafe extern "C" fn() -> u32>,
    pub set_image_index: Option<unsafe extern "C" fn(index: u32) -> bool>,
    pub get_num_images: Option<unsafe extern "C" fn() -> u32>,
    pub replace_image_index:
        Option<unsafe extern "C" fn(index: u32, info: *const retro_game_info) -> bool>,
    pub add_image_index: Option<unsafe extern "C" fn() -> bool>,
}

// Debug extension: optional symbols a debuggable plug-in exports alongside the
// standard entry points. Reads copy into caller-provided buffers and return
// the element/byte count written.
pub type retro_debug_instruction_hook_t = unsafe extern "C" fn(pc: u32) -> bool;
pub type retro_debug_vblank_t = unsafe extern "C" fn(user: *mut c_void);
pub type retro_debug_base_t = unsafe extern "C" fn(section: u32, base: u32);

// Core entry point signatures
pub type RetroSetEnvironmentFn = unsafe extern "C" fn(retro_environment_t);
pub type RetroSetVideoRefreshFn = unsafe extern "C" fn(retro_video_refresh_t);
pub type RetroSetAudioSampleFn = unsafe extern "C" fn(retro_audio_sample_t);
pub type RetroSetAudioSampleBatchFn = unsafe extern "C" fn(retro_audio_sample_batch_t);
pub type RetroSetInputPollFn = unsafe extern "C" fn(retro_input_poll_t);
pub type RetroSetInputStateFn = unsafe extern "C" fn(retro_input_state_t);
pub type RetroInitFn = unsafe extern "C" fn();
pub type RetroDeinitFn = unsafe extern "C" fn();
pub type RetroApiVersionFn = unsafe extern "C" fn() -> u32;
pub type RetroGetSystemAvInfoFn = unsafe extern "C" fn(info: *mut retro_system_av_info);
pub type RetroRunFn = unsafe extern "C" fn();
pub type RetroSerializeSizeFn = unsafe extern "C" fn() -> usize;
pub type RetroSerializeFn = unsafe extern "C" fn(data: *mut c_void, size: usize) -> bool;
pub type RetroUnserializeFn = unsafe extern "C" fn(data: *const c_void, size: usize) -> bool;
pub type RetroLoadGameFn = unsafe extern "C" fn(game: *const retro_game_info) -> bool;
pub type RetroUnloadGameFn = unsafe extern "C" fn();

// Debug extension entry point signatures
pub type RetroDebugReadRegistersFn = unsafe extern "C" fn(out: *mut u32, cap: usize) -> usize;
pub type RetroDebugReadCallstackFn = unsafe extern "C" fn(out: *mut u32, cap: usize) -> usize;
pub type RetroDebugReadVramFn = unsafe extern "C" fn(out: *mut u8, cap: usize) -> usize;
pub type RetroDebugReadCheckpointsFn = unsafe extern "C" fn(out: *mut u8, cap: usize) -> usize;
pub type RetroDebugSetPausedFn = unsafe extern "C" fn(paused: bool);
pub type RetroDebugIsPausedFn = unsafe extern "C" fn() -> bool;
pub type RetroDebugSetInstructionHookFn =
    unsafe extern "C" fn(hook: Option<retro_debug_instruction_hook_t>);
pub type RetroDebugSetVblankCallbackFn =
    unsafe extern "C" fn(callback: Option<retro_debug_vblank_t>, user: *mut c_void) -> bool;
pub type RetroDebugSetBaseCallbackFn =
    unsafe extern "C" fn(callback: Option<retro_debug_base_t>) -> bool;
pub type RetroDebugCheckpointSetEnabledFn = unsafe extern "C" fn(enabled: bool);
pub type RetroDebugCheckpointGetEnabledFn = unsafe extern "C" fn() -> bool;
pub type RetroDebugCheckpointResetFn = unsafe extern "C" fn();
pub type RetroDebugProfilerGetEnabledFn = unsafe extern "C" fn() -> bool;

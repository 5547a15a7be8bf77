//! Dispatch for the plug-in's environment callback.
//!
//! A single function receives every service request the plug-in makes. The
//! recognized command set is closed: anything else returns `false` and the
//! plug-in carries on without the capability.

use crate::options::{self, CoreOptionCatalog};
use crate::shared::{self, HostShared};
use crate::video::PixelFormat;
use crate::abi;
use rustc_hash::FxHashMap;
use std::ffi::{CString, c_char, c_void};

#[derive(Debug, Default)]
pub(crate) struct EnvironmentState {
    pub options: CoreOptionCatalog,
    overrides: FxHashMap<String, String>,
    variable_values: FxHashMap<String, CString>,
    pub system_dir: Option<CString>,
    pub save_dir: Option<CString>,
    pub support_no_game: bool,
    pub rotation: u32,
    pub performance_level: u32,
    pub keyboard_callback: Option<abi::retro_keyboard_callback>,
    pub disk_control: Option<abi::retro_disk_control_callback>,
}

impl EnvironmentState {
    pub fn set_directories(&mut self, system_dir: Option<&str>, save_dir: Option<&str>) {
        self.system_dir = system_dir.and_then(|dir| CString::new(dir).ok());
        self.save_dir = save_dir.and_then(|dir| CString::new(dir).ok());
    }

    /// Set or clear a configured value for a core option key. A `None` value
    /// reverts the key to the catalogue default.
    pub fn set_option_override(&mut self, key: &str, value: Option<&str>) {
        match value {
            Some(value) => {
                self.overrides.insert(key.to_owned(), value.to_owned());
            }
            None => {
                self.overrides.remove(key);
            }
        }
        self.variable_values.remove(key);
    }

    /// Current value for a key: the configured override if one is set,
    /// otherwise the default captured from the option catalogue.
    fn variable_value(&mut self, key: &str) -> Option<*const c_char> {
        if !self.variable_values.contains_key(key) {
            let value = self
                .overrides
                .get(key)
                .map(String::as_str)
                .or_else(|| self.options.default_value_for(key))?;
            self.variable_values.insert(key.to_owned(), CString::new(value).ok()?);
        }

        Some(self.variable_values[key].as_ptr())
    }
}

/// # Safety
///
/// `data` must be the payload the ABI defines for `cmd`.
pub(crate) unsafe fn dispatch(shared: &mut HostShared, cmd: u32, data: *mut c_void) -> bool {
    match cmd {
        abi::RETRO_ENVIRONMENT_GET_LOG_INTERFACE => {
            if data.is_null() {
                return false;
            }
            // SAFETY: payload is retro_log_callback
            unsafe {
                (*data.cast::<abi::retro_log_callback>()).log = shared::log_printf_fn();
            }
            true
        }
        abi::RETRO_ENVIRONMENT_GET_CORE_OPTIONS_VERSION => {
            if data.is_null() {
                return false;
            }
            // Request v2 option metadata
            // SAFETY: payload is unsigned
            unsafe {
                *data.cast::<u32>() = 2;
            }
            true
        }
        abi::RETRO_ENVIRONMENT_GET_DISK_CONTROL_INTERFACE_VERSION => {
            if data.is_null() {
                return false;
            }
            // SAFETY: payload is unsigned
            unsafe {
                *data.cast::<u32>() = 1;
            }
            true
        }
        abi::RETRO_ENVIRONMENT_SET_CORE_OPTIONS_V2 => {
            // SAFETY: payload is retro_core_options_v2
            match unsafe { CoreOptionCatalog::from_v2(data.cast_const().cast()) } {
                Some(catalog) => {
                    shared.env.options = catalog;
                    true
                }
                None => false,
            }
        }
        abi::RETRO_ENVIRONMENT_SET_CORE_OPTIONS_V2_INTL => {
            if data.is_null() {
                return false;
            }
            // SAFETY: payload is retro_core_options_v2_intl; prefer the local
            // table, fall back to US
            let raw = unsafe { &*data.cast_const().cast::<abi::retro_core_options_v2_intl>() };
            let table = if raw.local.is_null() { raw.us } else { raw.local };
            match unsafe { CoreOptionCatalog::from_v2(table) } {
                Some(catalog) => {
                    shared.env.options = catalog;
                    true
                }
                None => false,
            }
        }
        abi::RETRO_ENVIRONMENT_SET_CORE_OPTIONS => {
            // SAFETY: payload is a null-key-terminated v1 definition array
            match unsafe { CoreOptionCatalog::from_v1(data.cast_const().cast()) } {
                Some(catalog) => {
                    shared.env.options = catalog;
                    true
                }
                None => false,
            }
        }
        abi::RETRO_ENVIRONMENT_SET_CORE_OPTIONS_INTL => {
            if data.is_null() {
                return false;
            }
            // SAFETY: payload is retro_core_options_intl
            let raw = unsafe { &*data.cast_const().cast::<abi::retro_core_options_intl>() };
            let table = if raw.local.is_null() { raw.us } else { raw.local };
            match unsafe { CoreOptionCatalog::from_v1(table) } {
                Some(catalog) => {
                    shared.env.options = catalog;
                    true
                }
                None => false,
            }
        }
        abi::RETRO_ENVIRONMENT_GET_SYSTEM_DIRECTORY => {
            let Some(dir) = &shared.env.system_dir else { return false };
            if data.is_null() {
                return false;
            }
            // SAFETY: payload is *const char
            unsafe {
                *data.cast::<*const c_char>() = dir.as_ptr();
            }
            true
        }
        abi::RETRO_ENVIRONMENT_GET_SAVE_DIRECTORY => {
            let Some(dir) = &shared.env.save_dir else { return false };
            if data.is_null() {
                return false;
            }
            // SAFETY: payload is *const char
            unsafe {
                *data.cast::<*const c_char>() = dir.as_ptr();
            }
            true
        }
        abi::RETRO_ENVIRONMENT_GET_VARIABLE => {
            if data.is_null() {
                return false;
            }
            // SAFETY: payload is retro_variable with a valid key
            let var = unsafe { &mut *data.cast::<abi::retro_variable>() };
            let Some(key) = (unsafe { options::copy_c_str(var.key) }) else {
                return false;
            };
            match shared.env.variable_value(&key) {
                Some(value) => {
                    var.value = value;
                    true
                }
                None => false,
            }
        }
        abi::RETRO_ENVIRONMENT_SET_PIXEL_FORMAT => {
            if data.is_null() {
                return false;
            }
            // SAFETY: payload is the pixel format enum
            let format = unsafe { *data.cast::<u32>() };
            let format = match format {
                abi::RETRO_PIXEL_FORMAT_0RGB1555 => PixelFormat::ORgb1555,
                abi::RETRO_PIXEL_FORMAT_XRGB8888 => PixelFormat::XRgb8888,
                abi::RETRO_PIXEL_FORMAT_RGB565 => PixelFormat::Rgb565,
                _ => return false,
            };
            shared.video.set_format(format);
            true
        }
        abi::RETRO_ENVIRONMENT_SET_KEYBOARD_CALLBACK => {
            if data.is_null() {
                return false;
            }
            // SAFETY: payload is retro_keyboard_callback
            shared.env.keyboard_callback =
                Some(unsafe { *data.cast::<abi::retro_keyboard_callback>() });
            true
        }
        abi::RETRO_ENVIRONMENT_SET_DISK_CONTROL_INTERFACE => {
            if data.is_null() {
                return false;
            }
            // SAFETY: payload is retro_disk_control_callback
            shared.env.disk_control =
                Some(unsafe { *data.cast::<abi::retro_disk_control_callback>() });
            true
        }
        abi::RETRO_ENVIRONMENT_SET_SUPPORT_NO_GAME => {
            if data.is_null() {
                return false;
            }
            // SAFETY: payload is bool
            shared.env.support_no_game = unsafe { *data.cast::<bool>() };
            true
        }
        abi::RETRO_ENVIRONMENT_SET_ROTATION => {
            if data.is_null() {
                return false;
            }
            // SAFETY: payload is unsigned
            shared.env.rotation = unsafe { *data.cast::<u32>() };
            true
        }
        abi::RETRO_ENVIRONMENT_SET_PERFORMANCE_LEVEL => {
            if data.is_null() {
                return false;
            }
            // SAFETY: payload is unsigned
            shared.env.performance_level = unsafe { *data.cast::<u32>() };
            true
        }
        abi::RETRO_ENVIRONMENT_SET_INPUT_DESCRIPTORS
        | abi::RETRO_ENVIRONMENT_SET_CONTROLLER_INFO
        | abi::RETRO_ENVIRONMENT_SET_DISK_CONTROL_EXT_INTERFACE
        | abi::RETRO_ENVIRONMENT_SET_CORE_OPTIONS_DISPLAY
        | abi::RETRO_ENVIRONMENT_SET_CORE_OPTIONS_UPDATE_DISPLAY_CALLBACK => true,
        _ => {
            log::debug!("Unhandled environment command {cmd}");
            false
        }
    }
}

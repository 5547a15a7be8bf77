//! Owned copies of the plug-in's core option catalogue.
//!
//! Every string is copied out of plug-in memory while the environment call is
//! still on the stack; the plug-in is free to release its own copies as soon
//! as the call returns. Dropping the catalogue frees everything.

use crate::abi;
use std::ffi::{CStr, c_char};

#[derive(Debug, Clone, Default)]
pub struct CoreOptionValue {
    pub value: String,
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CoreOptionDefinition {
    pub key: String,
    pub desc: Option<String>,
    pub info: Option<String>,
    pub category_key: Option<String>,
    pub default_value: Option<String>,
    pub values: Vec<CoreOptionValue>,
}

#[derive(Debug, Clone, Default)]
pub struct CoreOptionCategory {
    pub key: String,
    pub desc: Option<String>,
    pub info: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CoreOptionCatalog {
    pub definitions: Vec<CoreOptionDefinition>,
    pub categories: Vec<CoreOptionCategory>,
}

impl CoreOptionCatalog {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    #[must_use]
    pub fn default_value_for(&self, key: &str) -> Option<&str> {
        self.definitions
            .iter()
            .find(|def| def.key == key)
            .and_then(|def| def.default_value.as_deref())
    }

    /// Copy a v2 option table published through the environment callback.
    ///
    /// # Safety
    ///
    /// `raw` must point to a valid `retro_core_options_v2` whose definition and
    /// category arrays are terminated by an entry with a null `key`.
    pub(crate) unsafe fn from_v2(raw: *const abi::retro_core_options_v2) -> Option<Self> {
        if raw.is_null() {
            return None;
        }

        // SAFETY: non-null per the check above, validity guaranteed by caller
        let raw = unsafe { &*raw };

        let mut definitions = Vec::new();
        if !raw.definitions.is_null() {
            let mut def_ptr = raw.definitions.cast_const();
            // SAFETY: the definitions array is null-key terminated
            while let Some(key) = unsafe { copy_c_str((*def_ptr).key) } {
                let def = unsafe { &*def_ptr };
                definitions.push(CoreOptionDefinition {
                    key,
                    desc: unsafe { copy_c_str(def.desc) },
                    info: unsafe { copy_c_str(def.info) },
                    category_key: unsafe { copy_c_str(def.category_key) },
                    default_value: unsafe { copy_c_str(def.default_value) },
                    values: unsafe { copy_values(&def.values) },
                });
                def_ptr = unsafe { def_ptr.add(1) };
            }
        }

        let mut categories = Vec::new();
        if !raw.categories.is_null() {
            let mut cat_ptr = raw.categories.cast_const();
            // SAFETY: the categories array is null-key terminated
            while let Some(key) = unsafe { copy_c_str((*cat_ptr).key) } {
                let cat = unsafe { &*cat_ptr };
                categories.push(CoreOptionCategory {
                    key,
                    desc: unsafe { copy_c_str(cat.desc) },
                    info: unsafe { copy_c_str(cat.info) },
                });
                cat_ptr = unsafe { cat_ptr.add(1) };
            }
        }

        Some(Self { definitions, categories })
    }

    /// Copy a v1 option table. v1 has no categories.
    ///
    /// # Safety
    ///
    /// `raw` must point to a null-key-terminated array of
    /// `retro_core_option_definition`.
    pub(crate) unsafe fn from_v1(raw: *const abi::retro_core_option_definition) -> Option<Self> {
        if raw.is_null() {
            return None;
        }

        let mut definitions = Vec::new();
        let mut def_ptr = raw;
        // SAFETY: the definitions array is null-key terminated
        while let Some(key) = unsafe { copy_c_str((*def_ptr).key) } {
            let def = unsafe { &*def_ptr };
            definitions.push(CoreOptionDefinition {
                key,
                desc: unsafe { copy_c_str(def.desc) },
                info: unsafe { copy_c_str(def.info) },
                category_key: None,
                default_value: unsafe { copy_c_str(def.default_value) },
                values: unsafe { copy_values(&def.values) },
            });
            def_ptr = unsafe { def_ptr.add(1) };
        }

        Some(Self { definitions, categories: Vec::new() })
    }
}

/// # Safety
///
/// Each entry's `value` pointer must either be null (terminating the array) or
/// point to a valid NUL-terminated string, and likewise for `label`.
unsafe fn copy_values(
    values: &[abi::retro_core_option_value; abi::RETRO_NUM_CORE_OPTION_VALUES_MAX + 1],
) -> Vec<CoreOptionValue> {
    let mut out = Vec::new();
    for raw_value in values {
        let Some(value) = (unsafe { copy_c_str(raw_value.value) }) else {
            break;
        };
        out.push(CoreOptionValue { value, label: unsafe { copy_c_str(raw_value.label) } });
    }
    out
}

/// # Safety
///
/// `ptr` must be null or point to a valid NUL-terminated string.
pub(crate) unsafe fn copy_c_str(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }

    // SAFETY: non-null per the check above, NUL-terminated per the caller
    Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;
    use std::ptr;

    const NULL_VALUE: abi::retro_core_option_value =
        abi::retro_core_option_value { value: ptr::null(), label: ptr::null() };

    #[test]
    fn copies_v2_definitions_and_defaults() {
        let key = CString::new("sys_region").unwrap();
        let desc = CString::new("Region").unwrap();
        let default = CString::new("us").unwrap();
        let v0 = CString::new("us").unwrap();
        let v0_label = CString::new("USA").unwrap();
        let v1 = CString::new("jp").unwrap();

        let mut values = [NULL_VALUE; abi::RETRO_NUM_CORE_OPTION_VALUES_MAX + 1];
        values[0] = abi::retro_core_option_value { value: v0.as_ptr(), label: v0_label.as_ptr() };
        values[1] = abi::retro_core_option_value { value: v1.as_ptr(), label: ptr::null() };

        let mut definitions = [
            abi::retro_core_option_v2_definition {
                key: key.as_ptr(),
                desc: desc.as_ptr(),
                desc_categorized: ptr::null(),
                info: ptr::null(),
                info_categorized: ptr::null(),
                category_key: ptr::null(),
                values,
                default_value: default.as_ptr(),
            },
            abi::retro_core_option_v2_definition {
                key: ptr::null(),
                desc: ptr::null(),
                desc_categorized: ptr::null(),
                info: ptr::null(),
                info_categorized: ptr::null(),
                category_key: ptr::null(),
                values: [NULL_VALUE; abi::RETRO_NUM_CORE_OPTION_VALUES_MAX + 1],
                default_value: ptr::null(),
            },
        ];

        let raw = abi::retro_core_options_v2 {
            categories: ptr::null_mut(),
            definitions: definitions.as_mut_ptr(),
        };

        let catalog = unsafe { CoreOptionCatalog::from_v2(&raw) }.unwrap();
        assert_eq!(catalog.definitions.len(), 1);
        assert_eq!(catalog.definitions[0].key, "sys_region");
        assert_eq!(catalog.definitions[0].values.len(), 2);
        assert_eq!(catalog.definitions[0].values[0].label.as_deref(), Some("USA"));
        assert_eq!(catalog.default_value_for("sys_region"), Some("us"));
        assert_eq!(catalog.default_value_for("missing"), None);
    }

    #[test]
    fn v1_definitions_have_no_categories() {
        let key = CString::new("audio_filter").unwrap();
        let default = CString::new("off").unwrap();

        let definitions = [
            abi::retro_core_option_definition {
                key: key.as_ptr(),
                desc: ptr::null(),
                info: ptr::null(),
                values: [NULL_VALUE; abi::RETRO_NUM_CORE_OPTION_VALUES_MAX + 1],
                default_value: default.as_ptr(),
            },
            abi::retro_core_option_definition {
                key: ptr::null(),
                desc: ptr::null(),
                info: ptr::null(),
                values: [NULL_VALUE; abi::RETRO_NUM_CORE_OPTION_VALUES_MAX + 1],
                default_value: ptr::null(),
            },
        ];

        let catalog = unsafe { CoreOptionCatalog::from_v1(definitions.as_ptr()) }.unwrap();
        assert_eq!(catalog.definitions.len(), 1);
        assert!(catalog.categories.is_empty());
        assert_eq!(catalog.default_value_for("audio_filter"), Some("off"));
    }
}

//! Persisted configuration.
//!
//! The on-disk format is line-oriented `key=value` pairs. Unknown keys are
//! skipped with a warning so configs survive version changes in both
//! directions. Core option overrides use a `core_option.` key prefix.

use crate::machine::SystemKind;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

const CORE_OPTION_PREFIX: &str = "core_option.";

pub const DEFAULT_AUDIO_BUFFER_MS: u32 = 50;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to write config file '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub system: SystemKind,
    pub core_path: Option<PathBuf>,
    pub rom_path: Option<PathBuf>,
    pub elf_path: Option<PathBuf>,
    pub toolchain_prefix: String,
    pub system_dir: Option<PathBuf>,
    pub save_dir: Option<PathBuf>,
    pub source_dir: Option<PathBuf>,
    pub audio_enabled: bool,
    pub audio_buffer_ms: u32,
    /// Per-option overrides applied on top of the plug-in's defaults.
    pub core_options: Vec<(String, String)>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let system = SystemKind::default();
        Self {
            system,
            core_path: None,
            rom_path: None,
            elf_path: None,
            toolchain_prefix: system.default_toolchain_prefix().to_owned(),
            system_dir: None,
            save_dir: None,
            source_dir: None,
            audio_enabled: true,
            audio_buffer_ms: DEFAULT_AUDIO_BUFFER_MS,
            core_options: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Load from `path`, defaulting every missing key. A missing file is not
    /// an error; the defaults are returned so first launch works.
    ///
    /// # Errors
    ///
    /// Returns an error only when the file exists but cannot be read.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                log::info!("No config file at '{}'; using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => return Err(ConfigError::Read { path: path.to_path_buf(), source }),
        };

        let mut config = Self::default();
        for (index, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                log::warn!("Skipping malformed config line {}: '{line}'", index + 1);
                continue;
            };
            let (key, value) = (key.trim(), value.trim());

            if let Some(option_key) = key.strip_prefix(CORE_OPTION_PREFIX) {
                config.set_core_option(option_key, value);
                continue;
            }

            match key {
                "system" => match value.parse() {
                    Ok(system) => config.system = system,
                    Err(err) => log::warn!("Config line {}: {err}", index + 1),
                },
                "core_path" => config.core_path = path_value(value),
                "rom_path" => config.rom_path = path_value(value),
                "elf_path" => config.elf_path = path_value(value),
                "toolchain_prefix" => config.toolchain_prefix = value.to_owned(),
                "system_dir" => config.system_dir = path_value(value),
                "save_dir" => config.save_dir = path_value(value),
                "source_dir" => config.source_dir = path_value(value),
                "audio_enabled" => config.audio_enabled = bool_value(value),
                "audio_buffer_ms" => match value.parse() {
                    Ok(ms) => config.audio_buffer_ms = ms,
                    Err(_) => log::warn!("Config line {}: invalid audio_buffer_ms '{value}'", index + 1),
                },
                _ => log::warn!("Skipping unknown config key '{key}'"),
            }
        }

        Ok(config)
    }

    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let mut out = String::new();
        out.push_str(&format!("system={}\n", self.system));

        let mut push_path = |key: &str, value: &Option<PathBuf>| {
            if let Some(value) = value {
                out.push_str(&format!("{key}={}\n", value.display()));
            }
        };
        push_path("core_path", &self.core_path);
        push_path("rom_path", &self.rom_path);
        push_path("elf_path", &self.elf_path);
        push_path("system_dir", &self.system_dir);
        push_path("save_dir", &self.save_dir);
        push_path("source_dir", &self.source_dir);

        out.push_str(&format!("toolchain_prefix={}\n", self.toolchain_prefix));
        out.push_str(&format!("audio_enabled={}\n", u8::from(self.audio_enabled)));
        out.push_str(&format!("audio_buffer_ms={}\n", self.audio_buffer_ms));
        for (key, value) in &self.core_options {
            out.push_str(&format!("{CORE_OPTION_PREFIX}{key}={value}\n"));
        }

        fs::write(path, out)
            .map_err(|source| ConfigError::Write { path: path.to_path_buf(), source })
    }

    pub fn set_core_option(&mut self, key: &str, value: &str) {
        if let Some(existing) = self.core_options.iter_mut().find(|(name, _)| name == key) {
            existing.1 = value.to_owned();
        } else {
            self.core_options.push((key.to_owned(), value.to_owned()));
        }
    }

    /// Whether the configured ELF exists as a regular file.
    #[must_use]
    pub fn elf_valid(&self) -> bool {
        self.elf_path.as_deref().is_some_and(|path| path.is_file())
    }

    /// Whether enough is configured to start the emulator at all.
    #[must_use]
    pub fn core_enabled(&self) -> bool {
        self.core_path.is_some() && self.rom_path.is_some()
    }
}

fn bool_value(value: &str) -> bool {
    matches!(value, "1" | "true" | "yes")
}

fn path_value(value: &str) -> Option<PathBuf> {
    if value.is_empty() { None } else { Some(expand_tilde(value)) }
}

/// Expand a leading `~` or `~/` using `HOME`.
#[must_use]
pub fn expand_tilde(raw: &str) -> PathBuf {
    if raw == "~" || raw.starts_with("~/") {
        if let Ok(home) = env::var("HOME")
            && !home.is_empty()
        {
            return PathBuf::from(format!("{home}{}", &raw[1..]));
        }
    }
    PathBuf::from(raw)
}

//! Option catalogue probing.
//!
//! Runs the environment handshake against a core library without starting the
//! emulated machine, so a settings screen can enumerate core options before
//! the user commits to a core. The library is loaded, interrogated, and
//! unloaded again within this call.

use crate::shared::{self, HostShared};
use crate::{LibretroHostError, abi, options::CoreOptionCatalog};
use libloading::Library;
use std::path::Path;

/// # Errors
///
/// Returns an error if the library cannot be loaded or does not export
/// `retro_set_environment`.
pub fn probe_core_options(
    core_path: &Path,
    system_dir: Option<&str>,
    save_dir: Option<&str>,
) -> Result<CoreOptionCatalog, LibretroHostError> {
    // SAFETY: loading a conforming plug-in
    let library = unsafe { Library::new(core_path) }.map_err(|source| {
        LibretroHostError::LoadLibrary { path: core_path.to_path_buf(), source }
    })?;

    // SAFETY: the symbols have the declared signatures
    let set_environment = unsafe {
        library
            .get::<abi::RetroSetEnvironmentFn>(b"retro_set_environment")
            .map_err(|source| LibretroHostError::MissingSymbol {
                name: "retro_set_environment".into(),
                source,
            })?
    };
    // SAFETY: as above
    let init = unsafe { library.get::<abi::RetroInitFn>(b"retro_init").ok() };
    // SAFETY: as above
    let deinit = unsafe { library.get::<abi::RetroDeinitFn>(b"retro_deinit").ok() };

    let mut probe_shared = HostShared::new(false, 0);
    probe_shared.env.set_directories(system_dir, save_dir);
    let shared_ptr: *mut HostShared = &mut *probe_shared;

    shared::activate(shared_ptr);
    // SAFETY: the handshake sequence; most cores publish their option tables
    // from retro_set_environment, some defer until retro_init
    unsafe {
        set_environment(shared::environment_callback);
        if probe_shared.env.options.is_empty()
            && let Some(init) = &init
        {
            init();
            if let Some(deinit) = &deinit {
                deinit();
            }
        }
    }
    shared::deactivate(shared_ptr);

    let catalog = std::mem::take(&mut probe_shared.env.options);
    log::debug!(
        "Probed {} core option definition(s) from '{}'",
        catalog.definitions.len(),
        core_path.display()
    );

    Ok(catalog)
}

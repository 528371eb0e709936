//! Runtime loaded from a shared library.
//!
//! The library exports:
//!
//! ```text
//! int32_t framehost_runtime_start(RuntimeBoot* boot);
//! ```
//!
//! It must fill `boot->tick` and return 0.

use std::path::{Path, PathBuf};

use libloading::Library;

use crate::error::{Error, Result};

use super::{HostApi, ManagedRuntime, ManagedTick, RawTick, RuntimeBoot};

/// Start symbol of a runtime library.
pub const START_SYMBOL: &str = "framehost_runtime_start";

/// Signature of [`START_SYMBOL`].
pub type StartFn = unsafe extern "C" fn(*mut RuntimeBoot) -> i32;

/// Runtime bridged through a shared library.
#[derive(Debug)]
pub struct DylibRuntime {
    path: PathBuf,
    name: String,
}

impl DylibRuntime {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self { path, name }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn startup_error(&self, message: impl std::fmt::Display) -> Error {
        Error::Startup(format!("runtime {}: {}", self.path.display(), message))
    }
}

/// Tick pointer plus the library it lives in.
struct LibraryTick {
    tick: RawTick,
    _library: Library,
}

impl LibraryTick {
    fn call(&self) {
        // Safety: the runtime returned this pointer from its start symbol and
        // the library stays mapped for as long as `self` exists.
        unsafe { (self.tick)() }
    }
}

impl ManagedRuntime for DylibRuntime {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self, api: &HostApi) -> Result<ManagedTick> {
        // Safety: the runtime library is trusted code named by the user.
        let library = unsafe { Library::new(&self.path) }.map_err(|e| self.startup_error(e))?;

        let start: StartFn = unsafe { library.get::<StartFn>(START_SYMBOL.as_bytes()) }
            .map(|symbol| *symbol)
            .map_err(|e| self.startup_error(e))?;

        let mut boot = RuntimeBoot::new(*api);
        // Safety: `boot` outlives the call and matches the documented layout.
        let status = unsafe { start(&mut boot) };
        if status != 0 {
            return Err(self.startup_error(format!("start returned status {}", status)));
        }
        let tick = boot
            .tick
            .ok_or_else(|| self.startup_error("start did not provide a tick entry point"))?;

        tracing::info!("Managed runtime {} started", self.name);
        let tick = LibraryTick {
            tick,
            _library: library,
        };
        Ok(Box::new(move || tick.call()))
    }
}

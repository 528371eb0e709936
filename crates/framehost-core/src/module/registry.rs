//! Registry of loaded modules.
//!
//! The registry is the single source of truth for whether a module is
//! loaded. Entries are kept in load order, which is also dispatch order.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::sync::lock;

use super::{Capabilities, Capability, Module};

/// A module registered with the host.
///
/// A hook call clones the module handle out of its slot and runs without
/// holding any lock. Release empties the slot, so no call can start
/// afterwards; the module itself is dropped when the last call already in
/// flight returns.
pub struct LoadedModule {
    path: PathBuf,
    name: String,
    capabilities: Capabilities,
    slot: Mutex<Option<Arc<dyn Module>>>,
}

impl LoadedModule {
    /// Wrap a freshly loaded module, reading its capabilities once.
    pub fn new(path: impl Into<PathBuf>, module: Box<dyn Module>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let capabilities = module.capabilities();

        Self {
            path,
            name,
            capabilities,
            slot: Mutex::new(Some(Arc::from(module))),
        }
    }

    /// Path the module was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name of the module, used in log messages.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Whether the module has not been released yet.
    pub fn is_live(&self) -> bool {
        lock(&self.slot).is_some()
    }

    /// Run `f` against the module if it has not been released.
    pub(crate) fn with_module<R>(&self, f: impl FnOnce(&dyn Module) -> R) -> Option<R> {
        let module = lock(&self.slot).clone()?;
        Some(f(module.as_ref()))
    }

    /// Stop handing the module out. Returns false if already released.
    ///
    /// The module is dropped here unless a hook call is still running, in
    /// which case the last such call drops it on return.
    pub(crate) fn release(&self) -> bool {
        let module = lock(&self.slot).take();
        let released = module.is_some();
        drop(module);
        released
    }
}

impl std::fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModule")
            .field("path", &self.path)
            .field("capabilities", &self.capabilities)
            .field("live", &self.is_live())
            .finish()
    }
}

/// Ordered, lock-guarded set of loaded modules keyed by path.
///
/// The lock is held only to mutate the list or copy it. Callers iterate
/// snapshots, so a module may enqueue work that touches the registry from
/// inside its own hook without deadlocking.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: Mutex<Vec<Arc<LoadedModule>>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module. Fails if its path is already registered.
    pub fn add(&self, module: LoadedModule) -> Result<Arc<LoadedModule>> {
        let mut modules = lock(&self.modules);
        if modules.iter().any(|m| m.path() == module.path()) {
            return Err(Error::AlreadyLoaded(module.path().to_path_buf()));
        }
        let module = Arc::new(module);
        modules.push(Arc::clone(&module));
        Ok(module)
    }

    /// Remove a module from the registry without releasing it.
    pub fn remove(&self, path: &Path) -> Option<Arc<LoadedModule>> {
        let mut modules = lock(&self.modules);
        let index = modules.iter().position(|m| m.path() == path)?;
        Some(modules.remove(index))
    }

    /// Remove every module from the registry without releasing them.
    pub fn remove_all(&self) -> Vec<Arc<LoadedModule>> {
        std::mem::take(&mut *lock(&self.modules))
    }

    /// Remove a module, then release it. Returns false if it was not loaded.
    pub fn unload(&self, path: &Path) -> bool {
        match self.remove(path) {
            Some(module) => {
                module.release();
                tracing::info!(module = module.name(), "Module unloaded");
                true
            }
            None => false,
        }
    }

    /// Remove and release every module. Returns how many were unloaded.
    pub fn unload_all(&self) -> usize {
        let modules = self.remove_all();
        for module in &modules {
            module.release();
            tracing::info!(module = module.name(), "Module unloaded");
        }
        modules.len()
    }

    /// Copy the current module set in load order.
    pub fn snapshot(&self) -> Vec<Arc<LoadedModule>> {
        lock(&self.modules).clone()
    }

    /// Copy the modules that provide `capability`.
    pub fn snapshot_with(&self, capability: Capability) -> Vec<Arc<LoadedModule>> {
        lock(&self.modules)
            .iter()
            .filter(|m| m.capabilities().has(capability))
            .cloned()
            .collect()
    }

    pub fn contains(&self, path: &Path) -> bool {
        lock(&self.modules).iter().any(|m| m.path() == path)
    }

    pub fn get(&self, path: &Path) -> Option<Arc<LoadedModule>> {
        lock(&self.modules).iter().find(|m| m.path() == path).cloned()
    }

    /// Names of loaded modules in load order.
    pub fn names(&self) -> Vec<String> {
        lock(&self.modules)
            .iter()
            .map(|m| m.name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.modules).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.modules).is_empty()
    }
}

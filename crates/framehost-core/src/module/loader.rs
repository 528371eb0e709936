//! Module resolution.

use std::path::Path;

use crate::error::Result;

use super::Module;

/// Resolves a module path into a loaded module.
///
/// Called only from the scheduler thread while a Load job runs. A failed
/// load must leave nothing behind: the registry is only updated after this
/// returns `Ok`.
pub trait ModuleLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Box<dyn Module>>;
}

impl<F> ModuleLoader for F
where
    F: Fn(&Path) -> Result<Box<dyn Module>> + Send + Sync,
{
    fn load(&self, path: &Path) -> Result<Box<dyn Module>> {
        self(path)
    }
}

//! Bootstrap payload written next to the host before the runtime starts.
//!
//! The managed runtime expects its bootstrap file at a fixed name. A
//! developer can point that name at their own build with a symbolic link,
//! in which case the link is left alone.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// What [`materialize`] did with the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Materialized {
    /// The payload was written; holds its size in bytes.
    Written(u64),
    /// The target is a symbolic link and was not touched.
    SkippedSymlink,
    /// Writing failed but an earlier copy exists and is used instead.
    KeptExisting,
}

/// Write `payload` to `target`, replacing its contents.
pub fn materialize(payload: &[u8], target: &Path) -> Result<Materialized> {
    if fs::symlink_metadata(target).is_ok_and(|m| m.file_type().is_symlink()) {
        tracing::info!(
            "Bootstrap target {} is a symbolic link, leaving it in place",
            target.display()
        );
        return Ok(Materialized::SkippedSymlink);
    }

    match fs::write(target, payload) {
        Ok(()) => {
            tracing::debug!("Wrote {} bytes to {}", payload.len(), target.display());
            Ok(Materialized::Written(payload.len() as u64))
        }
        Err(e) if target.exists() => {
            tracing::warn!(
                "Could not refresh {} ({}), using the existing file",
                target.display(),
                e
            );
            Ok(Materialized::KeptExisting)
        }
        Err(e) => Err(Error::Startup(format!(
            "could not write bootstrap file {}: {}",
            target.display(),
            e
        ))),
    }
}

/// A payload and the place it must be written to.
#[derive(Debug, Clone)]
pub struct Bootstrap {
    payload: Vec<u8>,
    target: PathBuf,
}

impl Bootstrap {
    pub fn new(payload: impl Into<Vec<u8>>, target: impl Into<PathBuf>) -> Self {
        Self {
            payload: payload.into(),
            target: target.into(),
        }
    }

    /// Read the payload from `source`. An unreadable source is fatal.
    pub fn from_file(source: &Path, target: impl Into<PathBuf>) -> Result<Self> {
        let payload = fs::read(source).map_err(|e| {
            Error::Startup(format!(
                "could not read bootstrap payload {}: {}",
                source.display(),
                e
            ))
        })?;
        Ok(Self::new(payload, target))
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn materialize(&self) -> Result<Materialized> {
        materialize(&self.payload, &self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_writes_and_truncates() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("framehost.bootstrap");
        fs::write(&target, b"an older and longer payload").unwrap();

        let outcome = materialize(b"fresh", &target).unwrap();
        assert_eq!(outcome, Materialized::Written(5));
        assert_eq!(fs::read(&target).unwrap(), b"fresh");
    }

    #[test]
    fn test_unwritable_without_existing_file_is_fatal() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("missing-dir").join("framehost.bootstrap");
        let err = materialize(b"x", &target).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_unwritable_with_existing_target_is_kept() {
        // A directory exists at the target, so the write fails.
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("framehost.bootstrap");
        fs::create_dir(&target).unwrap();
        assert_eq!(materialize(b"x", &target).unwrap(), Materialized::KeptExisting);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_target_is_left_alone() {
        let temp = TempDir::new().unwrap();
        let real = temp.path().join("dev-build");
        fs::write(&real, b"developer payload").unwrap();
        let target = temp.path().join("framehost.bootstrap");
        std::os::unix::fs::symlink(&real, &target).unwrap();

        assert_eq!(materialize(b"shipped", &target).unwrap(), Materialized::SkippedSymlink);
        assert_eq!(fs::read(&real).unwrap(), b"developer payload");
    }

    #[test]
    fn test_from_file_missing_source_is_fatal() {
        let temp = TempDir::new().unwrap();
        let err = Bootstrap::from_file(&temp.path().join("nope"), "out").unwrap_err();
        assert!(matches!(err, Error::Startup(_)));
    }

    #[test]
    fn test_from_file_roundtrip() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("payload.bin");
        fs::write(&source, b"payload").unwrap();
        let bootstrap = Bootstrap::from_file(&source, temp.path().join("out")).unwrap();
        assert_eq!(bootstrap.materialize().unwrap(), Materialized::Written(7));
    }
}

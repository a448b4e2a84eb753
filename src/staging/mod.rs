//! Temporary artifact staging
//!
//! Every compression request materializes exactly two files: the staged
//! upload and the engine's output. Both live under dedicated directories,
//! are named from a freshly generated UUID (never from caller input), and
//! exist only for the lifetime of one request.
//!
//! Release is scoped: the handler tracks staged paths in a
//! [`ReleaseGuard`], which removes them when the request's scope ends no
//! matter how it ends (success, classified failure, panic, or client
//! disconnect cancelling the task). Removal is best-effort over all
//! tracked paths; an already-absent file counts as released and a failed
//! removal is logged, never surfaced to the caller.

use std::path::{Path, PathBuf};

use uuid::Uuid;

/// An input or output file materialized at a unique, process-private path
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StagingError {
    #[error("failed to create staging directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to persist upload: {0}")]
    Write(#[from] std::io::Error),
}

/// Allocates and removes the per-request temp files
pub struct ArtifactStore {
    upload_dir: PathBuf,
    output_dir: PathBuf,
}

impl ArtifactStore {
    /// Create the store, ensuring both staging areas exist
    pub fn new(upload_dir: PathBuf, output_dir: PathBuf) -> Result<Self, StagingError> {
        for dir in [&upload_dir, &output_dir] {
            std::fs::create_dir_all(dir).map_err(|source| StagingError::CreateDir {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(Self {
            upload_dir,
            output_dir,
        })
    }

    /// Write the inbound bytes to a freshly generated path inside the
    /// upload area
    pub async fn stage(&self, data: &[u8]) -> Result<StagedFile, StagingError> {
        let path = self.upload_dir.join(unique_name());
        tokio::fs::write(&path, data).await?;
        Ok(StagedFile { path })
    }

    /// Allocate an unused path inside the output area without creating
    /// the file; the engine creates it
    pub fn reserve_output(&self) -> StagedFile {
        StagedFile {
            path: self.output_dir.join(unique_name()),
        }
    }

    /// Remove every given file if it exists. Best-effort over all paths:
    /// a failed removal is logged and the remaining paths are still
    /// attempted.
    pub fn release(&self, files: &[StagedFile]) {
        for file in files {
            remove_quietly(file.path());
        }
    }
}

fn unique_name() -> String {
    format!("{}.pdf", Uuid::new_v4().simple())
}

fn remove_quietly(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
        Err(error) => {
            tracing::warn!(
                path = %path.display(),
                error = %error,
                "Could not remove temporary file"
            );
        }
    }
}

/// Scoped cleanup for a request's staged files.
///
/// Tracked paths are removed exactly once: either through the explicit
/// [`ReleaseGuard::release`] call at the end of the happy path, or by the
/// `Drop` impl when the handler unwinds or is cancelled first.
#[derive(Debug, Default)]
pub struct ReleaseGuard {
    paths: Vec<PathBuf>,
    released: bool,
}

impl ReleaseGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a staged file for removal when this guard is released
    pub fn track(&mut self, file: &StagedFile) {
        self.paths.push(file.path().to_path_buf());
    }

    /// Remove all tracked files now
    pub fn release(mut self) {
        self.run_release();
    }

    fn run_release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        for path in &self.paths {
            remove_quietly(path);
        }
    }
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.run_release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (ArtifactStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path().join("in"), dir.path().join("out")).unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn test_stage_writes_bytes_to_unique_path() {
        let (store, _dir) = store();

        let first = store.stage(b"%PDF-1.4 one").await.unwrap();
        let second = store.stage(b"%PDF-1.4 two").await.unwrap();

        assert_ne!(first.path(), second.path());
        assert_eq!(std::fs::read(first.path()).unwrap(), b"%PDF-1.4 one");
        assert_eq!(std::fs::read(second.path()).unwrap(), b"%PDF-1.4 two");
    }

    #[tokio::test]
    async fn test_staged_name_not_derived_from_caller_input() {
        let (store, _dir) = store();

        let staged = store.stage(b"data").await.unwrap();
        let name = staged.path().file_name().unwrap().to_str().unwrap();

        // 32 hex chars + ".pdf"
        assert_eq!(name.len(), 36);
        assert!(name.ends_with(".pdf"));
    }

    #[test]
    fn test_reserve_output_does_not_create_file() {
        let (store, _dir) = store();

        let reserved = store.reserve_output();
        assert!(!reserved.path().exists());
    }

    #[tokio::test]
    async fn test_release_removes_existing_and_ignores_absent() {
        let (store, _dir) = store();

        let staged = store.stage(b"data").await.unwrap();
        let reserved = store.reserve_output();
        let staged_path = staged.path().to_path_buf();
        assert!(staged_path.exists());

        store.release(&[staged, reserved]);
        assert!(!staged_path.exists());
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let (store, _dir) = store();

        let staged = store.stage(b"data").await.unwrap();
        let path = staged.path().to_path_buf();

        store.release(std::slice::from_ref(&staged));
        assert!(!path.exists());
        // A second release of the same path is absorbed as success
        store.release(std::slice::from_ref(&staged));
    }

    #[tokio::test]
    async fn test_guard_releases_on_explicit_call() {
        let (store, _dir) = store();

        let staged = store.stage(b"data").await.unwrap();
        let path = staged.path().to_path_buf();

        let mut guard = ReleaseGuard::new();
        guard.track(&staged);
        guard.release();

        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_guard_releases_on_drop() {
        let (store, _dir) = store();

        let staged = store.stage(b"data").await.unwrap();
        let path = staged.path().to_path_buf();

        {
            let mut guard = ReleaseGuard::new();
            guard.track(&staged);
            // dropped without an explicit release, as on an error path
        }

        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_guard_releases_when_scope_panics() {
        let (store, _dir) = store();

        let staged = store.stage(b"data").await.unwrap();
        let path = staged.path().to_path_buf();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut guard = ReleaseGuard::new();
            guard.track(&staged);
            panic!("request processing fault");
        }));

        assert!(result.is_err());
        assert!(!path.exists());
    }
}

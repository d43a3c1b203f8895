//! Input staging.
//!
//! The engine reads only local files. An [`InputLocation`] that is not a local path is a key
//! in some object store and has to be fetched by an [`ObjectStager`] first. The resulting
//! [`StagedInput`] owns the temporary copy and deletes it when dropped, on success and on
//! every error path.

use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Component, Path, PathBuf};

use tempfile::TempPath;

use crate::error::{EngineError, EngineResult};

/// Where the engine should read its input from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputLocation {
    /// An existing file on the local filesystem.
    Local(PathBuf),
    /// An object-store key that needs staging.
    Remote(String),
}

impl InputLocation {
    /// Classify a caller-supplied location.
    ///
    /// Absolute paths that exist are local; everything else is treated as a remote key.
    pub fn parse(location: &str) -> Self {
        let path = Path::new(location);
        if path.is_absolute() && path.exists() {
            Self::Local(path.to_path_buf())
        } else {
            Self::Remote(location.to_string())
        }
    }
}

impl fmt::Display for InputLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(p) => write!(f, "{}", p.display()),
            Self::Remote(key) => f.write_str(key),
        }
    }
}

/// A locally readable input, cleaned up on drop when it was staged.
#[derive(Debug)]
pub struct StagedInput {
    path: PathBuf,
    temp: Option<TempPath>,
}

impl StagedInput {
    /// Use an existing local file in place; nothing is deleted on drop.
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            temp: None,
        }
    }

    /// Take ownership of a temporary file; it is deleted on drop.
    pub fn temporary(temp: TempPath) -> Self {
        Self {
            path: temp.to_path_buf(),
            temp: Some(temp),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `true` if dropping this value deletes the file.
    pub fn is_temporary(&self) -> bool {
        self.temp.is_some()
    }
}

impl Drop for StagedInput {
    fn drop(&mut self) {
        if let Some(temp) = self.temp.take() {
            let path = temp.to_path_buf();
            match temp.close() {
                Ok(()) => log::debug!("cleaned up staged input {}", path.display()),
                Err(e) => log::warn!("could not delete staged input {}: {e}", path.display()),
            }
        }
    }
}

/// Fetches remote objects into local temporary files.
pub trait ObjectStager: Send + Sync {
    /// Download `remote_key` into a local file owned by the returned guard.
    fn fetch(&self, remote_key: &str) -> EngineResult<StagedInput>;
}

/// An object store backed by a local directory: keys are relative paths under `root`.
///
/// Useful for local deployments and tests; fetched objects are copied to a temporary file
/// exactly as a network download would be.
#[derive(Debug, Clone)]
pub struct DirectoryStager {
    root: PathBuf,
    temp_dir: Option<PathBuf>,
}

impl DirectoryStager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            temp_dir: None,
        }
    }

    /// Stage into `dir` instead of the system temp directory.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    fn object_path(&self, key: &str) -> EngineResult<PathBuf> {
        let rel = Path::new(key.trim_start_matches('/'));
        if rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(EngineError::SourceUnavailable {
                message: format!("invalid object key '{key}'"),
                source: None,
            });
        }
        Ok(self.root.join(rel))
    }
}

impl ObjectStager for DirectoryStager {
    fn fetch(&self, remote_key: &str) -> EngineResult<StagedInput> {
        let source = self.object_path(remote_key)?;
        let staging_err =
            |e: io::Error| EngineError::source_unavailable(format!("error staging '{remote_key}'"), e);

        let mut src = File::open(&source).map_err(staging_err)?;
        let mut builder = tempfile::Builder::new();
        builder.prefix("staged-").suffix(".csv");
        // The temp file is removed by its own drop if the copy below fails.
        let mut tmp = match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(staging_err)?;
        io::copy(&mut src, tmp.as_file_mut()).map_err(staging_err)?;

        log::info!(
            "staged object '{remote_key}' to {}",
            tmp.path().display()
        );
        Ok(StagedInput::temporary(tmp.into_temp_path()))
    }
}

/// Resolve `location` to a readable local input, staging it through `stager` if needed.
pub fn resolve_input(
    location: &InputLocation,
    stager: Option<&dyn ObjectStager>,
) -> EngineResult<StagedInput> {
    match location {
        InputLocation::Local(path) => Ok(StagedInput::local(path)),
        InputLocation::Remote(key) => match stager {
            Some(stager) => stager.fetch(key),
            None => Err(EngineError::SourceUnavailable {
                message: format!("'{key}' is not a local file and no object stager is configured"),
                source: None,
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn store_with(key: &str, body: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(key);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
        dir
    }

    #[test]
    fn absolute_existing_paths_are_local() {
        let dir = store_with("a.csv", "x\n1\n");
        let p = dir.path().join("a.csv");
        assert_eq!(
            InputLocation::parse(p.to_str().unwrap()),
            InputLocation::Local(p.clone())
        );
        assert_eq!(
            InputLocation::parse("uploads/a.csv"),
            InputLocation::Remote("uploads/a.csv".to_string())
        );
        assert!(matches!(
            InputLocation::parse("/definitely/not/here.csv"),
            InputLocation::Remote(_)
        ));
    }

    #[test]
    fn staged_copy_is_deleted_on_drop() {
        let store = store_with("uploads/people.csv", "age\n1\n");
        let stager = DirectoryStager::new(store.path());

        let staged = stager.fetch("uploads/people.csv").unwrap();
        assert!(staged.is_temporary());
        let path = staged.path().to_path_buf();
        assert_eq!(fs::read_to_string(&path).unwrap(), "age\n1\n");
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("csv"));

        drop(staged);
        assert!(!path.exists());
    }

    #[test]
    fn local_input_is_never_deleted() {
        let store = store_with("keep.csv", "age\n1\n");
        let path = store.path().join("keep.csv");
        drop(StagedInput::local(&path));
        assert!(path.exists());
    }

    #[test]
    fn missing_object_and_escaping_keys_fail() {
        let store = store_with("a.csv", "x\n");
        let stager = DirectoryStager::new(store.path());
        assert!(matches!(
            stager.fetch("missing.csv"),
            Err(EngineError::SourceUnavailable { .. })
        ));
        assert!(matches!(
            stager.fetch("../a.csv"),
            Err(EngineError::SourceUnavailable { .. })
        ));
    }

    #[test]
    fn remote_without_stager_is_unavailable() {
        let err = resolve_input(&InputLocation::Remote("k.csv".into()), None).unwrap_err();
        assert!(err.to_string().contains("no object stager"));
    }
}

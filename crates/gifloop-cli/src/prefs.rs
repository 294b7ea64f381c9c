//! Remembered state between runs (prefs.json)

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur while reading or writing preferences
#[derive(Debug, Error)]
pub enum PrefsError {
    #[error("Failed to access preferences: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse preferences: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
struct PrefsFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_dir: Option<PathBuf>,
}

/// Preferences bound to the file they persist to
#[derive(Debug)]
pub struct Prefs {
    path: Option<PathBuf>,
    file: PrefsFile,
}

impl Prefs {
    /// `<config_dir>/gifloop/prefs.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("gifloop").join("prefs.json"))
    }

    /// Open the default prefs file, falling back to empty prefs on any error
    pub fn open_default() -> Self {
        match Self::default_path() {
            Some(path) => Self::open(path).unwrap_or_else(|e| {
                warn!(error = %e, "ignoring unreadable preferences");
                Self::in_memory()
            }),
            None => Self::in_memory(),
        }
    }

    /// Open prefs stored at `path`; a missing file is empty prefs
    pub fn open(path: PathBuf) -> Result<Self, PrefsError> {
        let file = if path.is_file() {
            serde_json::from_str(&fs::read_to_string(&path)?)?
        } else {
            PrefsFile::default()
        };
        Ok(Self {
            path: Some(path),
            file,
        })
    }

    /// Prefs that are never written anywhere
    pub fn in_memory() -> Self {
        Self {
            path: None,
            file: PrefsFile::default(),
        }
    }

    /// Directory of the last input, or the system temp dir
    pub fn last_dir(&self) -> PathBuf {
        self.file
            .last_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    /// Find `input` as given, or relative to the last directory.
    ///
    /// Returns `None` when neither location holds a file.
    pub fn resolve_input(&self, input: &Path) -> Option<PathBuf> {
        if input.is_file() {
            return Some(input.to_path_buf());
        }
        if input.is_relative() {
            let candidate = self.last_dir().join(input);
            if candidate.is_file() {
                debug!(path = %candidate.display(), "resolved against last directory");
                return Some(candidate);
            }
        }
        None
    }

    /// Record the directory of `input` and persist
    pub fn remember(&mut self, input: &Path) -> Result<(), PrefsError> {
        let dir = match input.canonicalize()?.parent() {
            Some(dir) => dir.to_path_buf(),
            None => return Ok(()),
        };
        if self.file.last_dir.as_deref() == Some(dir.as_path()) {
            return Ok(());
        }
        self.file.last_dir = Some(dir);
        self.save()
    }

    fn save(&self) -> Result<(), PrefsError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(&self.file)?)?;
        debug!(path = %path.display(), "saved preferences");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_to_temp_dir() {
        assert_eq!(Prefs::in_memory().last_dir(), std::env::temp_dir());
    }

    #[test]
    fn test_remember_persists_directory() {
        let dir = TempDir::new().unwrap();
        let prefs_path = dir.path().join("nested").join("prefs.json");
        let video = dir.path().join("clip.mp4");
        fs::write(&video, b"x").unwrap();

        let mut prefs = Prefs::open(prefs_path.clone()).unwrap();
        prefs.remember(&video).unwrap();

        let reopened = Prefs::open(prefs_path).unwrap();
        assert_eq!(reopened.last_dir(), dir.path().canonicalize().unwrap());
    }

    #[test]
    fn test_resolve_against_last_dir() {
        let dir = TempDir::new().unwrap();
        let video = dir.path().join("gifloop-prefs-test-clip.mp4");
        fs::write(&video, b"x").unwrap();

        let mut prefs = Prefs::in_memory();
        prefs.remember(&video).unwrap();

        let resolved = prefs
            .resolve_input(Path::new("gifloop-prefs-test-clip.mp4"))
            .unwrap();
        assert!(resolved.is_file());
        assert_eq!(prefs.resolve_input(Path::new("absent.mp4")), None);
    }

    #[test]
    fn test_corrupt_prefs_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prefs.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(Prefs::open(path), Err(PrefsError::Json(_))));
    }
}

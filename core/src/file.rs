use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::{BroError, Result};

/// Existence and modification time of a path, captured once.
///
/// The snapshot is not refreshed. Take it right before comparing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    path: PathBuf,
    exists: bool,
    modified: Option<SystemTime>,
}

impl File {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let metadata = fs::metadata(&path).ok();

        Self {
            exists: metadata.is_some(),
            modified: metadata.and_then(|m| m.modified().ok()),
            path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn modified(&self) -> Option<SystemTime> {
        self.modified
    }

    /// Extension including the leading dot, e.g. `.c` for `main.c`.
    pub fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
    }

    /// True only when both files exist and `self` is strictly newer.
    pub fn is_newer_than(&self, other: &File) -> bool {
        match (self.modified, other.modified) {
            (Some(mine), Some(theirs)) => self.exists && other.exists && mine > theirs,
            _ => false,
        }
    }

    fn require(&self) -> Result<()> {
        if !self.exists {
            return Err(BroError::MissingFile(self.path.clone()));
        }
        Ok(())
    }

    pub fn copy_to(&self, dest: impl AsRef<Path>) -> Result<File> {
        self.require()?;
        let dest = dest.as_ref();
        fs::copy(&self.path, dest).map_err(|e| BroError::io(dest, e))?;
        Ok(File::new(dest))
    }

    pub fn move_to(&self, dest: impl AsRef<Path>) -> Result<File> {
        self.require()?;
        let dest = dest.as_ref();
        fs::rename(&self.path, dest).map_err(|e| BroError::io(dest, e))?;
        Ok(File::new(dest))
    }

    pub fn remove(&self) -> Result<()> {
        self.require()?;
        fs::remove_file(&self.path).map_err(|e| BroError::io(&self.path, e))
    }
}

/// A directory snapshot with recursive discovery helpers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    file: File,
}

impl Directory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: File::new(path),
        }
    }

    pub fn as_file(&self) -> &File {
        &self.file
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn exists(&self) -> bool {
        self.file.exists()
    }

    pub fn create(&self) -> Result<()> {
        fs::create_dir_all(self.path()).map_err(|e| BroError::io(self.path(), e))
    }

    /// Every regular file below this directory, sorted by path per level.
    pub fn files(&self) -> Result<Vec<File>> {
        self.file.require()?;
        let mut files = Vec::new();
        walk(self.path(), &mut |path, is_dir| {
            if !is_dir {
                files.push(File::new(path));
            }
        })?;
        Ok(files)
    }

    /// Recreates the sub-directory skeleton (no file contents) under `dest`.
    pub fn replicate(&self, dest: impl AsRef<Path>) -> Result<()> {
        self.file.require()?;
        let dest = dest.as_ref();
        fs::create_dir_all(dest).map_err(|e| BroError::io(dest, e))?;

        let root = self.path();
        let mut result = Ok(());
        walk(root, &mut |path, is_dir| {
            if !is_dir || result.is_err() {
                return;
            }
            if let Ok(rel) = path.strip_prefix(root) {
                let target = dest.join(rel);
                if let Err(e) = fs::create_dir_all(&target) {
                    result = Err(BroError::io(target, e));
                }
            }
        })?;
        result
    }
}

/// Symlinked directories are not descended into, so links pointing back up
/// the tree cannot loop or report one file under several paths.
fn walk(dir: &Path, visit: &mut dyn FnMut(&Path, bool)) -> Result<()> {
    let mut entries: Vec<(PathBuf, fs::FileType)> = fs::read_dir(dir)
        .map_err(|e| BroError::io(dir, e))?
        .flatten()
        .filter_map(|entry| Some((entry.path(), entry.file_type().ok()?)))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    for (path, file_type) in entries {
        if file_type.is_dir() {
            visit(&path, true);
            walk(&path, visit)?;
        } else if file_type.is_symlink() && path.is_dir() {
            continue;
        } else {
            visit(&path, false);
        }
    }

    Ok(())
}

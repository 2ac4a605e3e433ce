use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::file::{Directory, File};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Source {
    File(PathBuf),
    Directory(PathBuf),
}

/// A named, ordered bundle of files processed together by stages.
///
/// Directories are scanned whenever the file list is materialised, so files
/// created between two builds are picked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    name: String,
    sources: Vec<Source>,
    deps: Vec<PathBuf>,
    flags: Vec<String>,
    disabled: bool,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sources: Vec::new(),
            deps: Vec::new(),
            flags: Vec::new(),
            disabled: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_file(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.sources.push(Source::File(path.into()));
        self
    }

    pub fn add_directory(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.sources.push(Source::Directory(path.into()));
        self
    }

    /// Extra paths the module's link output depends on.
    pub fn add_dep(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.deps.push(path.into());
        self
    }

    /// Linker flags bound as `${flags}` by link stages.
    pub fn add_flag(&mut self, flag: impl Into<String>) -> &mut Self {
        self.flags.push(flag.into());
        self
    }

    pub fn deps(&self) -> &[PathBuf] {
        &self.deps
    }

    pub fn flags(&self) -> &[String] {
        &self.flags
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn set_disabled(&mut self, disabled: bool) {
        self.disabled = disabled;
    }

    /// Current files in insertion order. Missing directories contribute nothing.
    pub fn files(&self) -> Result<Vec<File>> {
        let mut files = Vec::new();

        for source in &self.sources {
            match source {
                Source::File(path) => files.push(File::new(path)),
                Source::Directory(path) => {
                    let dir = Directory::new(path);
                    if dir.exists() {
                        files.extend(dir.files()?);
                    }
                }
            }
        }

        Ok(files)
    }

    /// Copy of this module with directories expanded into their files.
    pub fn snapshot(&self) -> Result<Module> {
        let sources = self
            .files()?
            .into_iter()
            .map(|file| Source::File(file.path().to_path_buf()))
            .collect();

        Ok(Module {
            sources,
            ..self.clone()
        })
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.sources.iter().any(|source| match source {
            Source::File(p) => p == path,
            Source::Directory(_) => false,
        })
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Paths of the entries from `start` onwards, used to list derived outputs.
    pub fn paths_from(&self, start: usize) -> Vec<PathBuf> {
        self.sources
            .iter()
            .skip(start)
            .map(|source| match source {
                Source::File(p) | Source::Directory(p) => p.clone(),
            })
            .collect()
    }
}

use indexmap::IndexMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::command::CmdTmpl;
use crate::entry::CmdEntry;
use crate::error::Result;
use crate::module::Module;
use crate::template::{Template, Vars};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageKind {
    /// One output per matching input, with `ext` appended to the file name.
    Transform { ext: String },
    /// All matching inputs into one output named by the template.
    Link { output: Template },
}

/// A named pipeline step mapping a module's files to build actions.
#[derive(Debug, Clone)]
pub struct Stage {
    name: String,
    kind: StageKind,
    cmds: IndexMap<String, Arc<CmdTmpl>>,
}

impl Stage {
    pub fn transform(name: impl Into<String>, ext: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: StageKind::Transform { ext: ext.into() },
            cmds: IndexMap::new(),
        }
    }

    pub fn link(name: impl Into<String>, output: impl Into<Template>) -> Self {
        Self {
            name: name.into(),
            kind: StageKind::Link {
                output: output.into(),
            },
            cmds: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &StageKind {
        &self.kind
    }

    pub fn is_transform(&self) -> bool {
        matches!(self.kind, StageKind::Transform { .. })
    }

    /// Binds files ending in `ext` (exact match, dot included) to `cmd`.
    pub fn add_cmd(&mut self, ext: impl Into<String>, cmd: Arc<CmdTmpl>) {
        self.cmds.insert(ext.into(), cmd);
    }

    pub fn cmd_for(&self, ext: &str) -> Option<&Arc<CmdTmpl>> {
        self.cmds.get(ext)
    }

    pub fn cmds(&self) -> impl Iterator<Item = (&str, &Arc<CmdTmpl>)> {
        self.cmds.iter().map(|(ext, cmd)| (ext.as_str(), cmd))
    }

    /// Plans this stage for `module` and appends the outputs to it.
    pub fn apply(&self, module: &mut Module, root: &Path, extra: &Vars) -> Result<Vec<CmdEntry>> {
        if self.cmds.is_empty() {
            return Ok(Vec::new());
        }

        match &self.kind {
            StageKind::Transform { ext } => self.apply_transform(module, root, ext, extra),
            StageKind::Link { output } => self.apply_link(module, root, output, extra),
        }
    }

    fn apply_transform(
        &self,
        module: &mut Module,
        root: &Path,
        ext: &str,
        extra: &Vars,
    ) -> Result<Vec<CmdEntry>> {
        let mut flags = extra.clone();
        flags.insert("mod".to_string(), vec![module.name().to_string()]);

        let mut entries = Vec::new();
        let mut outputs: Vec<PathBuf> = Vec::new();

        for file in module.files()? {
            let Some(cmd) = file.extension().and_then(|e| self.cmds.get(&e)) else {
                continue;
            };

            let output = self.output_path(file.path(), module.name(), root, ext);
            if outputs.contains(&output) {
                continue;
            }

            entries.push(
                CmdEntry::new(Arc::clone(cmd), [file.path()], output.clone())
                    .with_flags(flags.clone()),
            );
            outputs.push(output);
        }

        for output in outputs {
            module.add_file(output);
        }

        Ok(entries)
    }

    fn apply_link(
        &self,
        module: &mut Module,
        root: &Path,
        output: &Template,
        extra: &Vars,
    ) -> Result<Vec<CmdEntry>> {
        let Some(cmd) = self.cmds.values().next() else {
            return Ok(Vec::new());
        };

        let mut flags = extra.clone();
        flags.insert("mod".to_string(), vec![module.name().to_string()]);
        flags.insert("flags".to_string(), module.flags().to_vec());

        let inputs: Vec<PathBuf> = module
            .files()?
            .into_iter()
            .filter(|f| f.extension().is_some_and(|e| self.cmds.contains_key(&e)))
            .map(|f| f.path().to_path_buf())
            .fold(Vec::new(), |mut acc, path| {
                if !acc.contains(&path) {
                    acc.push(path);
                }
                acc
            });

        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let name = output
            .resolve(&flags)
            .into_iter()
            .find(|s| !s.is_empty())
            .unwrap_or_else(|| module.name().to_string());
        let target = root.join(&self.name).join(name);

        let entry = CmdEntry::new(Arc::clone(cmd), inputs, target.clone())
            .with_deps(module.deps().iter().cloned())
            .with_flags(flags);

        module.add_file(target);
        Ok(vec![entry])
    }

    /// `<root>/<stage>/<module>/<rel><ext>`, where `rel` drops an earlier
    /// `<root>/<any stage>/<module>/` prefix so build trees never nest.
    pub fn output_path(&self, input: &Path, module: &str, root: &Path, ext: &str) -> PathBuf {
        let rel = strip_build_prefix(input, root, module).unwrap_or_else(|| relative_key(input));
        let mut path = root.join(&self.name).join(module).join(rel).into_os_string();
        path.push(ext);
        PathBuf::from(path)
    }
}

fn strip_build_prefix(input: &Path, root: &Path, module: &str) -> Option<PathBuf> {
    let mut rest = input.strip_prefix(root).ok()?.components();
    rest.next()?;
    match rest.next()? {
        Component::Normal(name) if name == module => {}
        _ => return None,
    }
    let rel = rest.as_path().to_path_buf();
    if rel.as_os_str().is_empty() {
        return None;
    }
    Some(rel)
}

fn relative_key(input: &Path) -> PathBuf {
    input
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_os_string()),
            Component::ParentDir => Some("__".into()),
            _ => None,
        })
        .collect()
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            StageKind::Transform { .. } => "transform",
            StageKind::Link { .. } => "link",
        };
        write!(f, "{} ({})", self.name, kind)
    }
}

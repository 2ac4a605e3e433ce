use indexmap::IndexMap;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::command::{Cmd, CmdTmpl};
use crate::config::{Config, ModuleKind};
use crate::entry::{make_path, ninja_ident, ninja_path, ninja_rule, CmdEntry, CompileCommand};
use crate::error::{BroError, Result};
use crate::executor::{CmdPool, ExecContext, Runnable, Status};
use crate::file::File;
use crate::flags::{Flags, FRESH_OVERRIDE, REMOVE_OLD};
use crate::module::Module;
use crate::stage::Stage;

pub const DEFAULT_BUILD_ROOT: &str = "build";

const GENERATED_HEADER: &str = "# Generated by bro. Do not edit.";

fn default_flags() -> Flags {
    let mut flags = Flags::new();
    flags.set("cc", "gcc");
    flags.set("cxx", "g++");
    flags.set("ld", "g++");
    flags.set("ar", "ar");
    flags.set("build", DEFAULT_BUILD_ROOT);
    flags.set("rustc", "rustc");
    flags.set("rebuild_flags", "--edition 2021 -O");
    flags
}

fn default_cmds() -> Vec<CmdTmpl> {
    vec![
        CmdTmpl::new("cc", ["${cc}", "${cflags}", "-c", "${in}", "-o", "${out}"]),
        CmdTmpl::new("cxx", ["${cxx}", "${cxxflags}", "-c", "${in}", "-o", "${out}"]),
        CmdTmpl::new("exe", ["${ld}", "${in}", "-o", "${out}", "${flags}", "${ldflags}"]),
        CmdTmpl::new("ar", ["${ar}", "rcs", "${out}", "${in}"]),
        CmdTmpl::new("so", ["${ld}", "-shared", "${in}", "-o", "${out}", "${flags}"]),
        CmdTmpl::new("rebuild", ["${rustc}", "${rebuild_flags}", "${in}", "-o", "${out}"]),
    ]
}

/// Paths the self-freshness check compares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfBuild {
    source: PathBuf,
    header: Option<PathBuf>,
    binary: PathBuf,
}

impl SelfBuild {
    pub fn new(source: impl Into<PathBuf>, binary: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            header: None,
            binary: binary.into(),
        }
    }

    pub fn with_header(mut self, header: impl Into<PathBuf>) -> Self {
        self.header = Some(header.into());
        self
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// `<binary>.old`
    pub fn backup(&self) -> PathBuf {
        let mut path = self.binary.clone().into_os_string();
        path.push(".old");
        PathBuf::from(path)
    }
}

#[derive(Debug, Clone)]
pub struct PlannedStage {
    pub name: String,
    pub transform: bool,
    pub entries: Vec<CmdEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedModule {
    pub name: String,
    pub outputs: Vec<PathBuf>,
}

/// Every action of one build pass, grouped by stage in registration order.
#[derive(Debug, Clone)]
pub struct Plan {
    pub root: PathBuf,
    pub stages: Vec<PlannedStage>,
    pub modules: Vec<PlannedModule>,
}

impl Plan {
    pub fn entries(&self) -> impl Iterator<Item = &CmdEntry> {
        self.stages.iter().flat_map(|stage| stage.entries.iter())
    }
}

pub struct Bro {
    flags: Flags,
    cmds: IndexMap<String, Arc<CmdTmpl>>,
    modules: IndexMap<String, Module>,
    stages: IndexMap<String, Stage>,
    bindings: BTreeMap<usize, BTreeSet<usize>>,
    self_build: SelfBuild,
    ctx: ExecContext,
}

impl Bro {
    /// `args[0]` is the running binary; the rest are flag words.
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::with_config(args, &Config::default())
    }

    pub fn from_env() -> Self {
        Self::new(std::env::args())
    }

    /// Defaults, then `config.flags`, then command-line flags.
    pub fn with_config<I, S>(args: I, config: &Config) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut args = args.into_iter();
        let binary = args
            .next()
            .map(|arg| PathBuf::from(arg.as_ref()))
            .unwrap_or_default();

        let mut flags = default_flags();
        for (name, value) in &config.flags {
            flags.set(name.clone(), value.clone());
        }
        flags.extend_from_args(args);

        let mut bro = Self {
            flags,
            cmds: IndexMap::new(),
            modules: IndexMap::new(),
            stages: IndexMap::new(),
            bindings: BTreeMap::new(),
            self_build: SelfBuild::new(binary.with_extension("rs"), binary),
            ctx: ExecContext::default(),
        };

        for cmd in default_cmds() {
            bro.register_cmd(cmd);
        }

        bro
    }

    pub fn with_self_build(mut self, self_build: SelfBuild) -> Self {
        self.self_build = self_build;
        self
    }

    pub fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
        self.self_build.source = source.into();
        self
    }

    pub fn with_header(mut self, header: impl Into<PathBuf>) -> Self {
        self.self_build.header = Some(header.into());
        self
    }

    pub fn with_context(mut self, ctx: ExecContext) -> Self {
        self.ctx = ctx;
        self
    }

    pub fn ctx(&self) -> &ExecContext {
        &self.ctx
    }

    pub fn flags(&self) -> &Flags {
        &self.flags
    }

    pub fn flags_mut(&mut self) -> &mut Flags {
        &mut self.flags
    }

    pub fn self_build(&self) -> &SelfBuild {
        &self.self_build
    }

    pub fn build_root(&self) -> PathBuf {
        let root = self.flags.get("build").unwrap_or(DEFAULT_BUILD_ROOT);
        Config::expand_path(root)
    }

    // Registries. Inserts return the new index, or `None` for a taken name.

    pub fn register_cmd(&mut self, cmd: CmdTmpl) -> Option<usize> {
        if self.cmds.contains_key(cmd.name()) {
            return None;
        }
        let (index, _) = self.cmds.insert_full(cmd.name().to_string(), Arc::new(cmd));
        Some(index)
    }

    pub fn cmd(&self, name: &str) -> Option<&Arc<CmdTmpl>> {
        self.cmds.get(name)
    }

    pub fn cmd_at(&self, index: usize) -> Option<&Arc<CmdTmpl>> {
        self.cmds.get_index(index).map(|(_, cmd)| cmd)
    }

    pub fn cmds(&self) -> impl Iterator<Item = &Arc<CmdTmpl>> {
        self.cmds.values()
    }

    pub fn register_module(&mut self, name: impl Into<String>) -> Option<usize> {
        let name = name.into();
        if self.modules.contains_key(&name) {
            return None;
        }
        let module = Module::new(name.clone());
        let (index, _) = self.modules.insert_full(name, module);
        Some(index)
    }

    /// Registers a fully built module under its own name.
    pub fn add_module(&mut self, module: Module) -> Option<usize> {
        if self.modules.contains_key(module.name()) {
            return None;
        }
        let (index, _) = self.modules.insert_full(module.name().to_string(), module);
        Some(index)
    }

    pub fn module(&self, name: &str) -> Option<&Module> {
        self.modules.get(name)
    }

    pub fn module_mut(&mut self, name: &str) -> Option<&mut Module> {
        self.modules.get_mut(name)
    }

    pub fn module_at(&self, index: usize) -> Option<&Module> {
        self.modules.get_index(index).map(|(_, module)| module)
    }

    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.modules.values()
    }

    pub fn register_stage(&mut self, stage: Stage) -> Option<usize> {
        if self.stages.contains_key(stage.name()) {
            return None;
        }
        let (index, _) = self.stages.insert_full(stage.name().to_string(), stage);
        Some(index)
    }

    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stages.get(name)
    }

    pub fn stage_at(&self, index: usize) -> Option<&Stage> {
        self.stages.get_index(index).map(|(_, stage)| stage)
    }

    /// Routes files with extension `ext` in `stage` to the registered `cmd`.
    pub fn use_cmd(&mut self, stage: &str, ext: &str, cmd: &str) -> Result<()> {
        let tmpl = self
            .cmds
            .get(cmd)
            .cloned()
            .ok_or_else(|| BroError::UnknownCommand(cmd.to_string()))?;
        let stage = self
            .stages
            .get_mut(stage)
            .ok_or_else(|| BroError::UnknownStage(stage.to_string()))?;
        stage.add_cmd(ext, tmpl);
        Ok(())
    }

    /// Applies `stage` to `module` on every build pass.
    pub fn bind(&mut self, stage: &str, module: &str) -> Result<()> {
        let stage_index = self
            .stages
            .get_index_of(stage)
            .ok_or_else(|| BroError::UnknownStage(stage.to_string()))?;
        let module_index = self
            .modules
            .get_index_of(module)
            .ok_or_else(|| BroError::UnknownModule(module.to_string()))?;
        self.bindings
            .entry(stage_index)
            .or_default()
            .insert(module_index);
        Ok(())
    }

    pub fn bound_modules(&self, stage: &str) -> Vec<&str> {
        let Some(index) = self.stages.get_index_of(stage) else {
            return Vec::new();
        };
        self.bindings
            .get(&index)
            .into_iter()
            .flatten()
            .filter_map(|mi| self.modules.get_index(*mi).map(|(name, _)| name.as_str()))
            .collect()
    }

    /// Registers the stock C/C++ stages: `obj` (compile to `.o`), `lib`
    /// (archive `build/lib/lib<mod>.a`) and `bin` (link `build/bin/<mod>`).
    /// Archives come first so executables can link against them.
    pub fn c_pipeline(&mut self) -> Result<()> {
        self.register_stage(Stage::transform("obj", ".o"));
        self.register_stage(Stage::link("lib", "lib${mod}.a"));
        self.register_stage(Stage::link("bin", "${mod}"));

        self.use_cmd("obj", ".c", "cc")?;
        for ext in [".cpp", ".cc", ".cxx"] {
            self.use_cmd("obj", ext, "cxx")?;
        }
        self.use_cmd("bin", ".o", "exe")?;
        self.use_cmd("lib", ".o", "ar")?;
        Ok(())
    }

    /// Registers the modules declared in `config` on the C/C++ pipeline.
    pub fn add_config_modules(&mut self, config: &Config) -> Result<()> {
        if config.modules.is_empty() {
            return Ok(());
        }
        if self.stage("obj").is_none() {
            self.c_pipeline()?;
        }

        for (name, module_config) in &config.modules {
            if self.add_module(module_config.to_module(name)).is_none() {
                return Err(BroError::Duplicate(name.clone()));
            }
            self.bind("obj", name)?;
            match module_config.kind {
                ModuleKind::Exe => self.bind("bin", name)?,
                ModuleKind::Lib => self.bind("lib", name)?,
            }
        }

        Ok(())
    }

    // Self rebuild

    /// False when the source or header is strictly newer than the binary.
    pub fn is_fresh(&self) -> bool {
        if let Some(forced) = self.flags.get_bool(FRESH_OVERRIDE) {
            return forced;
        }

        let binary = File::new(&self.self_build.binary);
        if File::new(&self.self_build.source).is_newer_than(&binary) {
            return false;
        }

        match &self.self_build.header {
            Some(header) => !File::new(header).is_newer_than(&binary),
            None => true,
        }
    }

    /// Backs up the binary, recompiles it and reruns it with the forwarded
    /// flags. Returns the rerun's status.
    pub fn rebuild(&self) -> Result<Status> {
        let logger = self.ctx.logger();
        let binary = File::new(&self.self_build.binary);
        let backup = self.self_build.backup();

        binary.copy_to(&backup)?;
        logger.debug(&format!("Backed up {} to {}", binary.path().display(), backup.display()));

        let rebuild = self
            .cmds
            .get("rebuild")
            .cloned()
            .ok_or_else(|| BroError::UnknownCommand("rebuild".to_string()))?;
        let status = CmdEntry::new(rebuild, [self.self_build.source.clone()], binary.path())
            .with_flags(self.flags.to_vars())
            .compile()
            .run(&self.ctx);
        if status != 0 {
            return Err(BroError::Rebuild(status));
        }

        let mut rerun = Cmd::new([binary.path().to_string_lossy()]);
        for word in self.flags.forwarded() {
            rerun.push(word);
        }
        let status = rerun.run(&self.ctx);

        if status == 0 && self.flags.is_true(REMOVE_OLD) {
            if let Err(e) = File::new(&backup).remove() {
                logger.warn(&e.to_string());
            }
        }

        Ok(status)
    }

    /// Returns only when the binary is fresh. Otherwise rebuilds, reruns and
    /// exits with the rerun's status; a failed backup or compile exits too.
    pub fn fresh(&self) {
        if self.is_fresh() {
            return;
        }

        self.ctx.logger().info(&format!(
            "{} changed, rebuilding {}",
            self.self_build.source.display(),
            self.self_build.binary.display()
        ));

        match self.rebuild() {
            Ok(status) => std::process::exit(status),
            Err(e) => {
                self.ctx.logger().error(&e.to_string());
                std::process::exit(e.code());
            }
        }
    }

    // Planning and the three plan interpreters

    pub fn plan(&self) -> Result<Plan> {
        let root = self.build_root();
        let vars = self.flags.to_vars();

        let mut working: BTreeMap<usize, (Module, usize)> = BTreeMap::new();
        for (index, module) in self.modules.values().enumerate() {
            if module.is_disabled() {
                continue;
            }
            let snapshot = module.snapshot()?;
            let loaded = snapshot.len();
            working.insert(index, (snapshot, loaded));
        }

        let mut stages = Vec::with_capacity(self.stages.len());
        for (index, stage) in self.stages.values().enumerate() {
            let mut entries = Vec::new();
            for module_index in self.bindings.get(&index).into_iter().flatten() {
                if let Some((module, _)) = working.get_mut(module_index) {
                    entries.extend(stage.apply(module, &root, &vars)?);
                }
            }
            stages.push(PlannedStage {
                name: stage.name().to_string(),
                transform: stage.is_transform(),
                entries,
            });
        }

        let modules = working
            .into_values()
            .map(|(module, loaded)| PlannedModule {
                name: module.name().to_string(),
                outputs: module.paths_from(loaded),
            })
            .collect();

        Ok(Plan {
            root,
            stages,
            modules,
        })
    }

    /// Runs every stage in order; within a stage all actions run at once.
    pub async fn build(&self) -> Status {
        let plan = match self.plan() {
            Ok(plan) => plan,
            Err(e) => {
                self.ctx.logger().error(&e.to_string());
                return e.code();
            }
        };

        if let Err(e) = fs::create_dir_all(&plan.root) {
            let err = BroError::io(&plan.root, e);
            self.ctx.logger().error(&err.to_string());
            return err.code();
        }

        self.execute(plan).await
    }

    pub async fn execute(&self, plan: Plan) -> Status {
        let logger = self.ctx.logger();

        for stage in plan.stages {
            if stage.entries.is_empty() {
                continue;
            }

            logger.info(&format!("Stage {}: {} action(s)", stage.name, stage.entries.len()));

            let mut pool = CmdPool::new();
            for mut entry in stage.entries {
                entry.set_smart(true);
                pool.add(Arc::new(entry));
            }

            let status = Arc::new(pool).spawn(&self.ctx).wait().await;
            if status != 0 {
                logger.error(&format!("Stage {} failed", stage.name));
                return status;
            }
        }

        0
    }

    /// Applies module selection flags and `clean`, then builds.
    ///
    /// With no module flag set to true every module that is not already
    /// disabled builds; otherwise only the selected ones do. A module flag
    /// always wins: true enables the module, false disables it.
    pub async fn run(&mut self) -> Status {
        let selected = self
            .modules
            .keys()
            .any(|name| self.flags.get_bool(name) == Some(true));

        for (name, module) in self.modules.iter_mut() {
            let enabled = self
                .flags
                .get_bool(name)
                .unwrap_or(!selected && !module.is_disabled());
            module.set_disabled(!enabled);
        }

        if self.flags.is_true("clean") {
            let root = self.build_root();
            if root.exists() {
                self.ctx
                    .logger()
                    .info(&format!("Cleaning {}", root.display()));
                if let Err(e) = fs::remove_dir_all(&root) {
                    let err = BroError::io(&root, e);
                    self.ctx.logger().error(&err.to_string());
                    return err.code();
                }
            }
        }

        self.build().await
    }

    pub fn ninja(&self) -> Result<String> {
        let plan = self.plan()?;
        let root = ninja_path(&plan.root);
        let mut text = String::new();

        let _ = writeln!(text, "{}", GENERATED_HEADER);
        let _ = writeln!(text, "ninja_required_version = 1.3\n");

        let mut rules: IndexMap<&str, &CmdTmpl> = IndexMap::new();
        for entry in plan.entries() {
            rules.entry(entry.cmd().name()).or_insert(entry.cmd());
        }
        for cmd in rules.values() {
            let _ = writeln!(text, "{}", ninja_rule(cmd));
        }
        let _ = writeln!(
            text,
            "rule bro_clean\n  command = rm -rf {}\n  description = clean {}\n",
            root, root
        );

        for entry in plan.entries() {
            let _ = writeln!(text, "{}", entry.ninja());
        }

        for module in &plan.modules {
            let outputs: Vec<String> = module.outputs.iter().map(|p| ninja_path(p)).collect();
            let _ = writeln!(text, "build {}: phony {}", ninja_ident(&module.name), outputs.join(" "));
        }

        let names: Vec<String> = plan.modules.iter().map(|m| ninja_ident(&m.name)).collect();
        let _ = writeln!(text, "build all: phony {}", names.join(" "));
        let _ = writeln!(text, "build clean: bro_clean");
        let _ = writeln!(text, "\ndefault all");

        Ok(text)
    }

    pub fn makefile(&self) -> Result<String> {
        let plan = self.plan()?;
        let root = make_path(&plan.root);
        let mut text = String::new();

        let names: Vec<String> = plan.modules.iter().map(|m| m.name.clone()).collect();

        let _ = writeln!(text, "{}", GENERATED_HEADER);
        let _ = writeln!(text, ".PHONY: all clean {}\n", names.join(" "));
        let _ = writeln!(text, "all: {}\n", names.join(" "));

        for module in &plan.modules {
            let outputs: Vec<String> = module.outputs.iter().map(|p| make_path(p)).collect();
            let _ = writeln!(text, "{}: {}\n", module.name, outputs.join(" "));
        }

        let mut dirs: BTreeSet<PathBuf> = BTreeSet::new();
        for entry in plan.entries() {
            let _ = writeln!(text, "{}", entry.make());
            if let Some(parent) = entry.output().parent().filter(|p| !p.as_os_str().is_empty()) {
                let _ = writeln!(text, "{}: | {}\n", make_path(entry.output()), make_path(parent));
                dirs.insert(parent.to_path_buf());
            }
        }

        for dir in &dirs {
            let dir = make_path(dir);
            let _ = writeln!(text, "{}:\n\tmkdir -p {}\n", dir, dir);
        }

        let _ = writeln!(text, "clean:\n\trm -rf {}", root);

        Ok(text)
    }

    /// `compile_commands.json` for every transform-stage action.
    pub fn compile_commands(&self) -> Result<String> {
        let plan = self.plan()?;
        let directory = std::env::current_dir().map_err(|e| BroError::io(".", e))?;

        let records: Vec<CompileCommand> = plan
            .stages
            .iter()
            .filter(|stage| stage.transform)
            .flat_map(|stage| stage.entries.iter())
            .map(|entry| entry.compile_command(&directory))
            .collect();

        Ok(serde_json::to_string_pretty(&records).unwrap_or_else(|_| "[]".to_string()))
    }

    pub fn write_ninja(&self, path: impl AsRef<Path>) -> Result<()> {
        write_file(path.as_ref(), &self.ninja()?)
    }

    pub fn write_makefile(&self, path: impl AsRef<Path>) -> Result<()> {
        write_file(path.as_ref(), &self.makefile()?)
    }

    pub fn write_compile_commands(&self, path: impl AsRef<Path>) -> Result<()> {
        write_file(path.as_ref(), &self.compile_commands()?)
    }
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content).map_err(|e| BroError::io(path, e))
}

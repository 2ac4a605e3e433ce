use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::command::{shell_quote, Cmd, CmdTmpl};
use crate::error::BroError;
use crate::executor::{ExecContext, Runnable, Status};
use crate::file::File;
use crate::template::Vars;

/// One planned build action: inputs and dependencies to one output.
///
/// Execution, the Ninja statement and the Makefile rule are all derived from
/// the same fields, so the three always describe the same action.
#[derive(Debug, Clone)]
pub struct CmdEntry {
    output: PathBuf,
    inputs: Vec<PathBuf>,
    deps: Vec<PathBuf>,
    cmd: Arc<CmdTmpl>,
    flags: Vars,
    smart: bool,
}

/// A `compile_commands.json` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileCommand {
    pub directory: String,
    pub arguments: Vec<String>,
    pub file: String,
    pub output: String,
}

impl CmdEntry {
    pub fn new<I, P>(cmd: Arc<CmdTmpl>, inputs: I, output: impl Into<PathBuf>) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            output: output.into(),
            inputs: inputs.into_iter().map(Into::into).collect(),
            deps: Vec::new(),
            cmd,
            flags: Vars::new(),
            smart: false,
        }
    }

    pub fn with_deps<I, P>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.deps = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_flags(mut self, flags: Vars) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_smart(mut self, smart: bool) -> Self {
        self.smart = smart;
        self
    }

    pub fn set_smart(&mut self, smart: bool) {
        self.smart = smart;
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn inputs(&self) -> &[PathBuf] {
        &self.inputs
    }

    pub fn deps(&self) -> &[PathBuf] {
        &self.deps
    }

    pub fn cmd(&self) -> &CmdTmpl {
        &self.cmd
    }

    pub fn flags(&self) -> &Vars {
        &self.flags
    }

    pub fn is_smart(&self) -> bool {
        self.smart
    }

    /// Extra flags with the entry's own `in`/`out` laid over them.
    pub fn vars(&self) -> Vars {
        let mut vars = self.flags.clone();
        vars.insert("in".to_string(), self.inputs.iter().map(|p| path_str(p)).collect());
        vars.insert("out".to_string(), vec![path_str(&self.output)]);
        vars
    }

    pub fn compile(&self) -> Cmd {
        self.cmd.compile_with(&self.vars())
    }

    /// Missing output, or any input or dependency strictly newer than it.
    pub fn is_stale(&self) -> bool {
        let output = File::new(&self.output);
        if !output.exists() {
            return true;
        }

        self.inputs
            .iter()
            .chain(self.deps.iter())
            .any(|path| File::new(path).is_newer_than(&output))
    }

    pub fn ninja(&self) -> String {
        let mut text = format!(
            "build {}: {}",
            ninja_path(&self.output),
            ninja_ident(self.cmd.name())
        );
        for input in &self.inputs {
            text.push(' ');
            text.push_str(&ninja_path(input));
        }
        if !self.deps.is_empty() {
            text.push_str(" |");
            for dep in &self.deps {
                text.push(' ');
                text.push_str(&ninja_path(dep));
            }
        }
        text.push('\n');

        // Only variables the rule reads; other names could be Ninja edge
        // settings such as `pool` or `depfile`.
        let used: BTreeSet<String> = self
            .cmd
            .args()
            .iter()
            .flat_map(|arg| arg.variables())
            .collect();
        for (name, values) in &self.flags {
            if name == "in" || name == "out" || !used.contains(name) {
                continue;
            }
            let _ = writeln!(text, "  {} = {}", name, ninja_words(values));
        }

        let vars = self.vars();
        for (index, arg) in self.cmd.args().iter().enumerate() {
            if arg.is_literal() || arg.sole_variable().is_some() {
                continue;
            }
            let words: Vec<String> = arg
                .resolve(&vars)
                .into_iter()
                .filter(|w| !w.is_empty())
                .collect();
            let _ = writeln!(text, "  {} = {}", synthetic_arg(index), ninja_words(&words));
        }

        text
    }

    pub fn make(&self) -> String {
        let mut text = make_path(&self.output);
        text.push(':');
        for path in self.inputs.iter().chain(self.deps.iter()) {
            text.push(' ');
            text.push_str(&make_path(path));
        }
        let _ = write!(text, "\n\t{}\n", self.compile().line().replace('$', "$$"));
        text
    }

    pub fn compile_command(&self, directory: &Path) -> CompileCommand {
        CompileCommand {
            directory: path_str(directory),
            arguments: self.compile().args().to_vec(),
            file: self.inputs.first().map(|p| path_str(p)).unwrap_or_default(),
            output: path_str(&self.output),
        }
    }
}

impl Runnable for CmdEntry {
    fn run(&self, ctx: &ExecContext) -> Status {
        if self.smart && !self.is_stale() {
            ctx.logger()
                .debug(&format!("Up to date: {}", self.output.display()));
            return 0;
        }

        if let Some(parent) = self.output.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = fs::create_dir_all(parent) {
                let err = BroError::io(parent, e);
                ctx.logger().error(&err.to_string());
                return err.code();
            }
        }

        self.compile().run(ctx)
    }
}

/// `rule` block for a command template.
///
/// Arguments that are a single placeholder become Ninja variables. Arguments
/// mixing text and placeholders cannot fan out inside one Ninja word, so each
/// build statement binds them pre-resolved under a synthetic name.
pub fn ninja_rule(cmd: &CmdTmpl) -> String {
    let words: Vec<String> = cmd
        .args()
        .iter()
        .enumerate()
        .map(|(index, arg)| {
            if let Some(name) = arg.sole_variable() {
                ninja_var(name)
            } else if arg.is_literal() {
                let literal = arg.resolve(&Vars::new()).concat();
                shell_quote(&literal).replace('$', "$$")
            } else {
                format!("${}", synthetic_arg(index))
            }
        })
        .collect();

    format!(
        "rule {}\n  command = {}\n  description = {} $out\n",
        ninja_ident(cmd.name()),
        words.join(" "),
        cmd.name().replace('$', "$$")
    )
}

fn synthetic_arg(index: usize) -> String {
    format!("bro_arg{}", index)
}

fn ninja_var(name: &str) -> String {
    let simple = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if simple {
        format!("${}", name)
    } else {
        format!("${{{}}}", name)
    }
}

pub(crate) fn ninja_ident(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

pub(crate) fn ninja_path(path: &Path) -> String {
    path_str(path)
        .replace('$', "$$")
        .replace(' ', "$ ")
        .replace(':', "$:")
}

fn ninja_words(values: &[String]) -> String {
    values
        .iter()
        .map(|v| shell_quote(v).replace('$', "$$"))
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn make_path(path: &Path) -> String {
    path_str(path).replace('$', "$$").replace(' ', "\\ ")
}

pub(crate) fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::vars;

    fn cc() -> Arc<CmdTmpl> {
        Arc::new(CmdTmpl::new(
            "cc",
            ["${cc}", "-c", "${in}", "-o", "${out}", "-I${inc}"],
        ))
    }

    #[test]
    fn test_entry_bindings_win_over_flags() {
        let entry = CmdEntry::new(cc(), ["a.c"], "a.o").with_flags(vars([
            ("in", vec!["evil.c"]),
            ("cc", vec!["gcc"]),
        ]));
        let cmd = entry.compile();
        assert_eq!(cmd.args(), ["gcc", "-c", "a.c", "-o", "a.o", "-I"]);
    }

    #[test]
    fn test_ninja_statement() {
        let entry = CmdEntry::new(cc(), ["a.c", "b.h"], "out/a.o")
            .with_deps(["dep.a"])
            .with_flags(vars([("inc", vec!["x", "y"]), ("cc", vec!["gcc"])]));

        let text = entry.ninja();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("build out/a.o: cc a.c b.h | dep.a"));
        assert_eq!(lines.next(), Some("  cc = gcc"));
        assert_eq!(lines.next(), Some("  inc = x y"));
        assert_eq!(lines.next(), Some("  bro_arg5 = -Ix -Iy"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn test_ninja_binds_only_referenced_flags() {
        let entry = CmdEntry::new(cc(), ["a.c"], "a.o").with_flags(vars([
            ("cc", vec!["gcc"]),
            ("pool", vec!["console"]),
            ("c++", vec!["g++"]),
        ]));

        let text = entry.ninja();
        assert!(text.contains("  cc = gcc\n"));
        assert!(!text.contains("pool"));
        assert!(!text.contains("c++"));
    }

    #[test]
    fn test_ninja_rule() {
        let rule = ninja_rule(&cc());
        assert_eq!(
            rule,
            "rule cc\n  command = $cc -c $in -o $out $bro_arg5\n  description = cc $out\n"
        );
    }

    #[test]
    fn test_make_rule() {
        let entry = CmdEntry::new(cc(), ["a.c"], "out/a.o")
            .with_deps(["dep.a"])
            .with_flags(vars([("cc", vec!["gcc"]), ("inc", vec!["$x"])]));

        assert_eq!(
            entry.make(),
            "out/a.o: a.c dep.a\n\tgcc -c a.c -o out/a.o -I$$x\n"
        );
    }

    #[test]
    fn test_compile_command_record() {
        let entry = CmdEntry::new(cc(), ["a.c"], "a.o").with_flags(vars([("cc", vec!["gcc"])]));
        let record = entry.compile_command(Path::new("/work"));
        assert_eq!(record.file, "a.c");
        assert_eq!(record.output, "a.o");
        assert_eq!(record.arguments[0], "gcc");
        assert_eq!(record.directory, "/work");
    }
}

use std::fmt;

use crate::error::BroError;
use crate::executor::{ExecContext, Runnable, Status};
use crate::template::{Template, Vars};

/// A resolved argument vector, ready to hand to the shell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cmd {
    args: Vec<String>,
}

impl Cmd {
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn push(&mut self, arg: impl Into<String>) {
        self.args.push(arg.into());
    }

    /// Shell command line with each argument quoted where needed.
    pub fn line(&self) -> String {
        self.args
            .iter()
            .map(|arg| shell_quote(arg))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.line())
    }
}

impl Runnable for Cmd {
    fn run(&self, ctx: &ExecContext) -> Status {
        if self.args.is_empty() {
            let err = BroError::EmptyCommand;
            ctx.logger().error(&err.to_string());
            return err.code();
        }

        let line = self.line();
        ctx.logger().command(&line);
        ctx.launch(&line)
    }
}

/// Quotes `arg` for a POSIX shell when it holds whitespace or quotes.
pub fn shell_quote(arg: &str) -> String {
    let needs_quotes =
        arg.is_empty() || arg.chars().any(|c| c.is_whitespace() || c == '"' || c == '\'');

    if !needs_quotes {
        return arg.to_string();
    }

    format!("'{}'", arg.replace('\'', r"'\''"))
}

/// A named argument vector of [`Template`]s.
///
/// The name only identifies the template in logs and generated build files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmdTmpl {
    name: String,
    args: Vec<Template>,
}

impl CmdTmpl {
    pub fn new<I, T>(name: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Template>,
    {
        Self {
            name: name.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[Template] {
        &self.args
    }

    pub fn compile(&self) -> Cmd {
        self.compile_with(&Vars::new())
    }

    /// Resolves every argument in declared order, flattening fan-out.
    ///
    /// A placeholder argument that resolves to nothing is dropped rather
    /// than passed as an empty word; a literal empty argument is kept.
    pub fn compile_with(&self, vars: &Vars) -> Cmd {
        let mut cmd = Cmd::default();

        for arg in &self.args {
            for value in arg.resolve(vars) {
                if value.is_empty() && !arg.is_empty() {
                    continue;
                }
                cmd.push(value);
            }
        }

        cmd
    }

    pub fn run_with(&self, ctx: &ExecContext, vars: &Vars) -> Status {
        self.compile_with(vars).run(ctx)
    }
}

impl Runnable for CmdTmpl {
    fn run(&self, ctx: &ExecContext) -> Status {
        self.compile().run(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Launcher;
    use crate::logger::Logger;
    use crate::template::vars;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Spy {
        lines: Mutex<Vec<String>>,
    }

    impl Launcher for Spy {
        fn launch(&self, line: &str) -> std::io::Result<Status> {
            self.lines.lock().unwrap().push(line.to_string());
            Ok(0)
        }
    }

    fn spy_context() -> (Arc<Spy>, ExecContext) {
        let spy = Arc::new(Spy::default());
        let ctx = ExecContext::new(Logger::quiet(), spy.clone());
        (spy, ctx)
    }

    #[test]
    fn test_empty_command_fails_without_launching() {
        let (spy, ctx) = spy_context();
        assert_ne!(Cmd::default().run(&ctx), 0);
        assert!(spy.lines.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_command_fails_when_spawned() {
        let (spy, ctx) = spy_context();
        assert_ne!(Arc::new(Cmd::default()).spawn(&ctx).wait().await, 0);
        assert!(spy.lines.lock().unwrap().is_empty());
    }

    #[test]
    fn test_template_resolving_to_nothing_fails() {
        let (spy, ctx) = spy_context();
        let tmpl = CmdTmpl::new("ghost", ["${tool}", "${in}"]);
        assert!(tmpl.compile().is_empty());
        assert_ne!(tmpl.run_with(&ctx, &vars([("in", Vec::<String>::new())])), 0);
        assert!(spy.lines.lock().unwrap().is_empty());
    }

    #[test]
    fn test_command_is_launched_as_one_line() {
        let (spy, ctx) = spy_context();
        assert_eq!(Cmd::new(["echo", "a b"]).run(&ctx), 0);
        assert_eq!(*spy.lines.lock().unwrap(), vec!["echo 'a b'"]);
    }

    #[test]
    fn test_compile_flattens_in_declared_order() {
        let tmpl = CmdTmpl::new("cc", ["gcc", "-c", "${in}", "-o", "${out}"]);
        let v = vars([("in", vec!["a.c", "b.c"]), ("out", vec!["x.o"])]);
        let cmd = tmpl.compile_with(&v);
        assert_eq!(cmd.args(), ["gcc", "-c", "a.c", "b.c", "-o", "x.o"]);
    }

    #[test]
    fn test_compile_without_vars_drops_placeholders() {
        let tmpl = CmdTmpl::new("cc", ["gcc", "${cflags}", "-c", "${in}"]);
        assert_eq!(tmpl.compile().args(), ["gcc", "-c"]);
    }

    #[test]
    fn test_literal_empty_argument_is_kept() {
        let tmpl = CmdTmpl::new("echo", ["echo", ""]);
        assert_eq!(tmpl.compile().args(), ["echo", ""]);
    }

    #[test]
    fn test_line_quotes_whitespace_and_quotes() {
        let cmd = Cmd::new(["echo", "hello world", "it's", "plain", ""]);
        assert_eq!(cmd.line(), r#"echo 'hello world' 'it'\''s' plain ''"#);
    }

    #[test]
    fn test_name_has_no_effect_on_resolution() {
        let a = CmdTmpl::new("one", ["ls", "${d}"]);
        let b = CmdTmpl::new("two", ["ls", "${d}"]);
        let v = vars([("d", ["src"])]);
        assert_eq!(a.compile_with(&v), b.compile_with(&v));
    }
}

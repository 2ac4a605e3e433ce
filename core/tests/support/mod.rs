use bro_core::{Bro, CmdTmpl, ExecContext, Launcher, Logger, Stage, Status, SystemShell};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Records every launched line. Either hands the line to the real shell or
/// fakes a status from the line's words.
#[derive(Default)]
pub struct RecordingLauncher {
    lines: Mutex<Vec<String>>,
    passthrough: bool,
}

#[allow(dead_code)]
impl RecordingLauncher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn passthrough() -> Arc<Self> {
        Arc::new(Self {
            lines: Mutex::new(Vec::new()),
            passthrough: true,
        })
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.lines.lock().unwrap())
    }
}

impl Launcher for RecordingLauncher {
    fn launch(&self, line: &str) -> std::io::Result<Status> {
        self.lines.lock().unwrap().push(line.to_string());

        if self.passthrough {
            return SystemShell.launch(line);
        }

        Ok(fake_status(line))
    }
}

/// `fail` reports 1, `failN` reports N, anything else succeeds.
fn fake_status(line: &str) -> Status {
    line.split_whitespace()
        .find_map(|word| word.strip_prefix("fail"))
        .map(|rest| {
            let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
            digits.parse().unwrap_or(1)
        })
        .unwrap_or(0)
}

pub fn context(launcher: &Arc<RecordingLauncher>) -> ExecContext {
    ExecContext::new(Logger::quiet(), launcher.clone())
}

/// `<dir>/src/{a,b}.c` copied to objects and concatenated into one binary.
#[allow(dead_code)]
pub fn copy_project(dir: &Path, launcher: &Arc<RecordingLauncher>) -> Bro {
    let src = dir.join("src");
    std::fs::create_dir_all(&src).unwrap();
    std::fs::write(src.join("a.c"), "alpha\n").unwrap();
    std::fs::write(src.join("b.c"), "beta\n").unwrap();

    let build = format!("build={}", dir.join("build").display());
    let mut bro = Bro::new(["prog", build.as_str()]).with_context(context(launcher));

    bro.register_cmd(CmdTmpl::new("copy", ["cp", "${in}", "${out}"]));
    bro.register_cmd(CmdTmpl::new("join", ["cat", "${in}", ">", "${out}"]));
    bro.register_stage(Stage::transform("obj", ".o"));
    bro.register_stage(Stage::link("bin", "${mod}"));
    bro.use_cmd("obj", ".c", "copy").unwrap();
    bro.use_cmd("bin", ".o", "join").unwrap();

    bro.register_module("app");
    bro.module_mut("app").unwrap().add_directory(&src);
    bro.bind("obj", "app").unwrap();
    bro.bind("bin", "app").unwrap();

    bro
}

use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::logger::Logger;

/// Exit status of a command or of an aggregate of commands. Zero is success.
pub type Status = i32;

/// Status reported for failures that have no exit code of their own.
pub const FAILED: Status = 1;

/// Hands a rendered command line to the operating system.
pub trait Launcher: Send + Sync {
    fn launch(&self, line: &str) -> std::io::Result<Status>;
}

/// Runs command lines through `sh -c` (`cmd /C` on Windows).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemShell;

impl Launcher for SystemShell {
    fn launch(&self, line: &str) -> std::io::Result<Status> {
        #[cfg(unix)]
        let status = std::process::Command::new("sh").arg("-c").arg(line).status()?;
        #[cfg(not(unix))]
        let status = std::process::Command::new("cmd").arg("/C").arg(line).status()?;

        Ok(exit_status(status))
    }
}

pub(crate) fn exit_status(status: std::process::ExitStatus) -> Status {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;

        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    FAILED
}

/// Logger and launcher shared by every worker of a build.
#[derive(Clone)]
pub struct ExecContext {
    logger: Arc<Logger>,
    launcher: Arc<dyn Launcher>,
}

impl ExecContext {
    pub fn new(logger: Logger, launcher: Arc<dyn Launcher>) -> Self {
        Self {
            logger: Arc::new(logger),
            launcher,
        }
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub(crate) fn launch(&self, line: &str) -> Status {
        match self.launcher.launch(line) {
            Ok(status) => status,
            Err(e) => {
                self.logger.error(&format!("Failed to launch `{}`: {}", line, e));
                e.raw_os_error().filter(|c| *c != 0).unwrap_or(FAILED)
            }
        }
    }
}

impl Default for ExecContext {
    fn default() -> Self {
        Self::new(Logger::new(), Arc::new(SystemShell))
    }
}

/// Deferred status of work running on a worker thread.
pub struct Pending {
    handle: JoinHandle<Status>,
}

impl Pending {
    /// Runs `work` on its own blocking worker. Requires a tokio runtime.
    pub fn blocking<F>(work: F) -> Self
    where
        F: FnOnce() -> Status + Send + 'static,
    {
        Self {
            handle: tokio::task::spawn_blocking(work),
        }
    }

    fn from_task(handle: JoinHandle<Status>) -> Self {
        Self { handle }
    }

    pub async fn wait(self) -> Status {
        self.handle.await.unwrap_or(FAILED)
    }
}

/// Something that can run to completion and report a [`Status`].
pub trait Runnable: Send + Sync + 'static {
    fn run(&self, ctx: &ExecContext) -> Status;

    fn spawn(self: Arc<Self>, ctx: &ExecContext) -> Pending {
        let ctx = ctx.clone();
        Pending::blocking(move || self.run(&ctx))
    }
}

/// Unordered group of runnables.
///
/// `run` stops at the first failure. `spawn` starts every member at once and
/// resolves to the saturating sum of absolute member statuses, so the only
/// meaningful reading of the result is zero versus nonzero.
#[derive(Default, Clone)]
pub struct CmdPool {
    members: Vec<Arc<dyn Runnable>>,
}

impl CmdPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, runnable: Arc<dyn Runnable>) {
        self.members.push(runnable);
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl Runnable for CmdPool {
    fn run(&self, ctx: &ExecContext) -> Status {
        for member in &self.members {
            let status = member.run(ctx);
            if status != 0 {
                return status;
            }
        }
        0
    }

    fn spawn(self: Arc<Self>, ctx: &ExecContext) -> Pending {
        let pending: Vec<Pending> = self
            .members
            .iter()
            .map(|member| Arc::clone(member).spawn(ctx))
            .collect();

        Pending::from_task(tokio::spawn(async move {
            let mut sum: Status = 0;
            for p in pending {
                let status = p.wait().await;
                sum = sum.saturating_add(status.saturating_abs());
            }
            sum
        }))
    }
}

/// Ordered chain of runnables that behaves as one unit of work.
#[derive(Default, Clone)]
pub struct CmdQueue {
    members: Vec<Arc<dyn Runnable>>,
}

impl CmdQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, runnable: Arc<dyn Runnable>) {
        self.members.push(runnable);
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl Runnable for CmdQueue {
    fn run(&self, ctx: &ExecContext) -> Status {
        for member in &self.members {
            let status = member.run(ctx);
            if status != 0 {
                return status;
            }
        }
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_status_from_shell() {
        let ctx = ExecContext::new(Logger::quiet(), Arc::new(SystemShell));
        if cfg!(unix) {
            assert_eq!(ctx.launch("exit 3"), 3);
            assert_eq!(ctx.launch("true"), 0);
        }
    }

    #[tokio::test]
    async fn test_empty_pool_succeeds() {
        let ctx = ExecContext::new(Logger::quiet(), Arc::new(SystemShell));
        let pool = Arc::new(CmdPool::new());
        assert_eq!(pool.run(&ctx), 0);
        assert_eq!(pool.spawn(&ctx).wait().await, 0);
    }
}

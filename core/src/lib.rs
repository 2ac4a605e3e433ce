pub mod bro;
pub mod cli;
pub mod command;
pub mod config;
pub mod entry;
pub mod error;
pub mod executor;
pub mod file;
pub mod flags;
pub mod logger;
pub mod module;
pub mod stage;
pub mod template;

pub use bro::{Bro, Plan, PlannedModule, PlannedStage, SelfBuild};
pub use cli::Cli;
pub use command::{Cmd, CmdTmpl};
pub use config::{Config, ModuleConfig, ModuleKind};
pub use entry::{CmdEntry, CompileCommand};
pub use error::{BroError, Result};
pub use executor::{
    CmdPool, CmdQueue, ExecContext, Launcher, Pending, Runnable, Status, SystemShell, FAILED,
};
pub use file::{Directory, File};
pub use flags::Flags;
pub use logger::{LogLevel, Logger};
pub use module::Module;
pub use stage::{Stage, StageKind};
pub use template::{vars, Template, Vars};

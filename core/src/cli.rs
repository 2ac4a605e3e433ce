use clap::Parser;
use std::path::PathBuf;

use crate::config::CONFIG_FILE;
use crate::logger::LogLevel;

#[derive(Parser, Debug)]
#[command(name = "bro")]
#[command(author, version, about = "Small declarative build orchestrator", long_about = None)]
pub struct Cli {
    #[arg(
        short = 'C',
        long = "directory",
        value_name = "DIR",
        help = "Run as if started in DIR"
    )]
    pub source_dir: Option<PathBuf>,

    #[arg(long, value_name = "FILE", help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(long, value_name = "FILE", num_args = 0..=1, default_missing_value = "build.ninja", help = "Write a Ninja build file instead of building")]
    pub ninja: Option<PathBuf>,

    #[arg(long, value_name = "FILE", num_args = 0..=1, default_missing_value = "Makefile", help = "Write a Makefile instead of building")]
    pub makefile: Option<PathBuf>,

    #[arg(long = "compile-commands", value_name = "FILE", num_args = 0..=1, default_missing_value = "compile_commands.json", help = "Write compile_commands.json instead of building")]
    pub compile_commands: Option<PathBuf>,

    #[arg(short, long, conflicts_with = "verbose", help = "Only report errors")]
    pub quiet: bool,

    #[arg(short, long, help = "Also report debug messages")]
    pub verbose: bool,

    #[arg(
        value_name = "FLAGS",
        trailing_var_arg = true,
        allow_hyphen_values = true,
        help = "name=value, name (true) or -name (false)"
    )]
    pub flags: Vec<String>,
}

impl Cli {
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE))
    }

    pub fn log_level(&self) -> LogLevel {
        if self.quiet {
            LogLevel::Error
        } else if self.verbose {
            LogLevel::Debug
        } else {
            LogLevel::Info
        }
    }

    /// True when only generator files were requested.
    pub fn generates(&self) -> bool {
        self.ninja.is_some() || self.makefile.is_some() || self.compile_commands.is_some()
    }
}

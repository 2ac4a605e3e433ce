use anyhow::{Context, Result};
use bro_core::{Bro, Cli, Config, ExecContext, Logger, SystemShell};
use clap::Parser;
use std::sync::Arc;

fn generate(bro: &Bro, cli: &Cli) -> Result<()> {
    let logger = bro.ctx().logger();

    if let Some(path) = &cli.ninja {
        bro.write_ninja(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        logger.info(&format!("Wrote {}", path.display()));
    }

    if let Some(path) = &cli.makefile {
        bro.write_makefile(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        logger.info(&format!("Wrote {}", path.display()));
    }

    if let Some(path) = &cli.compile_commands {
        bro.write_compile_commands(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        logger.info(&format!("Wrote {}", path.display()));
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(dir) = &cli.source_dir {
        std::env::set_current_dir(dir)
            .with_context(|| format!("Failed to enter directory {}", dir.display()))?;
    }

    let config = Config::load_from_file(cli.config_path())?;

    let program = std::env::args().next().unwrap_or_else(|| "bro".to_string());
    let args = std::iter::once(program).chain(cli.flags.iter().cloned());

    let ctx = ExecContext::new(Logger::new().with_level(cli.log_level()), Arc::new(SystemShell));
    let mut bro = Bro::with_config(args, &config).with_context(ctx);
    bro.add_config_modules(&config)
        .context("Invalid module configuration")?;

    if cli.generates() {
        return generate(&bro, &cli);
    }

    if bro.modules().next().is_none() {
        bro.ctx()
            .logger()
            .warn(&format!("No modules configured in {}", cli.config_path().display()));
        return Ok(());
    }

    let status = bro.run().await;
    if status == 0 {
        bro.ctx().logger().info("Build completed successfully!");
    } else {
        bro.ctx().logger().error("Build failed!");
    }

    std::process::exit(status.clamp(0, 255));
}

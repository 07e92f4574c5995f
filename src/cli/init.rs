use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

use lobbybot::config::{CONFIG_FILE, Config};
use lobbybot::error::ExitError;

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Directory to write lobbybot.toml into
    #[arg(long)]
    pub path: Option<PathBuf>,
    /// Overwrite an existing config file
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    pub fn execute(&self) -> anyhow::Result<()> {
        let dir = match &self.path {
            Some(p) => p.clone(),
            None => std::env::current_dir().context("resolving current directory")?,
        };
        let target = dir.join(CONFIG_FILE);

        if target.exists() && !self.force {
            return Err(ExitError::Config(format!(
                "{} already exists (use --force to overwrite)",
                target.display()
            ))
            .into());
        }

        let toml = Config::default().to_toml()?;
        std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        std::fs::write(&target, toml).with_context(|| format!("writing {}", target.display()))?;
        tracing::info!(path = %target.display(), "wrote default config");
        println!("Wrote {}", target.display());
        Ok(())
    }
}

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

use lobbybot::bot::Bot;
use lobbybot::config::Config;
use lobbybot::error::ExitError;

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Config file (defaults to ./lobbybot.toml, then the user config dir)
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// IRC server host
    #[arg(long)]
    pub irc_server: Option<String>,
    /// IRC server port
    #[arg(long)]
    pub irc_port: Option<u16>,
    /// Channel to join and serve
    #[arg(long)]
    pub channel: Option<String>,
    /// Bot nickname
    #[arg(long)]
    pub nick: Option<String>,
    /// Lobby server host
    #[arg(long)]
    pub lobby_server: Option<String>,
    /// Lobby server port
    #[arg(long)]
    pub lobby_port: Option<u16>,
}

impl RunArgs {
    /// Layer command-line overrides on top of the file config.
    fn config(&self) -> anyhow::Result<Config> {
        let cwd = std::env::current_dir().context("resolving current directory")?;
        let mut config = Config::resolve(self.config.as_deref(), &cwd)?;

        if let Some(v) = &self.irc_server {
            config.irc.server.clone_from(v);
        }
        if let Some(v) = self.irc_port {
            config.irc.port = v;
        }
        if let Some(v) = &self.channel {
            config.irc.channel.clone_from(v);
        }
        if let Some(v) = &self.nick {
            config.irc.nick.clone_from(v);
        }
        if let Some(v) = &self.lobby_server {
            config.lobby.server.clone_from(v);
        }
        if let Some(v) = self.lobby_port {
            config.lobby.port = v;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn execute(&self) -> anyhow::Result<()> {
        let config = self.config()?;

        let bot = Bot::connect(&config)?;

        let hook = bot.shutdown_hook();
        ctrlc::set_handler(move || {
            let err = ExitError::Interrupted;
            tracing::info!("{err}, shutting down");
            hook.shutdown();
            std::process::exit(i32::from(err.code()));
        })
        .context("installing interrupt handler")?;

        bot.run().map_err(ExitError::from)?;
        Ok(())
    }
}

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

use lobbybot::commands::format_game_list;
use lobbybot::config::Config;
use lobbybot::error::ExitError;
use lobbybot::lobby::{LobbyClient, LobbySource};

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Config file (defaults to ./lobbybot.toml, then the user config dir)
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Lobby server host
    #[arg(long)]
    pub lobby_server: Option<String>,
    /// Lobby server port
    #[arg(long)]
    pub lobby_port: Option<u16>,
    /// Print games as JSON
    #[arg(long)]
    pub json: bool,
}

impl ListArgs {
    pub fn execute(&self) -> anyhow::Result<()> {
        let cwd = std::env::current_dir().context("resolving current directory")?;
        let mut config = Config::resolve(self.config.as_deref(), &cwd)?;
        if let Some(server) = &self.lobby_server {
            config.lobby.server.clone_from(server);
        }
        if let Some(port) = self.lobby_port {
            config.lobby.port = port;
        }

        let client = LobbyClient::new(
            &config.lobby.server,
            config.lobby.port,
            config.lobby_timeout(),
        );
        let games = client.list_games().map_err(ExitError::from)?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&games)?);
        } else {
            println!("{}", format_game_list(&games));
        }
        Ok(())
    }
}

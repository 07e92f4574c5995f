use std::str::FromStr;

use crate::error::UnrecognizedCommand;
use crate::lobby::{GameRecord, LobbySource, log_lobby_error};

pub const HELP_TEXT: &str = "I'm a bot that shows information from the \x02Warzone 2100\x02 \
     lobby server. For information about commands you can try: \"commands\"";

pub const COMMANDS_TEXT: &str = "ping: pong, help/info: general information about this bot, \
     list: show which games are currently being hosted";

/// Words the bot responds to when addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Ping,
    Help,
    Info,
    Commands,
    List,
}

impl Command {
    pub const ALL: [Command; 5] = [
        Command::Ping,
        Command::Help,
        Command::Info,
        Command::Commands,
        Command::List,
    ];

    pub const fn word(self) -> &'static str {
        match self {
            Command::Ping => "ping",
            Command::Help => "help",
            Command::Info => "info",
            Command::Commands => "commands",
            Command::List => "list",
        }
    }

    /// Produce the channel reply for this command.
    pub fn reply(self, lobby: &impl LobbySource) -> String {
        match self {
            Command::Ping => "pong".to_string(),
            Command::Help | Command::Info => HELP_TEXT.to_string(),
            Command::Commands => COMMANDS_TEXT.to_string(),
            Command::List => match lobby.list_games() {
                Ok(games) => format_game_list(&games),
                Err(e) => {
                    log_lobby_error(&lobby.endpoint(), "list", &e);
                    format!("Failed to communicate with the lobby ({})", lobby.endpoint())
                }
            },
        }
    }
}

/// Matches the trimmed word ignoring ASCII case, so `LIST` and `list` agree.
impl FromStr for Command {
    type Err = UnrecognizedCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Command::ALL
            .into_iter()
            .find(|c| c.word().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnrecognizedCommand(s.to_string()))
    }
}

pub fn format_game_list(games: &[GameRecord]) -> String {
    match games.len() {
        0 => "No games in lobby".to_string(),
        n => {
            let prefix = if n == 1 {
                "1 game hosted: ".to_string()
            } else {
                format!("{n} games hosted: ")
            };
            let list: Vec<String> = games.iter().map(GameRecord::summary).collect();
            prefix + &list.join(", ")
        }
    }
}

/// Reply for a word that is not a [`Command`].
pub fn unknown_command_reply(nick: &str, err: &UnrecognizedCommand) -> String {
    format!("{nick}: Unknown command '{}'. Try 'commands'.", err.0)
}

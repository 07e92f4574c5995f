use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ExitError;
use crate::notifier::NotifierSettings;

pub const CONFIG_FILE: &str = "lobbybot.toml";

/// Find the config file: `./lobbybot.toml`, then the user config directory.
/// Returns None if neither exists.
pub fn find_config(dir: &Path) -> Option<PathBuf> {
    let local = dir.join(CONFIG_FILE);
    if local.exists() {
        return Some(local);
    }
    let user = dirs::config_dir()?.join("lobbybot").join(CONFIG_FILE);
    user.exists().then_some(user)
}

/// Top-level lobbybot.toml config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Config {
    #[serde(default)]
    pub irc: IrcConfig,
    #[serde(default)]
    pub lobby: LobbyConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct IrcConfig {
    #[serde(default = "default_irc_server")]
    pub server: String,
    #[serde(default = "default_irc_port")]
    pub port: u16,
    #[serde(default = "default_channel")]
    pub channel: String,
    #[serde(default = "default_nick")]
    pub nick: String,
    #[serde(default = "default_realname")]
    pub realname: String,
}

impl Default for IrcConfig {
    fn default() -> Self {
        Self {
            server: default_irc_server(),
            port: default_irc_port(),
            channel: default_channel(),
            nick: default_nick(),
            realname: default_realname(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LobbyConfig {
    #[serde(default = "default_lobby_server")]
    pub server: String,
    #[serde(default = "default_lobby_port")]
    pub port: u16,
    /// Connect/read timeout for one game list request.
    #[serde(default = "default_lobby_timeout")]
    pub timeout_secs: u64,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            server: default_lobby_server(),
            port: default_lobby_port(),
            timeout_secs: default_lobby_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct NotifierConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Quiet period before a host may be announced as a new game again.
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
    #[serde(default)]
    pub announce_updates: bool,
    #[serde(default)]
    pub announce_closures: bool,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            cooldown_secs: default_cooldown(),
            announce_updates: false,
            announce_closures: false,
        }
    }
}

// Default value functions for serde
fn default_irc_server() -> String { "irc.freenode.net".into() }
fn default_irc_port() -> u16 { 6667 }
fn default_channel() -> String { "#warzone2100-games".into() }
fn default_nick() -> String { "wzlobbybot".into() }
fn default_realname() -> String { "Warzone 2100 Lobby Bot ( http://wz2100.net/ )".into() }
fn default_lobby_server() -> String { "lobby.wz2100.net".into() }
fn default_lobby_port() -> u16 { 9997 }
fn default_lobby_timeout() -> u64 { 10 }
fn default_poll_interval() -> u64 { 10 }
fn default_cooldown() -> u64 { 300 }

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::parse_toml(&contents)
    }

    /// Load `path` if given, otherwise the first config found from `dir`,
    /// otherwise the built-in defaults.
    pub fn resolve(path: Option<&Path>, dir: &Path) -> anyhow::Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match find_config(dir) {
            Some(found) => {
                tracing::debug!(path = %found.display(), "loading config");
                Self::load(&found)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn parse_toml(toml_str: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(toml_str)
            .map_err(|e| ExitError::Config(format!("invalid {CONFIG_FILE}: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ExitError> {
        if !self.irc.channel.starts_with('#') {
            return Err(ExitError::Config(format!(
                "irc.channel must start with '#', got {:?}",
                self.irc.channel
            )));
        }
        if self.irc.nick.is_empty() || self.irc.nick.contains(char::is_whitespace) {
            return Err(ExitError::Config(format!(
                "irc.nick must be a single word, got {:?}",
                self.irc.nick
            )));
        }
        if let Err(e) = crate::irc::addressed_message_pattern(&self.irc.nick) {
            return Err(ExitError::Config(format!("irc.nick cannot be matched: {e}")));
        }
        if self.notifier.poll_interval_secs == 0 {
            return Err(ExitError::Config(
                "notifier.poll_interval_secs must be at least 1".into(),
            ));
        }
        if self.lobby.timeout_secs == 0 {
            return Err(ExitError::Config("lobby.timeout_secs must be at least 1".into()));
        }
        Ok(())
    }

    /// Serialize config to a TOML string with section comments.
    pub fn to_toml(&self) -> anyhow::Result<String> {
        let raw = toml::to_string_pretty(self).context("serializing config to TOML")?;

        let mut doc: toml_edit::DocumentMut = raw
            .parse()
            .context("parsing generated TOML for comment injection")?;

        doc.decor_mut()
            .set_prefix("# lobbybot configuration\n");

        fn set_table_comment(doc: &mut toml_edit::DocumentMut, key: &str, comment: &str) {
            if let Some(tbl) = doc.get_mut(key).and_then(toml_edit::Item::as_table_mut) {
                tbl.decor_mut().set_prefix(comment);
            }
        }

        set_table_comment(&mut doc, "irc", "\n# Chat server and the one channel the bot serves\n");
        set_table_comment(&mut doc, "lobby", "\n# Warzone 2100 master server\n");
        set_table_comment(
            &mut doc,
            "notifier",
            "\n# Lobby polling and announcements\n\
             # cooldown_secs suppresses repeat \"New game\" messages for a host\n",
        );

        Ok(doc.to_string())
    }

    pub fn lobby_timeout(&self) -> Duration {
        Duration::from_secs(self.lobby.timeout_secs)
    }

    pub fn notifier_settings(&self) -> NotifierSettings {
        NotifierSettings {
            poll_interval: Duration::from_secs(self.notifier.poll_interval_secs),
            cooldown: Duration::from_secs(self.notifier.cooldown_secs),
            announce_updates: self.notifier.announce_updates,
            announce_closures: self.notifier.announce_closures,
        }
    }
}

/// JSON Schema for lobbybot.toml.
pub fn schema() -> schemars::schema::RootSchema {
    schemars::schema_for!(Config)
}

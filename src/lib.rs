//! lobbybot - IRC relay for the Warzone 2100 game lobby

pub mod bot;
pub mod commands;
pub mod config;
pub mod error;
pub mod irc;
pub mod lobby;
pub mod notifier;
pub mod telemetry;
pub mod transport;

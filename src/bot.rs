use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::{Arc, Mutex, PoisonError};

use crate::commands::{Command, unknown_command_reply};
use crate::config::Config;
use crate::error::{ExitError, TransportError};
use crate::irc::{ChatSender, InboundMessage, IrcConnection, addressed_message_pattern};
use crate::lobby::{LobbyClient, LobbySource};
use crate::notifier::{ChangeNotifier, NotifierHandle, NotifierSettings};

/// Stops and joins the running change notifier. Clonable so a signal handler
/// can hold one.
#[derive(Clone, Default)]
pub struct ShutdownHook {
    slot: Arc<Mutex<Option<NotifierHandle>>>,
}

impl ShutdownHook {
    fn install(&self, handle: NotifierHandle) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    /// Stop the notifier and block until its thread has exited. Later calls
    /// return immediately.
    pub fn shutdown(&self) {
        let handle = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            tracing::info!("waiting for lobby change notifier to terminate");
            handle.shutdown();
        }
    }
}

pub struct Bot<R = TcpStream, W = TcpStream, L = LobbyClient> {
    chat: IrcConnection<R, W>,
    sender: ChatSender<W>,
    lobby: L,
    settings: NotifierSettings,
    hook: ShutdownHook,
}

impl Bot {
    /// Connect to the chat server described by `config` and join its channel.
    pub fn connect(config: &Config) -> Result<Self, ExitError> {
        let pattern = addressed_message_pattern(&config.irc.nick)
            .map_err(|e| ExitError::Config(format!("irc.nick cannot be matched: {e}")))?;
        let chat = IrcConnection::connect(
            &config.irc.server,
            config.irc.port,
            &config.irc.channel,
            &config.irc.nick,
            &config.irc.realname,
            pattern,
        )?;
        let lobby = LobbyClient::new(
            &config.lobby.server,
            config.lobby.port,
            config.lobby_timeout(),
        );
        Ok(Self::new(chat, lobby, config.notifier_settings()))
    }
}

impl<R, W, L> Bot<R, W, L>
where
    R: Read,
    W: Write + Send + 'static,
    L: LobbySource + Clone + Send + 'static,
{
    pub fn new(chat: IrcConnection<R, W>, lobby: L, settings: NotifierSettings) -> Self {
        let sender = chat.sender();
        Self {
            chat,
            sender,
            lobby,
            settings,
            hook: ShutdownHook::default(),
        }
    }

    pub fn shutdown_hook(&self) -> ShutdownHook {
        self.hook.clone()
    }

    /// Answer one addressed message in the bot's channel.
    pub fn handle(&self, msg: &InboundMessage) -> Result<(), TransportError> {
        let reply = match msg.command.parse::<Command>() {
            Ok(command) => {
                tracing::info!(nick = %msg.sender_nick, command = command.word(), "command");
                command.reply(&self.lobby)
            }
            Err(err) => {
                tracing::info!(nick = %msg.sender_nick, "{err}");
                unknown_command_reply(&msg.sender_nick, &err)
            }
        };
        self.sender.send_channel_message(&reply)
    }

    /// Start the change notifier and serve commands until the chat connection
    /// fails. The notifier is stopped and joined before returning.
    pub fn run(mut self) -> Result<(), TransportError> {
        let handle = ChangeNotifier::new(self.settings.clone())
            .spawn(self.lobby.clone(), self.sender.clone())?;
        self.hook.install(handle);

        let result = loop {
            match self.chat.receive_command() {
                Ok(Some(msg)) => {
                    if let Err(e) = self.handle(&msg) {
                        break Err(e);
                    }
                }
                Ok(None) => {}
                Err(e) => break Err(e),
            }
        };

        if let Err(e) = &result {
            tracing::error!("chat connection failed: {e}");
        }
        self.hook.shutdown();
        result
    }
}

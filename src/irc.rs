//! The small slice of IRC the bot speaks.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;

use regex::Regex;

use crate::error::TransportError;
use crate::transport::{self, LineReader, LineWriter};

/// Longest line the server accepts, excluding the terminator.
pub const MAX_LINE: usize = 510;

/// Characters allowed around the bot's nick when addressing it.
const ADDRESS_PUNCT: &str = r"[ \t,:.?!]*";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub sender_nick: String,
    pub channel: String,
    pub command: String,
}

/// Clonable handle for everything the bot sends. Shared by the read loop and
/// the change notifier.
pub struct ChatSender<W = TcpStream> {
    writer: Arc<LineWriter<W>>,
    channel: String,
}

impl<W> Clone for ChatSender<W> {
    fn clone(&self) -> Self {
        Self {
            writer: Arc::clone(&self.writer),
            channel: self.channel.clone(),
        }
    }
}

impl<W: Write> ChatSender<W> {
    pub fn new(writer: LineWriter<W>, channel: &str) -> Self {
        Self {
            writer: Arc::new(writer),
            channel: channel.to_string(),
        }
    }

    pub fn send_raw(&self, line: &str) -> Result<(), TransportError> {
        self.writer.write_line(&clamp_line(line))
    }

    pub fn register(&self, nick: &str, realname: &str) -> Result<(), TransportError> {
        self.send_raw(&format!("NICK {nick}"))?;
        self.send_raw(&format!("USER {nick} 0 * :{realname}"))
    }

    pub fn join(&self, channel: &str) -> Result<(), TransportError> {
        self.send_raw(&format!("JOIN {channel}"))
    }

    pub fn privmsg(&self, recipient: &str, text: &str) -> Result<(), TransportError> {
        self.send_raw(&format!("PRIVMSG {recipient} :{text}"))
    }

    pub fn send_notice(&self, recipient: &str, text: &str) -> Result<(), TransportError> {
        self.send_raw(&format!("NOTICE {recipient} :{text}"))
    }

    pub fn send_channel_message(&self, text: &str) -> Result<(), TransportError> {
        self.privmsg(&self.channel, text)
    }
}

/// Strip embedded line breaks and cut to [`MAX_LINE`] bytes on a char boundary.
fn clamp_line(line: &str) -> String {
    let mut out: String = line
        .chars()
        .map(|c| if c == '\r' || c == '\n' { ' ' } else { c })
        .collect();
    if out.len() > MAX_LINE {
        let mut end = MAX_LINE;
        while !out.is_char_boundary(end) {
            end -= 1;
        }
        out.truncate(end);
    }
    out
}

/// Build the matcher for channel messages that start by naming `nick`.
/// The nick is escaped, so only the regex size limit can reject it.
pub fn addressed_message_pattern(nick: &str) -> Result<Regex, regex::Error> {
    let pattern = format!(
        r"^:(?P<nick>[^!\s]+)\S*\s+PRIVMSG (?P<channel>#[^\s:]+) :{p}{nick}{p}(?P<message>.*?){p}$",
        p = ADDRESS_PUNCT,
        nick = regex::escape(nick),
    );
    Regex::new(&pattern)
}

/// Match one raw line against the addressed-message pattern.
pub fn parse_addressed(pattern: &Regex, line: &str) -> Option<InboundMessage> {
    let caps = pattern.captures(line)?;
    Some(InboundMessage {
        sender_nick: caps["nick"].to_string(),
        channel: caps["channel"].to_string(),
        command: caps["message"].to_string(),
    })
}

pub struct IrcConnection<R = TcpStream, W = TcpStream> {
    reader: LineReader<R>,
    sender: ChatSender<W>,
    pattern: Regex,
}

impl IrcConnection {
    /// Connect, register `nick`, and join `channel`. `pattern` comes from
    /// [`addressed_message_pattern`] for the same nick.
    pub fn connect(
        server: &str,
        port: u16,
        channel: &str,
        nick: &str,
        realname: &str,
        pattern: Regex,
    ) -> Result<Self, TransportError> {
        let (reader, writer) = transport::connect(server, port)?;
        let conn = Self::new(reader, writer, channel, pattern);
        conn.sender.register(nick, realname)?;
        conn.sender.join(channel)?;
        tracing::info!(server, port, channel, nick, "registered with chat server");
        Ok(conn)
    }
}

impl<R: Read, W: Write> IrcConnection<R, W> {
    pub fn new(
        reader: LineReader<R>,
        writer: LineWriter<W>,
        channel: &str,
        pattern: Regex,
    ) -> Self {
        Self {
            reader,
            sender: ChatSender::new(writer, channel),
            pattern,
        }
    }

    pub fn sender(&self) -> ChatSender<W> {
        self.sender.clone()
    }

    /// Read one line. Returns the command when it is addressed to the bot in
    /// its own channel. Server pings are answered here.
    pub fn receive_command(&mut self) -> Result<Option<InboundMessage>, TransportError> {
        let line = self.reader.read_line()?;

        if let Some(token) = line.strip_prefix("PING ") {
            self.sender.send_raw(&format!("PONG {token}"))?;
            return Ok(None);
        }

        let Some(msg) = parse_addressed(&self.pattern, &line) else {
            return Ok(None);
        };

        if msg.channel != self.sender.channel {
            tracing::debug!(
                nick = %msg.sender_nick,
                channel = %msg.channel,
                "addressed outside home channel"
            );
            self.sender.send_notice(
                &msg.sender_nick,
                &format!(
                    "Sorry {}, I will not provide my services in this channel. \
                     Please find me in {}",
                    msg.sender_nick, self.sender.channel
                ),
            )?;
            return Ok(None);
        }

        Ok(Some(msg))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Writer whose bytes stay inspectable after being moved into a connection.
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl SharedBuf {
        fn lines(&self) -> Vec<String> {
            let bytes = self.0.lock().unwrap();
            String::from_utf8_lossy(&bytes)
                .split_terminator("\r\n")
                .map(str::to_string)
                .collect()
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn connection(input: &str) -> (IrcConnection<&[u8], SharedBuf>, SharedBuf) {
        let out = SharedBuf::default();
        let conn = IrcConnection::new(
            LineReader::new(input.as_bytes()),
            LineWriter::new(out.clone()),
            "#wz",
            addressed_message_pattern("wzlobbybot").unwrap(),
        );
        (conn, out)
    }

    #[test]
    fn parses_addressed_command() {
        let pattern = addressed_message_pattern("wzlobbybot").unwrap();
        let msg =
            parse_addressed(&pattern, ":alice!~a@host PRIVMSG #wz :wzlobbybot: list").unwrap();
        assert_eq!(msg.sender_nick, "alice");
        assert_eq!(msg.channel, "#wz");
        assert_eq!(msg.command, "list");
    }

    #[test]
    fn strips_punctuation_around_nick_and_command() {
        let pattern = addressed_message_pattern("wzlobbybot").unwrap();
        let msg =
            parse_addressed(&pattern, ":bob!b@h PRIVMSG #wz :  ,wzlobbybot,\tping?!").unwrap();
        assert_eq!(msg.command, "ping");
    }

    #[test]
    fn ignores_messages_not_addressed_to_bot() {
        let pattern = addressed_message_pattern("wzlobbybot").unwrap();
        assert!(parse_addressed(&pattern, ":bob!b@h PRIVMSG #wz :hello everyone").is_none());
        assert!(parse_addressed(&pattern, ":irc.server 001 wzlobbybot :Welcome").is_none());
        assert!(parse_addressed(&pattern, ":bob!b@h PRIVMSG wzlobbybot :list").is_none());
    }

    #[test]
    fn nick_is_matched_literally() {
        let pattern = addressed_message_pattern("bot.v2").unwrap();
        assert!(parse_addressed(&pattern, ":a!b@c PRIVMSG #wz :botXv2: ping").is_none());
        assert!(parse_addressed(&pattern, ":a!b@c PRIVMSG #wz :bot.v2: ping").is_some());
    }

    #[test]
    fn bare_mention_has_empty_command() {
        let pattern = addressed_message_pattern("wzlobbybot").unwrap();
        let msg = parse_addressed(&pattern, ":a!b@c PRIVMSG #wz :wzlobbybot!").unwrap();
        assert_eq!(msg.command, "");
    }

    #[test]
    fn receive_returns_command_in_home_channel() {
        let (mut conn, out) = connection(":alice!a@h PRIVMSG #wz :wzlobbybot: ping\r\n");
        let msg = conn.receive_command().unwrap().unwrap();
        assert_eq!(msg.command, "ping");
        assert!(out.lines().is_empty());
    }

    #[test]
    fn foreign_channel_gets_redirect_notice() {
        let (mut conn, out) = connection(":alice!a@h PRIVMSG #other :wzlobbybot: list\r\n");
        assert!(conn.receive_command().unwrap().is_none());
        assert_eq!(
            out.lines(),
            vec![
                "NOTICE alice :Sorry alice, I will not provide my services in this channel. \
                 Please find me in #wz"
            ]
        );
    }

    #[test]
    fn answers_server_ping() {
        let (mut conn, out) = connection("PING :irc.example.net\r\n");
        assert!(conn.receive_command().unwrap().is_none());
        assert_eq!(out.lines(), vec!["PONG :irc.example.net"]);
    }

    #[test]
    fn eof_is_transport_error() {
        let (mut conn, _) = connection("");
        assert!(matches!(conn.receive_command(), Err(TransportError::Closed)));
    }

    #[test]
    fn registration_lines() {
        let out = SharedBuf::default();
        let sender = ChatSender::new(LineWriter::new(out.clone()), "#wz");
        sender.register("wzlobbybot", "Lobby Bot").unwrap();
        sender.join("#wz").unwrap();
        sender.send_channel_message("pong").unwrap();
        assert_eq!(
            out.lines(),
            vec![
                "NICK wzlobbybot",
                "USER wzlobbybot 0 * :Lobby Bot",
                "JOIN #wz",
                "PRIVMSG #wz :pong",
            ]
        );
    }

    #[test]
    fn outbound_text_cannot_inject_lines() {
        let out = SharedBuf::default();
        let sender = ChatSender::new(LineWriter::new(out.clone()), "#wz");
        sender
            .send_channel_message("New game: evil\r\nQUIT :bye")
            .unwrap();
        assert_eq!(out.lines(), vec!["PRIVMSG #wz :New game: evil  QUIT :bye"]);
    }

    #[test]
    fn long_lines_are_truncated_on_char_boundary() {
        let clamped = clamp_line(&"é".repeat(400));
        assert!(clamped.len() <= MAX_LINE);
        assert_eq!(clamped.chars().count(), MAX_LINE / 2);
    }
}

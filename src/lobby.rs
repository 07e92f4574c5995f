//! Client for the Warzone 2100 master server game list.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::error::LobbyError;

/// Size of one `GAMESTRUCT` on the wire.
pub const GAME_STRUCT_SIZE: usize = 112;
const NAME_SIZE: usize = 64;
const HOST_SIZE: usize = 16;
const MAX_GAMES: u32 = 1024;
/// Session flag set once a game has started and no longer accepts players.
pub const SESSION_JOINDISABLED: i32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GameRecord {
    pub host: String,
    pub description: String,
    pub current_players: u32,
    pub max_players: u32,
    /// Eligible for a "New game" announcement.
    #[serde(skip)]
    pub announce: bool,
}

impl GameRecord {
    pub fn new(host: &str, description: &str, current_players: u32, max_players: u32) -> Self {
        Self {
            host: host.to_string(),
            description: description.to_string(),
            current_players,
            max_players,
            announce: true,
        }
    }

    /// `<description> [<current>/<max>]`
    pub fn summary(&self) -> String {
        format!(
            "{} [{}/{}]",
            self.description, self.current_players, self.max_players
        )
    }
}

/// Anything that can produce the current list of lobby games.
pub trait LobbySource {
    fn list_games(&self) -> Result<Vec<GameRecord>, LobbyError>;

    /// `host:port` shown to users when the lobby cannot be reached.
    fn endpoint(&self) -> String;

    /// Fetch for background use: failures are logged and reported as `None`.
    fn poll_games(&self) -> Option<Vec<GameRecord>> {
        match self.list_games() {
            Ok(games) => Some(games),
            Err(e) => {
                log_lobby_error(&self.endpoint(), "poll", &e);
                None
            }
        }
    }
}

/// Timeouts log at info, other lobby failures at warn.
pub fn log_lobby_error(endpoint: &str, action: &str, err: &LobbyError) {
    if err.is_timeout() {
        tracing::info!(lobby = endpoint, action, "lobby timed out: {err}");
    } else {
        tracing::warn!(lobby = endpoint, action, "lobby request failed: {err}");
    }
}

#[derive(Debug, Clone)]
pub struct LobbyClient {
    pub host: String,
    pub port: u16,
    timeout: Duration,
}

impl LobbyClient {
    pub fn new(host: &str, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.to_string(),
            port,
            timeout,
        }
    }

    fn unavailable(&self, source: std::io::Error) -> LobbyError {
        LobbyError::Unavailable {
            host: self.host.clone(),
            port: self.port,
            source,
        }
    }

    fn open(&self, deadline: Instant) -> Result<TcpStream, LobbyError> {
        let addrs = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| self.unavailable(e))?;

        let mut last_err = std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "host resolved to no addresses",
        );
        for addr in addrs {
            let remaining = remaining(deadline).map_err(|e| self.unavailable(e))?;
            match TcpStream::connect_timeout(&addr, remaining) {
                Ok(stream) => return Ok(stream),
                Err(e) => last_err = e,
            }
        }
        Err(self.unavailable(last_err))
    }
}

impl LobbySource for LobbyClient {
    /// One request/response exchange. `timeout` bounds the whole fetch, not
    /// each read.
    fn list_games(&self) -> Result<Vec<GameRecord>, LobbyError> {
        let deadline = Instant::now() + self.timeout;
        let stream = self.open(deadline)?;
        let mut conn = DeadlineStream {
            stream: &stream,
            deadline,
        };
        conn.write_all(b"list\0").map_err(|e| self.unavailable(e))?;
        let games = read_game_list(&mut conn).map_err(|e| match e {
            ReadError::Io(e) => self.unavailable(e),
            ReadError::Malformed(msg) => LobbyError::Malformed(msg),
        })?;
        tracing::debug!(lobby = %self.endpoint(), count = games.len(), "fetched game list");
        Ok(games)
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn remaining(deadline: Instant) -> std::io::Result<Duration> {
    let left = deadline.saturating_duration_since(Instant::now());
    if left.is_zero() {
        Err(std::io::Error::from(std::io::ErrorKind::TimedOut))
    } else {
        Ok(left)
    }
}

/// Socket whose reads and writes share one deadline.
struct DeadlineStream<'a> {
    stream: &'a TcpStream,
    deadline: Instant,
}

impl Read for DeadlineStream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.stream.set_read_timeout(Some(remaining(self.deadline)?))?;
        self.stream.read(buf)
    }
}

impl Write for DeadlineStream<'_> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.stream.set_write_timeout(Some(remaining(self.deadline)?))?;
        self.stream.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.stream.flush()
    }
}

#[derive(Debug)]
enum ReadError {
    Io(std::io::Error),
    Malformed(String),
}

impl From<std::io::Error> for ReadError {
    fn from(e: std::io::Error) -> Self {
        ReadError::Io(e)
    }
}

fn read_game_list(reader: &mut impl Read) -> Result<Vec<GameRecord>, ReadError> {
    let mut count = [0u8; 4];
    reader.read_exact(&mut count)?;
    let count = u32::from_be_bytes(count);
    if count > MAX_GAMES {
        return Err(ReadError::Malformed(format!(
            "game count {count} exceeds {MAX_GAMES}"
        )));
    }

    let mut games = Vec::with_capacity(count as usize);
    let mut buf = [0u8; GAME_STRUCT_SIZE];
    for _ in 0..count {
        reader.read_exact(&mut buf)?;
        games.push(decode_game(&buf));
    }
    Ok(games)
}

/// Decode one `GAMESTRUCT`:
/// `name[64] dwSize dwFlags host[16] dwMaxPlayers dwCurrentPlayers dwUserFlags[4]`.
pub fn decode_game(buf: &[u8; GAME_STRUCT_SIZE]) -> GameRecord {
    let name = c_string(&buf[..NAME_SIZE]);
    let flags = be_i32(buf, NAME_SIZE + 4);
    let host = c_string(&buf[NAME_SIZE + 8..NAME_SIZE + 8 + HOST_SIZE]);
    let max = be_i32(buf, NAME_SIZE + 8 + HOST_SIZE);
    let current = be_i32(buf, NAME_SIZE + 12 + HOST_SIZE);

    GameRecord {
        host,
        description: name,
        current_players: u32::try_from(current).unwrap_or(0),
        max_players: u32::try_from(max).unwrap_or(0).max(1),
        announce: (flags & SESSION_JOINDISABLED) == 0,
    }
}

fn be_i32(buf: &[u8], offset: usize) -> i32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&buf[offset..offset + 4]);
    i32::from_be_bytes(word)
}

fn c_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).trim().to_string()
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::thread;

    use super::*;

    fn encode_game(
        name: &str,
        host: &str,
        flags: i32,
        current: i32,
        max: i32,
    ) -> [u8; GAME_STRUCT_SIZE] {
        let mut buf = [0u8; GAME_STRUCT_SIZE];
        buf[..name.len()].copy_from_slice(name.as_bytes());
        buf[NAME_SIZE..NAME_SIZE + 4].copy_from_slice(&(GAME_STRUCT_SIZE as i32).to_be_bytes());
        buf[NAME_SIZE + 4..NAME_SIZE + 8].copy_from_slice(&flags.to_be_bytes());
        buf[NAME_SIZE + 8..NAME_SIZE + 8 + host.len()].copy_from_slice(host.as_bytes());
        let off = NAME_SIZE + 8 + HOST_SIZE;
        buf[off..off + 4].copy_from_slice(&max.to_be_bytes());
        buf[off + 4..off + 8].copy_from_slice(&current.to_be_bytes());
        buf
    }

    #[test]
    fn decodes_game_struct() {
        let game = decode_game(&encode_game("Alpha", "10.0.0.1", 0, 2, 4));
        assert_eq!(game.description, "Alpha");
        assert_eq!(game.host, "10.0.0.1");
        assert_eq!(game.current_players, 2);
        assert_eq!(game.max_players, 4);
        assert!(game.announce);
    }

    #[test]
    fn started_games_are_not_announced() {
        let game = decode_game(&encode_game("Beta", "10.0.0.2", SESSION_JOINDISABLED, 4, 4));
        assert!(!game.announce);
    }

    #[test]
    fn negative_counts_are_clamped() {
        let game = decode_game(&encode_game("Gamma", "10.0.0.3", 0, -3, 0));
        assert_eq!(game.current_players, 0);
        assert_eq!(game.max_players, 1);
    }

    #[test]
    fn rejects_absurd_count() {
        let mut data: &[u8] = &u32::MAX.to_be_bytes();
        assert!(matches!(read_game_list(&mut data), Err(ReadError::Malformed(_))));
    }

    #[test]
    fn truncated_list_is_io_error() {
        let mut data = 2u32.to_be_bytes().to_vec();
        data.extend_from_slice(&encode_game("Alpha", "10.0.0.1", 0, 1, 2));
        let mut slice = data.as_slice();
        assert!(matches!(read_game_list(&mut slice), Err(ReadError::Io(_))));
    }

    #[test]
    fn summary_format() {
        assert_eq!(GameRecord::new("h", "Alpha", 2, 4).summary(), "Alpha [2/4]");
    }

    #[test]
    fn lists_games_from_server() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut request = [0u8; 5];
            conn.read_exact(&mut request).unwrap();
            assert_eq!(&request, b"list\0");
            conn.write_all(&2u32.to_be_bytes()).unwrap();
            conn.write_all(&encode_game("Alpha", "10.0.0.1", 0, 2, 4)).unwrap();
            conn.write_all(&encode_game("Beta", "10.0.0.2", 0, 1, 8)).unwrap();
        });

        let client = LobbyClient::new("127.0.0.1", port, Duration::from_secs(5));
        let games = client.list_games().unwrap();
        server.join().unwrap();

        assert_eq!(games.len(), 2);
        assert_eq!(games[0].summary(), "Alpha [2/4]");
        assert_eq!(games[1].host, "10.0.0.2");
    }

    #[test]
    fn refused_connection_is_unavailable() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = LobbyClient::new("127.0.0.1", port, Duration::from_secs(1));
        let err = client.list_games().unwrap_err();
        assert!(matches!(err, LobbyError::Unavailable { port: p, .. } if p == port));
        assert!(client.poll_games().is_none());
    }

    #[test]
    fn silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (conn, _) = listener.accept().unwrap();
            thread::sleep(Duration::from_millis(800));
            drop(conn);
        });

        let client = LobbyClient::new("127.0.0.1", port, Duration::from_millis(200));
        let err = client.list_games().unwrap_err();
        assert!(err.is_timeout(), "expected timeout, got {err}");
        server.join().unwrap();
    }

    #[test]
    fn trickling_server_hits_overall_deadline() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut reply = 1u32.to_be_bytes().to_vec();
            reply.extend_from_slice(&encode_game("Alpha", "10.0.0.1", 0, 1, 2));
            // Each byte arrives well inside the read timeout.
            for byte in reply {
                if conn.write_all(&[byte]).is_err() {
                    break;
                }
                thread::sleep(Duration::from_millis(50));
            }
        });

        let started = Instant::now();
        let client = LobbyClient::new("127.0.0.1", port, Duration::from_millis(400));
        let err = client.list_games().unwrap_err();
        assert!(err.is_timeout(), "expected timeout, got {err}");
        assert!(started.elapsed() < Duration::from_secs(3));
        server.join().unwrap();
    }
}

//! Background lobby poller that turns snapshot differences into channel
//! announcements.
//!
//! The first successful poll only records state. Later polls compare the new
//! game list against the previous one by host:
//!
//! - a host that was not listed before and is flagged `announce` is a new
//!   game, subject to a per-host cooldown that is refreshed on every
//!   reappearance
//! - a host listed in both polls is checked for description or player count
//!   changes (when update announcements are on)
//! - a host that disappeared is reported closed with its last known state
//!   (when close announcements are on)

use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::TransportError;
use crate::irc::ChatSender;
use crate::lobby::{GameRecord, LobbySource};

/// Where announcements go.
pub trait Announcer {
    fn announce(&self, text: &str) -> Result<(), TransportError>;
}

impl<W: Write> Announcer for ChatSender<W> {
    fn announce(&self, text: &str) -> Result<(), TransportError> {
        self.send_channel_message(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Announcement {
    NewGame(GameRecord),
    UpdatedGame(GameRecord),
    GameClosed(GameRecord),
}

impl fmt::Display for Announcement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Announcement::NewGame(g) => {
                write!(f, "New game: {} ({} players)", g.description, g.max_players)
            }
            Announcement::UpdatedGame(g) => write!(f, "Updated game: {}", g.summary()),
            Announcement::GameClosed(g) => write!(f, "Game closed: {}", g.summary()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NotifierSettings {
    /// Pause between the end of one poll and the start of the next.
    pub poll_interval: Duration,
    /// Minimum quiet time before the same host is announced as new again.
    pub cooldown: Duration,
    pub announce_updates: bool,
    pub announce_closures: bool,
}

impl Default for NotifierSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            cooldown: Duration::from_secs(300),
            announce_updates: false,
            announce_closures: false,
        }
    }
}

/// One poll's games keyed by host, in lobby order.
#[derive(Debug, Default)]
struct GameSnapshot {
    games: Vec<GameRecord>,
    by_host: HashMap<String, usize>,
}

impl GameSnapshot {
    fn from_games(games: Vec<GameRecord>) -> Self {
        let mut snapshot = Self::default();
        for game in games {
            if let Some(&i) = snapshot.by_host.get(&game.host) {
                snapshot.games[i] = game;
            } else {
                snapshot.by_host.insert(game.host.clone(), snapshot.games.len());
                snapshot.games.push(game);
            }
        }
        snapshot
    }

    fn get(&self, host: &str) -> Option<&GameRecord> {
        self.by_host.get(host).map(|&i| &self.games[i])
    }

    fn contains(&self, host: &str) -> bool {
        self.by_host.contains_key(host)
    }
}

pub struct ChangeNotifier {
    settings: NotifierSettings,
    snapshot: Option<GameSnapshot>,
    announced_at: HashMap<String, DateTime<Utc>>,
}

impl ChangeNotifier {
    pub fn new(settings: NotifierSettings) -> Self {
        Self {
            settings,
            snapshot: None,
            announced_at: HashMap::new(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Number of hosts still inside their new-game cooldown.
    pub fn tracked_hosts(&self) -> usize {
        self.announced_at.len()
    }

    /// Take a fresh game list as of `now`, replace the held snapshot, and
    /// return what should be announced.
    pub fn observe(&mut self, games: Vec<GameRecord>, now: DateTime<Utc>) -> Vec<Announcement> {
        let next = GameSnapshot::from_games(games);
        let Some(prev) = self.snapshot.take() else {
            tracing::debug!(games = next.games.len(), "initial lobby snapshot recorded");
            self.snapshot = Some(next);
            return Vec::new();
        };

        let cooldown = self.settings.cooldown;
        let mut out = Vec::new();
        for game in &next.games {
            match prev.get(&game.host) {
                None if game.announce => {
                    if cooldown_elapsed(&mut self.announced_at, &game.host, now, cooldown) {
                        out.push(Announcement::NewGame(game.clone()));
                    } else {
                        tracing::debug!(host = %game.host, "new game inside cooldown, suppressed");
                    }
                }
                Some(old) if self.settings.announce_updates && has_changed(old, game) => {
                    out.push(Announcement::UpdatedGame(game.clone()));
                }
                _ => {}
            }
        }

        if self.settings.announce_closures {
            out.extend(
                prev.games
                    .into_iter()
                    .filter(|g| !next.contains(&g.host))
                    .map(Announcement::GameClosed),
            );
        }

        // Entries past the cooldown behave exactly like missing ones.
        self.announced_at
            .retain(|_, last| !is_older_than(*last, now, cooldown));

        self.snapshot = Some(next);
        out
    }

    /// Poll until `stop` fires or its sender is dropped.
    pub fn run(
        mut self,
        lobby: &impl LobbySource,
        announcer: &impl Announcer,
        stop: &Receiver<()>,
    ) {
        tracing::info!(
            interval_secs = self.settings.poll_interval.as_secs(),
            updates = self.settings.announce_updates,
            closures = self.settings.announce_closures,
            "change notifier started"
        );
        loop {
            if !matches!(stop.try_recv(), Err(TryRecvError::Empty)) {
                break;
            }

            if let Some(games) = lobby.poll_games() {
                for announcement in self.observe(games, Utc::now()) {
                    tracing::info!(%announcement, "announcing");
                    if let Err(e) = announcer.announce(&announcement.to_string()) {
                        tracing::error!("change notifier stopping: {e}");
                        return;
                    }
                }
            }

            match stop.recv_timeout(self.settings.poll_interval) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        tracing::info!("change notifier stopped");
    }

    /// Run on a dedicated thread.
    pub fn spawn<L, A>(self, lobby: L, announcer: A) -> std::io::Result<NotifierHandle>
    where
        L: LobbySource + Send + 'static,
        A: Announcer + Send + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel();
        let thread = thread::Builder::new()
            .name("change-notifier".into())
            .spawn(move || self.run(&lobby, &announcer, &stop_rx))?;
        Ok(NotifierHandle {
            stop: stop_tx,
            thread,
        })
    }
}

fn has_changed(old: &GameRecord, new: &GameRecord) -> bool {
    old.description != new.description
        || old.max_players != new.max_players
        || old.current_players != new.current_players
}

fn is_older_than(last: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> bool {
    (now - last).to_std().is_ok_and(|age| age > window)
}

/// True when `host` has no announcement within `window`. Always restamps the
/// host with `now`.
fn cooldown_elapsed(
    announced_at: &mut HashMap<String, DateTime<Utc>>,
    host: &str,
    now: DateTime<Utc>,
    window: Duration,
) -> bool {
    let elapsed = announced_at
        .get(host)
        .is_none_or(|&last| is_older_than(last, now, window));
    announced_at.insert(host.to_string(), now);
    elapsed
}

/// Owner's side of a spawned notifier.
pub struct NotifierHandle {
    stop: Sender<()>,
    thread: JoinHandle<()>,
}

impl NotifierHandle {
    /// Ask the loop to exit at its next checkpoint.
    pub fn stop(&self) {
        let _ = self.stop.send(());
    }

    pub fn join(self) -> thread::Result<()> {
        self.thread.join()
    }

    /// Stop and wait for the loop to exit.
    pub fn shutdown(self) {
        self.stop();
        if self.join().is_err() {
            tracing::error!("change notifier thread panicked");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }
}

use std::process::ExitCode;

/// Failure on the chat socket. Fatal to whichever loop hit it.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection closed by peer")]
    Closed,
}

/// Failure talking to the lobby server.
#[derive(Debug, thiserror::Error)]
pub enum LobbyError {
    #[error("lobby {host}:{port} unavailable: {source}")]
    Unavailable {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed lobby response: {0}")]
    Malformed(String),
}

impl LobbyError {
    /// The lobby accepted the connection or request but did not answer in time.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            LobbyError::Unavailable { source, .. }
                if matches!(
                    source.kind(),
                    std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
                )
        )
    }
}

/// A command word the dispatcher does not know.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown command '{0}'")]
pub struct UnrecognizedCommand(pub String);

/// Errors that cause lobbybot to exit with a specific code.
#[derive(Debug, thiserror::Error)]
pub enum ExitError {
    #[error("config error: {0}")]
    Config(String),

    #[error("chat connection lost: {0}")]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Lobby(#[from] LobbyError),

    #[error("interrupted")]
    Interrupted,
}

impl ExitError {
    /// Raw process status, for paths that must call `std::process::exit`.
    pub const fn code(&self) -> u8 {
        match self {
            ExitError::Config(_) => 2,
            ExitError::Transport(_) => 3,
            ExitError::Lobby(_) => 4,
            ExitError::Interrupted => 130,
        }
    }

    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_detected() {
        let err = LobbyError::Unavailable {
            host: "lobby".into(),
            port: 9997,
            source: std::io::Error::from(std::io::ErrorKind::TimedOut),
        };
        assert!(err.is_timeout());
        assert!(err.to_string().starts_with("lobby lobby:9997 unavailable: "));
    }

    #[test]
    fn refused_is_not_timeout() {
        let err = LobbyError::Unavailable {
            host: "lobby".into(),
            port: 9997,
            source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
        };
        assert!(!err.is_timeout());
    }

    #[test]
    fn exit_codes() {
        assert_eq!(ExitError::Config("x".into()).exit_code(), ExitCode::from(2));
        assert_eq!(
            ExitError::Transport(TransportError::Closed).exit_code(),
            ExitCode::from(3)
        );
        assert_eq!(ExitError::Interrupted.exit_code(), ExitCode::from(130));
        assert_eq!(ExitError::Interrupted.code(), 130);
    }

    #[test]
    fn lobby_errors_exit_with_four() {
        let err = ExitError::from(LobbyError::Malformed("short read".into()));
        assert_eq!(err.code(), 4);
        assert_eq!(err.to_string(), "malformed lobby response: short read");
    }
}

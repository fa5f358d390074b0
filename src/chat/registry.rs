/// Session registry: live connections and their nicknames.
use std::net::SocketAddr;

use tokio::sync::mpsc;

/// A registered client session.
///
/// Owned by the [`Registry`]; the connection task keeps the receiving end of
/// `tx` and writes whatever arrives there back to its socket. Dropping the
/// receiver is what the broadcast engine observes as a send failure.
#[derive(Debug)]
pub struct Session {
    pub nick: String,
    pub addr: SocketAddr,
    pub tx: mpsc::UnboundedSender<String>,
}

/// Why a registration was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegisterError {
    #[error("nickname must not be empty")]
    Empty,
    #[error("nickname {0:?} is already in use")]
    AlreadyInUse(String),
}

/// Nickname-unique set of live sessions, kept in registration order.
///
/// Shared across connection tasks inside the server state lock; every
/// mutation and snapshot happens under that lock.
#[derive(Debug, Default)]
pub struct Registry {
    sessions: Vec<Session>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session. The nickname (trimmed) must be non-empty and
    /// not held by any live session; on success the session is immediately
    /// visible to [`list`](Self::list) and fan-out.
    pub fn register(
        &mut self,
        nick: &str,
        addr: SocketAddr,
        tx: mpsc::UnboundedSender<String>,
    ) -> Result<&Session, RegisterError> {
        let nick = nick.trim();
        if nick.is_empty() {
            return Err(RegisterError::Empty);
        }
        if self.contains(nick) {
            return Err(RegisterError::AlreadyInUse(nick.to_owned()));
        }
        self.sessions.push(Session {
            nick: nick.to_owned(),
            addr,
            tx,
        });
        Ok(self.sessions.last().unwrap())
    }

    /// Remove a session by nickname. Idempotent: removing an absent
    /// nickname is a no-op returning `None`.
    pub fn unregister(&mut self, nick: &str) -> Option<Session> {
        let idx = self.sessions.iter().position(|s| s.nick == nick)?;
        Some(self.sessions.remove(idx))
    }

    pub fn contains(&self, nick: &str) -> bool {
        self.sessions.iter().any(|s| s.nick == nick)
    }

    /// Nicknames in registration order.
    pub fn list(&self) -> Vec<String> {
        self.sessions.iter().map(|s| s.nick.clone()).collect()
    }

    /// Fan-out view: every session except the excluded nickname.
    pub fn iter_except<'a>(
        &'a self,
        excluded: Option<&'a str>,
    ) -> impl Iterator<Item = &'a Session> {
        self.sessions
            .iter()
            .filter(move |s| Some(s.nick.as_str()) != excluded)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

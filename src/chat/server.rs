/// Chat server core: state management, broadcast fan-out, client handling.
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;

use futures::SinkExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use tokio_stream::StreamExt;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::codec::{CodecError, LineCodec};
use super::history::HistoryLog;
use super::registry::Registry;

/// Handshake rejection, sent before closing. Clients match on the `ERRO`
/// prefix.
const HANDSHAKE_REJECTED: &str = "ERRO: Nickname inválido ou já em uso.";

/// Header preceding the history replay for a fresh session.
const HISTORY_HEADER: &str = "Histórico de mensagens:";

/// How many history entries are replayed to a fresh session.
const HISTORY_REPLAY: usize = 10;

/// Static command summary for `/help`.
const HELP_TEXT: &str = "Comandos disponíveis:\n\
    /quit - Sair do chat\n\
    /list - Listar usuários online\n\
    /help - Mostrar esta ajuda";

/// Shared server state.
#[derive(Debug)]
pub struct ServerState {
    /// Live sessions, nickname-unique.
    pub registry: Registry,
    /// Bounded persisted record of everything broadcast.
    pub history: HistoryLog,
}

/// Shared, thread-safe server state.
pub type SharedState = Arc<RwLock<ServerState>>;

impl ServerState {
    pub fn new(history: HistoryLog) -> Self {
        Self {
            registry: Registry::new(),
            history,
        }
    }

    /// Record one message and fan it out to every session except `sender`.
    ///
    /// A recipient whose channel is gone is evicted from the registry and
    /// its departure is announced through the same path. The cascade is
    /// driven by an explicit queue: every pass only targets still-registered
    /// sessions and removes at least one, so it always terminates. Callers
    /// hold the state write lock for the whole cascade; all recipients
    /// observe broadcasts in the same relative order.
    pub fn broadcast(&mut self, body: &str, sender: Option<&str>) {
        let mut queue: VecDeque<(String, Option<String>)> = VecDeque::new();
        queue.push_back((body.to_owned(), sender.map(str::to_owned)));

        while let Some((body, sender)) = queue.pop_front() {
            let entry = self.history.append(&body);

            let mut dropped = Vec::new();
            for session in self.registry.iter_except(sender.as_deref()) {
                if session.tx.send(entry.line().to_owned()).is_err() {
                    dropped.push(session.nick.clone());
                }
            }

            for nick in dropped {
                if self.registry.unregister(&nick).is_some() {
                    warn!(%nick, "send failed, evicting session");
                    queue.push_back((format!("{nick} saiu do chat."), None));
                }
            }
        }
    }
}

/// A bound chat server, ready to serve.
#[derive(Debug)]
pub struct ChatServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    state: SharedState,
    shutdown: CancellationToken,
}

impl ChatServer {
    /// Bind the listening socket. Bind failure is fatal; there is no chat
    /// service without it.
    pub async fn bind(
        addr: &str,
        history: HistoryLog,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!("sarau listening on {local_addr}");
        Ok(Self {
            listener,
            local_addr,
            state: Arc::new(RwLock::new(ServerState::new(history))),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Token that stops the accept loop and asks every handler to close.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn state(&self) -> SharedState {
        Arc::clone(&self.state)
    }

    /// Accept connections until the shutdown token fires, then drain all
    /// handlers, flush the history, and release the listening socket.
    pub async fn serve(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let Self {
            listener,
            state,
            shutdown,
            ..
        } = self;

        let mut handles = Vec::new();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => {
                    let (socket, addr) = accepted?;
                    info!(%addr, "new connection");
                    let state = Arc::clone(&state);
                    let shutdown = shutdown.clone();
                    handles.push(tokio::spawn(async move {
                        if let Err(e) = handle_client(socket, addr, state, shutdown).await {
                            warn!(%addr, "client error: {e}");
                        }
                        info!(%addr, "disconnected");
                    }));
                }
            }
        }

        info!("shutting down, draining {} handler task(s)", handles.len());
        for handle in handles {
            let _ = handle.await;
        }
        state.read().await.history.persist();
        drop(listener);
        info!("chat service stopped");
        Ok(())
    }
}

/// Handle a single client connection.
///
/// Drives the session through its states: read the handshake line, register,
/// relay until quit/disconnect/shutdown, then clean up. Cleanup runs on
/// every exit path past registration, including write failures.
async fn handle_client(
    socket: TcpStream,
    addr: SocketAddr,
    state: SharedState,
    shutdown: CancellationToken,
) -> Result<(), CodecError> {
    let mut framed = Framed::new(socket, LineCodec);
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    // The first line is the candidate nickname.
    let nick = tokio::select! {
        _ = shutdown.cancelled() => return Ok(()),
        frame = framed.next() => match frame {
            Some(Ok(line)) => line.trim().to_owned(),
            Some(Err(e)) => return Err(e),
            None => return Ok(()), // peer closed before the handshake
        },
    };

    // Registration and the join announcement happen under one lock hold; no
    // broadcast can slip in between.
    {
        let mut st = state.write().await;
        let rejected = st.registry.register(&nick, addr, tx).err();
        if let Some(e) = rejected {
            drop(st);
            warn!(%addr, "handshake rejected: {e}");
            framed.send(HANDSHAKE_REJECTED.to_owned()).await?;
            return Ok(());
        }
        st.broadcast(&format!("{nick} entrou no chat!"), Some(&nick));
    }
    info!(%addr, %nick, "session registered");

    let result = relay(&mut framed, &nick, &state, &shutdown, &mut rx).await;

    // Tear down, safe on any path; a session the broadcast engine already
    // evicted is simply gone.
    {
        let mut st = state.write().await;
        if st.registry.unregister(&nick).is_some() {
            st.broadcast(&format!("{nick} saiu do chat."), None);
            info!(%nick, "session closed");
        }
    }

    result
}

/// The registered half of a session: replay recent history, greet, then
/// relay lines until quit, disconnect, or shutdown.
async fn relay(
    framed: &mut Framed<TcpStream, LineCodec>,
    nick: &str,
    state: &SharedState,
    shutdown: &CancellationToken,
    rx: &mut mpsc::UnboundedReceiver<String>,
) -> Result<(), CodecError> {
    // Direct replies below go to this session only, never broadcast and
    // never persisted.
    let replay: Vec<String> = {
        let st = state.read().await;
        st.history
            .recent(HISTORY_REPLAY)
            .map(|entry| entry.line().to_owned())
            .collect()
    };
    if !replay.is_empty() {
        framed.send(HISTORY_HEADER.to_owned()).await?;
        for line in replay {
            framed.send(line).await?;
        }
    }
    framed
        .send(format!(
            "Bem-vindo, {nick}! Comandos disponíveis: /quit, /list, /help"
        ))
        .await?;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),

            // One line from the client.
            frame = framed.next() => {
                let line = match frame {
                    Some(Ok(line)) => line,
                    Some(Err(e)) => {
                        warn!(nick, "read error: {e}");
                        return Ok(());
                    }
                    None => return Ok(()), // peer disconnected
                };
                let text = line.trim();
                if text.is_empty() {
                    continue;
                }
                if text.eq_ignore_ascii_case("/quit") {
                    return Ok(());
                } else if text.eq_ignore_ascii_case("/list") {
                    let users = state.read().await.registry.list().join(", ");
                    framed.send(format!("Usuários online: {users}")).await?;
                } else if text.eq_ignore_ascii_case("/help") {
                    framed.send(HELP_TEXT.to_owned()).await?;
                } else {
                    let body = format!("{nick}: {text}");
                    state.write().await.broadcast(&body, Some(nick));
                }
            }

            // A broadcast for this session.
            Some(line) = rx.recv() => {
                framed.send(line).await?;
            }
        }
    }
}

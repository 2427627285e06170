//! Session store
//!
//! A single task owns every session. Callers talk to it through a cloneable
//! handle; each operation is a message answered over a oneshot channel, so
//! updates to one session are applied strictly in arrival order. The same
//! task runs the periodic expiry sweep.

use super::store::{ConversationMessage, Session};
use crate::config::SessionConfig;
use crate::error::{ErrorCode, OrchestrationError};
use crate::Result;
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};
use uuid::Uuid;

const COMMAND_BUFFER: usize = 256;

enum Command {
    Create {
        reply: oneshot::Sender<String>,
    },
    Get {
        id: String,
        reply: oneshot::Sender<Option<Session>>,
    },
    GetOrCreate {
        id: Option<String>,
        reply: oneshot::Sender<Session>,
    },
    Update {
        id: String,
        message: ConversationMessage,
        reply: oneshot::Sender<bool>,
    },
    Delete {
        id: String,
        reply: oneshot::Sender<bool>,
    },
    LastN {
        id: String,
        n: usize,
        reply: oneshot::Sender<Vec<ConversationMessage>>,
    },
    Count {
        reply: oneshot::Sender<usize>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to the session-owning task
#[derive(Clone)]
pub struct SessionStore {
    commands: mpsc::Sender<Command>,
}

impl SessionStore {
    /// Spawn the owning task. Must be called inside a tokio runtime.
    pub fn new(config: SessionConfig) -> Self {
        let (commands, receiver) = mpsc::channel(COMMAND_BUFFER);
        tokio::spawn(run(config, receiver));
        Self { commands }
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Option<T> {
        let (reply, response) = oneshot::channel();
        self.commands.send(build(reply)).await.ok()?;
        response.await.ok()
    }

    fn closed() -> OrchestrationError {
        OrchestrationError::SessionStoreError("session store has been shut down".to_string())
    }

    pub async fn create(&self) -> Result<String> {
        self.request(|reply| Command::Create { reply })
            .await
            .ok_or_else(Self::closed)
    }

    /// Live session by id. Expired sessions are evicted and reported absent.
    pub async fn get(&self, id: &str) -> Option<Session> {
        let id = id.to_string();
        self.request(|reply| Command::Get { id, reply }).await.flatten()
    }

    /// Existing live session for `id`, or a fresh session under a new id.
    pub async fn get_or_create(&self, id: Option<&str>) -> Result<Session> {
        let id = id.map(str::to_string);
        self.request(|reply| Command::GetOrCreate { id, reply })
            .await
            .ok_or_else(Self::closed)
    }

    pub async fn update(&self, id: &str, message: ConversationMessage) -> Result<()> {
        let owned_id = id.to_string();
        let updated = self
            .request(|reply| Command::Update {
                id: owned_id,
                message,
                reply,
            })
            .await
            .ok_or_else(Self::closed)?;

        if !updated {
            return Err(OrchestrationError::agent(
                ErrorCode::SessionNotFound,
                format!("Session {} not found or expired", id),
            ));
        }
        Ok(())
    }

    /// Returns whether a session was removed.
    pub async fn delete(&self, id: &str) -> bool {
        let id = id.to_string();
        self.request(|reply| Command::Delete { id, reply })
            .await
            .unwrap_or(false)
    }

    pub async fn last_n(&self, id: &str, n: usize) -> Vec<ConversationMessage> {
        let id = id.to_string();
        self.request(|reply| Command::LastN { id, n, reply })
            .await
            .unwrap_or_default()
    }

    /// Stored sessions, including expired ones not yet swept
    pub async fn session_count(&self) -> usize {
        self.request(|reply| Command::Count { reply })
            .await
            .unwrap_or(0)
    }

    /// Stop the sweep and drop every session. Safe to call repeatedly.
    pub async fn destroy(&self) {
        if self
            .request(|reply| Command::Shutdown { reply })
            .await
            .is_some()
        {
            info!("Session store shut down");
        }
    }
}

struct Sessions {
    config: SessionConfig,
    sessions: HashMap<String, Session>,
}

impl Sessions {
    fn create(&mut self) -> Session {
        let id = Uuid::new_v4().to_string();
        let session = Session::new(id.clone());
        self.sessions.insert(id.clone(), session.clone());
        debug!(session_id = %id, "Session created");
        session
    }

    /// Live session, refreshed; expired ones are evicted.
    fn live(&mut self, id: &str) -> Option<&mut Session> {
        let expired = self
            .sessions
            .get(id)
            .map(|s| s.is_expired(Instant::now(), self.config.timeout))?;

        if expired {
            self.sessions.remove(id);
            debug!(session_id = %id, "Session expired on access");
            return None;
        }

        let session = self.sessions.get_mut(id)?;
        session.touch();
        Some(session)
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Create { reply } => {
                let _ = reply.send(self.create().id);
            }
            Command::Get { id, reply } => {
                let _ = reply.send(self.live(&id).map(|s| s.clone()));
            }
            Command::GetOrCreate { id, reply } => {
                let existing = id.as_deref().and_then(|id| self.live(id).map(|s| s.clone()));
                let session = match existing {
                    Some(session) => session,
                    None => self.create(),
                };
                let _ = reply.send(session);
            }
            Command::Update { id, message, reply } => {
                let max_history = self.config.max_history;
                let updated = match self.live(&id) {
                    Some(session) => {
                        session.push(message, max_history);
                        true
                    }
                    None => false,
                };
                let _ = reply.send(updated);
            }
            Command::Delete { id, reply } => {
                let _ = reply.send(self.sessions.remove(&id).is_some());
            }
            Command::LastN { id, n, reply } => {
                let messages = self.live(&id).map(|s| s.last_n(n)).unwrap_or_default();
                let _ = reply.send(messages);
            }
            Command::Count { reply } => {
                let _ = reply.send(self.sessions.len());
            }
            // handled by the run loop
            Command::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    fn sweep(&mut self) {
        let now = Instant::now();
        let timeout = self.config.timeout;
        let before = self.sessions.len();

        self.sessions.retain(|_, s| !s.is_expired(now, timeout));

        let removed = before - self.sessions.len();
        if removed > 0 {
            info!(removed, remaining = self.sessions.len(), "Expired sessions swept");
        }
    }
}

async fn run(config: SessionConfig, mut commands: mpsc::Receiver<Command>) {
    let period = config.sweep_interval;
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut state = Sessions {
        config,
        sessions: HashMap::new(),
    };

    loop {
        tokio::select! {
            biased;

            _ = ticker.tick() => state.sweep(),

            command = commands.recv() => match command {
                Some(Command::Shutdown { reply }) => {
                    state.sessions.clear();
                    let _ = reply.send(());
                    break;
                }
                Some(command) => state.handle(command),
                None => break,
            },
        }
    }

    debug!("Session store task stopped");
}

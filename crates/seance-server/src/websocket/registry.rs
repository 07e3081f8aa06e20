//! Session registry.
//!
//! ```text
//! RwLock<HashMap<SessionId, Arc<Mutex<SessionBucket>>>>
//!        │                            │
//!        │ find / create / retire     │ every membership change
//!        ▼                            ▼
//!   held briefly, never            one lock per session
//!   across a bucket mutation
//! ```
//!
//! Lock order is always outer map then bucket. A bucket emptied by the last
//! leave is marked inactive under its own lock and then removed from the map;
//! a join that finds an inactive bucket helps retire it and retries.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::gauge;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info};

use seance_core::{ConnectionId, Identity, SessionId};

use super::connection::Connection;
use crate::errors::RegistryError;
use crate::metrics::SESSIONS_ACTIVE;

struct Member {
    connection: Arc<Connection>,
    identity: Identity,
}

struct SessionBucket {
    members: HashMap<ConnectionId, Member>,
    created_at: DateTime<Utc>,
    max_users: usize,
    active: bool,
}

impl SessionBucket {
    fn new(max_users: usize) -> Self {
        Self {
            members: HashMap::new(),
            created_at: Utc::now(),
            max_users,
            active: true,
        }
    }
}

/// Snapshot of one session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    /// Session id.
    pub id: SessionId,
    /// When the first participant joined.
    pub created_at: DateTime<Utc>,
    /// Advisory participant cap.
    pub max_users: usize,
    /// Open connections.
    pub participants: usize,
    /// `false` only while the bucket is being retired.
    pub active: bool,
}

/// Maps sessions to their open connections.
pub struct ConnectionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<Mutex<SessionBucket>>>>,
    default_max_users: usize,
}

impl ConnectionRegistry {
    /// Empty registry; new sessions record `default_max_users`.
    pub fn new(default_max_users: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            default_max_users,
        }
    }

    /// Add `connection` to `session_id`, creating the session if needed.
    ///
    /// Returns the participant count after the join. The cap is advisory and
    /// is not checked here.
    pub fn register(
        &self,
        session_id: &SessionId,
        connection: Arc<Connection>,
        identity: Identity,
    ) -> Result<usize, RegistryError> {
        if !identity.is_valid() {
            return Err(RegistryError::EmptyName);
        }
        if !connection.bind(session_id.clone()) {
            return Err(RegistryError::AlreadyBound {
                connection_id: connection.id.clone(),
                session_id: connection
                    .session_id()
                    .cloned()
                    .unwrap_or_else(|| session_id.clone()),
            });
        }

        loop {
            let bucket = self.bucket_for(session_id);
            let mut guard = bucket.lock();
            if !guard.active {
                drop(guard);
                self.retire(session_id, &bucket);
                continue;
            }
            let _ = guard.members.insert(
                connection.id.clone(),
                Member {
                    connection: Arc::clone(&connection),
                    identity,
                },
            );
            let count = guard.members.len();
            debug!(
                session_id = %session_id,
                connection_id = %connection.id,
                participants = count,
                "connection registered"
            );
            return Ok(count);
        }
    }

    /// Remove a connection and fire its close signal.
    ///
    /// Deletes the session when it becomes empty. Returns the departed
    /// identity, or `None` if the connection was not registered.
    pub fn unregister(
        &self,
        session_id: &SessionId,
        connection_id: &ConnectionId,
    ) -> Option<Identity> {
        let bucket = self.sessions.read().get(session_id).cloned()?;

        let (member, emptied) = {
            let mut guard = bucket.lock();
            let member = guard.members.remove(connection_id)?;
            let emptied = guard.members.is_empty();
            if emptied {
                guard.active = false;
            }
            (member, emptied)
        };

        if emptied {
            self.retire(session_id, &bucket);
            info!(session_id = %session_id, "session closed");
        }
        member.connection.close();
        debug!(session_id = %session_id, connection_id = %connection_id, "connection unregistered");
        Some(member.identity)
    }

    /// Identities in the session, oldest join first.
    pub fn participants_of(&self, session_id: &SessionId) -> Vec<Identity> {
        let Some(bucket) = self.get(session_id) else {
            return Vec::new();
        };
        let mut identities: Vec<Identity> = bucket
            .lock()
            .members
            .values()
            .map(|m| m.identity.clone())
            .collect();
        identities.sort_by(|a, b| a.joined_at.cmp(&b.joined_at));
        identities
    }

    /// Connections in the session, for fan-out.
    pub fn connections_of(&self, session_id: &SessionId) -> Vec<Arc<Connection>> {
        self.get(session_id)
            .map(|bucket| {
                bucket
                    .lock()
                    .members
                    .values()
                    .map(|m| Arc::clone(&m.connection))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Snapshot of one session.
    pub fn session_info(&self, session_id: &SessionId) -> Option<SessionInfo> {
        let bucket = self.get(session_id)?;
        let guard = bucket.lock();
        Some(snapshot(session_id, &guard))
    }

    /// Snapshot of every live session, ordered by id.
    pub fn sessions(&self) -> Vec<SessionInfo> {
        let mut all: Vec<SessionInfo> = self
            .sessions
            .read()
            .iter()
            .map(|(id, bucket)| snapshot(id, &bucket.lock()))
            .collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Whether the session currently exists.
    pub fn has_session(&self, session_id: &SessionId) -> bool {
        self.sessions.read().contains_key(session_id)
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Open connections across all sessions.
    pub fn connection_count(&self) -> usize {
        self.sessions
            .read()
            .values()
            .map(|bucket| bucket.lock().members.len())
            .sum()
    }

    fn get(&self, session_id: &SessionId) -> Option<Arc<Mutex<SessionBucket>>> {
        self.sessions.read().get(session_id).cloned()
    }

    fn bucket_for(&self, session_id: &SessionId) -> Arc<Mutex<SessionBucket>> {
        if let Some(bucket) = self.get(session_id) {
            return bucket;
        }
        let mut sessions = self.sessions.write();
        let bucket = sessions.entry(session_id.clone()).or_insert_with(|| {
            info!(session_id = %session_id, max_users = self.default_max_users, "session created");
            Arc::new(Mutex::new(SessionBucket::new(self.default_max_users)))
        });
        let bucket = Arc::clone(bucket);
        gauge!(SESSIONS_ACTIVE).set(sessions.len() as f64);
        bucket
    }

    /// Remove `bucket` from the map if it is still the one registered.
    fn retire(&self, session_id: &SessionId, bucket: &Arc<Mutex<SessionBucket>>) {
        let mut sessions = self.sessions.write();
        if sessions
            .get(session_id)
            .is_some_and(|current| Arc::ptr_eq(current, bucket))
        {
            let _ = sessions.remove(session_id);
        }
        gauge!(SESSIONS_ACTIVE).set(sessions.len() as f64);
    }
}

fn snapshot(session_id: &SessionId, bucket: &SessionBucket) -> SessionInfo {
    SessionInfo {
        id: session_id.clone(),
        created_at: bucket.created_at,
        max_users: bucket.max_users,
        participants: bucket.members.len(),
        active: bucket.active,
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(seance_core::constants::DEFAULT_MAX_SESSION_USERS)
    }
}

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use crate::error::{BookError, Result};
use crate::record::{Dataset, IncomingRow};

/// Opaque session handle handed to clients.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    fn generate() -> Self {
        SessionId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        SessionId(value)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        SessionId(value.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Server-side working state for one upload or generate call.
#[derive(Debug, Clone)]
pub struct Session {
    pub original: Dataset,
    pub current: Dataset,
    pub filename: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What a fetch returns: the working copy and its display name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub data: Dataset,
    pub filename: String,
}

/// Keyed storage of working copies.
///
/// `replace` overwrites the working copy wholesale and does not check it
/// against the original; diffing handles rows that appear or disappear.
pub trait SessionStore: Send + Sync {
    fn create(&self, dataset: Dataset, filename: &str) -> SessionId;

    fn get(&self, id: &SessionId) -> Result<Snapshot>;

    fn original(&self, id: &SessionId) -> Result<Dataset>;

    fn replace(&self, id: &SessionId, dataset: Dataset) -> Result<()>;

    fn reset(&self, id: &SessionId) -> Result<Dataset>;

    fn remove(&self, id: &SessionId) -> Result<()>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop sessions idle past the store's TTL, returning how many went.
    fn evict_expired(&self) -> usize;

    /// Replace the working copy with client rows, giving id-less rows ids
    /// that no original or current row uses.
    fn replace_rows(&self, id: &SessionId, rows: Vec<IncomingRow>) -> Result<Dataset> {
        let first_free = self
            .original(id)?
            .next_id()
            .max(self.get(id)?.data.next_id());
        let dataset = Dataset::from_incoming(rows, first_free)?;
        self.replace(id, dataset.clone())?;
        Ok(dataset)
    }
}

/// Process-local store. Sessions live until removed or, when a TTL is set,
/// until they sit idle for longer than it.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<SessionId, Session>>,
    ttl: Option<Duration>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Option<Duration>) -> Self {
        MemorySessionStore {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<SessionId, Session>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<SessionId, Session>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_live(&self, session: &Session, now: DateTime<Utc>) -> bool {
        match self.ttl {
            Some(ttl) => now - session.updated_at <= ttl,
            None => true,
        }
    }

    fn with_live<T>(&self, id: &SessionId, f: impl FnOnce(&Session) -> T) -> Result<T> {
        let sessions = self.read();
        match sessions.get(id) {
            Some(session) if self.is_live(session, Utc::now()) => Ok(f(session)),
            _ => Err(BookError::SessionNotFound),
        }
    }

    fn with_live_mut<T>(&self, id: &SessionId, f: impl FnOnce(&mut Session) -> T) -> Result<T> {
        let now = Utc::now();
        let mut sessions = self.write();
        match sessions.get_mut(id) {
            Some(session) if self.is_live(session, now) => {
                session.updated_at = now;
                Ok(f(session))
            }
            _ => Err(BookError::SessionNotFound),
        }
    }

    /// Eviction against an explicit clock.
    pub fn evict_expired_at(&self, now: DateTime<Utc>) -> usize {
        if self.ttl.is_none() {
            return 0;
        }
        let mut sessions = self.write();
        let before = sessions.len();
        sessions.retain(|_, session| self.is_live(session, now));
        before - sessions.len()
    }
}

impl SessionStore for MemorySessionStore {
    fn create(&self, dataset: Dataset, filename: &str) -> SessionId {
        let now = Utc::now();
        let mut sessions = self.write();

        let mut id = SessionId::generate();
        while sessions.contains_key(&id) {
            id = SessionId::generate();
        }

        log::info!(
            "created session {id} with {} records from {filename}",
            dataset.len()
        );
        sessions.insert(
            id.clone(),
            Session {
                current: dataset.clone(),
                original: dataset,
                filename: filename.to_string(),
                created_at: now,
                updated_at: now,
            },
        );
        id
    }

    fn get(&self, id: &SessionId) -> Result<Snapshot> {
        self.with_live(id, |session| Snapshot {
            data: session.current.clone(),
            filename: session.filename.clone(),
        })
    }

    fn original(&self, id: &SessionId) -> Result<Dataset> {
        self.with_live(id, |session| session.original.clone())
    }

    fn replace(&self, id: &SessionId, dataset: Dataset) -> Result<()> {
        self.with_live_mut(id, |session| {
            if dataset.len() != session.original.len() {
                log::debug!(
                    "session {id}: working copy has {} rows, original has {}",
                    dataset.len(),
                    session.original.len()
                );
            }
            session.current = dataset;
        })
    }

    fn reset(&self, id: &SessionId) -> Result<Dataset> {
        self.with_live_mut(id, |session| {
            session.current = session.original.clone();
            log::info!("session {id} reset to original");
            session.current.clone()
        })
    }

    fn remove(&self, id: &SessionId) -> Result<()> {
        match self.write().remove(id) {
            Some(_) => {
                log::info!("removed session {id}");
                Ok(())
            }
            None => Err(BookError::SessionNotFound),
        }
    }

    fn len(&self) -> usize {
        self.read().len()
    }

    fn evict_expired(&self) -> usize {
        self.evict_expired_at(Utc::now())
    }
}

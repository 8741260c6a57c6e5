//! Visitor identity
//!
//! Two ids are attached to every report:
//!
//! - session id: lives in session-scoped storage, created on first use
//! - visitor id: lives in persistent storage with an expiry at local
//!   23:59:59 of the day it was issued, so it rolls over once per day
//!
//! Storage is behind [`IdentityStore`]; the browser's own storage areas are
//! external. [`MemoryStore`] is the default.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Local, NaiveTime, TimeZone};

use crate::error::{TrackerError, TrackerResult};
use crate::util::random_mark;

/// Session-scoped key holding the session id
pub const SESSION_KEY: &str = "pagetrace_markUser";

/// Persistent key holding the daily visitor id
pub const VISITOR_KEY: &str = "pagetrace_markUv";

/// Persistent key holding the visitor id expiry, epoch millis
pub const VISITOR_EXPIRY_KEY: &str = "pagetrace_markUvTime";

/// Lifetime of a stored value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreScope {
    Session,
    Persistent,
}

/// Key/value storage for identity marks
pub trait IdentityStore: Send + Sync {
    fn get(&self, scope: StoreScope, key: &str) -> Option<String>;

    fn set(&self, scope: StoreScope, key: &str, value: &str) -> TrackerResult<()>;

    /// Store name (for logging)
    fn name(&self) -> &'static str;
}

/// In-memory identity store
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<(StoreScope, String), String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.read().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl IdentityStore for MemoryStore {
    fn get(&self, scope: StoreScope, key: &str) -> Option<String> {
        self.values
            .read()
            .ok()
            .and_then(|v| v.get(&(scope, key.to_string())).cloned())
    }

    fn set(&self, scope: StoreScope, key: &str, value: &str) -> TrackerResult<()> {
        let mut values = self
            .values
            .write()
            .map_err(|_| TrackerError::Storage("identity store lock poisoned".to_string()))?;
        values.insert((scope, key.to_string()), value.to_string());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Read-or-create access to the session and visitor ids
#[derive(Clone)]
pub struct Identity {
    store: Arc<dyn IdentityStore>,
}

impl Identity {
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn IdentityStore> {
        &self.store
    }

    /// The session id, created on first call
    pub fn session_id(&self) -> String {
        match self.store.get(StoreScope::Session, SESSION_KEY) {
            Some(id) if !id.is_empty() => id,
            _ => {
                let id = random_mark();
                self.persist(StoreScope::Session, SESSION_KEY, &id);
                id
            }
        }
    }

    /// The visitor id for the local calendar day
    pub fn visitor_id(&self) -> String {
        self.visitor_id_at(Local::now())
    }

    /// The visitor id as of `now`. A missing, empty or expired id is
    /// replaced and its expiry set to 23:59:59 of `now`'s day.
    pub fn visitor_id_at<Tz: TimeZone>(&self, now: DateTime<Tz>) -> String {
        let now_millis = now.timestamp_millis();
        let stored = self.store.get(StoreScope::Persistent, VISITOR_KEY);
        let expiry = self
            .store
            .get(StoreScope::Persistent, VISITOR_EXPIRY_KEY)
            .and_then(|v| v.parse::<i64>().ok());

        if let (Some(id), Some(expiry)) = (stored, expiry) {
            if !id.is_empty() && now_millis <= expiry {
                return id;
            }
        }

        let id = random_mark();
        let expiry = end_of_day(&now).unwrap_or(now_millis);
        self.persist(StoreScope::Persistent, VISITOR_KEY, &id);
        self.persist(StoreScope::Persistent, VISITOR_EXPIRY_KEY, &expiry.to_string());
        id
    }

    fn persist(&self, scope: StoreScope, key: &str, value: &str) {
        if let Err(e) = self.store.set(scope, key, value) {
            tracing::warn!(store = self.store.name(), key, "failed to persist identity: {}", e);
        }
    }
}

/// 23:59:59 of `now`'s local day, epoch millis
fn end_of_day<Tz: TimeZone>(now: &DateTime<Tz>) -> Option<i64> {
    let last_second = NaiveTime::from_hms_opt(23, 59, 59)?;
    let naive = now.date_naive().and_time(last_second);
    now.timezone()
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_session_id_is_stable() {
        let identity = Identity::new(Arc::new(MemoryStore::new()));
        let first = identity.session_id();
        assert_eq!(identity.session_id(), first);
        assert!(first.len() > 10);
    }

    #[test]
    fn test_end_of_day() {
        let now = Utc.with_ymd_and_hms(2024, 6, 10, 8, 30, 0).unwrap();
        let expected = Utc.with_ymd_and_hms(2024, 6, 10, 23, 59, 59).unwrap();
        assert_eq!(end_of_day(&now), Some(expected.timestamp_millis()));
    }
}

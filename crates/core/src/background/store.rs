use super::services::PermissionStore;
use crate::error::StoreError;
use crate::types::DAppSession;
use async_trait::async_trait;
use std::cell::RefCell;
use std::collections::BTreeMap;

/// Permission store kept in memory. Serves tests and contexts without
/// persistent storage; [`MemoryPermissionStore::to_json`] and
/// [`MemoryPermissionStore::from_json`] let callers snapshot it.
#[derive(Debug, Default)]
pub struct MemoryPermissionStore {
    sessions: RefCell<BTreeMap<String, DAppSession>>,
}

impl MemoryPermissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(self, origin: impl Into<String>, session: DAppSession) -> Self {
        self.sessions.borrow_mut().insert(origin.into(), session);
        self
    }

    pub fn len(&self) -> usize {
        self.sessions.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.borrow().is_empty()
    }

    pub fn to_json(&self) -> Result<String, StoreError> {
        serde_json::to_string(&*self.sessions.borrow())
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        let sessions: BTreeMap<String, DAppSession> =
            serde_json::from_str(json).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        Ok(Self {
            sessions: RefCell::new(sessions),
        })
    }
}

#[async_trait(?Send)]
impl PermissionStore for MemoryPermissionStore {
    async fn get(&self, origin: &str) -> Result<Option<DAppSession>, StoreError> {
        Ok(self.sessions.borrow().get(origin).cloned())
    }

    async fn set(&self, origin: &str, session: DAppSession) -> Result<(), StoreError> {
        self.sessions.borrow_mut().insert(origin.to_string(), session);
        Ok(())
    }

    async fn remove(&self, origins: &[String]) -> Result<(), StoreError> {
        let mut sessions = self.sessions.borrow_mut();
        for origin in origins {
            sessions.remove(origin);
        }
        Ok(())
    }

    async fn all(&self) -> Result<Vec<(String, DAppSession)>, StoreError> {
        Ok(self
            .sessions
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

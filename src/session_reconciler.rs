//! The "currently authenticated admin" derived from the admin collection.
//!
//! The session is a state machine over [`SessionState`]:
//!
//! - `login` moves Anonymous → Authenticated and persists the admin record.
//! - `reconcile` runs on every admin collection change and re-binds the
//!   session to the refreshed record with the same username, so permission
//!   and profile edits made elsewhere show up without a new login.
//! - `logout` moves back to Anonymous and deletes the persisted blob.
//!
//! At start-up `restore` optimistically rebuilds the session from the blob
//! store; the first admin update then reconciles it.
//!
//! Blob store failures are logged and never undo an in-memory transition.

use log::{debug, info, warn};

use crate::app_response::AppResponse;
use crate::collection_kind::CollectionKind;
use crate::session_store::SessionStore;
use crate::sync_config::MissingIdentityPolicy;
use crate::sync_model::{find_by_identity, Record};

#[derive(Debug, Clone, PartialEq, Default)]
pub enum SessionState {
    #[default]
    Anonymous,
    Authenticated(Record),
}

pub struct SessionReconciler {
    state: SessionState,
    store: Box<dyn SessionStore>,
    key: String,
    policy: MissingIdentityPolicy,
}

impl SessionReconciler {
    pub fn new(store: Box<dyn SessionStore>, key: impl Into<String>, policy: MissingIdentityPolicy) -> Self {
        Self {
            state: SessionState::Anonymous,
            store,
            key: key.into(),
            policy,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn current(&self) -> Option<&Record> {
        match &self.state {
            SessionState::Authenticated(admin) => Some(admin),
            SessionState::Anonymous => None,
        }
    }

    /// Loads a previously persisted session. Returns whether one was restored.
    pub fn restore(&mut self) -> bool {
        let blob = match self.store.get(&self.key) {
            Ok(Some(blob)) => blob,
            Ok(None) => return false,
            Err(e) => {
                warn!("Could not read persisted session: {e}");
                return false;
            }
        };

        match serde_json::from_slice::<Record>(&blob) {
            Ok(admin) if admin.identity(CollectionKind::Admins).is_some() => {
                info!("Restored persisted admin session");
                self.state = SessionState::Authenticated(admin);
                true
            }
            Ok(_) => {
                warn!("Persisted session has no username; ignoring it");
                false
            }
            Err(e) => {
                warn!("Persisted session is not valid JSON: {e}");
                false
            }
        }
    }

    pub fn login(&mut self, admin: Record) -> Result<(), AppResponse> {
        if admin.identity(CollectionKind::Admins).is_none() {
            return Err(AppResponse::ValidationError(
                "admin record has no username".to_string(),
            ));
        }
        self.persist(&admin);
        self.state = SessionState::Authenticated(admin);
        Ok(())
    }

    pub fn logout(&mut self) {
        self.state = SessionState::Anonymous;
        if let Err(e) = self.store.delete(&self.key) {
            warn!("Could not delete persisted session: {e}");
        }
    }

    /// Re-binds the session to its refreshed record in `admins`.
    pub fn reconcile(&mut self, admins: &[Record]) {
        let Some(identity) = self
            .current()
            .and_then(|admin| admin.identity(CollectionKind::Admins))
            .cloned()
        else {
            return;
        };

        match find_by_identity(admins, CollectionKind::Admins, &identity) {
            Some(refreshed) => {
                let refreshed = refreshed.clone();
                self.persist(&refreshed);
                self.state = SessionState::Authenticated(refreshed);
            }
            None => match self.policy {
                MissingIdentityPolicy::KeepLastKnown => {
                    debug!("Session admin {identity} no longer listed; keeping last-known record");
                }
                MissingIdentityPolicy::ForceLogout => {
                    info!("Session admin {identity} no longer listed; logging out");
                    self.logout();
                }
            },
        }
    }

    fn persist(&self, admin: &Record) {
        let blob = match serde_json::to_vec(admin) {
            Ok(blob) => blob,
            Err(e) => {
                warn!("Could not serialize session: {e}");
                return;
            }
        };
        if let Err(e) = self.store.set(&self.key, &blob) {
            warn!("Could not persist session: {e}");
        }
    }
}

//! Runtime configuration for the sync core.
//!
//! The host hands the configuration over as JSON (the same shape it uses for
//! every other call across the C ABI). Every field has a default, so an empty
//! object `{}` is a valid configuration that keeps the session in memory.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::app_response::AppResponse;

/// Key under which the serialized admin session is kept in the session store.
pub const DEFAULT_SESSION_KEY: &str = "admin_session";

/// Default LMDB map size for the session store (10 MiB).
pub const DEFAULT_LMDB_MAP_SIZE: usize = 10 * 1024 * 1024;

/// What the session reconciler does when the logged-in admin disappears from
/// a refreshed admin collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MissingIdentityPolicy {
    /// Keep the last-known admin record bound to the session.
    #[default]
    KeepLastKnown,
    /// Clear the session and delete the persisted blob.
    ForceLogout,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Base name of the LMDB session store (`<name>.lmdb`). `None` keeps the
    /// session in process memory only.
    pub session_db_path: Option<String>,
    pub session_key: String,
    pub lmdb_map_size: usize,
    pub missing_identity_policy: MissingIdentityPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            session_db_path: None,
            session_key: DEFAULT_SESSION_KEY.to_string(),
            lmdb_map_size: DEFAULT_LMDB_MAP_SIZE,
            missing_identity_policy: MissingIdentityPolicy::default(),
        }
    }
}

impl SyncConfig {
    pub fn from_json(json: &str) -> Result<Self, AppResponse> {
        let trimmed = json.trim();
        if trimmed.is_empty() {
            return Ok(Self::default());
        }
        let config: SyncConfig = serde_json::from_str(trimmed)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, AppResponse> {
        let contents = fs::read_to_string(path).map_err(|e| {
            AppResponse::BadRequest(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_json(&contents)
    }

    fn validate(&self) -> Result<(), AppResponse> {
        if self.session_key.is_empty() {
            return Err(AppResponse::ValidationError(
                "session_key cannot be empty".to_string(),
            ));
        }
        if self.lmdb_map_size == 0 {
            return Err(AppResponse::ValidationError(
                "lmdb_map_size must be greater than zero".to_string(),
            ));
        }
        if let Some(path) = &self.session_db_path {
            if path.trim().is_empty() {
                return Err(AppResponse::ValidationError(
                    "session_db_path cannot be blank".to_string(),
                ));
            }
        }
        Ok(())
    }
}

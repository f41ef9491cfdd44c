//! Durable blob storage for the admin session.
//!
//! The session survives process restarts through [`LmdbSessionStore`]; hosts
//! without a writable directory fall back to [`MemorySessionStore`].

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use lmdb::{Database, Environment, Error as LmdbError, Transaction, WriteFlags};
use log::info;

use crate::app_response::AppResponse;
use crate::sync_config::SyncConfig;

pub trait SessionStore: Send {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AppResponse>;
    fn set(&self, key: &str, blob: &[u8]) -> Result<(), AppResponse>;
    /// Returns `false` when nothing was stored under `key`.
    fn delete(&self, key: &str) -> Result<bool, AppResponse>;
}

/// Opens the session store selected by the configuration.
pub fn open_session_store(config: &SyncConfig) -> Result<Box<dyn SessionStore>, AppResponse> {
    match &config.session_db_path {
        Some(name) => Ok(Box::new(LmdbSessionStore::init(name, config.lmdb_map_size)?)),
        None => Ok(Box::new(MemorySessionStore::new())),
    }
}

pub struct LmdbSessionStore {
    env: Environment,
    db: Database,
    path: PathBuf,
}

impl LmdbSessionStore {
    /// Opens (creating if needed) the environment directory `<name>.lmdb`.
    pub fn init(name: &str, map_size: usize) -> Result<Self, AppResponse> {
        let path = PathBuf::from(format!("{name}.lmdb"));
        if !path.exists() {
            info!("Creating session store at: {}", path.display());
            fs::create_dir_all(&path)?;
        }

        let env = Environment::new().set_map_size(map_size).open(&path)?;
        let db = env.open_db(None)?;

        Ok(Self { env, db, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for LmdbSessionStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AppResponse> {
        let txn = self.env.begin_ro_txn()?;
        let blob = match txn.get(self.db, &key) {
            Ok(bytes) => Some(bytes.to_vec()),
            Err(LmdbError::NotFound) => None,
            Err(e) => return Err(e.into()),
        };
        txn.abort();
        Ok(blob)
    }

    fn set(&self, key: &str, blob: &[u8]) -> Result<(), AppResponse> {
        let mut txn = self.env.begin_rw_txn()?;
        txn.put(self.db, &key, &blob, WriteFlags::empty())?;
        txn.commit()?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, AppResponse> {
        let mut txn = self.env.begin_rw_txn()?;
        match txn.del(self.db, &key, None) {
            Ok(()) => {
                txn.commit()?;
                Ok(true)
            }
            Err(LmdbError::NotFound) => {
                txn.abort();
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local store. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    blobs: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AppResponse> {
        let blobs = self.blobs.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(blobs.get(key).cloned())
    }

    fn set(&self, key: &str, blob: &[u8]) -> Result<(), AppResponse> {
        let mut blobs = self.blobs.lock().unwrap_or_else(PoisonError::into_inner);
        blobs.insert(key.to_string(), blob.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, AppResponse> {
        let mut blobs = self.blobs.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(blobs.remove(key).is_some())
    }
}

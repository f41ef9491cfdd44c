//! The sync engine: collection mirrors, app config, admin session and the
//! publish path, behind one handle.
//!
//! Every mirror mutation (remote update or local publish) runs under a single
//! mutation lock, so two updates never interleave on the same collection.
//! Remote writes are queued on the [`StoreWriter`] and never block the caller.
//!
//! Readers are notified after the lock is released, in revision order, and
//! only once the session has been reconciled against the new snapshot. A
//! reader may publish from its callback: the resulting notification is queued
//! and delivered by the thread already notifying.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::thread;

use log::{debug, info, warn};
use serde_json::Value as JsonValue;

use crate::app_response::AppResponse;
use crate::collection_kind::{CollectionKind, APP_SETTINGS};
use crate::collection_mirror::{CollectionMirror, CollectionSnapshot, ListenerId, MirrorListener};
use crate::normalizer::normalize_raw;
use crate::remote_store::{RemoteStore, StoreWriter};
use crate::seeding::seed_for;
use crate::session_reconciler::{SessionReconciler, SessionState};
use crate::session_store::{open_session_store, SessionStore};
use crate::sync_config::SyncConfig;
use crate::sync_model::{AdminPermission, AdminProfile, AppConfig, Record};

pub struct AppSyncState {
    mirrors: Vec<CollectionMirror>,
    app_config: RwLock<Arc<AppConfig>>,
    session: Mutex<SessionReconciler>,
    mutations: Mutex<()>,
    notifications: Mutex<PendingNotifications>,
    writer: StoreWriter,
}

/// Snapshots stored but not yet delivered to their readers.
///
/// Pushed under the mutation lock, so the queue is in revision order.
#[derive(Default)]
struct PendingNotifications {
    queue: VecDeque<Arc<CollectionSnapshot>>,
    delivering: bool,
}

/// Clears the delivering flag if a listener panics mid-delivery.
struct DeliveryReset<'a>(&'a Mutex<PendingNotifications>);

impl Drop for DeliveryReset<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.lock().unwrap_or_else(PoisonError::into_inner).delivering = false;
        }
    }
}

impl AppSyncState {
    /// Builds the engine with the session store selected by `config` and
    /// optimistically restores a persisted session.
    pub fn init(config: SyncConfig, remote: Arc<dyn RemoteStore>) -> Result<Self, AppResponse> {
        let store = open_session_store(&config)?;
        Self::with_session_store(config, remote, store)
    }

    pub fn with_session_store(
        config: SyncConfig,
        remote: Arc<dyn RemoteStore>,
        store: Box<dyn SessionStore>,
    ) -> Result<Self, AppResponse> {
        let mut session = SessionReconciler::new(
            store,
            config.session_key,
            config.missing_identity_policy,
        );
        session.restore();

        Ok(Self {
            mirrors: CollectionKind::ALL.into_iter().map(CollectionMirror::new).collect(),
            app_config: RwLock::new(Arc::new(AppConfig::default())),
            session: Mutex::new(session),
            mutations: Mutex::new(()),
            notifications: Mutex::new(PendingNotifications::default()),
            writer: StoreWriter::spawn(remote)?,
        })
    }

    /// Builds the engine and subscribes it to every collection of `remote`.
    pub fn connect(config: SyncConfig, remote: Arc<dyn RemoteStore>) -> Result<Arc<Self>, AppResponse> {
        let state = Arc::new(Self::init(config, remote.clone())?);
        state.attach(remote.as_ref());
        Ok(state)
    }

    /// Subscribes to all mirrored collections and the app config.
    ///
    /// Callbacks hold a weak handle, so the store never keeps the engine alive.
    pub fn attach(self: &Arc<Self>, remote: &dyn RemoteStore) {
        let names = CollectionKind::ALL
            .into_iter()
            .map(CollectionKind::wire_name)
            .chain(std::iter::once(APP_SETTINGS));
        for name in names {
            let weak: Weak<Self> = Arc::downgrade(self);
            remote.subscribe(
                name,
                Arc::new(move |raw: Option<JsonValue>| {
                    if let Some(state) = weak.upgrade() {
                        state.apply_remote_update(name, raw);
                    }
                }),
            );
        }
        info!("Subscribed to {} remote documents", CollectionKind::ALL.len() + 1);
    }

    /// Entry point for subscription callbacks. Unknown names are ignored.
    pub fn apply_remote_update(&self, collection: &str, raw: Option<JsonValue>) {
        if collection == APP_SETTINGS {
            self.apply_app_config_update(raw);
            return;
        }
        match CollectionKind::from_wire_name(collection) {
            Some(kind) => self.apply_collection_update(kind, raw),
            None => warn!("Ignoring update for unknown collection '{collection}'"),
        }
    }

    pub fn apply_collection_update(&self, kind: CollectionKind, raw: Option<JsonValue>) {
        {
            let _guard = self.lock_mutations();
            let mirror = self.mirror(kind);
            if kind != CollectionKind::Admins {
                let snapshot = mirror.on_update(raw);
                self.queue_notification(snapshot);
            } else {
                let admins = normalize_raw(kind, raw);
                match seed_for(kind, &admins) {
                    Some(seed) => {
                        self.publish_locked(kind, seed);
                    }
                    None => {
                        let snapshot = mirror.replace(admins);
                        self.lock_session().reconcile(&snapshot.records);
                        self.queue_notification(snapshot);
                    }
                }
            }
        }
        self.deliver_notifications();
    }

    pub fn apply_app_config_update(&self, raw: Option<JsonValue>) {
        let Some(update) = raw else {
            return;
        };
        if !update.is_object() {
            warn!("Ignoring malformed app settings document");
            return;
        }
        let _guard = self.lock_mutations();
        self.merge_app_config(&update);
    }

    fn mirror(&self, kind: CollectionKind) -> &CollectionMirror {
        &self.mirrors[kind.index()]
    }

    /// Registers a reader of `kind`.
    ///
    /// The listener runs after every replacement, once the session reflects
    /// the new snapshot. It may call back into the engine, including
    /// [`AppSyncState::publish`].
    pub fn subscribe(&self, kind: CollectionKind, listener: MirrorListener) -> ListenerId {
        self.mirror(kind).subscribe(listener)
    }

    pub fn unsubscribe(&self, kind: CollectionKind, id: ListenerId) -> bool {
        self.mirror(kind).unsubscribe(id)
    }

    pub fn current(&self, kind: CollectionKind) -> Arc<CollectionSnapshot> {
        self.mirror(kind).current()
    }

    pub fn records(&self, kind: CollectionKind) -> Vec<Record> {
        self.current(kind).records.clone()
    }

    /// Whether the user collection has been received at least once.
    pub fn is_ready(&self) -> bool {
        self.current(CollectionKind::Users).revision > 0
    }

    /// Replaces a whole collection.
    ///
    /// The mirror holds `records` before this returns; the remote save is
    /// queued. Publishing admins re-binds the session right away instead of
    /// waiting for the store echo.
    pub fn publish(&self, kind: CollectionKind, records: Vec<Record>) -> Arc<CollectionSnapshot> {
        let snapshot = {
            let _guard = self.lock_mutations();
            self.publish_locked(kind, records)
        };
        self.deliver_notifications();
        snapshot
    }

    pub fn publish_named(
        &self,
        collection: &str,
        records: Vec<Record>,
    ) -> Result<Arc<CollectionSnapshot>, AppResponse> {
        let kind = CollectionKind::from_wire_name(collection).ok_or_else(|| {
            AppResponse::BadRequest(format!("Unknown collection: {collection}"))
        })?;
        Ok(self.publish(kind, records))
    }

    fn publish_locked(&self, kind: CollectionKind, records: Vec<Record>) -> Arc<CollectionSnapshot> {
        let snapshot = self.mirror(kind).replace(records);
        let document = JsonValue::Array(
            snapshot
                .records
                .iter()
                .map(|record| record.as_value().clone())
                .collect(),
        );
        self.writer.save_all(kind.wire_name(), document);

        if kind == CollectionKind::Admins {
            self.lock_session().reconcile(&snapshot.records);
        }
        debug!("Published {} records to '{}'", snapshot.len(), kind);
        self.queue_notification(snapshot.clone());
        snapshot
    }

    fn queue_notification(&self, snapshot: Arc<CollectionSnapshot>) {
        self.lock_notifications().queue.push_back(snapshot);
    }

    /// Delivers queued snapshots until the queue is empty.
    ///
    /// Must be called without the mutation lock. Returns at once when another
    /// call (on this thread or another) is already delivering; that call
    /// picks up whatever was queued.
    fn deliver_notifications(&self) {
        {
            let mut pending = self.lock_notifications();
            if pending.delivering {
                return;
            }
            pending.delivering = true;
        }
        let _reset = DeliveryReset(&self.notifications);
        loop {
            let snapshot = {
                let mut pending = self.lock_notifications();
                match pending.queue.pop_front() {
                    Some(snapshot) => snapshot,
                    None => {
                        pending.delivering = false;
                        return;
                    }
                }
            };
            self.mirror(snapshot.kind).notify(&snapshot);
        }
    }

    pub fn app_config(&self) -> Arc<AppConfig> {
        self.app_config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Merges `update` into the config and saves the merged document upstream.
    pub fn publish_app_config(&self, update: &JsonValue) -> Result<Arc<AppConfig>, AppResponse> {
        if !update.is_object() {
            return Err(AppResponse::BadRequest(
                "App settings update must be a JSON object".to_string(),
            ));
        }
        let _guard = self.lock_mutations();
        let merged = self.merge_app_config(update);
        self.writer.save_all(APP_SETTINGS, merged.to_value()?);
        Ok(merged)
    }

    fn merge_app_config(&self, update: &JsonValue) -> Arc<AppConfig> {
        let mut held = self.app_config.write().unwrap_or_else(PoisonError::into_inner);
        let merged = Arc::new(held.merged(update));
        *held = merged.clone();
        merged
    }

    pub fn login(&self, admin: Record) -> Result<(), AppResponse> {
        self.lock_session().login(admin)
    }

    /// Logs in the admin whose username and password match.
    pub fn authenticate(&self, username: &str, password: &str) -> Option<Record> {
        let admins = self.current(CollectionKind::Admins);
        let admin = admins.records.iter().find(|admin| {
            admin.field("username").and_then(JsonValue::as_str) == Some(username)
                && admin.field("password").and_then(JsonValue::as_str) == Some(password)
        })?;

        match self.login(admin.clone()) {
            Ok(()) => Some(admin.clone()),
            Err(e) => {
                warn!("Login for '{username}' failed: {e}");
                None
            }
        }
    }

    pub fn logout(&self) {
        self.lock_session().logout();
    }

    pub fn current_session(&self) -> Option<Record> {
        self.lock_session().current().cloned()
    }

    pub fn session_state(&self) -> SessionState {
        self.lock_session().state().clone()
    }

    /// Whether the logged-in admin holds `permission`. Super admins hold all.
    pub fn session_has_permission(&self, permission: AdminPermission) -> bool {
        let Some(admin) = self.current_session() else {
            return false;
        };
        match AdminProfile::try_from(&admin) {
            Ok(profile) => profile.has_permission(permission),
            Err(e) => {
                warn!("Session record is not a valid admin profile: {e}");
                false
            }
        }
    }

    /// Blocks until every queued remote save has been attempted.
    pub fn flush(&self) {
        self.writer.flush();
    }

    fn lock_mutations(&self) -> MutexGuard<'_, ()> {
        self.mutations.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_session(&self) -> MutexGuard<'_, SessionReconciler> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_notifications(&self) -> MutexGuard<'_, PendingNotifications> {
        self.notifications.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

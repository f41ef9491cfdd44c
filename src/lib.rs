//! # Gym Sync Core
//!
//! State synchronization core of the gym membership admin console. It keeps
//! the console's collections (admins, users, bookings, transactions,
//! promotions, vouchers, trainers, packages, PT packages) live-mirrored from a
//! real-time remote store, normalizes whatever shape the store hands back,
//! seeds the bootstrap admin, and keeps the logged-in admin session consistent
//! with the admin collection across edits and process restarts.
//!
//! ## Features
//!
//! - **Shape-tolerant mirrors**: array, keyed-map and missing documents all
//!   normalize to one ordered record sequence, with user defaults backfilled
//! - **Immediate local writes**: `publish` updates the mirror synchronously and
//!   ships the whole collection upstream from a background writer
//! - **Live session**: permission or profile edits to the logged-in admin show
//!   up without a new login
//! - **Durable session**: the session blob lives in LMDB and is restored at start-up
//! - **Safe error handling**: No `unwrap()` calls in production code
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use gym_sync_core::collection_kind::CollectionKind;
//! use gym_sync_core::remote_store::InMemoryRemoteStore;
//! use gym_sync_core::sync_config::SyncConfig;
//! use gym_sync_core::sync_state::AppSyncState;
//!
//! let remote = Arc::new(InMemoryRemoteStore::new());
//! let state = AppSyncState::connect(SyncConfig::default(), remote)?;
//!
//! // The empty admin collection has been seeded with the bootstrap admin.
//! assert_eq!(state.current(CollectionKind::Admins).len(), 1);
//! assert!(state.authenticate("admin", "123456").is_some());
//! # Ok::<(), gym_sync_core::app_response::AppResponse>(())
//! ```
//!
//! ## FFI Functions
//!
//! Hosts that own the remote store connection (Flutter, a JS bridge) drive the
//! core through C-compatible functions. Every response is a JSON-serialized
//! [`AppResponse`] that must be released with [`free_response`]:
//!
//! - [`create_sync_core`] - Initialize the core with a JSON config and a save callback
//!   (invoked from a background thread)
//! - [`apply_remote_update`] - Feed a subscription callback into the mirrors
//! - [`get_collection`] / [`publish_collection`] - Read or replace a collection
//! - [`get_app_config`] / [`publish_app_config`] - Read or merge the app config
//! - [`login_admin`] / [`authenticate_admin`] / [`logout_admin`] / [`current_session`] - Session control
//! - [`session_has_permission`] - Permission check for the logged-in admin
//! - [`is_sync_ready`] - Whether the user collection has arrived
//! - [`close_sync_core`] - Release the core

pub mod app_response;
pub mod collection_kind;
pub mod collection_mirror;
pub mod normalizer;
pub mod remote_store;
pub mod seeding;
pub mod session_reconciler;
pub mod session_store;
pub mod sync_config;
pub mod sync_model;
pub mod sync_state;
pub mod wire_document;

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::sync::Arc;

use log::{debug, info, warn};
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::app_response::AppResponse;
use crate::remote_store::{RemoteStore, UpdateCallback};
use crate::sync_config::SyncConfig;
use crate::sync_model::{AdminPermission, Record};
use crate::sync_state::AppSyncState;

/// Host function that persists a whole document upstream.
///
/// Called with the collection name and the JSON document; returns `true` when
/// the host accepted the write. Both strings are only valid for the duration
/// of the call.
///
/// # Threading
///
/// The callback runs on the core's `remote-store-writer` thread, never on the
/// thread that called [`publish_collection`] or [`publish_app_config`]. Hosts
/// whose runtime cannot run code on a foreign thread must hand the write off
/// to their own thread. A Dart host does this with `NativeCallable.listener`,
/// whose native function posts to the isolate and returns immediately; that
/// function should copy both strings before returning and report `true`.
pub type SaveCallback = extern "C" fn(collection: *const c_char, document_json: *const c_char) -> bool;

/// Opaque handle returned by [`create_sync_core`].
pub struct SyncHandle {
    state: Arc<AppSyncState>,
}

/// Remote store whose subscriptions live on the host side.
struct HostRemoteStore {
    save: SaveCallback,
}

impl RemoteStore for HostRemoteStore {
    fn subscribe(&self, collection: &str, _callback: UpdateCallback) {
        debug!("Host delivers '{collection}' updates through apply_remote_update");
    }

    fn save_all(&self, collection: &str, document: JsonValue) -> Result<(), AppResponse> {
        let name = CString::new(collection)
            .map_err(|e| AppResponse::BadRequest(format!("Invalid collection name: {e}")))?;
        let json = CString::new(serde_json::to_string(&document)?)
            .map_err(|e| AppResponse::SerializationError(format!("Document contains NUL: {e}")))?;

        if (self.save)(name.as_ptr(), json.as_ptr()) {
            Ok(())
        } else {
            Err(AppResponse::RemoteStoreError(format!(
                "Host rejected save of '{collection}'"
            )))
        }
    }
}

/// Creates a sync core.
///
/// # Parameters
///
/// * `config_json` - JSON [`SyncConfig`]; null or empty selects the defaults
/// * `save_callback` - Host function persisting documents upstream. It is
///   invoked from a background thread; see [`SaveCallback`] for what that
///   requires of the host
///
/// # Returns
///
/// A pointer to the [`SyncHandle`], or null when the configuration is invalid,
/// the callback is missing or the session store cannot be opened.
///
/// # Examples
///
/// ```no_run
/// use std::ffi::CString;
/// use std::os::raw::c_char;
/// use gym_sync_core::create_sync_core;
///
/// extern "C" fn save(_collection: *const c_char, _json: *const c_char) -> bool {
///     true
/// }
///
/// let config = CString::new(r#"{"session_db_path":"admin_session"}"#).unwrap();
/// let handle = create_sync_core(config.as_ptr(), Some(save));
/// assert!(!handle.is_null());
/// ```
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn create_sync_core(
    config_json: *const c_char,
    save_callback: Option<SaveCallback>,
) -> *mut SyncHandle {
    let Some(save) = save_callback else {
        warn!("Null save callback passed to create_sync_core");
        return std::ptr::null_mut();
    };

    let config = if config_json.is_null() {
        SyncConfig::default()
    } else {
        let json = match unsafe { CStr::from_ptr(config_json).to_str() } {
            Ok(s) => s,
            Err(e) => {
                warn!("Invalid UTF-8 in config parameter: {e}");
                return std::ptr::null_mut();
            }
        };
        match SyncConfig::from_json(json) {
            Ok(config) => config,
            Err(e) => {
                warn!("Invalid sync config: {e}");
                return std::ptr::null_mut();
            }
        }
    };

    let remote: Arc<dyn RemoteStore> = Arc::new(HostRemoteStore { save });
    match AppSyncState::init(config, remote) {
        Ok(state) => {
            info!("✅ Sync core initialized");
            Box::into_raw(Box::new(SyncHandle {
                state: Arc::new(state),
            }))
        }
        Err(e) => {
            warn!("❌ Failed to initialize sync core: {e}");
            std::ptr::null_mut()
        }
    }
}

/// Applies a remote document to the matching mirror.
///
/// `json_ptr` may be null to signal an absent document. `collection` is a
/// collection wire name or `app_settings`.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn apply_remote_update(
    handle: *mut SyncHandle,
    collection: *const c_char,
    json_ptr: *const c_char,
) -> *const c_char {
    let handle = match handle_ref(handle, "apply_remote_update") {
        Ok(h) => h,
        Err(err) => return err,
    };
    let collection = match c_ptr_to_string(collection, "collection") {
        Ok(name) => name,
        Err(err) => return err,
    };

    let raw = if json_ptr.is_null() {
        None
    } else {
        let json = match c_ptr_to_string(json_ptr, "JSON") {
            Ok(json) => json,
            Err(err) => return err,
        };
        match serde_json::from_str::<JsonValue>(&json) {
            Ok(value) => Some(value),
            Err(e) => {
                let error = AppResponse::SerializationError(format!("Invalid JSON: {e}"));
                return response_to_c_string(&error);
            }
        }
    };

    handle.state.apply_remote_update(&collection, raw);
    response_to_c_string(&AppResponse::success(format!("Update applied to '{collection}'")))
}

/// Returns the current records of a collection as a JSON array.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn get_collection(handle: *mut SyncHandle, collection: *const c_char) -> *const c_char {
    let handle = match handle_ref(handle, "get_collection") {
        Ok(h) => h,
        Err(err) => return err,
    };
    let collection = match c_ptr_to_string(collection, "collection") {
        Ok(name) => name,
        Err(err) => return err,
    };

    match collection_kind::CollectionKind::from_wire_name(&collection) {
        Some(kind) => ok_json(&handle.state.current(kind).records),
        None => {
            let error = AppResponse::NotFound(format!("Unknown collection: {collection}"));
            response_to_c_string(&error)
        }
    }
}

/// Replaces a whole collection with the given JSON array.
///
/// The mirror is updated before this returns; the upstream save is queued.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn publish_collection(
    handle: *mut SyncHandle,
    collection: *const c_char,
    json_ptr: *const c_char,
) -> *const c_char {
    let handle = match handle_ref(handle, "publish_collection") {
        Ok(h) => h,
        Err(err) => return err,
    };
    let collection = match c_ptr_to_string(collection, "collection") {
        Ok(name) => name,
        Err(err) => return err,
    };
    let json = match c_ptr_to_string(json_ptr, "JSON") {
        Ok(json) => json,
        Err(err) => return err,
    };

    let records: Vec<Record> = match serde_json::from_str(&json) {
        Ok(records) => records,
        Err(e) => {
            let error = AppResponse::SerializationError(format!("Expected a JSON array of records: {e}"));
            return response_to_c_string(&error);
        }
    };

    match handle.state.publish_named(&collection, records) {
        Ok(snapshot) => response_to_c_string(&AppResponse::success(format!(
            "Published {} records to '{}'",
            snapshot.len(),
            collection
        ))),
        Err(e) => response_to_c_string(&e),
    }
}

#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn get_app_config(handle: *mut SyncHandle) -> *const c_char {
    match handle_ref(handle, "get_app_config") {
        Ok(h) => ok_json(h.state.app_config().as_ref()),
        Err(err) => err,
    }
}

/// Merges a partial app config update and saves the result upstream.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn publish_app_config(handle: *mut SyncHandle, json_ptr: *const c_char) -> *const c_char {
    let handle = match handle_ref(handle, "publish_app_config") {
        Ok(h) => h,
        Err(err) => return err,
    };
    let json = match c_ptr_to_string(json_ptr, "JSON") {
        Ok(json) => json,
        Err(err) => return err,
    };
    let update: JsonValue = match serde_json::from_str(&json) {
        Ok(value) => value,
        Err(e) => {
            let error = AppResponse::SerializationError(format!("Invalid JSON: {e}"));
            return response_to_c_string(&error);
        }
    };

    match handle.state.publish_app_config(&update) {
        Ok(config) => ok_json(config.as_ref()),
        Err(e) => response_to_c_string(&e),
    }
}

/// Binds the session to the given admin record (JSON object).
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn login_admin(handle: *mut SyncHandle, json_ptr: *const c_char) -> *const c_char {
    let handle = match handle_ref(handle, "login_admin") {
        Ok(h) => h,
        Err(err) => return err,
    };
    let json = match c_ptr_to_string(json_ptr, "JSON") {
        Ok(json) => json,
        Err(err) => return err,
    };
    let admin: Record = match serde_json::from_str(&json) {
        Ok(admin) => admin,
        Err(e) => {
            let error = AppResponse::SerializationError(format!("Invalid JSON: {e}"));
            return response_to_c_string(&error);
        }
    };

    match handle.state.login(admin) {
        Ok(()) => response_to_c_string(&AppResponse::success("Admin logged in")),
        Err(e) => response_to_c_string(&e),
    }
}

/// Logs in by username and password against the mirrored admin collection.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn authenticate_admin(
    handle: *mut SyncHandle,
    username: *const c_char,
    password: *const c_char,
) -> *const c_char {
    let handle = match handle_ref(handle, "authenticate_admin") {
        Ok(h) => h,
        Err(err) => return err,
    };
    let username = match c_ptr_to_string(username, "username") {
        Ok(s) => s,
        Err(err) => return err,
    };
    let password = match c_ptr_to_string(password, "password") {
        Ok(s) => s,
        Err(err) => return err,
    };

    match handle.state.authenticate(&username, &password) {
        Some(admin) => ok_json(&admin),
        None => response_to_c_string(&AppResponse::NotFound(
            "Invalid username or password".to_string(),
        )),
    }
}

#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn logout_admin(handle: *mut SyncHandle) -> *const c_char {
    match handle_ref(handle, "logout_admin") {
        Ok(h) => {
            h.state.logout();
            response_to_c_string(&AppResponse::success("Admin logged out"))
        }
        Err(err) => err,
    }
}

/// Returns the logged-in admin record, or `NotFound` when anonymous.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn current_session(handle: *mut SyncHandle) -> *const c_char {
    let handle = match handle_ref(handle, "current_session") {
        Ok(h) => h,
        Err(err) => return err,
    };
    match handle.state.current_session() {
        Some(admin) => ok_json(&admin),
        None => response_to_c_string(&AppResponse::NotFound("No active session".to_string())),
    }
}

/// Whether the logged-in admin holds the named permission (e.g. `"create_qr"`).
///
/// Returns `false` when anonymous, for unknown permission names and for null
/// arguments.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn session_has_permission(handle: *mut SyncHandle, permission: *const c_char) -> bool {
    let Some(handle) = (unsafe { handle.as_ref() }) else {
        return false;
    };
    if permission.is_null() {
        return false;
    }
    let name = match unsafe { CStr::from_ptr(permission).to_str() } {
        Ok(s) => s,
        Err(e) => {
            warn!("Invalid UTF-8 in permission parameter: {e}");
            return false;
        }
    };
    match serde_json::from_value::<AdminPermission>(JsonValue::String(name.to_string())) {
        Ok(permission) => handle.state.session_has_permission(permission),
        Err(_) => {
            warn!("Unknown admin permission '{name}'");
            false
        }
    }
}

#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn is_sync_ready(handle: *mut SyncHandle) -> bool {
    match unsafe { handle.as_ref() } {
        Some(h) => h.state.is_ready(),
        None => false,
    }
}

/// Releases the core. Queued upstream saves are drained first.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn close_sync_core(handle: *mut SyncHandle) -> *const c_char {
    if handle.is_null() {
        let error = AppResponse::BadRequest("Null handle passed to close_sync_core".to_string());
        return response_to_c_string(&error);
    }

    let handle = unsafe { Box::from_raw(handle) };
    handle.state.flush();
    drop(handle);
    response_to_c_string(&AppResponse::success("Sync core closed"))
}

/// Frees a response string returned by any function of this library.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn free_response(ptr: *const c_char) {
    if ptr.is_null() {
        return;
    }
    unsafe {
        drop(CString::from_raw(ptr as *mut c_char));
    }
}

fn handle_ref<'a>(handle: *mut SyncHandle, caller: &str) -> Result<&'a SyncHandle, *const c_char> {
    match unsafe { handle.as_ref() } {
        Some(h) => Ok(h),
        None => {
            let error = AppResponse::BadRequest(format!("Null handle passed to {caller}"));
            Err(response_to_c_string(&error))
        }
    }
}

fn ok_json<T: Serialize + ?Sized>(value: &T) -> *const c_char {
    match serde_json::to_string(value) {
        Ok(json) => response_to_c_string(&AppResponse::Ok(json)),
        Err(e) => {
            let error = AppResponse::SerializationError(format!("Error serializing result: {e}"));
            response_to_c_string(&error)
        }
    }
}

/// Converts an [`AppResponse`] to a C string owned by the caller.
///
/// Returns null if serialization or C string creation fails.
fn response_to_c_string(response: &AppResponse) -> *const c_char {
    let json = match serde_json::to_string(response) {
        Ok(j) => j,
        Err(e) => {
            warn!("Error serializing response: {e}");
            return std::ptr::null();
        }
    };

    match CString::new(json) {
        Ok(c_str) => c_str.into_raw(),
        Err(e) => {
            warn!("Error creating CString: {e}");
            std::ptr::null()
        }
    }
}

/// Converts a C string pointer to a Rust String.
///
/// On failure the `Err` holds a ready-to-return error response.
fn c_ptr_to_string(ptr: *const c_char, field_name: &str) -> Result<String, *const c_char> {
    if ptr.is_null() {
        let error = AppResponse::BadRequest(format!("Null {field_name} pointer"));
        return Err(response_to_c_string(&error));
    }

    match unsafe { CStr::from_ptr(ptr).to_str() } {
        Ok(s) => Ok(s.to_string()),
        Err(e) => {
            let error = AppResponse::BadRequest(format!("Invalid UTF-8 in {field_name}: {e}"));
            Err(response_to_c_string(&error))
        }
    }
}

//! Data model definitions for mirrored records.
//!
//! Records arrive from the remote store as loosely-shaped JSON. The core does
//! not validate them: a [`Record`] wraps whatever JSON value the store held,
//! after normalization has backfilled the optional fields it knows about.
//!
//! Two shapes are modelled with concrete types because the core itself
//! produces or interprets them:
//!
//! - [`AdminProfile`]: the seeded bootstrap admin, and the typed view of the
//!   logged-in session used for permission checks.
//! - [`AppConfig`]: the singleton holding the public app's hero texts and
//!   media references.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::app_response::AppResponse;
use crate::collection_kind::CollectionKind;

/// A single record of a mirrored collection.
///
/// `Record` is a transparent wrapper around [`JsonValue`]: it serializes to
/// exactly the JSON it was built from, so the sequence handed to the remote
/// store is the sequence the readers see.
///
/// # Identity
///
/// Every collection names one identity field (see
/// [`CollectionKind::identity_field`]). Lookups and session reconciliation
/// compare that field by JSON equality.
///
/// ```rust
/// use gym_sync_core::collection_kind::CollectionKind;
/// use gym_sync_core::sync_model::Record;
/// use serde_json::json;
///
/// let admin = Record::new(json!({"username": "admin", "role": "super_admin"}));
/// assert_eq!(admin.identity(CollectionKind::Admins), Some(&json!("admin")));
/// assert_eq!(admin.identity(CollectionKind::Users), None);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(JsonValue);

impl Record {
    pub fn new(value: JsonValue) -> Self {
        Record(value)
    }

    pub fn as_value(&self) -> &JsonValue {
        &self.0
    }

    /// Returns the named field when the record is a JSON object holding it.
    pub fn field(&self, name: &str) -> Option<&JsonValue> {
        self.0.as_object().and_then(|object| object.get(name))
    }

    /// Value of the identity field for the given collection, if present.
    pub fn identity(&self, kind: CollectionKind) -> Option<&JsonValue> {
        self.field(kind.identity_field())
            .filter(|value| !value.is_null())
    }

    pub(crate) fn as_object_mut(&mut self) -> Option<&mut Map<String, JsonValue>> {
        self.0.as_object_mut()
    }
}

impl From<JsonValue> for Record {
    fn from(value: JsonValue) -> Self {
        Record(value)
    }
}

/// Finds the record whose identity field equals `identity`.
pub fn find_by_identity<'a>(
    records: &'a [Record],
    kind: CollectionKind,
    identity: &JsonValue,
) -> Option<&'a Record> {
    records
        .iter()
        .find(|record| record.identity(kind) == Some(identity))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminRole {
    SuperAdmin,
    SubAdmin,
}

/// Dashboard capabilities that can be granted to a sub-admin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminPermission {
    ViewUsers,
    ApproveUsers,
    ViewRevenue,
    ViewRevenueDetails,
    SendNotification,
    EditUserSettings,
    ManageUser,
    ChatUser,
    ManagePackages,
    ManagePtPackages,
    AddPt,
    ViewUserList,
    ManagePromo,
    ManageVoucher,
    ViewSchedule,
    ManageAppInterface,
    ManageBookings,
    CreateQr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminSettings {
    pub show_floating_menu: bool,
    pub show_popup_noti: bool,
}

impl Default for AdminSettings {
    fn default() -> Self {
        Self {
            show_floating_menu: true,
            show_popup_noti: true,
        }
    }
}

/// Typed view of an admin record.
///
/// Admin records are stored in the mirror as plain [`Record`]s; this type is
/// what the core builds when it has to synthesize one (the bootstrap admin)
/// and what callers can parse the current session into.
///
/// # Examples
///
/// ```rust
/// use gym_sync_core::sync_model::{AdminProfile, AdminRole};
///
/// let admin = AdminProfile::bootstrap();
/// assert_eq!(admin.username, "admin");
/// assert_eq!(admin.role, AdminRole::SuperAdmin);
/// assert!(admin.permissions.is_empty());
///
/// let record = admin.to_record()?;
/// let parsed = AdminProfile::try_from(&record)?;
/// assert_eq!(parsed, admin);
/// # Ok::<(), gym_sync_core::app_response::AppResponse>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminProfile {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub face_data: Option<String>,
    pub role: AdminRole,
    pub name: String,
    #[serde(default)]
    pub permissions: Vec<AdminPermission>,
    #[serde(default)]
    pub settings: AdminSettings,
}

impl AdminProfile {
    /// The well-known super admin written when the admin collection is empty.
    pub fn bootstrap() -> Self {
        Self {
            username: "admin".to_string(),
            password: Some("123456".to_string()),
            phone: Some("0909000000".to_string()),
            avatar: None,
            face_data: None,
            role: AdminRole::SuperAdmin,
            name: "Super Admin".to_string(),
            permissions: Vec::new(),
            settings: AdminSettings::default(),
        }
    }

    pub fn has_permission(&self, permission: AdminPermission) -> bool {
        self.role == AdminRole::SuperAdmin || self.permissions.contains(&permission)
    }

    pub fn to_record(&self) -> Result<Record, AppResponse> {
        Ok(Record::new(serde_json::to_value(self)?))
    }
}

impl TryFrom<&Record> for AdminProfile {
    type Error = AppResponse;

    fn try_from(record: &Record) -> Result<Self, Self::Error> {
        Ok(serde_json::from_value(record.as_value().clone())?)
    }
}

const DEFAULT_HERO_IMAGE: &str =
    "https://images.unsplash.com/photo-1541534741688-6078c6bfb5c5?auto=format&fit=crop&q=80&w=600";

/// Singleton configuration of the public-facing app.
///
/// Unlike collections, the config is merged rather than replaced: an update
/// only overwrites the fields it carries as non-empty strings, so a partial
/// document never blanks out the rest.
///
/// ```rust
/// use gym_sync_core::sync_model::AppConfig;
/// use serde_json::json;
///
/// let config = AppConfig::default();
/// let merged = config.merged(&json!({"heroTitle": "NEW", "heroVideo": ""}));
/// assert_eq!(merged.hero_title, "NEW");
/// assert_eq!(merged.hero_subtitle, config.hero_subtitle);
/// assert_eq!(merged.hero_video, config.hero_video);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub app_logo: String,
    pub hero_image: String,
    pub hero_video: String,
    pub hero_title: String,
    pub hero_subtitle: String,
    pub hero_overlay_text: String,
    pub hero_overlay_sub: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_logo: String::new(),
            hero_image: DEFAULT_HERO_IMAGE.to_string(),
            hero_video: String::new(),
            hero_title: "CÂU LẠC\nBỘ\nGYM".to_string(),
            hero_subtitle: "GYM CHO MỌI NGƯỜI".to_string(),
            hero_overlay_text: "THAY ĐỔI BẢN THÂN".to_string(),
            hero_overlay_sub: "Tại Sip Gym Nhà Bè".to_string(),
        }
    }
}

impl AppConfig {
    /// Returns a copy with every non-empty string field of `update` applied.
    ///
    /// A non-object `update` yields an unchanged copy.
    pub fn merged(&self, update: &JsonValue) -> AppConfig {
        let mut next = self.clone();
        let Some(fields) = update.as_object() else {
            return next;
        };

        let targets: [(&str, &mut String); 7] = [
            ("appLogo", &mut next.app_logo),
            ("heroImage", &mut next.hero_image),
            ("heroVideo", &mut next.hero_video),
            ("heroTitle", &mut next.hero_title),
            ("heroSubtitle", &mut next.hero_subtitle),
            ("heroOverlayText", &mut next.hero_overlay_text),
            ("heroOverlaySub", &mut next.hero_overlay_sub),
        ];
        for (key, target) in targets {
            if let Some(value) = fields.get(key).and_then(JsonValue::as_str) {
                if !value.is_empty() {
                    *target = value.to_string();
                }
            }
        }
        next
    }

    pub fn to_value(&self) -> Result<JsonValue, AppResponse> {
        Ok(serde_json::to_value(self)?)
    }
}

//! Bootstrap records for collections that must never be empty.

use log::{info, warn};

use crate::collection_kind::CollectionKind;
use crate::sync_model::{AdminProfile, Record};

/// Returns the sequence to publish when `records` is an empty admin collection.
///
/// The seeded write echoes back as a one-record update, which this check
/// leaves alone, so no re-entry guard is needed.
pub fn seed_for(kind: CollectionKind, records: &[Record]) -> Option<Vec<Record>> {
    if kind != CollectionKind::Admins || !records.is_empty() {
        return None;
    }

    match AdminProfile::bootstrap().to_record() {
        Ok(admin) => {
            info!("Admin collection is empty; seeding bootstrap admin");
            Some(vec![admin])
        }
        Err(e) => {
            warn!("Could not build bootstrap admin: {e}");
            None
        }
    }
}

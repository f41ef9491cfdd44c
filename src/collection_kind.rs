//! Catalogue of the mirrored collections.

use std::fmt::{Display, Formatter};

/// Wire name of the app configuration singleton.
pub const APP_SETTINGS: &str = "app_settings";

/// One of the nine record collections mirrored from the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CollectionKind {
    Admins,
    Users,
    Bookings,
    Transactions,
    Promotions,
    Vouchers,
    Trainers,
    Packages,
    PtPackages,
}

impl CollectionKind {
    pub const ALL: [CollectionKind; 9] = [
        CollectionKind::Admins,
        CollectionKind::Users,
        CollectionKind::Bookings,
        CollectionKind::Transactions,
        CollectionKind::Promotions,
        CollectionKind::Vouchers,
        CollectionKind::Trainers,
        CollectionKind::Packages,
        CollectionKind::PtPackages,
    ];

    /// Name of the collection in the remote store.
    pub fn wire_name(self) -> &'static str {
        match self {
            CollectionKind::Admins => "admins",
            CollectionKind::Users => "users",
            CollectionKind::Bookings => "bookings",
            CollectionKind::Transactions => "transactions",
            CollectionKind::Promotions => "promos",
            CollectionKind::Vouchers => "vouchers",
            CollectionKind::Trainers => "trainers",
            CollectionKind::Packages => "packages",
            CollectionKind::PtPackages => "pt_packages",
        }
    }

    pub fn from_wire_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.wire_name() == name)
    }

    /// Field that identifies a record of this kind across updates.
    pub fn identity_field(self) -> &'static str {
        match self {
            CollectionKind::Admins => "username",
            CollectionKind::Users => "phone",
            _ => "id",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl Display for CollectionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

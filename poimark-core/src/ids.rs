//! Strongly typed identifiers for the records the engine references.
//!
//! Every identifier wraps a `u64`. Keeping them distinct stops a POI id from
//! being passed where a user id is expected.

use std::fmt;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[cfg_attr(feature = "serde", serde(transparent))]
        pub struct $name(pub u64);

        impl $name {
            /// Return the raw numeric identifier.
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Identifier of a [`PointOfInterest`](crate::PointOfInterest).
    PoiId
);
id_type!(
    /// Identifier of a [`User`](crate::User).
    UserId
);
id_type!(
    /// Identifier of a [`Region`](crate::Region), shared by countries and
    /// provinces.
    RegionId
);
id_type!(
    /// Identifier of a POI category.
    CategoryId
);

//! Core of the poimark points-of-interest engine.
//!
//! Responsibilities:
//! - Geodesic radius and region containment search over POIs.
//! - Soft-delete visibility applied to every read path.
//! - Dense, per-user ordered bookmark lists.
//! - Per-user ratings clamped to `0..=10`.
//! - Staff scoping over the country/province hierarchy.
//! - Dispatch of external actions onto the above.
//!
//! Boundaries:
//! - Storage sits behind [`PoiStore`], [`BookmarkStore`] and [`RatingStore`].
//!   [`MemoryStore`] implements all three; `SqliteStore` does too when the
//!   `store-sqlite` feature is enabled.
//! - Authentication, HTTP and admin surfaces live outside this crate.
//!
//! Invariants:
//! - A user's bookmark orders are always exactly `1..=N`.
//! - Deleted POIs never appear in search results.

#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod bookmark;
mod dispatch;
mod geodesy;
mod ids;
mod poi;
mod rating;
mod region;
mod search;
mod store;
mod user;
mod visibility;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use bookmark::{Bookmark, BookmarkError, BookmarkRows, BookmarkStore, Bookmarks};
pub use dispatch::{
    Action, ActionError, BookmarkPoiAction, Dispatcher, MovePoiBookmarkAction, Outcome,
    RatePoiAction, SearchAction, UnbookmarkPoiAction, UnratePoiAction,
};
pub use geodesy::geodesic_distance;
pub use ids::{CategoryId, PoiId, RegionId, UserId};
pub use poi::{PointOfInterest, PointOfInterestError};
pub use rating::{MAX_SCORE, MIN_SCORE, Rating, RatingStore, Score, rate, unrate};
pub use region::{Region, RegionCatalog, RegionError, RegionKind};
pub use search::{
    AnnotatedPoi, Circle, DEFAULT_DISTANCE_FIELD, PersonalScope, SearchError, SearchQuery,
    SpatialSearch, annotate_distances,
};
pub use store::{MemoryStore, PoiStore, StoreError};
#[cfg(feature = "store-sqlite")]
#[cfg_attr(docsrs, doc(cfg(feature = "store-sqlite")))]
pub use store::{SqliteStore, SqliteStoreError};
pub use user::{MAX_USERNAME_LEN, User, UserError};
pub use visibility::{Deletion, SoftDeletable, Visible, VisibleExt};

//! Facade crate for the poimark points-of-interest engine.
//!
//! This crate re-exports the core domain types, components and storage seams,
//! and exposes the SQLite store behind the `store-sqlite` feature.

#![forbid(unsafe_code)]

pub use poimark_core::{
    Action, ActionError, AnnotatedPoi, Bookmark, BookmarkError, BookmarkPoiAction, BookmarkRows,
    BookmarkStore, Bookmarks, CategoryId, Circle, Deletion, Dispatcher, MemoryStore,
    MovePoiBookmarkAction, Outcome, PersonalScope, PoiId, PoiStore, PointOfInterest,
    PointOfInterestError, RatePoiAction, Rating, RatingStore, Region, RegionCatalog, RegionError,
    RegionId, RegionKind, Score, SearchAction, SearchError, SearchQuery, SoftDeletable,
    SpatialSearch, StoreError, UnbookmarkPoiAction, UnratePoiAction, User, UserError, UserId,
    VisibleExt, annotate_distances, geodesic_distance, rate, unrate,
};

#[cfg(feature = "store-sqlite")]
pub use poimark_core::{SqliteStore, SqliteStoreError};

#[cfg(feature = "test-support")]
pub use poimark_core::test_support;

//! Storage seams for POIs, bookmarks and ratings.
//!
//! The `PoiStore` trait defines a read-only interface for retrieving
//! [`PointOfInterest`] values by bounding box or id. Bookmark and rating
//! persistence live behind [`BookmarkStore`](crate::BookmarkStore) and
//! [`RatingStore`](crate::RatingStore). Two backends implement all three:
//! [`MemoryStore`] and, behind the `store-sqlite` feature, `SqliteStore`.

use geo::Rect;
use thiserror::Error;

use crate::{PoiId, PointOfInterest};

mod index;
mod memory;
#[cfg(feature = "store-sqlite")]
mod sqlite;

pub(crate) use index::PoiIndex;
pub use memory::MemoryStore;
#[cfg(feature = "store-sqlite")]
pub use sqlite::{SqliteStore, SqliteStoreError};

/// Failures surfaced by a storage backend.
///
/// The core never retries; callers decide whether a failure is transient.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A lock guarding shared state was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    Poisoned,
    /// An identifier could not be represented by the backend.
    #[error("identifier {id} exceeds the backend integer range")]
    IdOutOfRange {
        /// Identifier that failed the conversion.
        id: u64,
    },
    /// A uniqueness constraint would have been violated.
    #[error("constraint violated: {0}")]
    Constraint(String),
    /// Any other backend failure, passed through unchanged.
    #[error("storage backend failed: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Read-only access to persisted points of interest.
///
/// Implementers are expected to store POIs in a spatial index such as an
/// R\*-tree. The bounding box uses WGS84 coordinates (`x = longitude`,
/// `y = latitude`). Soft-deleted POIs are returned as stored; read paths apply
/// [`VisibleExt::visible`](crate::VisibleExt::visible) themselves.
///
/// # Examples
///
/// ```rust
/// use geo::{Coord, Rect};
/// use poimark_core::{MemoryStore, PoiId, PoiStore, PointOfInterest};
///
/// let poi = PointOfInterest::new(PoiId(1), "Origin", Coord { x: 0.0, y: 0.0 }).unwrap();
/// let store = MemoryStore::with_pois([poi.clone()]);
/// let bbox = Rect::new(Coord { x: -1.0, y: -1.0 }, Coord { x: 1.0, y: 1.0 });
///
/// let found: Vec<_> = store.get_pois_in_bbox(&bbox).collect();
/// assert_eq!(found, vec![poi]);
/// ```
pub trait PoiStore {
    /// Return all POIs that fall within the provided bounding box, ordered by
    /// id.
    ///
    /// Antimeridian note: this method does not model regions that cross the
    /// antimeridian. Callers that need such queries MUST split the area into
    /// two `Rect` ranges and invoke this method for each range.
    ///
    /// Containment includes boundary points.
    fn get_pois_in_bbox(
        &self,
        bbox: &Rect<f64>,
    ) -> Box<dyn Iterator<Item = PointOfInterest> + Send + '_>;

    /// Look up a single POI, deleted or not.
    fn get_poi(&self, id: PoiId) -> Option<PointOfInterest>;
}

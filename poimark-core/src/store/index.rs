//! In-memory R\*-tree over POI locations shared by both store backends.

use std::collections::BTreeMap;

use geo::{Coord, Rect};
use rstar::{AABB, RTree, RTreeObject};

use crate::{PoiId, PointOfInterest, UserId};

/// Entry stored inside the R\*-tree. Full records live beside the tree.
#[derive(Debug, Clone, Copy, PartialEq)]
struct IndexedPoi {
    id: PoiId,
    location: Coord<f64>,
}

impl From<&PointOfInterest> for IndexedPoi {
    fn from(poi: &PointOfInterest) -> Self {
        Self {
            id: poi.id,
            location: poi.location,
        }
    }
}

impl RTreeObject for IndexedPoi {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.location.x, self.location.y])
    }
}

/// POI records keyed by id plus a spatial index over their locations.
#[derive(Debug, Default)]
pub(crate) struct PoiIndex {
    tree: RTree<IndexedPoi>,
    records: BTreeMap<PoiId, PointOfInterest>,
}

impl PoiIndex {
    pub(crate) fn bulk_load<I>(pois: I) -> Self
    where
        I: IntoIterator<Item = PointOfInterest>,
    {
        let records: BTreeMap<PoiId, PointOfInterest> =
            pois.into_iter().map(|poi| (poi.id, poi)).collect();
        let tree = RTree::bulk_load(records.values().map(IndexedPoi::from).collect());
        Self { tree, records }
    }

    /// Insert or replace a POI, moving its index entry when the location
    /// changed.
    pub(crate) fn upsert(&mut self, poi: PointOfInterest) {
        if let Some(previous) = self.records.get(&poi.id) {
            self.tree.remove(&IndexedPoi::from(previous));
        }
        self.tree.insert(IndexedPoi::from(&poi));
        self.records.insert(poi.id, poi);
    }

    /// Soft-delete a POI. Returns `false` when it was unknown or already
    /// deleted.
    pub(crate) fn soft_delete(&mut self, id: PoiId, by: UserId) -> bool {
        match self.records.get_mut(&id) {
            Some(poi) if poi.deletion.is_visible() => {
                poi.deletion.mark(by);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn get(&self, id: PoiId) -> Option<&PointOfInterest> {
        self.records.get(&id)
    }

    pub(crate) fn in_bbox(&self, bbox: &Rect<f64>) -> Vec<PointOfInterest> {
        let envelope =
            AABB::from_corners([bbox.min().x, bbox.min().y], [bbox.max().x, bbox.max().y]);
        let mut pois: Vec<PointOfInterest> = self
            .tree
            .locate_in_envelope_intersecting(&envelope)
            .filter_map(|entry| self.records.get(&entry.id))
            .cloned()
            .collect();
        // Sort to give callers a deterministic order.
        pois.sort_unstable_by_key(|poi| poi.id);
        pois
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }
}

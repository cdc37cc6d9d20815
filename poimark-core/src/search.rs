//! Radius, distance-ranking and region containment queries over a
//! [`PoiStore`].
//!
//! Every query drops soft-deleted POIs before any other predicate. Radius
//! filtering and distance annotation share [`geodesic_distance`], and ranked
//! results break distance ties by POI id so pages are reproducible.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use geo::{BoundingRect, Coord};
use thiserror::Error;

use crate::{
    CategoryId, PoiId, PoiStore, PointOfInterest, Region, RegionCatalog, RegionError, RegionId,
    VisibleExt,
    geodesy::{geodesic_distance, search_envelopes},
    poi::is_valid_location,
};

/// Name of the distance annotation used by combined searches.
pub const DEFAULT_DISTANCE_FIELD: &str = "distance";

/// A search circle measured along the WGS84 ellipsoid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    /// Centre, `x = longitude`, `y = latitude`.
    pub centre: Coord<f64>,
    /// Radius in metres. Must be positive.
    pub radius: f64,
}

/// A POI plus distances to named reference points, in metres.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AnnotatedPoi {
    /// The matched POI.
    pub poi: PointOfInterest,
    /// Distance per reference point name.
    #[cfg_attr(feature = "serde", serde(default))]
    pub distances: BTreeMap<String, f64>,
}

impl AnnotatedPoi {
    /// Distance to the reference point called `name`.
    #[must_use]
    pub fn distance(&self, name: &str) -> Option<f64> {
        self.distances.get(name).copied()
    }
}

impl From<PointOfInterest> for AnnotatedPoi {
    fn from(poi: PointOfInterest) -> Self {
        Self {
            poi,
            distances: BTreeMap::new(),
        }
    }
}

/// Errors raised by [`SpatialSearch`].
#[derive(Debug, Error, PartialEq)]
pub enum SearchError {
    /// The radius was zero, negative or not finite.
    #[error("search radius must be a positive number of metres, got {radius}")]
    InvalidRadius {
        /// Radius supplied.
        radius: f64,
    },
    /// The centre was not a valid longitude/latitude pair.
    #[error("search centre ({x}, {y}) is not a valid longitude/latitude pair")]
    InvalidCentre {
        /// Longitude supplied.
        x: f64,
        /// Latitude supplied.
        y: f64,
    },
    /// Neither a circle nor a region set bounded the search.
    #[error("a search needs a centre and radius, a region set, or both")]
    MissingSpatialConstraint,
    /// Bookmarked/rated filters were requested without a user.
    #[error("bookmarked and rated filters need an authenticated user")]
    AnonymousPersonalFilter,
    /// A requested region is unknown or deleted.
    #[error(transparent)]
    Region(#[from] RegionError),
}

/// The requesting user's bookmarked and rated POIs, used by personal filters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersonalScope {
    /// POIs the user bookmarked.
    pub bookmarked: HashSet<PoiId>,
    /// POIs the user rated.
    pub rated: HashSet<PoiId>,
}

/// Combined search request. Every supplied constraint must hold.
///
/// # Examples
/// ```
/// use geo::Coord;
/// use poimark_core::{CategoryId, RegionId, SearchQuery};
///
/// let query = SearchQuery::around(Coord { x: -3.7, y: 40.4 }, 2_000.0)
///     .with_regions([RegionId(1)])
///     .with_categories([CategoryId(4)])
///     .bookmarked_only();
/// assert!(query.bookmarked_only);
/// assert_eq!(query.regions, Some(vec![RegionId(1)]));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchQuery {
    /// Optional search circle.
    pub circle: Option<Circle>,
    /// Optional region set; POIs must lie in at least one. An empty set
    /// matches nothing.
    pub regions: Option<Vec<RegionId>>,
    /// POIs must carry at least one of these. Empty means no category filter.
    pub categories: BTreeSet<CategoryId>,
    /// Keep only POIs the requester bookmarked.
    pub bookmarked_only: bool,
    /// Keep only POIs the requester rated.
    pub rated_only: bool,
}

impl SearchQuery {
    /// Query bounded by a circle.
    #[must_use]
    pub fn around(centre: Coord<f64>, radius: f64) -> Self {
        Self {
            circle: Some(Circle { centre, radius }),
            ..Self::default()
        }
    }

    /// Query bounded by a region set.
    #[must_use]
    pub fn in_regions<I>(regions: I) -> Self
    where
        I: IntoIterator<Item = RegionId>,
    {
        Self::default().with_regions(regions)
    }

    /// Add or replace the region constraint.
    #[must_use]
    pub fn with_regions<I>(mut self, regions: I) -> Self
    where
        I: IntoIterator<Item = RegionId>,
    {
        self.regions = Some(regions.into_iter().collect());
        self
    }

    /// Add or replace the category constraint.
    #[must_use]
    pub fn with_categories<I>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = CategoryId>,
    {
        self.categories = categories.into_iter().collect();
        self
    }

    /// Keep only bookmarked POIs.
    #[must_use]
    pub const fn bookmarked_only(mut self) -> Self {
        self.bookmarked_only = true;
        self
    }

    /// Keep only rated POIs.
    #[must_use]
    pub const fn rated_only(mut self) -> Self {
        self.rated_only = true;
        self
    }

    /// Whether the query filters on the requester's bookmarks or ratings.
    #[must_use]
    pub const fn needs_personal_scope(&self) -> bool {
        self.bookmarked_only || self.rated_only
    }
}

/// Attach, per POI, the distance to each named reference point.
pub fn annotate_distances<I>(pois: I, points: &BTreeMap<String, Coord<f64>>) -> Vec<AnnotatedPoi>
where
    I: IntoIterator<Item = PointOfInterest>,
{
    pois.into_iter()
        .map(|poi| {
            let distances = points
                .iter()
                .map(|(name, point)| (name.clone(), geodesic_distance(poi.location, *point)))
                .collect();
            AnnotatedPoi { poi, distances }
        })
        .collect()
}

/// Read-only spatial queries over a POI store.
#[derive(Debug)]
pub struct SpatialSearch<'s, S: ?Sized> {
    store: &'s S,
}

impl<'s, S> SpatialSearch<'s, S>
where
    S: PoiStore + ?Sized,
{
    /// Wrap a store.
    pub const fn new(store: &'s S) -> Self {
        Self { store }
    }

    /// Visible POIs within `radius` metres of `centre`, boundary included,
    /// ordered by id.
    pub fn within(
        &self,
        centre: Coord<f64>,
        radius: f64,
    ) -> Result<Vec<PointOfInterest>, SearchError> {
        validate_circle(centre, radius)?;
        let mut found = BTreeMap::new();
        for envelope in search_envelopes(centre, radius) {
            for poi in self
                .store
                .get_pois_in_bbox(&envelope)
                .visible()
                .filter(|poi| geodesic_distance(centre, poi.location) <= radius)
            {
                found.insert(poi.id, poi);
            }
        }
        Ok(found.into_values().collect())
    }

    /// [`within`](Self::within) annotated with the distance to `centre` under
    /// `output_field`, nearest first, ties broken by id.
    pub fn nearby_search(
        &self,
        centre: Coord<f64>,
        radius: f64,
        output_field: &str,
    ) -> Result<Vec<AnnotatedPoi>, SearchError> {
        let points = BTreeMap::from([(output_field.to_owned(), centre)]);
        let mut hits = annotate_distances(self.within(centre, radius)?, &points);
        hits.sort_by(|a, b| {
            let (da, db) = (a.distance(output_field), b.distance(output_field));
            da.unwrap_or(f64::INFINITY)
                .total_cmp(&db.unwrap_or(f64::INFINITY))
                .then(a.poi.id.cmp(&b.poi.id))
        });
        Ok(hits)
    }

    /// Visible POIs lying in at least one of `regions`, ordered by id.
    ///
    /// Regions without a boundary contribute nothing, and an empty slice
    /// yields an empty result.
    pub fn in_region(&self, regions: &[&Region]) -> Vec<PointOfInterest> {
        let mut found = BTreeMap::new();
        for region in regions {
            let Some(bbox) = region.boundary.as_ref().and_then(BoundingRect::bounding_rect) else {
                continue;
            };
            for poi in self
                .store
                .get_pois_in_bbox(&bbox)
                .visible()
                .filter(|poi| region.contains(poi.location))
            {
                found.insert(poi.id, poi);
            }
        }
        found.into_values().collect()
    }

    /// Run a combined search.
    ///
    /// With a circle, results are ranked by distance (annotated under
    /// [`DEFAULT_DISTANCE_FIELD`]); otherwise they are ordered by id.
    pub fn search(
        &self,
        query: &SearchQuery,
        catalog: &RegionCatalog,
        personal: Option<&PersonalScope>,
    ) -> Result<Vec<AnnotatedPoi>, SearchError> {
        if query.circle.is_none() && query.regions.is_none() {
            return Err(SearchError::MissingSpatialConstraint);
        }
        let personal = match (query.needs_personal_scope(), personal) {
            (true, None) => return Err(SearchError::AnonymousPersonalFilter),
            (_, scope) => scope,
        };
        let regions = query
            .regions
            .as_deref()
            .map(|ids| catalog.resolve(ids))
            .transpose()?;

        let mut hits = match (query.circle, regions.as_deref()) {
            (Some(circle), regions) => {
                let mut ranked =
                    self.nearby_search(circle.centre, circle.radius, DEFAULT_DISTANCE_FIELD)?;
                if let Some(regions) = regions {
                    ranked.retain(|hit| {
                        regions
                            .iter()
                            .any(|region| region.contains(hit.poi.location))
                    });
                }
                ranked
            }
            (None, Some(regions)) => self
                .in_region(regions)
                .into_iter()
                .map(AnnotatedPoi::from)
                .collect(),
            (None, None) => return Err(SearchError::MissingSpatialConstraint),
        };

        if !query.categories.is_empty() {
            hits.retain(|hit| hit.poi.in_any_category(&query.categories));
        }
        if let Some(scope) = personal {
            if query.bookmarked_only {
                hits.retain(|hit| scope.bookmarked.contains(&hit.poi.id));
            }
            if query.rated_only {
                hits.retain(|hit| scope.rated.contains(&hit.poi.id));
            }
        }
        Ok(hits)
    }
}

fn validate_circle(centre: Coord<f64>, radius: f64) -> Result<(), SearchError> {
    if !is_valid_location(centre) {
        return Err(SearchError::InvalidCentre {
            x: centre.x,
            y: centre.y,
        });
    }
    if !(radius.is_finite() && radius > 0.0) {
        return Err(SearchError::InvalidRadius { radius });
    }
    Ok(())
}

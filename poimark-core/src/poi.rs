use std::collections::BTreeSet;

use geo::Coord;
use thiserror::Error;

use crate::{CategoryId, Deletion, PoiId, SoftDeletable};

/// A named, located place in the catalogue.
///
/// Coordinates are WGS84 with `x = longitude` and `y = latitude`.
///
/// # Examples
/// ```
/// use geo::Coord;
/// use poimark_core::{CategoryId, PoiId, PointOfInterest};
///
/// let poi = PointOfInterest::new(PoiId(1), "Museum", Coord { x: 1.0, y: 2.0 })
///     .unwrap()
///     .with_summary("Modern art")
///     .with_categories([CategoryId(3)]);
///
/// assert_eq!(poi.id, PoiId(1));
/// assert!(poi.categories.contains(&CategoryId(3)));
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PointOfInterest {
    /// Unique, immutable identifier.
    pub id: PoiId,
    /// Display name.
    pub name: String,
    /// Short text shown in listings.
    #[cfg_attr(feature = "serde", serde(default))]
    pub summary: String,
    /// Long text shown on detail pages.
    #[cfg_attr(feature = "serde", serde(default))]
    pub description: String,
    /// Geospatial position.
    pub location: Coord<f64>,
    /// Categories the POI belongs to.
    #[cfg_attr(feature = "serde", serde(default))]
    pub categories: BTreeSet<CategoryId>,
    /// Soft-deletion state.
    #[cfg_attr(feature = "serde", serde(default))]
    pub deletion: Deletion,
}

/// Errors returned by [`PointOfInterest::new`].
#[derive(Debug, Error, PartialEq)]
pub enum PointOfInterestError {
    /// The location was not a finite WGS84 coordinate.
    #[error("location ({x}, {y}) is not a valid longitude/latitude pair")]
    InvalidLocation {
        /// Longitude supplied.
        x: f64,
        /// Latitude supplied.
        y: f64,
    },
}

impl PointOfInterest {
    /// Validate the location and construct a visible POI with no
    /// categories.
    pub fn new(
        id: PoiId,
        name: impl Into<String>,
        location: Coord<f64>,
    ) -> Result<Self, PointOfInterestError> {
        if !is_valid_location(location) {
            return Err(PointOfInterestError::InvalidLocation {
                x: location.x,
                y: location.y,
            });
        }
        Ok(Self {
            id,
            name: name.into(),
            summary: String::new(),
            description: String::new(),
            location,
            categories: BTreeSet::new(),
            deletion: Deletion::active(),
        })
    }

    /// Replace the short text.
    #[must_use]
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    /// Replace the long text.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Replace the category set.
    #[must_use]
    pub fn with_categories<I>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = CategoryId>,
    {
        self.categories = categories.into_iter().collect();
        self
    }

    /// Whether the POI carries at least one of `wanted`.
    #[must_use]
    pub fn in_any_category(&self, wanted: &BTreeSet<CategoryId>) -> bool {
        !self.categories.is_disjoint(wanted)
    }
}

impl SoftDeletable for PointOfInterest {
    fn deletion(&self) -> Deletion {
        self.deletion
    }
}

pub(crate) fn is_valid_location(location: Coord<f64>) -> bool {
    location.x.is_finite()
        && location.y.is_finite()
        && (-180.0..=180.0).contains(&location.x)
        && (-90.0..=90.0).contains(&location.y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Coord { x: 181.0, y: 0.0 })]
    #[case(Coord { x: 0.0, y: -90.5 })]
    #[case(Coord { x: f64::NAN, y: 0.0 })]
    fn rejects_invalid_locations(#[case] location: Coord<f64>) {
        let result = PointOfInterest::new(PoiId(1), "Nowhere", location);
        assert!(matches!(
            result,
            Err(PointOfInterestError::InvalidLocation { .. })
        ));
    }

    #[rstest]
    fn new_pois_are_visible() {
        let poi = PointOfInterest::new(PoiId(1), "Pier", Coord { x: -180.0, y: 90.0 })
            .expect("boundary coordinates are valid");
        assert!(poi.is_visible());
        assert!(poi.categories.is_empty());
    }

    #[rstest]
    #[case(&[1, 2], &[2, 5], true)]
    #[case(&[1], &[3], false)]
    #[case(&[], &[3], false)]
    fn category_match_is_any_of(
        #[case] held: &[u64],
        #[case] wanted: &[u64],
        #[case] expected: bool,
    ) {
        let poi = PointOfInterest::new(PoiId(1), "Cafe", Coord { x: 0.0, y: 0.0 })
            .expect("valid poi")
            .with_categories(held.iter().copied().map(CategoryId));
        let wanted: BTreeSet<_> = wanted.iter().copied().map(CategoryId).collect();
        assert_eq!(poi.in_any_category(&wanted), expected);
    }
}

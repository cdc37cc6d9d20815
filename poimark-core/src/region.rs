//! Two-level region hierarchy (country, province) and staff scoping.
//!
//! Regions share one shape: a name, an optional boundary, a manager set and a
//! soft-deletion marker. [`RegionKind`] distinguishes the two levels and holds
//! the parent link for provinces. [`RegionCatalog`] keeps reverse indices so
//! scoping questions are answered by lookups rather than scans.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use geo::{Coord, Intersects, MultiPolygon, Point};
use thiserror::Error;

use crate::{Deletion, RegionId, SoftDeletable, User, UserId, VisibleExt};

/// Level of a region within the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "level", rename_all = "snake_case"))]
pub enum RegionKind {
    /// Top-level region.
    Country,
    /// Region nested in a country.
    Province {
        /// Parent country.
        country: RegionId,
    },
}

/// A named polygonal area used for containment filtering and staff scoping.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Region {
    /// Unique identifier across both levels.
    pub id: RegionId,
    /// Display name.
    pub name: String,
    /// Hierarchy level and parent link.
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub kind: RegionKind,
    /// Boundary polygons. Regions without one never match a POI.
    #[cfg_attr(feature = "serde", serde(default))]
    pub boundary: Option<MultiPolygon<f64>>,
    /// Staff users managing this region directly.
    #[cfg_attr(feature = "serde", serde(default))]
    pub managers: BTreeSet<UserId>,
    /// Soft-deletion state.
    #[cfg_attr(feature = "serde", serde(default))]
    pub deletion: Deletion,
}

impl Region {
    /// Construct a country without boundary or managers.
    pub fn country(id: RegionId, name: impl Into<String>) -> Self {
        Self::with_kind(id, name, RegionKind::Country)
    }

    /// Construct a province of `country` without boundary or managers.
    pub fn province(id: RegionId, name: impl Into<String>, country: RegionId) -> Self {
        Self::with_kind(id, name, RegionKind::Province { country })
    }

    fn with_kind(id: RegionId, name: impl Into<String>, kind: RegionKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            boundary: None,
            managers: BTreeSet::new(),
            deletion: Deletion::active(),
        }
    }

    /// Attach a boundary.
    #[must_use]
    pub fn with_boundary(mut self, boundary: impl Into<MultiPolygon<f64>>) -> Self {
        self.boundary = Some(boundary.into());
        self
    }

    /// Replace the direct manager set.
    #[must_use]
    pub fn with_managers<I>(mut self, managers: I) -> Self
    where
        I: IntoIterator<Item = UserId>,
    {
        self.managers = managers.into_iter().collect();
        self
    }

    /// Parent country of a province.
    #[must_use]
    pub const fn parent(&self) -> Option<RegionId> {
        match self.kind {
            RegionKind::Country => None,
            RegionKind::Province { country } => Some(country),
        }
    }

    /// Whether this region is a country.
    #[must_use]
    pub const fn is_country(&self) -> bool {
        matches!(self.kind, RegionKind::Country)
    }

    /// Whether `location` lies inside or on the boundary.
    ///
    /// Regions without a boundary contain nothing.
    #[must_use]
    pub fn contains(&self, location: Coord<f64>) -> bool {
        self.boundary
            .as_ref()
            .is_some_and(|boundary| boundary.intersects(&Point::from(location)))
    }
}

impl SoftDeletable for Region {
    fn deletion(&self) -> Deletion {
        self.deletion
    }
}

/// Errors raised while maintaining or querying a [`RegionCatalog`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegionError {
    /// The region does not exist or is soft-deleted.
    #[error("region {0} not found")]
    NotFound(RegionId),
    /// A region with the same id is already registered.
    #[error("region {0} already exists")]
    Duplicate(RegionId),
    /// A province referenced something other than a registered country.
    #[error("province {province} references unknown country {country}")]
    UnknownCountry {
        /// Province being registered.
        province: RegionId,
        /// Missing parent.
        country: RegionId,
    },
}

/// Registry of countries and provinces with manager indices.
#[derive(Debug, Clone, Default)]
pub struct RegionCatalog {
    regions: BTreeMap<RegionId, Region>,
    managed: HashMap<UserId, BTreeSet<RegionId>>,
    provinces_by_country: HashMap<RegionId, BTreeSet<RegionId>>,
}

impl RegionCatalog {
    /// Create an empty catalogue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a region.
    ///
    /// Provinces must reference a country that is already registered.
    pub fn insert(&mut self, region: Region) -> Result<(), RegionError> {
        if self.regions.contains_key(&region.id) {
            return Err(RegionError::Duplicate(region.id));
        }
        if let Some(country) = region.parent() {
            let parent_is_country = self.regions.get(&country).is_some_and(Region::is_country);
            if !parent_is_country {
                return Err(RegionError::UnknownCountry {
                    province: region.id,
                    country,
                });
            }
            self.provinces_by_country
                .entry(country)
                .or_default()
                .insert(region.id);
        }
        for manager in &region.managers {
            self.managed.entry(*manager).or_default().insert(region.id);
        }
        self.regions.insert(region.id, region);
        Ok(())
    }

    /// Soft-delete a visible region.
    pub fn soft_delete(&mut self, id: RegionId, by: UserId) -> Result<(), RegionError> {
        let region = self
            .regions
            .get_mut(&id)
            .filter(|region| region.is_visible())
            .ok_or(RegionError::NotFound(id))?;
        region.deletion.mark(by);
        Ok(())
    }

    /// Look up a visible region.
    #[must_use]
    pub fn get(&self, id: RegionId) -> Option<&Region> {
        self.regions.get(&id).filter(|region| region.is_visible())
    }

    /// Resolve ids to visible regions, failing on the first unknown id.
    pub fn resolve(&self, ids: &[RegionId]) -> Result<Vec<&Region>, RegionError> {
        ids.iter()
            .map(|id| self.get(*id).ok_or(RegionError::NotFound(*id)))
            .collect()
    }

    /// Every visible region, ordered by id.
    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        self.regions.values().visible()
    }

    /// Visible countries `user` may manage: all of them for superusers,
    /// otherwise the ones listing `user` as a manager.
    #[must_use]
    pub fn countries_allowed_for(&self, user: &User) -> Vec<&Region> {
        if user.is_superuser {
            return self.iter().filter(|region| region.is_country()).collect();
        }
        self.managed_by(user.id)
            .filter(|region| region.is_country())
            .collect()
    }

    /// Visible provinces `user` may manage: those listing `user` directly,
    /// plus every province of a country returned by
    /// [`countries_allowed_for`](Self::countries_allowed_for).
    #[must_use]
    pub fn provinces_allowed_for(&self, user: &User) -> Vec<&Region> {
        let mut ids: BTreeSet<RegionId> = self
            .managed_by(user.id)
            .filter(|region| !region.is_country())
            .map(|region| region.id)
            .collect();
        for country in self.countries_allowed_for(user) {
            if let Some(provinces) = self.provinces_by_country.get(&country.id) {
                ids.extend(provinces.iter().copied());
            }
        }
        ids.into_iter().filter_map(|id| self.get(id)).collect()
    }

    /// Membership form of [`countries_allowed_for`](Self::countries_allowed_for).
    #[must_use]
    pub fn is_country_allowed(&self, user: &User, country: RegionId) -> bool {
        self.get(country)
            .filter(|region| region.is_country())
            .is_some_and(|region| user.is_superuser || region.managers.contains(&user.id))
    }

    /// Membership form of [`provinces_allowed_for`](Self::provinces_allowed_for).
    #[must_use]
    pub fn is_province_allowed(&self, user: &User, province: RegionId) -> bool {
        self.get(province).is_some_and(|region| match region.kind {
            RegionKind::Country => false,
            RegionKind::Province { country } => {
                region.managers.contains(&user.id) || self.is_country_allowed(user, country)
            }
        })
    }

    fn managed_by(&self, user: UserId) -> impl Iterator<Item = &Region> {
        self.managed
            .get(&user)
            .into_iter()
            .flatten()
            .filter_map(|id| self.get(*id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Rect, polygon};
    use rstest::{fixture, rstest};

    const SPAIN: RegionId = RegionId(1);
    const FRANCE: RegionId = RegionId(2);
    const MADRID: RegionId = RegionId(10);
    const CATALONIA: RegionId = RegionId(11);
    const BRITTANY: RegionId = RegionId(20);

    fn user(id: u64) -> User {
        User::new(UserId(id), format!("user_{id}")).expect("valid user")
    }

    #[fixture]
    fn catalog() -> RegionCatalog {
        let mut catalog = RegionCatalog::new();
        catalog
            .insert(Region::country(SPAIN, "Spain").with_managers([UserId(1)]))
            .expect("insert Spain");
        catalog
            .insert(Region::country(FRANCE, "France").with_managers([UserId(2)]))
            .expect("insert France");
        catalog
            .insert(Region::province(MADRID, "Madrid", SPAIN).with_managers([UserId(3)]))
            .expect("insert Madrid");
        catalog
            .insert(Region::province(CATALONIA, "Catalonia", SPAIN))
            .expect("insert Catalonia");
        catalog
            .insert(Region::province(BRITTANY, "Brittany", FRANCE).with_managers([UserId(3)]))
            .expect("insert Brittany");
        catalog
    }

    fn ids(regions: &[&Region]) -> Vec<RegionId> {
        regions.iter().map(|region| region.id).collect()
    }

    #[rstest]
    fn superusers_see_every_country(catalog: RegionCatalog) {
        let admin = user(99).with_superuser();
        assert_eq!(ids(&catalog.countries_allowed_for(&admin)), vec![SPAIN, FRANCE]);
    }

    #[rstest]
    fn country_managers_see_their_countries(catalog: RegionCatalog) {
        assert_eq!(ids(&catalog.countries_allowed_for(&user(1))), vec![SPAIN]);
        assert!(catalog.countries_allowed_for(&user(3)).is_empty());
    }

    #[rstest]
    fn provinces_inherit_country_managers(catalog: RegionCatalog) {
        assert_eq!(
            ids(&catalog.provinces_allowed_for(&user(1))),
            vec![MADRID, CATALONIA]
        );
    }

    #[rstest]
    fn provinces_include_direct_management(catalog: RegionCatalog) {
        assert_eq!(
            ids(&catalog.provinces_allowed_for(&user(3))),
            vec![MADRID, BRITTANY]
        );
    }

    #[rstest]
    #[case(1, MADRID, true)]
    #[case(1, BRITTANY, false)]
    #[case(3, BRITTANY, true)]
    #[case(3, CATALONIA, false)]
    #[case(2, SPAIN, false)]
    fn province_membership_matches_set(
        catalog: RegionCatalog,
        #[case] user_id: u64,
        #[case] region: RegionId,
        #[case] expected: bool,
    ) {
        assert_eq!(catalog.is_province_allowed(&user(user_id), region), expected);
    }

    #[rstest]
    fn deleted_countries_stop_granting_provinces(mut catalog: RegionCatalog) {
        catalog.soft_delete(SPAIN, UserId(99)).expect("delete Spain");
        assert!(catalog.countries_allowed_for(&user(1)).is_empty());
        assert!(catalog.provinces_allowed_for(&user(1)).is_empty());
        assert!(!catalog.is_province_allowed(&user(1), MADRID));
    }

    #[rstest]
    fn provinces_need_a_registered_country(mut catalog: RegionCatalog) {
        let orphan = Region::province(RegionId(30), "Orphan", RegionId(404));
        assert_eq!(
            catalog.insert(orphan),
            Err(RegionError::UnknownCountry {
                province: RegionId(30),
                country: RegionId(404),
            })
        );
        let nested = Region::province(RegionId(31), "Nested", MADRID);
        assert!(catalog.insert(nested).is_err());
    }

    #[rstest]
    fn duplicate_ids_are_rejected(mut catalog: RegionCatalog) {
        assert_eq!(
            catalog.insert(Region::country(SPAIN, "Again")),
            Err(RegionError::Duplicate(SPAIN))
        );
    }

    #[rstest]
    fn resolve_fails_on_unknown_ids(catalog: RegionCatalog) {
        assert_eq!(
            catalog.resolve(&[SPAIN, RegionId(404)]).map(|found| found.len()),
            Err(RegionError::NotFound(RegionId(404)))
        );
    }

    #[rstest]
    fn containment_includes_the_boundary() {
        let square = Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 1.0, y: 1.0 }).to_polygon();
        let region = Region::country(SPAIN, "Square").with_boundary(square);
        assert!(region.contains(Coord { x: 0.5, y: 0.5 }));
        assert!(region.contains(Coord { x: 1.0, y: 0.5 }));
        assert!(!region.contains(Coord { x: 1.5, y: 0.5 }));
    }

    #[rstest]
    fn regions_without_boundary_contain_nothing() {
        let region = Region::country(SPAIN, "Unmapped");
        assert!(!region.contains(Coord { x: 0.0, y: 0.0 }));
        let triangle = polygon![(x: 0.0, y: 0.0), (x: 2.0, y: 0.0), (x: 0.0, y: 2.0)];
        let mapped = region.with_boundary(triangle);
        assert!(mapped.contains(Coord { x: 0.5, y: 0.5 }));
    }
}

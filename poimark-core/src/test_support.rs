//! Sample data shared by unit tests and downstream crates' tests.
//!
//! The catalogue covers two countries with provinces, and the POIs sit at
//! real landmarks so distances are easy to reason about.

use geo::{Coord, MultiPolygon, Rect};

use crate::{
    CategoryId, Deletion, PoiId, PointOfInterest, Region, RegionCatalog, RegionError, RegionId,
    User, UserError, UserId,
};

/// Museums.
pub const MUSEUM: CategoryId = CategoryId(1);
/// Parks and gardens.
pub const PARK: CategoryId = CategoryId(2);
/// Monuments.
pub const MONUMENT: CategoryId = CategoryId(3);

/// Country: Spain.
pub const SPAIN: RegionId = RegionId(1);
/// Country: France.
pub const FRANCE: RegionId = RegionId(2);
/// Province of Spain: Madrid.
pub const MADRID: RegionId = RegionId(10);
/// Province of Spain: Catalonia.
pub const CATALONIA: RegionId = RegionId(11);
/// Province of France: Brittany.
pub const BRITTANY: RegionId = RegionId(20);

/// Build a visible POI without validating the location.
pub fn poi(id: u64, name: &str, lon: f64, lat: f64) -> PointOfInterest {
    PointOfInterest {
        id: PoiId(id),
        name: name.to_owned(),
        summary: String::new(),
        description: String::new(),
        location: Coord { x: lon, y: lat },
        categories: std::collections::BTreeSet::new(),
        deletion: Deletion::active(),
    }
}

/// Axis-aligned boundary between two corners.
pub fn square(min: (f64, f64), max: (f64, f64)) -> MultiPolygon<f64> {
    let rect = Rect::new(Coord { x: min.0, y: min.1 }, Coord { x: max.0, y: max.1 });
    MultiPolygon::new(vec![rect.to_polygon()])
}

/// Landmarks in Madrid, Barcelona and northern France.
pub fn sample_pois() -> Vec<PointOfInterest> {
    vec![
        poi(1, "Prado", -3.6921, 40.4138).with_categories([MUSEUM]),
        poi(2, "Retiro", -3.6844, 40.4153).with_categories([PARK]),
        poi(3, "Sagrada Familia", 2.1744, 41.4036).with_categories([MONUMENT]),
        poi(4, "Mont-Saint-Michel", -1.5115, 48.6361).with_categories([MONUMENT]),
        poi(5, "Louvre", 2.3376, 48.8606).with_categories([MUSEUM]),
    ]
}

/// Spain and France with provinces. User 2 manages Spain, user 3 France and
/// user 4 only Madrid.
pub fn sample_catalogue() -> Result<RegionCatalog, RegionError> {
    let mut catalog = RegionCatalog::new();
    for region in sample_regions() {
        catalog.insert(region)?;
    }
    Ok(catalog)
}

/// The regions behind [`sample_catalogue`], countries first.
pub fn sample_regions() -> Vec<Region> {
    vec![
        Region::country(SPAIN, "Spain")
            .with_boundary(square((-9.5, 36.0), (3.5, 43.8)))
            .with_managers([UserId(2)]),
        Region::country(FRANCE, "France")
            .with_boundary(square((-5.0, 43.8), (8.0, 51.0)))
            .with_managers([UserId(3)]),
        Region::province(MADRID, "Madrid", SPAIN)
            .with_boundary(square((-4.6, 39.9), (-3.0, 41.2)))
            .with_managers([UserId(4)]),
        Region::province(CATALONIA, "Catalonia", SPAIN)
            .with_boundary(square((0.1, 40.5), (3.4, 42.9))),
        Region::province(BRITTANY, "Brittany", FRANCE)
            .with_boundary(square((-5.0, 47.0), (-1.0, 49.0))),
    ]
}

/// A regular user, a staff manager per country, a Madrid-only manager and a
/// superuser.
pub fn sample_users() -> Result<Vec<User>, UserError> {
    Ok(vec![
        User::new(UserId(1), "visitor")?,
        User::new(UserId(2), "spain_staff")?.with_staff(),
        User::new(UserId(3), "france_staff")?.with_staff(),
        User::new(UserId(4), "madrid_staff")?.with_staff(),
        User::new(UserId(5), "admin")?.with_superuser(),
    ])
}

//! Distance metric shared by every spatial query.
//!
//! Radius filtering and distance annotation both go through
//! [`geodesic_distance`] so rankings never disagree with the filter that
//! produced them. The R\*-tree only sees coarse lon/lat envelopes from
//! [`search_envelopes`]; they over-approximate the search circle and the exact
//! geodesic test runs afterwards.

use std::f64::consts::{FRAC_PI_2, PI};

use geo::{Coord, Distance, Geodesic, Point, Rect};

/// Smallest radius of curvature on the WGS84 ellipsoid (meridional radius at
/// the equator), in metres. Dividing by it yields an upper bound on the
/// angular size of a circle measured along the ellipsoid.
const MIN_CURVATURE_RADIUS_M: f64 = 6_335_439.0;

/// Relative slack added to envelopes to absorb the sphere/ellipsoid mismatch.
const ENVELOPE_PADDING: f64 = 1.01;

/// Geodesic distance in metres between two WGS84 coordinates.
///
/// Coordinates use `x = longitude`, `y = latitude`, in degrees.
///
/// # Examples
/// ```
/// use geo::Coord;
/// use poimark_core::geodesic_distance;
///
/// let one_degree = geodesic_distance(Coord { x: 0.0, y: 0.0 }, Coord { x: 1.0, y: 0.0 });
/// assert!((one_degree - 111_319.5).abs() < 1.0);
/// ```
#[must_use]
pub fn geodesic_distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    Geodesic.distance(Point::from(a), Point::from(b))
}

/// Lon/lat rectangles that together cover every point within `radius` metres
/// of `centre`.
///
/// Circles crossing the antimeridian are split into two rectangles. Circles
/// reaching a pole cover the full longitude range.
#[expect(
    clippy::float_arithmetic,
    reason = "envelope bounds are derived from spherical trigonometry"
)]
pub(crate) fn search_envelopes(centre: Coord<f64>, radius: f64) -> Vec<Rect<f64>> {
    let angular = radius / MIN_CURVATURE_RADIUS_M * ENVELOPE_PADDING;
    if angular >= PI {
        return vec![world()];
    }

    let lat = centre.y.to_radians();
    let lat_min = lat - angular;
    let lat_max = lat + angular;
    if lat_min <= -FRAC_PI_2 || lat_max >= FRAC_PI_2 {
        return vec![Rect::new(
            Coord {
                x: -180.0,
                y: lat_min.max(-FRAC_PI_2).to_degrees(),
            },
            Coord {
                x: 180.0,
                y: lat_max.min(FRAC_PI_2).to_degrees(),
            },
        )];
    }

    let ratio = angular.sin() / lat.cos();
    if ratio >= 1.0 {
        return vec![Rect::new(
            Coord {
                x: -180.0,
                y: lat_min.to_degrees(),
            },
            Coord {
                x: 180.0,
                y: lat_max.to_degrees(),
            },
        )];
    }

    let delta_lon = ratio.asin().to_degrees();
    let (south, north) = (lat_min.to_degrees(), lat_max.to_degrees());
    let (west, east) = (centre.x - delta_lon, centre.x + delta_lon);

    if west < -180.0 {
        vec![
            Rect::new(Coord { x: west + 360.0, y: south }, Coord { x: 180.0, y: north }),
            Rect::new(Coord { x: -180.0, y: south }, Coord { x: east, y: north }),
        ]
    } else if east > 180.0 {
        vec![
            Rect::new(Coord { x: west, y: south }, Coord { x: 180.0, y: north }),
            Rect::new(Coord { x: -180.0, y: south }, Coord { x: east - 360.0, y: north }),
        ]
    } else {
        vec![Rect::new(Coord { x: west, y: south }, Coord { x: east, y: north })]
    }
}

fn world() -> Rect<f64> {
    Rect::new(Coord { x: -180.0, y: -90.0 }, Coord { x: 180.0, y: 90.0 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Intersects;
    use rstest::rstest;

    fn covered(envelopes: &[Rect<f64>], point: Coord<f64>) -> bool {
        envelopes.iter().any(|rect| rect.intersects(&point))
    }

    #[rstest]
    fn distance_is_symmetric() {
        let a = Coord { x: -3.7038, y: 40.4168 };
        let b = Coord { x: 2.1734, y: 41.3851 };
        let there = geodesic_distance(a, b);
        let back = geodesic_distance(b, a);
        assert!((there - back).abs() < 1e-6);
        assert!(there > 480_000.0 && there < 520_000.0);
    }

    #[rstest]
    fn distance_to_self_is_zero() {
        let a = Coord { x: 12.5, y: -33.0 };
        assert!(geodesic_distance(a, a).abs() < 1e-9);
    }

    #[rstest]
    #[case(Coord { x: 0.0, y: 0.0 }, 10_000.0)]
    #[case(Coord { x: 179.95, y: 10.0 }, 20_000.0)]
    #[case(Coord { x: -179.95, y: -10.0 }, 20_000.0)]
    #[case(Coord { x: 45.0, y: 70.0 }, 150_000.0)]
    fn envelopes_cover_points_on_the_circle(#[case] centre: Coord<f64>, #[case] radius: f64) {
        let envelopes = search_envelopes(centre, radius);
        for bearing in (0..360).step_by(15) {
            let destination = geo::Destination::destination(
                &Geodesic,
                Point::from(centre),
                f64::from(bearing),
                radius,
            );
            assert!(
                covered(&envelopes, destination.0),
                "bearing {bearing} escaped the envelope"
            );
        }
    }

    #[rstest]
    fn antimeridian_circles_split_in_two() {
        let envelopes = search_envelopes(Coord { x: 179.99, y: 0.0 }, 5_000.0);
        assert_eq!(envelopes.len(), 2);
    }

    #[rstest]
    fn polar_circles_cover_every_longitude() {
        let envelopes = search_envelopes(Coord { x: 10.0, y: 89.9 }, 50_000.0);
        assert_eq!(envelopes.len(), 1);
        let rect = envelopes.first().copied().unwrap_or_else(world);
        assert!((rect.min().x + 180.0).abs() < f64::EPSILON);
        assert!((rect.max().x - 180.0).abs() < f64::EPSILON);
    }
}

//! Same-trip heuristic for replaced routes

use super::{GeoPoint, WaypointSet};

/// Maximum distance between paired waypoints of the same trip
pub const EQUIVALENCE_THRESHOLD_M: f64 = 100.0;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in meters
pub fn haversine_distance_m(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let delta_lat = (b.latitude - a.latitude).to_radians();
    let delta_lon = (b.longitude - a.longitude).to_radians();

    let sin_dlat = (delta_lat / 2.0).sin();
    let sin_dlon = (delta_lon / 2.0).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}

/// Whether two remaining-waypoint sets describe the same trip
///
/// Uses [`EQUIVALENCE_THRESHOLD_M`]. Comparison is per index, so the result
/// depends on waypoint order.
pub fn is_equivalent(old_remaining: Option<&WaypointSet>, new_remaining: Option<&WaypointSet>) -> bool {
    is_equivalent_within(old_remaining, new_remaining, EQUIVALENCE_THRESHOLD_M)
}

/// [`is_equivalent`] with an explicit threshold in meters
pub fn is_equivalent_within(
    old_remaining: Option<&WaypointSet>,
    new_remaining: Option<&WaypointSet>,
    threshold_m: f64,
) -> bool {
    let (old, new) = match (old_remaining, new_remaining) {
        (Some(old), Some(new)) => (old, new),
        _ => return false,
    };
    if old.is_empty() || new.is_empty() || old.len() != new.len() {
        return false;
    }

    old.points()
        .iter()
        .zip(new.points())
        .all(|(a, b)| haversine_distance_m(a, b) <= threshold_m)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn set(points: &[(f64, f64)]) -> WaypointSet {
        points.iter().map(|&(lon, lat)| GeoPoint::new(lon, lat)).collect()
    }

    #[test]
    fn test_haversine_one_degree_latitude() {
        let d = haversine_distance_m(&GeoPoint::new(139.0, 35.0), &GeoPoint::new(139.0, 36.0));
        assert!((d - 111_195.0).abs() < 100.0);
    }

    #[test]
    fn test_haversine_same_point() {
        let p = GeoPoint::new(13.4, 52.5);
        assert_eq!(haversine_distance_m(&p, &p), 0.0);
    }

    #[test]
    fn test_same_points_are_equivalent() {
        let a = set(&[(3.3, 4.4), (4.4, 5.5)]);
        assert!(is_equivalent(Some(&a), Some(&a.clone())));
    }

    #[test]
    fn test_nearby_points_are_equivalent() {
        let a = set(&[(13.4, 52.5), (13.5, 52.6)]);
        // ~55 m north of each reference point
        let near = set(&[(13.4, 52.5005), (13.5, 52.6005)]);
        assert!(is_equivalent(Some(&a), Some(&near)));
        assert!(!is_equivalent_within(Some(&a), Some(&near), 50.0));
    }

    #[test]
    fn test_one_far_point_breaks_equivalence() {
        let a = set(&[(2.2, 3.3), (3.3, 4.4), (4.4, 5.5)]);
        let b = set(&[(2.2, 3.3), (5.5, 6.6), (4.4, 5.5)]);
        assert!(!is_equivalent(Some(&a), Some(&b)));
    }

    #[test]
    fn test_length_mismatch() {
        let a = set(&[(3.3, 4.4), (4.4, 5.5)]);
        let b = set(&[(4.4, 5.5)]);
        assert!(!is_equivalent(Some(&a), Some(&b)));
    }

    #[test]
    fn test_missing_or_empty() {
        let a = set(&[(3.3, 4.4)]);
        let empty = WaypointSet::default();
        assert!(!is_equivalent(None, Some(&a)));
        assert!(!is_equivalent(Some(&a), None));
        assert!(!is_equivalent(Some(&empty), Some(&empty)));
    }

    #[test]
    fn test_index_order_matters() {
        let a = set(&[(3.3, 4.4), (4.4, 5.5)]);
        let reversed = set(&[(4.4, 5.5), (3.3, 4.4)]);
        assert!(!is_equivalent(Some(&a), Some(&reversed)));
    }

    fn arb_set() -> impl Strategy<Value = WaypointSet> {
        prop::collection::vec((-180.0f64..180.0, -85.0f64..85.0), 0..5)
            .prop_map(|pts| set(&pts))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Repeated calls give the same answer.
        #[test]
        fn prop_equivalence_deterministic(a in arb_set(), b in arb_set()) {
            prop_assert_eq!(is_equivalent(Some(&a), Some(&b)), is_equivalent(Some(&a), Some(&b)));
        }

        /// Swapping both sides pairs the same indices, so the answer holds.
        #[test]
        fn prop_equivalence_swap_sides(a in arb_set(), b in arb_set()) {
            prop_assert_eq!(is_equivalent(Some(&a), Some(&b)), is_equivalent(Some(&b), Some(&a)));
        }

        /// A non-empty set is always the same trip as itself.
        #[test]
        fn prop_equivalence_reflexive(a in arb_set()) {
            prop_assert_eq!(is_equivalent(Some(&a), Some(&a)), !a.is_empty());
        }
    }
}

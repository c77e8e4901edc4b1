//! Waypoint snapshots used to decide whether a replaced route is the same trip
//!
//! Only leg-end waypoints matter: the origin is always dropped, and
//! EV-charging stops injected by the router are not destinations.

mod equivalence;

use serde::{Deserialize, Serialize};

pub use equivalence::{haversine_distance_m, is_equivalent, is_equivalent_within, EQUIVALENCE_THRESHOLD_M};

/// A WGS84 coordinate in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub longitude: f64,
    pub latitude: f64,
}

impl GeoPoint {
    /// A point from WGS84 degrees, longitude first
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }
}

/// Why a waypoint is on the route
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaypointKind {
    /// A destination requested by the user
    #[default]
    Regular,
    /// A charging stop added by the router
    EvCharging,
}

/// A waypoint on a route
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub location: GeoPoint,
    #[serde(default)]
    pub kind: WaypointKind,
}

impl Waypoint {
    /// A stop the driver navigates to
    pub fn regular(longitude: f64, latitude: f64) -> Self {
        Self {
            location: GeoPoint::new(longitude, latitude),
            kind: WaypointKind::Regular,
        }
    }

    /// A charging stop inserted by the router
    pub fn ev_charging(longitude: f64, latitude: f64) -> Self {
        Self {
            location: GeoPoint::new(longitude, latitude),
            kind: WaypointKind::EvCharging,
        }
    }

    /// Whether the stop counts when comparing trips
    pub fn is_destination(&self) -> bool {
        self.kind == WaypointKind::Regular
    }
}

/// Ordered leg-end points of a route, origin excluded
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WaypointSet(Vec<GeoPoint>);

impl WaypointSet {
    pub fn new(points: Vec<GeoPoint>) -> Self {
        Self(points)
    }

    /// Build the set for a whole route: charging stops and the origin are dropped
    pub fn from_route(waypoints: &[Waypoint]) -> Self {
        Self(destinations(waypoints).skip(1).collect())
    }

    /// Points in route order
    pub fn points(&self) -> &[GeoPoint] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<GeoPoint> for WaypointSet {
    fn from_iter<I: IntoIterator<Item = GeoPoint>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Progress snapshot of the route currently being billed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteProgress {
    /// Every waypoint of the route, origin included
    pub waypoints: Vec<Waypoint>,
    /// Destinations not reached yet
    pub remaining_waypoints: usize,
}

impl RouteProgress {
    /// Progress along `waypoints` with `remaining_waypoints` not yet reached
    pub fn new(waypoints: Vec<Waypoint>, remaining_waypoints: usize) -> Self {
        Self {
            waypoints,
            remaining_waypoints,
        }
    }

    /// Destinations still ahead; the origin is dropped even before departure
    pub fn remaining(&self) -> WaypointSet {
        let points: Vec<GeoPoint> = destinations(&self.waypoints).collect();
        let reached = points.len().saturating_sub(self.remaining_waypoints).max(1);
        points.into_iter().skip(reached).collect()
    }
}

fn destinations(waypoints: &[Waypoint]) -> impl Iterator<Item = GeoPoint> + '_ {
    waypoints
        .iter()
        .filter(|w| w.is_destination())
        .map(|w| w.location)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points(set: &WaypointSet) -> Vec<(f64, f64)> {
        set.points().iter().map(|p| (p.longitude, p.latitude)).collect()
    }

    #[test]
    fn test_from_route_drops_origin() {
        let set = WaypointSet::from_route(&[
            Waypoint::regular(1.1, 2.2),
            Waypoint::regular(3.3, 4.4),
            Waypoint::regular(4.4, 5.5),
        ]);
        assert_eq!(points(&set), vec![(3.3, 4.4), (4.4, 5.5)]);
    }

    #[test]
    fn test_from_route_skips_charging_stops() {
        let set = WaypointSet::from_route(&[
            Waypoint::regular(1.1, 2.2),
            Waypoint::ev_charging(5.5, 6.6),
            Waypoint::regular(4.4, 5.5),
        ]);
        assert_eq!(points(&set), vec![(4.4, 5.5)]);
    }

    #[test]
    fn test_remaining_before_departure() {
        let progress = RouteProgress::new(
            vec![
                Waypoint::regular(1.1, 2.2),
                Waypoint::regular(3.3, 4.4),
                Waypoint::regular(4.4, 5.5),
            ],
            3,
        );
        // origin is never part of the remaining set
        assert_eq!(points(&progress.remaining()), vec![(3.3, 4.4), (4.4, 5.5)]);
    }

    #[test]
    fn test_remaining_mid_route() {
        let progress = RouteProgress::new(
            vec![
                Waypoint::regular(2.2, 3.3),
                Waypoint::regular(6.6, 7.7),
                Waypoint::ev_charging(5.5, 6.6),
                Waypoint::regular(3.3, 4.4),
                Waypoint::regular(4.4, 5.5),
            ],
            2,
        );
        assert_eq!(points(&progress.remaining()), vec![(3.3, 4.4), (4.4, 5.5)]);
    }

    #[test]
    fn test_remaining_finished_route() {
        let progress = RouteProgress::new(
            vec![Waypoint::regular(1.1, 2.2), Waypoint::regular(3.3, 4.4)],
            0,
        );
        assert!(progress.remaining().is_empty());
    }

    #[test]
    fn test_waypoint_kind_defaults_to_regular() {
        let wp: Waypoint =
            serde_json::from_str(r#"{"location":{"longitude":1.0,"latitude":2.0}}"#).unwrap();
        assert!(wp.is_destination());
    }
}

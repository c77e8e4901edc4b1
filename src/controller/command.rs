//! Commands accepted by the billing controller

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::error::Result;
use crate::session::NavigationMode;
use crate::waypoints::{RouteProgress, Waypoint, WaypointSet};

/// A signal applied to the state machine
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    ModeChanged(NavigationMode),
    RouteReplaced {
        old_remaining: Option<WaypointSet>,
        new_remaining: Option<WaypointSet>,
    },
    LegStarted,
    Shutdown,
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::ModeChanged(mode) => write!(f, "MODE_CHANGED ({})", mode),
            Command::RouteReplaced { .. } => write!(f, "ROUTE_REPLACED"),
            Command::LegStarted => write!(f, "LEG_STARTED"),
            Command::Shutdown => write!(f, "SHUTDOWN"),
        }
    }
}

/// A command plus the channel its result is acknowledged on
pub(crate) struct Envelope {
    pub command: Command,
    pub reply: oneshot::Sender<Result<()>>,
}

/// Trip signals as delivered by a host over a serialized stream
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TripEvent {
    /// The trip session switched navigation mode
    ModeChanged { mode: NavigationMode },

    /// The developer set a new route
    RouteReplaced {
        /// Progress along the route being replaced, if any
        #[serde(default)]
        progress: Option<RouteProgress>,
        /// All waypoints of the new route, origin included
        #[serde(default)]
        waypoints: Option<Vec<Waypoint>>,
    },

    /// A new leg of the current route started
    LegStarted,
}

impl From<TripEvent> for Command {
    fn from(event: TripEvent) -> Self {
        match event {
            TripEvent::ModeChanged { mode } => Command::ModeChanged(mode),
            TripEvent::RouteReplaced {
                progress,
                waypoints,
            } => Command::RouteReplaced {
                old_remaining: progress.as_ref().map(RouteProgress::remaining),
                new_remaining: waypoints.as_deref().map(WaypointSet::from_route),
            },
            TripEvent::LegStarted => Command::LegStarted,
        }
    }
}

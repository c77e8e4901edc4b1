//! trip-billing: billing session control for navigation trips
//!
//! Tracks which billable usage session should be active while a trip
//! moves between Idle, Free Drive and Active Guidance, and drives an
//! external metering service accordingly:
//! - at most one session is ever running or paused
//! - a different kind of session is stopped before a new one begins
//! - every switch into a non-Idle mode sends one usage pulse
//!
//! Hosts build a [`SessionStateMachine`] over a [`BillingGateway`] and a
//! [`CredentialProvider`], attach it with [`BillingController::attach`]
//! and feed trip signals through the returned [`BillingHandle`].
//!
//! Route replacements must be delivered, and awaited, before the mode
//! change the same replacement causes.

pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod gateway;
pub mod lifecycle;
pub mod session;
pub mod waypoints;

pub use config::{BillingConfig, Config};
pub use controller::{BillingController, BillingHandle, Command, TripEvent};
pub use error::{BillingError, GatewayError, GatewayErrorCode, Result};
pub use events::BillingEvent;
pub use gateway::{
    BillingGateway, CredentialProvider, EnvCredential, ErrorReporter, GatewayCall, GatewayReport,
    InMemoryGateway, MeteringAdapter, MeteringBackend, RecordedCall, StaticCredential,
};
pub use session::{
    BillingSessionRecord, NavigationMode, SessionKind, SessionStateMachine, SessionStatus, Validity,
};
pub use waypoints::{is_equivalent, GeoPoint, RouteProgress, Waypoint, WaypointKind, WaypointSet};

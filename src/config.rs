//! Configuration loading and management

use std::time::Duration;

use anyhow::{Context, Result};

use crate::session::Validity;
use crate::waypoints::EQUIVALENCE_THRESHOLD_M;

/// Environment variable prefix for all overrides
const ENV_PREFIX: &str = "TRIP_BILLING_";

/// Default name of the variable holding the access credential
pub const DEFAULT_CREDENTIAL_VAR: &str = "TRIP_BILLING_ACCESS_TOKEN";

/// Tunables of the billing state machine and its controller
#[derive(Debug, Clone, PartialEq)]
pub struct BillingConfig {
    /// Validity requested for Free Drive sessions
    pub free_drive_validity: Validity,

    /// Validity requested for Active Guidance sessions
    pub active_guidance_validity: Validity,

    /// Distance under which two waypoints are the same destination
    pub waypoint_threshold_m: f64,

    /// User agent passed to the backend, empty for its default
    pub user_agent: String,

    /// Capacity of the controller's command channel
    pub command_capacity: usize,

    /// Capacity of the billing event broadcast channel
    pub event_capacity: usize,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            free_drive_validity: Validity::Window(Duration::from_secs(60 * 60)),
            active_guidance_validity: Validity::BackendDefault,
            waypoint_threshold_m: EQUIVALENCE_THRESHOLD_M,
            user_agent: String::new(),
            command_capacity: 32,
            event_capacity: 64,
        }
    }
}

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// State machine and controller settings
    pub billing: BillingConfig,

    /// Environment variable the credential is read from on every call
    pub credential_var: String,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));
        let mut billing = BillingConfig::default();

        if let Some(secs) = var("FREE_DRIVE_VALIDITY_SECS") {
            billing.free_drive_validity = parse_validity(&secs)
                .context("invalid TRIP_BILLING_FREE_DRIVE_VALIDITY_SECS")?;
        }
        if let Some(secs) = var("ACTIVE_GUIDANCE_VALIDITY_SECS") {
            billing.active_guidance_validity = parse_validity(&secs)
                .context("invalid TRIP_BILLING_ACTIVE_GUIDANCE_VALIDITY_SECS")?;
        }
        if let Some(meters) = var("WAYPOINT_THRESHOLD_M") {
            billing.waypoint_threshold_m = meters
                .parse()
                .context("invalid TRIP_BILLING_WAYPOINT_THRESHOLD_M")?;
        }
        if let Some(user_agent) = var("USER_AGENT") {
            billing.user_agent = user_agent;
        }
        if let Some(capacity) = var("COMMAND_CAPACITY") {
            billing.command_capacity = capacity
                .parse()
                .context("invalid TRIP_BILLING_COMMAND_CAPACITY")?;
        }
        if let Some(capacity) = var("EVENT_CAPACITY") {
            billing.event_capacity = capacity
                .parse()
                .context("invalid TRIP_BILLING_EVENT_CAPACITY")?;
        }

        let credential_var = var("CREDENTIAL_VAR").unwrap_or_else(|| DEFAULT_CREDENTIAL_VAR.to_string());

        Ok(Self {
            billing,
            credential_var,
        })
    }
}

/// Seconds, `0` meaning the backend default
fn parse_validity(secs: &str) -> Result<Validity> {
    let secs: u64 = secs.trim().parse()?;
    Ok(if secs == 0 {
        Validity::BackendDefault
    } else {
        Validity::Window(Duration::from_secs(secs))
    })
}

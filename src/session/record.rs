//! Session identity, status and the navigation modes that drive them

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// High-level navigation mode observed from the trip session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationMode {
    /// No trip in progress
    Idle,
    /// Map-following without a route
    FreeDrive,
    /// Following a route turn-by-turn
    ActiveGuidance,
}

impl Default for NavigationMode {
    fn default() -> Self {
        Self::Idle
    }
}

impl std::fmt::Display for NavigationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NavigationMode::Idle => write!(f, "Idle"),
            NavigationMode::FreeDrive => write!(f, "FreeDrive"),
            NavigationMode::ActiveGuidance => write!(f, "ActiveGuidance"),
        }
    }
}

/// The billable session products
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    FreeDriveUsage,
    ActiveGuidanceUsage,
}

impl SessionKind {
    /// Every kind the gateway may report a status for
    pub const ALL: [SessionKind; 2] = [SessionKind::ActiveGuidanceUsage, SessionKind::FreeDriveUsage];

    /// Human-readable name used in billing explanations
    pub fn public_name(&self) -> &'static str {
        match self {
            SessionKind::FreeDriveUsage => "Free Drive Trip Session",
            SessionKind::ActiveGuidanceUsage => "Active Guidance Trip Session",
        }
    }
}

impl std::fmt::Display for SessionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.public_name())
    }
}

/// Status of one session kind as tracked locally or reported by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    NoSession,
    Running,
    Paused,
}

impl SessionStatus {
    /// Running or paused
    pub fn is_active(&self) -> bool {
        !matches!(self, SessionStatus::NoSession)
    }
}

/// Requested lifetime of a session, enforced by the metering backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    /// Let the backend pick (currently up to 12 hours)
    BackendDefault,
    /// An explicit window
    Window(Duration),
}

impl Validity {
    /// Milliseconds as understood by the backend, `0` meaning default
    pub fn as_millis(&self) -> u64 {
        match self {
            Validity::BackendDefault => 0,
            Validity::Window(d) => d.as_millis() as u64,
        }
    }

    /// Inverse of [`Validity::as_millis`]
    pub fn from_millis(millis: u64) -> Self {
        if millis == 0 {
            Validity::BackendDefault
        } else {
            Validity::Window(Duration::from_millis(millis))
        }
    }
}

/// The single session that is currently running or paused
///
/// `None` in the owning machine means no session exists. Only a status of
/// `Running` or `Paused` is ever stored here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingSessionRecord {
    pub kind: SessionKind,
    pub status: SessionStatus,
}

impl BillingSessionRecord {
    /// A session of `kind` that is being metered
    pub fn running(kind: SessionKind) -> Self {
        Self {
            kind,
            status: SessionStatus::Running,
        }
    }

    /// A session of `kind` that is open but not metered
    pub fn paused(kind: SessionKind) -> Self {
        Self {
            kind,
            status: SessionStatus::Paused,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validity_millis() {
        assert_eq!(Validity::BackendDefault.as_millis(), 0);
        assert_eq!(Validity::Window(Duration::from_secs(3600)).as_millis(), 3_600_000);
        assert_eq!(Validity::from_millis(0), Validity::BackendDefault);
    }

    #[test]
    fn test_mode_deserialization() {
        let mode: NavigationMode = serde_json::from_str(r#""active_guidance""#).unwrap();
        assert_eq!(mode, NavigationMode::ActiveGuidance);
    }
}

//! Billing explanation events
//!
//! Every decision that touches the gateway is published on a broadcast
//! channel so hosts can show or log why a session changed.

use serde::{Deserialize, Serialize};

use crate::session::{NavigationMode, SessionKind};

/// Events emitted by the state machine as it drives the gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BillingEvent {
    /// A new session was begun
    SessionStarted { kind: SessionKind, reason: String },

    /// A running session was paused
    SessionPaused { kind: SessionKind, reason: String },

    /// A paused session was resumed
    SessionResumed { kind: SessionKind, reason: String },

    /// A session was stopped
    SessionStopped { kind: SessionKind, reason: String },

    /// A monthly-active-user pulse was sent
    UsagePulse { mode: NavigationMode },

    /// Resuming failed and a new session is begun instead
    ResumeFallback { kind: SessionKind, message: String },
}

impl BillingEvent {
    /// Session kind the event is about, if any
    pub fn kind(&self) -> Option<SessionKind> {
        match self {
            BillingEvent::SessionStarted { kind, .. }
            | BillingEvent::SessionPaused { kind, .. }
            | BillingEvent::SessionResumed { kind, .. }
            | BillingEvent::SessionStopped { kind, .. }
            | BillingEvent::ResumeFallback { kind, .. } => Some(*kind),
            BillingEvent::UsagePulse { .. } => None,
        }
    }
}

impl std::fmt::Display for BillingEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BillingEvent::SessionStarted { kind, reason } => {
                write!(f, "{} has been started because {}", kind, reason)
            }
            BillingEvent::SessionPaused { kind, reason } => {
                write!(f, "{} has been paused because {}", kind, reason)
            }
            BillingEvent::SessionResumed { kind, reason } => {
                write!(f, "{} has been resumed because {}", kind, reason)
            }
            BillingEvent::SessionStopped { kind, reason } => {
                write!(f, "{} has been stopped because {}", kind, reason)
            }
            BillingEvent::UsagePulse { mode } => write!(f, "usage pulse sent in {} mode", mode),
            BillingEvent::ResumeFallback { kind, message } => {
                write!(f, "failed to resume {} ({}), starting a new one", kind, message)
            }
        }
    }
}

//! Boundary to the metering service
//!
//! [`BillingGateway`] is the typed contract the state machine talks to.
//! [`MeteringAdapter`] implements it over a raw, SKU-string keyed
//! [`MeteringBackend`]; [`InMemoryGateway`] is an in-process stand-in used
//! for dry runs and tests.
//!
//! `begin`, `resume` and the usage pulse report failures asynchronously
//! through an [`ErrorReporter`]. Reports land on the state machine's own
//! channel so they are applied by the same loop that applies events.

mod adapter;
mod credentials;
mod memory;

use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{GatewayError, Result};
use crate::session::{SessionKind, SessionStatus, Validity};

pub use adapter::{
    sku_id, MeteringAdapter, MeteringBackend, RawErrorCallback, RawServiceError,
    ACTIVE_GUIDANCE_SKU, FREE_DRIVE_SKU, USAGE_PULSE_SKU,
};
pub use credentials::{CredentialProvider, EnvCredential, StaticCredential};
pub use memory::{InMemoryGateway, RecordedCall};

/// Typed metering operations, keyed by session kind
pub trait BillingGateway: Send {
    /// Start a metered session
    fn begin(&self, credential: &str, kind: SessionKind, validity: Validity, reporter: ErrorReporter);

    /// Pause a session, best effort
    fn pause(&self, kind: SessionKind);

    /// Resume a paused session; a `ResumeFailed` report means it is gone
    fn resume(&self, kind: SessionKind, reporter: ErrorReporter);

    /// Stop a session, best effort
    fn stop(&self, kind: SessionKind);

    /// Current backend status of one session kind
    fn status(&self, kind: SessionKind) -> Result<SessionStatus>;

    /// One-shot monthly-active-user event
    fn trigger_usage_pulse(&self, credential: &str, reporter: ErrorReporter);
}

/// The gateway call an asynchronous error belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayCall {
    Begin { kind: SessionKind, validity: Validity },
    /// `generation` identifies the session instance the resume was issued for
    Resume {
        kind: SessionKind,
        validity: Validity,
        generation: u64,
    },
    UsagePulse,
}

impl std::fmt::Display for GatewayCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayCall::Begin { kind, .. } => write!(f, "begin({})", kind),
            GatewayCall::Resume { kind, .. } => write!(f, "resume({})", kind),
            GatewayCall::UsagePulse => write!(f, "usage_pulse"),
        }
    }
}

/// An error delivered back to the state machine
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayReport {
    pub call: GatewayCall,
    pub error: GatewayError,
}

/// One-shot sink for the error of a single gateway call
///
/// Safe to move to any thread. Dropping it without reporting means the
/// call succeeded.
#[derive(Debug)]
pub struct ErrorReporter {
    call: GatewayCall,
    tx: mpsc::UnboundedSender<GatewayReport>,
}

impl ErrorReporter {
    pub(crate) fn new(call: GatewayCall, tx: mpsc::UnboundedSender<GatewayReport>) -> Self {
        Self { call, tx }
    }

    /// The call this reporter belongs to
    pub fn call(&self) -> GatewayCall {
        self.call
    }

    /// Deliver the call's error to the state machine
    pub fn report(self, error: GatewayError) {
        let report = GatewayReport {
            call: self.call,
            error,
        };
        if self.tx.send(report).is_err() {
            debug!(call = %self.call, "gateway error reported after the state machine was dropped");
        }
    }
}

//! Adapter from the typed gateway contract to a raw metering backend
//!
//! The backend speaks SKU identifier strings, millisecond validity and
//! string status/error codes. Everything is normalized here so the state
//! machine only ever sees [`SessionKind`], [`SessionStatus`] and
//! [`GatewayErrorCode`].

use tracing::trace;

use super::{BillingGateway, ErrorReporter};
use crate::config::BillingConfig;
use crate::error::{BillingError, GatewayError, GatewayErrorCode, Result};
use crate::session::{SessionKind, SessionStatus, Validity};

/// SKU of an Active Guidance trip session
pub const ACTIVE_GUIDANCE_SKU: &str = "nav2_ses_trip";
/// SKU of a Free Drive trip session
pub const FREE_DRIVE_SKU: &str = "nav2_ses_fdtrip";
/// SKU of the monthly-active-user pulse
pub const USAGE_PULSE_SKU: &str = "nav2_ses_mau";

const STATUS_NO_SESSION: &str = "no_session";
const STATUS_ACTIVE: &str = "session_active";
const STATUS_PAUSED: &str = "session_paused";

const CODE_RESUME_FAILED: &str = "RESUME_FAILED";
const CODE_TOKEN_VALIDATION_FAILED: &str = "TOKEN_VALIDATION_FAILED";

/// Map a session kind to its backend SKU identifier
pub fn sku_id(kind: SessionKind) -> &'static str {
    match kind {
        SessionKind::ActiveGuidanceUsage => ACTIVE_GUIDANCE_SKU,
        SessionKind::FreeDriveUsage => FREE_DRIVE_SKU,
    }
}

/// Error as reported by the raw backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawServiceError {
    pub code: Option<String>,
    pub message: String,
}

/// Error callback handed to the raw backend, may run on any thread
pub type RawErrorCallback = Box<dyn FnOnce(RawServiceError) + Send>;

/// The metering service as exposed by the platform
///
/// An empty user agent selects the backend default, and a validity of `0`
/// selects the backend's default session lifetime.
pub trait MeteringBackend: Send {
    fn begin_billing_session(
        &self,
        access_token: &str,
        user_agent: &str,
        sku_id: &str,
        validity_ms: u64,
        on_error: RawErrorCallback,
    );

    fn pause_billing_session(&self, sku_id: &str);

    fn resume_billing_session(&self, sku_id: &str, on_error: RawErrorCallback);

    fn stop_billing_session(&self, sku_id: &str);

    fn session_status(&self, sku_id: &str) -> String;

    fn trigger_user_billing_event(
        &self,
        access_token: &str,
        user_agent: &str,
        sku_id: &str,
        on_error: RawErrorCallback,
    );
}

/// [`BillingGateway`] over a [`MeteringBackend`]
pub struct MeteringAdapter<B> {
    backend: B,
    user_agent: String,
}

impl<B: MeteringBackend> MeteringAdapter<B> {
    /// Wrap `backend`, sending `user_agent` with begin and pulse calls
    pub fn new(backend: B, user_agent: impl Into<String>) -> Self {
        Self {
            backend,
            user_agent: user_agent.into(),
        }
    }

    /// Wrap `backend` with the user agent from `config`
    pub fn from_config(backend: B, config: &BillingConfig) -> Self {
        Self::new(backend, config.user_agent.clone())
    }

    /// The wrapped backend
    pub fn backend(&self) -> &B {
        &self.backend
    }
}

fn normalize_error(raw: RawServiceError) -> GatewayError {
    let code = match raw.code.as_deref() {
        Some(CODE_RESUME_FAILED) => GatewayErrorCode::ResumeFailed,
        Some(CODE_TOKEN_VALIDATION_FAILED) => GatewayErrorCode::TokenValidationFailed,
        other => GatewayErrorCode::Unrecognized(other.map(str::to_owned)),
    };
    GatewayError::new(code, raw.message)
}

fn forward_to(reporter: ErrorReporter) -> RawErrorCallback {
    Box::new(move |raw| reporter.report(normalize_error(raw)))
}

impl<B: MeteringBackend> BillingGateway for MeteringAdapter<B> {
    fn begin(&self, credential: &str, kind: SessionKind, validity: Validity, reporter: ErrorReporter) {
        trace!(sku = sku_id(kind), validity_ms = validity.as_millis(), "begin billing session");
        self.backend.begin_billing_session(
            credential,
            &self.user_agent,
            sku_id(kind),
            validity.as_millis(),
            forward_to(reporter),
        );
    }

    fn pause(&self, kind: SessionKind) {
        self.backend.pause_billing_session(sku_id(kind));
    }

    fn resume(&self, kind: SessionKind, reporter: ErrorReporter) {
        self.backend.resume_billing_session(sku_id(kind), forward_to(reporter));
    }

    fn stop(&self, kind: SessionKind) {
        self.backend.stop_billing_session(sku_id(kind));
    }

    fn status(&self, kind: SessionKind) -> Result<SessionStatus> {
        let raw = self.backend.session_status(sku_id(kind));
        match raw.as_str() {
            STATUS_NO_SESSION => Ok(SessionStatus::NoSession),
            STATUS_ACTIVE => Ok(SessionStatus::Running),
            STATUS_PAUSED => Ok(SessionStatus::Paused),
            _ => Err(BillingError::UnknownGatewayError {
                call: format!("status({})", kind),
                message: format!("unrecognized session status {:?}", raw),
            }),
        }
    }

    fn trigger_usage_pulse(&self, credential: &str, reporter: ErrorReporter) {
        self.backend.trigger_user_billing_event(
            credential,
            &self.user_agent,
            USAGE_PULSE_SKU,
            forward_to(reporter),
        );
    }
}

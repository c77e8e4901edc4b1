//! Core billing session state machine
//!
//! Holds the single [`BillingSessionRecord`] and applies the transition
//! rules for mode changes, route replacement, leg boundaries and shutdown.
//! All methods take `&mut self`; the controller serializes access.

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use super::record::{BillingSessionRecord, NavigationMode, SessionKind, SessionStatus, Validity};
use crate::config::BillingConfig;
use crate::error::{BillingError, GatewayErrorCode, Result};
use crate::events::BillingEvent;
use crate::gateway::{BillingGateway, CredentialProvider, ErrorReporter, GatewayCall, GatewayReport};
use crate::waypoints::{is_equivalent_within, WaypointSet};

/// Log target for billing decisions
const EXPLANATION: &str = "billing_explanation";

/// The billing session state machine
pub struct SessionStateMachine<G, C> {
    gateway: G,
    credentials: C,
    config: BillingConfig,
    /// The one session that is running or paused, if any
    record: Option<BillingSessionRecord>,
    /// Last mode applied, for ignoring repeats
    last_mode: Option<NavigationMode>,
    /// Bumped whenever `record` starts tracking a new begin or resume
    generation: u64,
    report_tx: mpsc::UnboundedSender<GatewayReport>,
    event_tx: broadcast::Sender<BillingEvent>,
}

impl<G, C> SessionStateMachine<G, C>
where
    G: BillingGateway,
    C: CredentialProvider,
{
    /// Create a state machine with no session
    ///
    /// The returned receiver yields errors the gateway reports
    /// asynchronously; feed them back through [`Self::handle_gateway_report`].
    pub fn new(
        gateway: G,
        credentials: C,
        config: BillingConfig,
        event_tx: broadcast::Sender<BillingEvent>,
    ) -> (Self, mpsc::UnboundedReceiver<GatewayReport>) {
        let (report_tx, report_rx) = mpsc::unbounded_channel();
        let machine = Self {
            gateway,
            credentials,
            config,
            record: None,
            last_mode: None,
            generation: 0,
            report_tx,
            event_tx,
        };
        (machine, report_rx)
    }

    /// The session currently running or paused
    pub fn record(&self) -> Option<BillingSessionRecord> {
        self.record
    }

    /// The gateway calls are issued to
    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Settings the machine was built with
    pub fn config(&self) -> &BillingConfig {
        &self.config
    }

    /// Adopt the session the gateway reports as running or paused
    ///
    /// Used at attach time, when the backend may already hold a session
    /// from an earlier trip context.
    pub fn reconcile(&mut self) -> Result<()> {
        let active = self.active_gateway_session()?;
        if active != self.record {
            info!(target: EXPLANATION, from = ?self.record, to = ?active, "adopted gateway session status");
        }
        self.record = active;
        self.generation += 1;
        Ok(())
    }

    /// Apply a navigation mode change
    pub fn on_navigation_mode_changed(&mut self, mode: NavigationMode) -> Result<()> {
        self.active_gateway_session()?;

        if self.last_mode == Some(mode) {
            debug!(%mode, "navigation mode unchanged, ignoring");
            return Ok(());
        }
        info!(from = ?self.last_mode, to = %mode, record = ?self.record, "navigation mode changed");

        if mode != NavigationMode::Idle {
            self.trigger_usage_pulse(mode);
        }

        match mode {
            NavigationMode::Idle => self.pause_current("navigation is idle"),
            NavigationMode::FreeDrive => self.resume_or_begin(
                SessionKind::FreeDriveUsage,
                self.config.free_drive_validity,
                "navigation is in free drive",
            ),
            NavigationMode::ActiveGuidance => self.resume_or_begin(
                SessionKind::ActiveGuidanceUsage,
                self.config.active_guidance_validity,
                "navigation is in active guidance",
            ),
        }

        self.last_mode = Some(mode);
        Ok(())
    }

    /// Apply a developer-initiated route replacement
    ///
    /// Must be called before the mode change caused by the same
    /// replacement is applied.
    pub fn on_route_replaced(
        &mut self,
        old_remaining: Option<&WaypointSet>,
        new_remaining: Option<&WaypointSet>,
    ) -> Result<()> {
        self.active_gateway_session()?;

        let current = match self.record {
            Some(record) if record.kind == SessionKind::ActiveGuidanceUsage => record,
            _ => {
                debug!(record = ?self.record, "route replaced outside active guidance, ignoring");
                return Ok(());
            }
        };

        if is_equivalent_within(old_remaining, new_remaining, self.config.waypoint_threshold_m) {
            info!(target: EXPLANATION, "route replaced with the same destinations, keeping session");
            return Ok(());
        }

        let was_paused = current.status == SessionStatus::Paused;
        let reason = format!(
            "destination has been changed. Old waypoints: {:?}, new waypoints: {:?}",
            old_remaining.map(WaypointSet::points),
            new_remaining.map(WaypointSet::points),
        );
        self.begin_billing_session(
            SessionKind::ActiveGuidanceUsage,
            self.config.active_guidance_validity,
            &reason,
        );

        if was_paused {
            self.pause(
                SessionKind::ActiveGuidanceUsage,
                "it used to be paused before destinations update",
            );
        }
        Ok(())
    }

    /// Apply the start of a new route leg
    pub fn on_leg_boundary_crossed(&mut self) -> Result<()> {
        self.active_gateway_session()?;

        match self.record {
            Some(record) if record.kind == SessionKind::ActiveGuidanceUsage => {
                self.begin_billing_session(
                    SessionKind::ActiveGuidanceUsage,
                    self.config.active_guidance_validity,
                    "navigation switched to the next route leg",
                );
                Ok(())
            }
            other => {
                let err = BillingError::InvariantViolation(format!(
                    "next route leg started while an active guidance session is not running, actual session: {:?}",
                    other
                ));
                error!(%err, "leg boundary rejected");
                Err(err)
            }
        }
    }

    /// Stop whatever session is left; safe to call repeatedly
    pub fn on_shutdown(&mut self) -> Result<()> {
        if let Some(record) = self.record.take() {
            self.gateway.stop(record.kind);
            self.explain(BillingEvent::SessionStopped {
                kind: record.kind,
                reason: "navigation is shutting down".into(),
            });
        }
        self.last_mode = None;
        Ok(())
    }

    /// Apply an error the gateway reported for an earlier call
    pub fn handle_gateway_report(&mut self, report: GatewayReport) -> Result<()> {
        let GatewayReport { call, error: err } = report;
        match err.code {
            GatewayErrorCode::ResumeFailed => {
                warn!(%call, %err, "gateway error");
                self.fall_back_to_begin(call, err.message);
                Ok(())
            }
            GatewayErrorCode::TokenValidationFailed => {
                warn!(%call, %err, "gateway error");
                Ok(())
            }
            GatewayErrorCode::Unrecognized(_) => {
                error!(%call, %err, "unrecognized gateway error");
                Err(BillingError::UnknownGatewayError {
                    call: call.to_string(),
                    message: err.to_string(),
                })
            }
        }
    }

    fn fall_back_to_begin(&mut self, call: GatewayCall, message: String) {
        let (kind, validity, generation) = match call {
            GatewayCall::Resume {
                kind,
                validity,
                generation,
            } => (kind, validity, generation),
            other => {
                warn!(call = %other, "resume failure reported for a non-resume call, ignoring");
                return;
            }
        };

        // a later begin or resume already replaced the session this resume was for
        if generation != self.generation {
            debug!(%kind, generation, current = self.generation, "stale resume failure, ignoring");
            return;
        }

        match self.record {
            Some(record) if record.kind == kind && record.status == SessionStatus::Running => {
                // the backend no longer has this session, so nothing to stop
                self.record = None;
                self.explain(BillingEvent::ResumeFallback {
                    kind,
                    message: message.clone(),
                });
                self.begin_billing_session(kind, validity, &format!("resuming failed ({})", message));
            }
            Some(record) if record.kind == kind => {
                info!(target: EXPLANATION, %kind, "resume failed after the session was paused again, dropping it");
                self.record = None;
            }
            other => {
                debug!(%kind, record = ?other, "resume failure for a session no longer tracked, ignoring");
            }
        }
    }

    fn resume_or_begin(&mut self, kind: SessionKind, validity: Validity, reason: &str) {
        match self.record {
            Some(record) if record.kind == kind => {
                self.generation += 1;
                let reporter = self.reporter(GatewayCall::Resume {
                    kind,
                    validity,
                    generation: self.generation,
                });
                self.gateway.resume(kind, reporter);
                self.record = Some(BillingSessionRecord::running(kind));
                self.explain(BillingEvent::SessionResumed {
                    kind,
                    reason: reason.to_owned(),
                });
            }
            _ => self.begin_billing_session(kind, validity, reason),
        }
    }

    /// Stop the current session, if any, and begin a fresh one
    fn begin_billing_session(&mut self, kind: SessionKind, validity: Validity, reason: &str) {
        if let Some(previous) = self.record.take() {
            self.gateway.stop(previous.kind);
            self.explain(BillingEvent::SessionStopped {
                kind: previous.kind,
                reason: reason.to_owned(),
            });
        }

        let credential = self.credentials.credential();
        let reporter = self.reporter(GatewayCall::Begin { kind, validity });
        self.gateway.begin(&credential, kind, validity, reporter);
        self.record = Some(BillingSessionRecord::running(kind));
        self.generation += 1;
        self.explain(BillingEvent::SessionStarted {
            kind,
            reason: reason.to_owned(),
        });
    }

    fn pause_current(&mut self, reason: &str) {
        match self.record {
            Some(record) => self.pause(record.kind, reason),
            None => debug!("no session to pause"),
        }
    }

    fn pause(&mut self, kind: SessionKind, reason: &str) {
        self.gateway.pause(kind);
        self.record = Some(BillingSessionRecord::paused(kind));
        self.explain(BillingEvent::SessionPaused {
            kind,
            reason: reason.to_owned(),
        });
    }

    fn trigger_usage_pulse(&mut self, mode: NavigationMode) {
        let credential = self.credentials.credential();
        let reporter = self.reporter(GatewayCall::UsagePulse);
        self.gateway.trigger_usage_pulse(&credential, reporter);
        self.explain(BillingEvent::UsagePulse { mode });
    }

    /// The single session the gateway reports as running or paused
    ///
    /// More than one is a gateway anomaly and never resolved by picking one.
    fn active_gateway_session(&self) -> Result<Option<BillingSessionRecord>> {
        let mut statuses = Vec::with_capacity(SessionKind::ALL.len());
        for kind in SessionKind::ALL {
            statuses.push((kind, self.gateway.status(kind)?));
        }

        let mut active = statuses.iter().filter(|(_, status)| status.is_active());
        let first = active.next().map(|&(kind, status)| BillingSessionRecord { kind, status });
        if active.next().is_some() {
            let err = BillingError::more_than_one_session(&statuses);
            error!(%err, "gateway consistency check failed");
            return Err(err);
        }
        Ok(first)
    }

    fn reporter(&self, call: GatewayCall) -> ErrorReporter {
        ErrorReporter::new(call, self.report_tx.clone())
    }

    fn explain(&self, event: BillingEvent) {
        info!(target: EXPLANATION, "{}", event);
        // no subscribers is fine
        let _ = self.event_tx.send(event);
    }
}

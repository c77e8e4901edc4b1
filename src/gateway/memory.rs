//! In-process gateway that tracks session statuses and records calls

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use super::{BillingGateway, ErrorReporter};
use crate::error::{GatewayError, Result};
use crate::session::{SessionKind, SessionStatus, Validity};

/// A call observed by the [`InMemoryGateway`], in issue order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCall {
    Begin { kind: SessionKind, validity: Validity },
    Pause(SessionKind),
    Resume(SessionKind),
    Stop(SessionKind),
    UsagePulse,
}

impl RecordedCall {
    /// Whether this is a begin of any kind
    pub fn is_begin(&self) -> bool {
        matches!(self, RecordedCall::Begin { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scripted {
    Begin,
    Resume,
    UsagePulse,
}

#[derive(Default)]
struct Inner {
    statuses: HashMap<SessionKind, SessionStatus>,
    calls: Vec<RecordedCall>,
    credentials: Vec<String>,
    failures: VecDeque<(Scripted, GatewayError)>,
    /// Reports held back until [`InMemoryGateway::release_reports`]
    held: Option<Vec<(ErrorReporter, GatewayError)>>,
}

impl Inner {
    fn take_failure(&mut self, call: Scripted) -> Option<GatewayError> {
        let idx = self.failures.iter().position(|(c, _)| *c == call)?;
        self.failures.remove(idx).map(|(_, err)| err)
    }

    fn set_status(&mut self, kind: SessionKind, status: SessionStatus) {
        self.statuses.insert(kind, status);
    }
}

/// Dry-run metering gateway
///
/// Clones share state, so a test can keep one clone while the state
/// machine owns another. Begin never stops other kinds on its own; that
/// is the caller's job.
#[derive(Clone, Default)]
pub struct InMemoryGateway {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryGateway {
    /// An empty gateway with no sessions
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Every call issued so far
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    /// Drain the call log
    pub fn take_calls(&self) -> Vec<RecordedCall> {
        std::mem::take(&mut self.lock().calls)
    }

    /// Credentials passed to begin and usage pulse calls
    pub fn credentials_seen(&self) -> Vec<String> {
        self.lock().credentials.clone()
    }

    /// Force the backend status of a kind
    pub fn set_status(&self, kind: SessionKind, status: SessionStatus) {
        self.lock().set_status(kind, status);
    }

    /// Kinds currently running or paused on the backend
    pub fn active_kinds(&self) -> Vec<SessionKind> {
        let inner = self.lock();
        SessionKind::ALL
            .into_iter()
            .filter(|k| inner.statuses.get(k).is_some_and(|s| s.is_active()))
            .collect()
    }

    /// Report `error` for the next begin call
    pub fn fail_next_begin(&self, error: GatewayError) {
        self.lock().failures.push_back((Scripted::Begin, error));
    }

    /// Report `error` for the next resume call
    pub fn fail_next_resume(&self, error: GatewayError) {
        self.lock().failures.push_back((Scripted::Resume, error));
    }

    /// Report `error` for the next usage pulse
    pub fn fail_next_usage_pulse(&self, error: GatewayError) {
        self.lock().failures.push_back((Scripted::UsagePulse, error));
    }

    /// Hold scripted errors back instead of reporting them from the call
    ///
    /// Backend statuses still change immediately; only delivery is late.
    pub fn hold_reports(&self) {
        let mut inner = self.lock();
        if inner.held.is_none() {
            inner.held = Some(Vec::new());
        }
    }

    /// Deliver every held report, in call order, and stop holding
    ///
    /// Returns how many were delivered.
    pub fn release_reports(&self) -> usize {
        let held = self.lock().held.take().unwrap_or_default();
        let count = held.len();
        for (reporter, err) in held {
            reporter.report(err);
        }
        count
    }

    fn deliver(&self, reporter: ErrorReporter, err: GatewayError) {
        {
            let mut inner = self.lock();
            if let Some(held) = inner.held.as_mut() {
                debug!(call = %reporter.call(), "holding gateway report");
                held.push((reporter, err));
                return;
            }
        }
        reporter.report(err);
    }
}

impl BillingGateway for InMemoryGateway {
    fn begin(&self, credential: &str, kind: SessionKind, validity: Validity, reporter: ErrorReporter) {
        let failure = {
            let mut inner = self.lock();
            inner.calls.push(RecordedCall::Begin { kind, validity });
            inner.credentials.push(credential.to_owned());
            let failure = inner.take_failure(Scripted::Begin);
            let status = if failure.is_some() {
                SessionStatus::NoSession
            } else {
                SessionStatus::Running
            };
            inner.set_status(kind, status);
            failure
        };
        debug!(%kind, validity_ms = validity.as_millis(), "dry-run begin");
        if let Some(err) = failure {
            self.deliver(reporter, err);
        }
    }

    fn pause(&self, kind: SessionKind) {
        let mut inner = self.lock();
        inner.calls.push(RecordedCall::Pause(kind));
        if inner.statuses.get(&kind) == Some(&SessionStatus::Running) {
            inner.set_status(kind, SessionStatus::Paused);
        }
    }

    fn resume(&self, kind: SessionKind, reporter: ErrorReporter) {
        let failure = {
            let mut inner = self.lock();
            inner.calls.push(RecordedCall::Resume(kind));
            let failure = inner.take_failure(Scripted::Resume);
            if failure.is_some() {
                inner.set_status(kind, SessionStatus::NoSession);
            } else if inner.statuses.get(&kind) == Some(&SessionStatus::Paused) {
                inner.set_status(kind, SessionStatus::Running);
            }
            failure
        };
        if let Some(err) = failure {
            self.deliver(reporter, err);
        }
    }

    fn stop(&self, kind: SessionKind) {
        let mut inner = self.lock();
        inner.calls.push(RecordedCall::Stop(kind));
        inner.set_status(kind, SessionStatus::NoSession);
    }

    fn status(&self, kind: SessionKind) -> Result<SessionStatus> {
        Ok(self
            .lock()
            .statuses
            .get(&kind)
            .copied()
            .unwrap_or(SessionStatus::NoSession))
    }

    fn trigger_usage_pulse(&self, credential: &str, reporter: ErrorReporter) {
        let failure = {
            let mut inner = self.lock();
            inner.calls.push(RecordedCall::UsagePulse);
            inner.credentials.push(credential.to_owned());
            inner.take_failure(Scripted::UsagePulse)
        };
        if let Some(err) = failure {
            self.deliver(reporter, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::GatewayCall;
    use tokio::sync::mpsc;

    #[test]
    fn test_status_follows_calls() {
        let gateway = InMemoryGateway::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let kind = SessionKind::FreeDriveUsage;
        let call = GatewayCall::Begin {
            kind,
            validity: Validity::BackendDefault,
        };

        gateway.begin("pk", kind, Validity::BackendDefault, ErrorReporter::new(call, tx));
        assert_eq!(gateway.status(kind), Ok(SessionStatus::Running));

        gateway.pause(kind);
        assert_eq!(gateway.status(kind), Ok(SessionStatus::Paused));

        gateway.stop(kind);
        assert_eq!(gateway.status(kind), Ok(SessionStatus::NoSession));
        assert!(gateway.active_kinds().is_empty());
    }

    #[test]
    fn test_scripted_resume_failure() {
        let gateway = InMemoryGateway::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let kind = SessionKind::ActiveGuidanceUsage;
        gateway.set_status(kind, SessionStatus::Paused);
        gateway.fail_next_resume(GatewayError::resume_failed("expired"));

        let call = GatewayCall::Resume {
            kind,
            validity: Validity::BackendDefault,
            generation: 3,
        };
        gateway.resume(kind, ErrorReporter::new(call, tx));

        assert_eq!(rx.try_recv().unwrap().call, call);
        assert_eq!(gateway.status(kind), Ok(SessionStatus::NoSession));
        assert_eq!(gateway.calls(), vec![RecordedCall::Resume(kind)]);
    }

    #[test]
    fn test_held_reports_arrive_on_release() {
        let gateway = InMemoryGateway::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let kind = SessionKind::FreeDriveUsage;
        gateway.set_status(kind, SessionStatus::Paused);
        gateway.hold_reports();
        gateway.fail_next_resume(GatewayError::resume_failed("expired"));

        let call = GatewayCall::Resume {
            kind,
            validity: Validity::BackendDefault,
            generation: 1,
        };
        gateway.resume(kind, ErrorReporter::new(call, tx));

        assert!(rx.try_recv().is_err());
        assert_eq!(gateway.status(kind), Ok(SessionStatus::NoSession));

        assert_eq!(gateway.release_reports(), 1);
        assert_eq!(rx.try_recv().unwrap().call, call);
        assert_eq!(gateway.release_reports(), 0);
    }
}

//! Serialized driver for the session state machine
//!
//! [`BillingController`] owns the state machine on a tokio task. Commands
//! from [`BillingHandle`]s and error reports from the gateway are consumed
//! by one loop, so no two transitions ever interleave.

mod command;
mod handle;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::gateway::{BillingGateway, CredentialProvider, GatewayReport};
use crate::session::SessionStateMachine;

pub use command::{Command, TripEvent};
pub use handle::BillingHandle;

use command::Envelope;

/// Actor owning a [`SessionStateMachine`]
pub struct BillingController<G, C> {
    machine: SessionStateMachine<G, C>,
    commands: mpsc::Receiver<Envelope>,
    reports: mpsc::UnboundedReceiver<GatewayReport>,
}

impl<G, C> BillingController<G, C>
where
    G: BillingGateway + 'static,
    C: CredentialProvider + 'static,
{
    /// Reconcile with the gateway and start the controller task
    ///
    /// The task ends after a shutdown command, once every handle is
    /// dropped, or with an error when the gateway reports a fatal error
    /// asynchronously.
    pub fn attach(
        mut machine: SessionStateMachine<G, C>,
        reports: mpsc::UnboundedReceiver<GatewayReport>,
    ) -> Result<(BillingHandle, JoinHandle<Result<()>>)> {
        machine.reconcile()?;

        let (tx, commands) = mpsc::channel(machine.config().command_capacity.max(1));
        let controller = Self {
            machine,
            commands,
            reports,
        };
        let task = tokio::spawn(controller.run());
        Ok((BillingHandle::new(tx), task))
    }

    async fn run(mut self) -> Result<()> {
        info!(record = ?self.machine.record(), "billing controller started");

        loop {
            tokio::select! {
                biased;

                Some(report) = self.reports.recv() => {
                    if let Err(err) = self.machine.handle_gateway_report(report) {
                        error!(%err, "billing controller stopped");
                        return Err(err);
                    }
                }

                envelope = self.commands.recv() => {
                    let Some(Envelope { command, reply }) = envelope else {
                        info!("all billing handles dropped");
                        self.machine.on_shutdown()?;
                        break;
                    };

                    let shutdown = matches!(command, Command::Shutdown);
                    debug!(%command, "applying command");
                    let result = self.apply(command);
                    let drained = self.drain_reports();

                    let fatal = drained.clone().err();
                    if reply.send(result.and(drained)).is_err() {
                        debug!("command caller went away before acknowledgement");
                    }
                    if let Some(err) = fatal {
                        error!(%err, "billing controller stopped");
                        return Err(err);
                    }
                    if shutdown {
                        break;
                    }
                }
            }
        }

        info!("billing controller stopped");
        Ok(())
    }

    fn apply(&mut self, command: Command) -> Result<()> {
        let result = match command {
            Command::ModeChanged(mode) => self.machine.on_navigation_mode_changed(mode),
            Command::RouteReplaced {
                old_remaining,
                new_remaining,
            } => self
                .machine
                .on_route_replaced(old_remaining.as_ref(), new_remaining.as_ref()),
            Command::LegStarted => self.machine.on_leg_boundary_crossed(),
            Command::Shutdown => self.machine.on_shutdown(),
        };
        if let Err(err) = &result {
            warn!(%err, record = ?self.machine.record(), "command rejected");
        }
        result
    }

    /// Apply reports the gateway raised while handling the last command
    fn drain_reports(&mut self) -> Result<()> {
        while let Ok(report) = self.reports.try_recv() {
            self.machine.handle_gateway_report(report)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BillingConfig;
    use crate::error::{BillingError, GatewayError, GatewayErrorCode};
    use crate::gateway::{InMemoryGateway, RecordedCall, StaticCredential};
    use crate::session::{NavigationMode, SessionKind, SessionStatus};
    use std::time::Duration;
    use tokio::sync::broadcast;

    fn attach(gateway: &InMemoryGateway) -> (BillingHandle, JoinHandle<Result<()>>) {
        let (event_tx, _) = broadcast::channel(16);
        let (machine, reports) = SessionStateMachine::new(
            gateway.clone(),
            StaticCredential::new("pk.123"),
            BillingConfig::default(),
            event_tx,
        );
        BillingController::attach(machine, reports).unwrap()
    }

    #[tokio::test]
    async fn test_shutdown_stops_session_and_task() {
        let gateway = InMemoryGateway::new();
        let (handle, task) = attach(&gateway);

        handle.navigation_mode_changed(NavigationMode::FreeDrive).await.unwrap();
        handle.shutdown().await.unwrap();

        assert!(task.await.unwrap().is_ok());
        assert_eq!(gateway.calls().last(), Some(&RecordedCall::Stop(SessionKind::FreeDriveUsage)));
        assert_eq!(
            handle.leg_started().await,
            Err(BillingError::ControllerClosed)
        );
    }

    #[tokio::test]
    async fn test_dropping_handles_shuts_down() {
        let gateway = InMemoryGateway::new();
        let (handle, task) = attach(&gateway);

        handle.navigation_mode_changed(NavigationMode::ActiveGuidance).await.unwrap();
        drop(handle);

        assert!(task.await.unwrap().is_ok());
        assert!(gateway.active_kinds().is_empty());
    }

    #[tokio::test]
    async fn test_fatal_command_keeps_controller_alive() {
        let gateway = InMemoryGateway::new();
        let (handle, _task) = attach(&gateway);

        let err = handle.leg_started().await.unwrap_err();
        assert!(matches!(err, BillingError::InvariantViolation(_)));

        handle.navigation_mode_changed(NavigationMode::ActiveGuidance).await.unwrap();
        handle.leg_started().await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_gateway_error_ends_controller() {
        let gateway = InMemoryGateway::new();
        let (handle, task) = attach(&gateway);
        gateway.fail_next_begin(GatewayError::new(GatewayErrorCode::Unrecognized(None), "boom"));

        let err = handle
            .navigation_mode_changed(NavigationMode::FreeDrive)
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::UnknownGatewayError { .. }));
        assert!(matches!(
            task.await.unwrap(),
            Err(BillingError::UnknownGatewayError { .. })
        ));
    }

    /// Yield to the controller task until `done` holds
    async fn settle(done: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while !done() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_late_resume_failure_begins_new_session() {
        let gateway = InMemoryGateway::new();
        let (handle, task) = attach(&gateway);
        let kind = SessionKind::ActiveGuidanceUsage;
        handle.navigation_mode_changed(NavigationMode::ActiveGuidance).await.unwrap();
        handle.navigation_mode_changed(NavigationMode::Idle).await.unwrap();
        gateway.hold_reports();
        gateway.fail_next_resume(GatewayError::resume_failed("session expired"));

        handle.navigation_mode_changed(NavigationMode::ActiveGuidance).await.unwrap();
        gateway.take_calls();
        assert_eq!(gateway.release_reports(), 1);

        settle(|| !gateway.calls().is_empty()).await;
        assert_eq!(
            gateway.calls(),
            vec![RecordedCall::Begin {
                kind,
                validity: BillingConfig::default().active_guidance_validity,
            }]
        );
        assert_eq!(gateway.active_kinds(), vec![kind]);
        assert!(!task.is_finished());
    }

    #[tokio::test]
    async fn test_late_unknown_error_ends_controller() {
        let gateway = InMemoryGateway::new();
        let (handle, task) = attach(&gateway);
        gateway.hold_reports();
        gateway.fail_next_usage_pulse(GatewayError::new(
            GatewayErrorCode::Unrecognized(Some("QUOTA".into())),
            "over quota",
        ));

        // acknowledged before the error shows up
        handle.navigation_mode_changed(NavigationMode::FreeDrive).await.unwrap();
        gateway.release_reports();

        let result = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(BillingError::UnknownGatewayError { .. })));
        assert_eq!(
            handle.leg_started().await,
            Err(BillingError::ControllerClosed)
        );
    }

    #[tokio::test]
    async fn test_attach_adopts_existing_session() {
        let gateway = InMemoryGateway::new();
        gateway.set_status(SessionKind::FreeDriveUsage, SessionStatus::Paused);
        let (handle, _task) = attach(&gateway);

        handle.navigation_mode_changed(NavigationMode::FreeDrive).await.unwrap();

        assert_eq!(
            gateway.calls(),
            vec![RecordedCall::UsagePulse, RecordedCall::Resume(SessionKind::FreeDriveUsage)]
        );
    }

    #[tokio::test]
    async fn test_attach_rejects_inconsistent_gateway() {
        let gateway = InMemoryGateway::new();
        gateway.set_status(SessionKind::FreeDriveUsage, SessionStatus::Paused);
        gateway.set_status(SessionKind::ActiveGuidanceUsage, SessionStatus::Running);
        let (event_tx, _) = broadcast::channel(16);
        let (machine, reports) = SessionStateMachine::new(
            gateway.clone(),
            StaticCredential::new("pk.123"),
            BillingConfig::default(),
            event_tx,
        );

        assert!(matches!(
            BillingController::attach(machine, reports),
            Err(BillingError::InvariantViolation(_))
        ));
    }
}

//! Cloneable entry point for hosts

use tokio::sync::{mpsc, oneshot};

use super::command::{Command, Envelope};
use crate::error::{BillingError, Result};
use crate::session::NavigationMode;
use crate::waypoints::WaypointSet;

/// Sends trip signals to a running [`BillingController`](super::BillingController)
///
/// Every method resolves once the controller has fully applied the
/// signal, returning any fatal error it raised.
#[derive(Clone)]
pub struct BillingHandle {
    tx: mpsc::Sender<Envelope>,
}

impl BillingHandle {
    pub(crate) fn new(tx: mpsc::Sender<Envelope>) -> Self {
        Self { tx }
    }

    pub async fn navigation_mode_changed(&self, mode: NavigationMode) -> Result<()> {
        self.send(Command::ModeChanged(mode)).await
    }

    /// Report a route replacement
    ///
    /// Await this before delivering any mode change the same replacement
    /// causes; the two must not be reordered.
    pub async fn route_replaced(
        &self,
        old_remaining: Option<WaypointSet>,
        new_remaining: Option<WaypointSet>,
    ) -> Result<()> {
        self.send(Command::RouteReplaced {
            old_remaining,
            new_remaining,
        })
        .await
    }

    pub async fn leg_started(&self) -> Result<()> {
        self.send(Command::LegStarted).await
    }

    /// Stop any session and end the controller
    pub async fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown).await
    }

    /// Send a command and wait for its acknowledgement
    pub async fn send(&self, command: Command) -> Result<()> {
        let (reply, ack) = oneshot::channel();
        self.tx
            .send(Envelope { command, reply })
            .await
            .map_err(|_| BillingError::ControllerClosed)?;
        ack.await.map_err(|_| BillingError::ControllerClosed)?
    }

    /// Whether the controller has stopped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

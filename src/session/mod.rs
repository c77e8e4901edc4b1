//! Billing session state machine
//!
//! Keeps at most one session (Free Drive or Active Guidance) running or
//! paused, and translates navigation signals into gateway calls:
//! - mode changes: pause on Idle, resume-or-begin otherwise
//! - route replacement: begin a new Active Guidance session when the
//!   remaining destinations changed
//! - leg boundaries: begin a new Active Guidance session
//! - shutdown: stop whatever is left

mod machine;
mod record;

pub use machine::SessionStateMachine;
pub use record::{BillingSessionRecord, NavigationMode, SessionKind, SessionStatus, Validity};

//! Process lifecycle helpers for the host daemon

mod shutdown;

pub use shutdown::ShutdownSignal;

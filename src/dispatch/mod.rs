//! Sending planned requests to the management API.

pub mod executor;
pub mod transport;

pub use executor::{DispatchReport, ExecuteOptions, execute};
pub use transport::{Transport, UreqTransport};

mod session;
mod types;

pub use session::{DeviceSession, Snmp2Transport, Transport};
pub use types::{Counter64, TransportError, TransportResult, WireValue};

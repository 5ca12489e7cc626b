use std::time::Duration;

use snmp2::SyncSession;
use tracing::debug;

use super::types::{Counter64, TransportError, TransportResult, WireValue};
use crate::oid::Oid;
use crate::registry::{HostDefinition, ProtocolVersion};

/// Port used when a host address does not carry one.
const DEFAULT_PORT: u16 = 161;

/// One open exchange channel to a device. Closing is dropping; the engine
/// drops the session when it is done with the host, success or not.
pub trait DeviceSession: Send {
    /// Issues one GET covering every OID in `oids`, returning the response
    /// varbinds in wire order.
    fn get_many(&mut self, oids: &[Oid]) -> TransportResult<Vec<(Oid, WireValue)>>;

    /// Issues one GETNEXT step after `oid`.
    fn get_next(&mut self, oid: &Oid) -> TransportResult<Vec<(Oid, WireValue)>>;
}

/// Opens device sessions. Constructed once at bootstrap and handed to the
/// poll engine; there is no other transport state to initialize.
pub trait Transport: Send + Sync {
    fn open(&self, host: &HostDefinition) -> TransportResult<Box<dyn DeviceSession>>;
}

/// `Transport` backed by the snmp2 crate's synchronous community sessions.
pub struct Snmp2Transport {
    timeout: Duration,
}

impl Snmp2Transport {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Transport for Snmp2Transport {
    fn open(&self, host: &HostDefinition) -> TransportResult<Box<dyn DeviceSession>> {
        let address = ensure_port(&host.address);
        let community = host.community.expose().as_bytes();
        let session = match host.version {
            ProtocolVersion::V1 => SyncSession::new_v1(&address, community, Some(self.timeout), 1),
            ProtocolVersion::V2c => {
                SyncSession::new_v2c(&address, community, Some(self.timeout), 1)
            }
        }
        .map_err(|e| TransportError::SessionOpen {
            address: address.clone(),
            detail: format!("{e:?}"),
        })?;
        debug!(host = %host.name, %address, version = %host.version, "session opened");
        Ok(Box::new(Snmp2Session { session }))
    }
}

struct Snmp2Session {
    session: SyncSession,
}

impl DeviceSession for Snmp2Session {
    fn get_many(&mut self, oids: &[Oid]) -> TransportResult<Vec<(Oid, WireValue)>> {
        let mut collected = Vec::with_capacity(oids.len());
        for oid in oids {
            let target = to_wire_oid(oid)?;
            let pdu = self.session.get(&target).map_err(map_error)?;
            if pdu.error_status != 0 {
                // v1 agents answer a missing object with noSuchName and the
                // echoed varbind. The slot stays absent; the rest still read.
                debug!("get {} answered with error status {}", oid, pdu.error_status);
                continue;
            }
            for (name, value) in pdu.varbinds {
                collected.push((from_wire_oid(&name)?, decode_value(value)));
            }
        }
        Ok(collected)
    }

    fn get_next(&mut self, oid: &Oid) -> TransportResult<Vec<(Oid, WireValue)>> {
        let target = to_wire_oid(oid)?;
        let pdu = self.session.getnext(&target).map_err(map_error)?;
        if pdu.error_status != 0 {
            // v1 agents signal the end of the tree as an error status.
            return Ok(Vec::new());
        }
        let mut collected = Vec::new();
        for (name, value) in pdu.varbinds {
            collected.push((from_wire_oid(&name)?, decode_value(value)));
        }
        Ok(collected)
    }
}

fn to_wire_oid(oid: &Oid) -> TransportResult<snmp2::Oid<'static>> {
    snmp2::Oid::from(oid.components()).map_err(|_| TransportError::InvalidOid(oid.to_string()))
}

fn from_wire_oid(name: &snmp2::Oid) -> TransportResult<Oid> {
    let text = name.to_string();
    text.parse().map_err(|_| {
        TransportError::RequestFailed(format!("unparseable OID `{text}` in response"))
    })
}

/// Convert snmp2's borrowed value into our owned wire value. The v2c
/// exception markers keep their identity so the table walk can stop at
/// endOfMibView.
fn decode_value(value: snmp2::Value) -> WireValue {
    use snmp2::Value as V;

    match value {
        V::Integer(i) => WireValue::Integer(i),
        V::OctetString(bytes) => WireValue::OctetString(bytes.to_vec()),
        V::Counter32(c) => WireValue::Counter32(c),
        V::Unsigned32(g) => WireValue::Gauge32(g),
        V::Counter64(c) => WireValue::Counter64(Counter64::from_u64(c)),
        V::Timeticks(t) => WireValue::Timeticks(t),
        V::IpAddress(octets) => WireValue::IpAddress(octets),
        V::ObjectIdentifier(oid) => WireValue::Unsupported(format!("oid {}", oid)),
        V::Null => WireValue::Null,
        V::NoSuchObject => WireValue::NoSuchObject,
        V::NoSuchInstance => WireValue::NoSuchInstance,
        V::EndOfMibView => WireValue::EndOfMibView,
        other => WireValue::Unsupported(format!("{:?}", other)),
    }
}

/// Map snmp2 crate errors to our transport taxonomy.
fn map_error(err: snmp2::Error) -> TransportError {
    use snmp2::Error;

    match err {
        Error::Send => TransportError::RequestFailed("send failed".to_string()),
        Error::Receive => TransportError::Timeout,
        Error::CommunityMismatch => TransportError::AuthFailure("community mismatch".to_string()),
        Error::AuthFailure(e) => TransportError::AuthFailure(format!("{:?}", e)),
        other => TransportError::RequestFailed(format!("{:?}", other)),
    }
}

/// Appends the default SNMP port when the address has none. Bare IPv6
/// addresses are bracketed first.
fn ensure_port(address: &str) -> String {
    let colons = address.matches(':').count();
    if colons == 0 {
        return format!("{address}:{DEFAULT_PORT}");
    }
    if address.starts_with('[') {
        if address.contains("]:") {
            address.to_string()
        } else {
            format!("{address}:{DEFAULT_PORT}")
        }
    } else if colons == 1 {
        address.to_string()
    } else {
        format!("[{address}]:{DEFAULT_PORT}")
    }
}

use std::fmt;

use thiserror::Error;

pub type TransportResult<T> = Result<T, TransportError>;

/// Failures surfaced by the session layer. The poll engine scopes these to
/// the current host or the current definition, never to the whole cycle.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("session open to {address} failed: {detail}")]
    SessionOpen { address: String, detail: String },
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("request timed out")]
    Timeout,
    #[error("authentication failed: {0}")]
    AuthFailure(String),
    #[error("invalid OID `{0}`")]
    InvalidOid(String),
}

/// A 64-bit counter as the wire carries it: two 32-bit words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counter64 {
    pub high: u32,
    pub low: u32,
}

impl Counter64 {
    pub fn from_u64(value: u64) -> Self {
        Counter64 {
            high: (value >> 32) as u32,
            low: value as u32,
        }
    }

    /// Reconstructs the full value: (high << 32) + low.
    pub fn to_u64(self) -> u64 {
        ((self.high as u64) << 32) + self.low as u64
    }
}

/// One decoded response value, owned, independent of any receive buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireValue {
    Integer(i64),
    Counter32(u32),
    /// Gauge32 and Unsigned32 share a wire tag.
    Gauge32(u32),
    Counter64(Counter64),
    Timeticks(u32),
    OctetString(Vec<u8>),
    IpAddress([u8; 4]),
    Null,
    NoSuchObject,
    NoSuchInstance,
    EndOfMibView,
    /// Anything the decoder does not model, kept for diagnostics.
    Unsupported(String),
}

impl WireValue {
    /// Wire kind for log messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            WireValue::Integer(_) => "integer",
            WireValue::Counter32(_) => "counter32",
            WireValue::Gauge32(_) => "gauge32",
            WireValue::Counter64(_) => "counter64",
            WireValue::Timeticks(_) => "timeticks",
            WireValue::OctetString(_) => "octet-string",
            WireValue::IpAddress(_) => "ip-address",
            WireValue::Null => "null",
            WireValue::NoSuchObject => "no-such-object",
            WireValue::NoSuchInstance => "no-such-instance",
            WireValue::EndOfMibView => "end-of-mib-view",
            WireValue::Unsupported(_) => "unsupported",
        }
    }

    /// Renders the value as a table row instance name, when it has a
    /// sensible text form.
    pub fn as_instance_text(&self) -> Option<String> {
        match self {
            WireValue::Integer(i) => Some(i.to_string()),
            WireValue::Counter32(c) => Some(c.to_string()),
            WireValue::Gauge32(g) => Some(g.to_string()),
            WireValue::Counter64(c) => Some(c.to_u64().to_string()),
            WireValue::Timeticks(t) => Some(t.to_string()),
            WireValue::OctetString(bytes) => {
                let text = String::from_utf8_lossy(bytes);
                let trimmed = text.trim_end_matches('\0').trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
            WireValue::IpAddress(ip) => Some(format!("{}.{}.{}.{}", ip[0], ip[1], ip[2], ip[3])),
            WireValue::Null
            | WireValue::NoSuchObject
            | WireValue::NoSuchInstance
            | WireValue::EndOfMibView
            | WireValue::Unsupported(_) => None,
        }
    }
}

impl fmt::Display for WireValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireValue::Integer(i) => write!(f, "{i}"),
            WireValue::Counter32(c) => write!(f, "{c}"),
            WireValue::Gauge32(g) => write!(f, "{g}"),
            WireValue::Counter64(c) => write!(f, "{}", c.to_u64()),
            WireValue::Timeticks(t) => write!(f, "{t} ticks"),
            WireValue::OctetString(bytes) => {
                write!(f, "\"{}\"", String::from_utf8_lossy(bytes))
            }
            WireValue::IpAddress(ip) => {
                write!(f, "{}.{}.{}.{}", ip[0], ip[1], ip[2], ip[3])
            }
            WireValue::Null => write!(f, "null"),
            WireValue::NoSuchObject => write!(f, "noSuchObject"),
            WireValue::NoSuchInstance => write!(f, "noSuchInstance"),
            WireValue::EndOfMibView => write!(f, "endOfMibView"),
            WireValue::Unsupported(s) => write!(f, "unsupported({s})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter64_reconstruction() {
        let words = Counter64 { high: 0x1, low: 0x2 };
        assert_eq!(words.to_u64(), 0x1_0000_0002);
    }

    #[test]
    fn test_counter64_round_trip() {
        let value = 0xDEAD_BEEF_CAFE_F00D;
        assert_eq!(Counter64::from_u64(value).to_u64(), value);
        assert_eq!(Counter64::from_u64(7), Counter64 { high: 0, low: 7 });
    }

    #[test]
    fn test_instance_text_numeric() {
        assert_eq!(WireValue::Integer(-3).as_instance_text().unwrap(), "-3");
        assert_eq!(WireValue::Gauge32(12).as_instance_text().unwrap(), "12");
        assert_eq!(
            WireValue::IpAddress([10, 0, 0, 1]).as_instance_text().unwrap(),
            "10.0.0.1"
        );
    }

    #[test]
    fn test_instance_text_octet_string() {
        let v = WireValue::OctetString(b"eth0\0".to_vec());
        assert_eq!(v.as_instance_text().unwrap(), "eth0");
        assert_eq!(
            WireValue::OctetString(b"  ".to_vec()).as_instance_text(),
            None
        );
    }

    #[test]
    fn test_instance_text_absent_for_exceptions() {
        assert_eq!(WireValue::Null.as_instance_text(), None);
        assert_eq!(WireValue::NoSuchInstance.as_instance_text(), None);
        assert_eq!(WireValue::EndOfMibView.as_instance_text(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(WireValue::Integer(42).to_string(), "42");
        assert_eq!(WireValue::OctetString(b"lo".to_vec()).to_string(), "\"lo\"");
        assert_eq!(WireValue::EndOfMibView.to_string(), "endOfMibView");
    }
}

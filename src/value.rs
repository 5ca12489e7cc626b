use tracing::warn;

use crate::schema::SlotKind;
use crate::snmp::WireValue;

/// One coerced metric cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SlotValue {
    Counter(u64),
    Gauge(f64),
}

impl SlotValue {
    /// The "no data" cell for a slot kind: counters read 0 so downstream
    /// rate math keeps a monotonic series, gauges read NaN so "no data"
    /// stays distinct from zero.
    pub fn absent(kind: SlotKind) -> SlotValue {
        match kind {
            SlotKind::Counter => SlotValue::Counter(0),
            SlotKind::Gauge => SlotValue::Gauge(f64::NAN),
        }
    }

    pub fn kind(&self) -> SlotKind {
        match self {
            SlotValue::Counter(_) => SlotKind::Counter,
            SlotValue::Gauge(_) => SlotKind::Gauge,
        }
    }
}

/// Widens the wire value to 64 bits. Signed integers pass through as
/// two's complement. `None` when the wire type carries no metric value.
fn widen(value: &WireValue) -> Option<u64> {
    match value {
        WireValue::Integer(i) => Some(*i as u64),
        WireValue::Counter32(c) => Some(*c as u64),
        WireValue::Gauge32(g) => Some(*g as u64),
        WireValue::Counter64(words) => Some(words.to_u64()),
        _ => None,
    }
}

/// Coerces one wire value into the declared slot kind. Pure: the same
/// (value, kind) pair always yields the same cell.
pub fn coerce(value: &WireValue, kind: SlotKind) -> SlotValue {
    let widened = widen(value);
    if widened.is_none() {
        warn!(
            "cannot interpret {} value {} as a metric, treating as undefined",
            value.kind_name(),
            value
        );
    }
    match kind {
        SlotKind::Counter => SlotValue::Counter(widened.unwrap_or(0)),
        SlotKind::Gauge => match widened {
            Some(v) => SlotValue::Gauge(v as f64),
            None => SlotValue::Gauge(f64::NAN),
        },
    }
}

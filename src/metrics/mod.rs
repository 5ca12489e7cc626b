use std::io::{self, Write};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::value::SlotValue;

/// Widest host name a sample will carry; longer names are truncated.
pub const MAX_HOST_LEN: usize = 64;

/// Source tag stamped on every sample this agent emits.
pub const SOURCE_TAG: &str = "snmp";

#[derive(Debug, Error)]
#[error("sink rejected sample: {0}")]
pub struct SinkError(pub String);

/// One named cell of a sample.
#[derive(Debug, Clone)]
pub struct SampleCell {
    pub name: String,
    pub value: SlotValue,
}

impl Serialize for SampleCell {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("SampleCell", 3)?;
        state.serialize_field("name", &self.name)?;
        state.serialize_field("kind", self.value.kind().as_str())?;
        match self.value {
            SlotValue::Counter(c) => state.serialize_field("value", &c)?,
            SlotValue::Gauge(g) if g.is_finite() => state.serialize_field("value", &g)?,
            // NaN has no JSON form; an absent gauge reads as null.
            SlotValue::Gauge(_) => state.serialize_field("value", &Option::<f64>::None)?,
        }
        state.end()
    }
}

/// One completed metric sample, the agent's only steady-state output.
#[derive(Debug, Clone, Serialize)]
pub struct Sample {
    pub host: String,
    pub source: &'static str,
    #[serde(rename = "type")]
    pub metric_type: String,
    pub instance: String,
    pub time: DateTime<Utc>,
    pub values: Vec<SampleCell>,
}

impl Sample {
    /// Builds a sample stamped with the current time, truncating an
    /// over-long host name.
    pub fn new(host: &str, metric_type: &str, instance: &str, values: Vec<SampleCell>) -> Sample {
        Sample {
            host: truncate_host(host),
            source: SOURCE_TAG,
            metric_type: metric_type.to_string(),
            instance: instance.to_string(),
            time: Utc::now(),
            values,
        }
    }
}

fn truncate_host(host: &str) -> String {
    if host.chars().count() <= MAX_HOST_LEN {
        host.to_string()
    } else {
        host.chars().take(MAX_HOST_LEN).collect()
    }
}

/// Receives completed samples. Implementations must accept concurrent
/// submissions; parallel host polls share one sink.
pub trait MetricSink: Send + Sync {
    fn submit(&self, sample: Sample) -> Result<(), SinkError>;
}

/// Writes one JSON object per sample to standard output.
#[derive(Debug, Default)]
pub struct JsonLineSink;

impl JsonLineSink {
    pub fn new() -> Self {
        Self
    }
}

impl MetricSink for JsonLineSink {
    fn submit(&self, sample: Sample) -> Result<(), SinkError> {
        let line = serde_json::to_string(&sample).map_err(|e| SinkError(e.to_string()))?;
        let mut out = io::stdout().lock();
        writeln!(out, "{line}").map_err(|e| SinkError(e.to_string()))
    }
}

/// Collects samples in memory, for tests and for embedders that drain
/// samples themselves.
#[derive(Debug, Default)]
pub struct BufferSink {
    samples: Mutex<Vec<Sample>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes every buffered sample, oldest first.
    pub fn drain(&self) -> Vec<Sample> {
        let mut guard = self.samples.lock().unwrap_or_else(|p| p.into_inner());
        std::mem::take(&mut *guard)
    }

    pub fn len(&self) -> usize {
        self.samples
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MetricSink for BufferSink {
    fn submit(&self, sample: Sample) -> Result<(), SinkError> {
        self.samples
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(sample);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(name: &str, value: SlotValue) -> SampleCell {
        SampleCell {
            name: name.to_string(),
            value,
        }
    }

    #[test]
    fn test_host_truncated_to_bound() {
        let long = "h".repeat(MAX_HOST_LEN + 11);
        let sample = Sample::new(&long, "gauge", "", vec![]);
        assert_eq!(sample.host.len(), MAX_HOST_LEN);
        let short = Sample::new("router01", "gauge", "", vec![]);
        assert_eq!(short.host, "router01");
    }

    #[test]
    fn test_sample_carries_source_tag() {
        let sample = Sample::new("h", "if_octets", "eth0", vec![]);
        assert_eq!(sample.source, "snmp");
        assert_eq!(sample.metric_type, "if_octets");
        assert_eq!(sample.instance, "eth0");
    }

    #[test]
    fn test_serialize_shape() {
        let sample = Sample::new(
            "router01",
            "if_octets",
            "eth0",
            vec![
                cell("rx", SlotValue::Counter(1234)),
                cell("tx", SlotValue::Gauge(42.5)),
                cell("missing", SlotValue::Gauge(f64::NAN)),
            ],
        );
        let json = serde_json::to_value(&sample).unwrap();
        assert_eq!(json["host"], "router01");
        assert_eq!(json["source"], "snmp");
        assert_eq!(json["type"], "if_octets");
        assert_eq!(json["instance"], "eth0");
        assert!(json["time"].as_str().unwrap().contains('T'));
        assert_eq!(json["values"][0]["name"], "rx");
        assert_eq!(json["values"][0]["kind"], "counter");
        assert_eq!(json["values"][0]["value"], 1234);
        assert_eq!(json["values"][1]["value"], 42.5);
        assert!(json["values"][2]["value"].is_null());
        assert_eq!(json["values"][2]["kind"], "gauge");
    }

    #[test]
    fn test_buffer_sink_collects_in_order() {
        let sink = BufferSink::new();
        sink.submit(Sample::new("a", "gauge", "", vec![])).unwrap();
        sink.submit(Sample::new("b", "gauge", "", vec![])).unwrap();
        assert_eq!(sink.len(), 2);
        let drained = sink.drain();
        assert_eq!(drained[0].host, "a");
        assert_eq!(drained[1].host, "b");
        assert!(sink.is_empty());
    }
}

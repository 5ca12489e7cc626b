use std::collections::HashMap;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("metric type `{0}` has an empty slot list")]
    EmptySlotList(String),
    #[error("unknown slot kind `{0}` (expected `counter` or `gauge`)")]
    BadKind(String),
}

/// Numeric kind of one metric slot.
///
/// Counters are monotonically advancing raw integers; gauges are floating
/// point and may be NaN when a read produced no value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Counter,
    Gauge,
}

impl SlotKind {
    fn parse(s: &str) -> Result<Self, SchemaError> {
        match s.to_ascii_lowercase().as_str() {
            "counter" => Ok(SlotKind::Counter),
            "gauge" => Ok(SlotKind::Gauge),
            other => Err(SchemaError::BadKind(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SlotKind::Counter => "counter",
            SlotKind::Gauge => "gauge",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotSpec {
    pub name: String,
    pub kind: SlotKind,
}

/// A named metric shape: the ordered slots a sample of this type carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricSchema {
    pub name: String,
    pub slots: Vec<SlotSpec>,
}

impl MetricSchema {
    /// Builds a schema from slot entries of the form `"name:kind"` or bare
    /// `"kind"`. Unnamed slots get `value` (single slot) or `valueN`.
    pub fn parse(name: &str, entries: &[String]) -> Result<Self, SchemaError> {
        if entries.is_empty() {
            return Err(SchemaError::EmptySlotList(name.to_string()));
        }
        let mut slots = Vec::with_capacity(entries.len());
        for (idx, entry) in entries.iter().enumerate() {
            let (slot_name, kind_str) = match entry.split_once(':') {
                Some((n, k)) => (Some(n.trim()), k.trim()),
                None => (None, entry.trim()),
            };
            let kind = SlotKind::parse(kind_str)?;
            let slot_name = match slot_name {
                Some(n) if !n.is_empty() => n.to_string(),
                _ if entries.len() == 1 => "value".to_string(),
                _ => format!("value{idx}"),
            };
            slots.push(SlotSpec {
                name: slot_name,
                kind,
            });
        }
        Ok(MetricSchema {
            name: name.to_string(),
            slots,
        })
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }
}

/// Registry of metric shapes, keyed by exact type name.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, MetricSchema>,
}

const BUILTIN_TYPES: &[(&str, &[&str])] = &[
    ("if_octets", &["rx:counter", "tx:counter"]),
    ("if_packets", &["rx:counter", "tx:counter"]),
    ("if_errors", &["rx:counter", "tx:counter"]),
    ("counter", &["value:counter"]),
    ("gauge", &["value:gauge"]),
    ("uptime", &["value:gauge"]),
    ("users", &["value:gauge"]),
    ("temperature", &["value:gauge"]),
];

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with a small set of common shapes, which a
    /// config file's `[types]` section may extend or override.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for (name, entries) in BUILTIN_TYPES {
            let entries: Vec<String> = entries.iter().map(|s| s.to_string()).collect();
            // Static table, parse cannot fail.
            if let Ok(schema) = MetricSchema::parse(name, &entries) {
                registry.register(schema);
            }
        }
        registry
    }

    /// Inserts a schema, replacing any previous shape with the same name.
    /// Returns true when an existing entry was replaced.
    pub fn register(&mut self, schema: MetricSchema) -> bool {
        self.schemas.insert(schema.name.clone(), schema).is_some()
    }

    pub fn lookup(&self, name: &str) -> Option<&MetricSchema> {
        self.schemas.get(name)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_named_slots() {
        let schema = MetricSchema::parse(
            "if_octets",
            &["rx:counter".to_string(), "tx:counter".to_string()],
        )
        .unwrap();
        assert_eq!(schema.slot_count(), 2);
        assert_eq!(schema.slots[0].name, "rx");
        assert_eq!(schema.slots[0].kind, SlotKind::Counter);
        assert_eq!(schema.slots[1].name, "tx");
    }

    #[test]
    fn test_parse_bare_kind_single_slot() {
        let schema = MetricSchema::parse("load", &["gauge".to_string()]).unwrap();
        assert_eq!(schema.slots[0].name, "value");
        assert_eq!(schema.slots[0].kind, SlotKind::Gauge);
    }

    #[test]
    fn test_parse_bare_kind_multi_slot() {
        let schema =
            MetricSchema::parse("pair", &["counter".to_string(), "gauge".to_string()]).unwrap();
        assert_eq!(schema.slots[0].name, "value0");
        assert_eq!(schema.slots[1].name, "value1");
    }

    #[test]
    fn test_parse_kind_case_insensitive() {
        let schema = MetricSchema::parse("t", &["rx:Counter".to_string()]).unwrap();
        assert_eq!(schema.slots[0].kind, SlotKind::Counter);
    }

    #[test]
    fn test_parse_rejects_unknown_kind() {
        let err = MetricSchema::parse("t", &["rx:derive".to_string()]).unwrap_err();
        assert_eq!(err, SchemaError::BadKind("derive".to_string()));
    }

    #[test]
    fn test_parse_rejects_empty() {
        let err = MetricSchema::parse("t", &[]).unwrap_err();
        assert_eq!(err, SchemaError::EmptySlotList("t".to_string()));
    }

    #[test]
    fn test_builtins_present() {
        let registry = SchemaRegistry::with_builtins();
        let if_octets = registry.lookup("if_octets").unwrap();
        assert_eq!(if_octets.slot_count(), 2);
        assert!(if_octets.slots.iter().all(|s| s.kind == SlotKind::Counter));
        assert_eq!(registry.lookup("gauge").unwrap().slot_count(), 1);
    }

    #[test]
    fn test_lookup_is_exact_match() {
        let registry = SchemaRegistry::with_builtins();
        assert!(registry.lookup("IF_OCTETS").is_none());
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = SchemaRegistry::with_builtins();
        let custom = MetricSchema::parse("gauge", &["g:gauge".to_string()]).unwrap();
        assert!(registry.register(custom));
        assert_eq!(registry.lookup("gauge").unwrap().slots[0].name, "g");
    }
}

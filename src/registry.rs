use std::fmt;

use thiserror::Error;

use crate::oid::Oid;
use crate::secret::Community;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("duplicate name `{0}`")]
pub struct DuplicateName(pub String);

/// SNMP protocol version used for a host's sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolVersion {
    V1,
    #[default]
    V2c,
}

impl ProtocolVersion {
    /// Maps the numeric config value; only 1 and 2 are accepted.
    pub fn from_number(n: f64) -> Option<Self> {
        if n == 1.0 {
            Some(ProtocolVersion::V1)
        } else if n == 2.0 {
            Some(ProtocolVersion::V2c)
        } else {
            None
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolVersion::V1 => write!(f, "1"),
            ProtocolVersion::V2c => write!(f, "2c"),
        }
    }
}

/// How a definition names the instance dimension of its samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceSpec {
    /// Fixed instance string, scalar mode.
    Literal(String),
    /// Table column whose per-row values name each row.
    Column(Oid),
}

/// One named, reusable description of a metric to collect.
///
/// Immutable once registered; hosts reference it through a [`DataHandle`].
#[derive(Debug, Clone)]
pub struct DataDefinition {
    pub name: String,
    /// Reference into the metric schema registry.
    pub metric_type: String,
    pub instance: InstanceSpec,
    /// One OID per metric slot, in slot order.
    pub values: Vec<Oid>,
}

impl DataDefinition {
    pub fn is_table(&self) -> bool {
        matches!(self.instance, InstanceSpec::Column(_))
    }
}

/// Stable index of a data definition inside its registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataHandle(usize);

/// Stable index of a host definition inside its registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostHandle(usize);

/// One named remote device target.
#[derive(Debug, Clone)]
pub struct HostDefinition {
    pub name: String,
    /// Hostname or IP, optionally with a port.
    pub address: String,
    pub community: Community,
    pub version: ProtocolVersion,
    /// Data definitions to poll, in poll order. Duplicates permitted.
    pub collect_set: Vec<DataHandle>,
}

/// Insertion-ordered collection of data definitions with name lookup.
#[derive(Debug, Default)]
pub struct DataRegistry {
    entries: Vec<DataDefinition>,
}

impl DataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a definition, rejecting duplicate names so that lookup by
    /// name stays unambiguous for the collect binding step.
    pub fn register(&mut self, definition: DataDefinition) -> Result<DataHandle, DuplicateName> {
        if self.lookup(&definition.name).is_some() {
            return Err(DuplicateName(definition.name));
        }
        self.entries.push(definition);
        Ok(DataHandle(self.entries.len() - 1))
    }

    /// Case-insensitive name lookup.
    pub fn lookup(&self, name: &str) -> Option<DataHandle> {
        self.entries
            .iter()
            .position(|d| d.name.eq_ignore_ascii_case(name))
            .map(DataHandle)
    }

    pub fn get(&self, handle: DataHandle) -> Option<&DataDefinition> {
        self.entries.get(handle.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (DataHandle, &DataDefinition)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, d)| (DataHandle(i), d))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Insertion-ordered collection of host definitions with name lookup.
#[derive(Debug, Default)]
pub struct HostRegistry {
    entries: Vec<HostDefinition>,
}

impl HostRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, host: HostDefinition) -> Result<HostHandle, DuplicateName> {
        if self.lookup(&host.name).is_some() {
            return Err(DuplicateName(host.name));
        }
        self.entries.push(host);
        Ok(HostHandle(self.entries.len() - 1))
    }

    /// Case-insensitive name lookup.
    pub fn lookup(&self, name: &str) -> Option<HostHandle> {
        self.entries
            .iter()
            .position(|h| h.name.eq_ignore_ascii_case(name))
            .map(HostHandle)
    }

    pub fn get(&self, handle: HostHandle) -> Option<&HostDefinition> {
        self.entries.get(handle.0)
    }

    /// Grows a host's collect set. Only the binder calls this; hosts are
    /// immutable once binding finishes.
    pub fn push_collect(&mut self, handle: HostHandle, data: DataHandle) {
        if let Some(host) = self.entries.get_mut(handle.0) {
            host.collect_set.push(data);
        }
    }

    /// Hosts in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &HostDefinition> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

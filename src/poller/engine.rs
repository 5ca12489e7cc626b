use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, error, warn};

use crate::metrics::{MetricSink, Sample, SampleCell};
use crate::oid::Oid;
use crate::registry::{DataDefinition, DataRegistry, HostDefinition, InstanceSpec};
use crate::schema::{MetricSchema, SchemaRegistry};
use crate::snmp::{DeviceSession, Transport, TransportError, WireValue};
use crate::value::{coerce, SlotValue};

/// Failure of one data definition on one host. Contained; never aborts
/// the host's remaining definitions or other hosts.
#[derive(Debug, Error)]
pub enum PollError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("metric type `{0}` is not defined")]
    UnknownType(String),
    #[error("type `{metric_type}` has {expected} slots but {actual} values are configured")]
    SlotCountMismatch {
        metric_type: String,
        expected: usize,
        actual: usize,
    },
}

/// Outcome counts for one host in one cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HostStats {
    pub definitions_polled: usize,
    pub definitions_failed: usize,
    pub samples: usize,
}

impl HostStats {
    pub fn merge(&mut self, other: HostStats) {
        self.definitions_polled += other.definitions_polled;
        self.definitions_failed += other.definitions_failed;
        self.samples += other.samples;
    }
}

/// Reads every bound data definition of a host over one short-lived
/// session and dispatches the resulting samples.
pub struct PollEngine {
    data: Arc<DataRegistry>,
    schemas: Arc<SchemaRegistry>,
    transport: Arc<dyn Transport>,
    sink: Arc<dyn MetricSink>,
}

impl PollEngine {
    pub fn new(
        data: Arc<DataRegistry>,
        schemas: Arc<SchemaRegistry>,
        transport: Arc<dyn Transport>,
        sink: Arc<dyn MetricSink>,
    ) -> Self {
        Self {
            data,
            schemas,
            transport,
            sink,
        }
    }

    /// Polls one host. A session that cannot be opened aborts the host
    /// for this cycle; a definition that fails is skipped and the rest
    /// still run. The session closes when this returns, success or not.
    pub fn poll_host(&self, host: &HostDefinition) -> HostStats {
        let mut stats = HostStats::default();
        if host.collect_set.is_empty() {
            debug!("host `{}` has nothing to collect", host.name);
            return stats;
        }

        let started = Instant::now();
        let mut session = match self.transport.open(host) {
            Ok(session) => session,
            Err(e) => {
                error!("host `{}`: {e}", host.name);
                stats.definitions_failed = host.collect_set.len();
                return stats;
            }
        };

        for handle in &host.collect_set {
            // Handles were issued by the registry the binder populated.
            let Some(def) = self.data.get(*handle) else {
                continue;
            };
            match self.poll_definition(session.as_mut(), host, def) {
                Ok(samples) => {
                    stats.definitions_polled += 1;
                    stats.samples += samples;
                }
                Err(e) => {
                    warn!("host `{}` data `{}`: {e}", host.name, def.name);
                    stats.definitions_failed += 1;
                }
            }
        }

        debug!(
            "host `{}` polled in {:?}: {} samples, {} of {} definitions failed",
            host.name,
            started.elapsed(),
            stats.samples,
            stats.definitions_failed,
            host.collect_set.len()
        );
        stats
    }

    fn poll_definition(
        &self,
        session: &mut dyn DeviceSession,
        host: &HostDefinition,
        def: &DataDefinition,
    ) -> Result<usize, PollError> {
        let schema = self
            .schemas
            .lookup(&def.metric_type)
            .ok_or_else(|| PollError::UnknownType(def.metric_type.clone()))?;
        // Unknown types pass the binder, so the width is re-checked here.
        if schema.slot_count() != def.values.len() {
            return Err(PollError::SlotCountMismatch {
                metric_type: def.metric_type.clone(),
                expected: schema.slot_count(),
                actual: def.values.len(),
            });
        }
        match &def.instance {
            InstanceSpec::Literal(instance) => {
                self.poll_scalar(session, host, def, schema, instance)
            }
            InstanceSpec::Column(column) => self.poll_table(session, host, def, schema, column),
        }
    }

    /// One batched request for all value OIDs, one sample out. Responses
    /// are matched to slots by exact OID, whatever order they arrive in;
    /// slots nothing matched keep their absent value.
    fn poll_scalar(
        &self,
        session: &mut dyn DeviceSession,
        host: &HostDefinition,
        def: &DataDefinition,
        schema: &MetricSchema,
        instance: &str,
    ) -> Result<usize, PollError> {
        let varbinds = session.get_many(&def.values)?;

        let mut slots: Vec<SlotValue> = schema
            .slots
            .iter()
            .map(|s| SlotValue::absent(s.kind))
            .collect();
        for (oid, value) in &varbinds {
            // A definition may list one OID for several slots; fill them all.
            let mut matched = false;
            for (index, want) in def.values.iter().enumerate() {
                if want == oid {
                    slots[index] = coerce(value, schema.slots[index].kind);
                    matched = true;
                }
            }
            if matched {
                debug!("host `{}` data `{}`: {} = {}", host.name, def.name, oid, value);
            } else {
                debug!(
                    "host `{}` data `{}`: unrequested response OID {} ignored",
                    host.name, def.name, oid
                );
            }
        }

        let cells = schema
            .slots
            .iter()
            .zip(slots)
            .map(|(spec, value)| SampleCell {
                name: spec.name.clone(),
                value,
            })
            .collect();
        Ok(self.submit(Sample::new(&host.name, &def.metric_type, instance, cells)))
    }

    /// Walks each value column and the instance column, groups the cells
    /// by row suffix, and emits one sample per row. A row exists when any
    /// value column has a cell for it; the instance column only names
    /// rows, it never creates them.
    fn poll_table(
        &self,
        session: &mut dyn DeviceSession,
        host: &HostDefinition,
        def: &DataDefinition,
        schema: &MetricSchema,
        column: &Oid,
    ) -> Result<usize, PollError> {
        let mut columns: Vec<BTreeMap<Oid, WireValue>> = Vec::with_capacity(def.values.len());
        for root in &def.values {
            columns.push(walk_column(session, root)?);
        }
        let instances = walk_column(session, column)?;

        let mut rows: BTreeSet<Oid> = BTreeSet::new();
        for col in &columns {
            rows.extend(col.keys().cloned());
        }

        let mut emitted = 0;
        for suffix in &rows {
            let instance = match instances.get(suffix).and_then(WireValue::as_instance_text) {
                Some(text) => text,
                None => suffix.to_string(),
            };
            let mut cells = Vec::with_capacity(schema.slots.len());
            for (index, spec) in schema.slots.iter().enumerate() {
                let value = match columns[index].get(suffix) {
                    Some(wire) => coerce(wire, spec.kind),
                    None => SlotValue::absent(spec.kind),
                };
                cells.push(SampleCell {
                    name: spec.name.clone(),
                    value,
                });
            }
            emitted += self.submit(Sample::new(&host.name, &def.metric_type, &instance, cells));
        }
        debug!(
            "host `{}` data `{}`: table yielded {} rows",
            host.name, def.name, emitted
        );
        Ok(emitted)
    }

    fn submit(&self, sample: Sample) -> usize {
        match self.sink.submit(sample) {
            Ok(()) => 1,
            Err(e) => {
                error!("failed to dispatch sample: {e}");
                0
            }
        }
    }
}

/// Walks one table column with repeated getnext requests, keyed by the
/// OID suffix below the column root.
///
/// The walk stops at the first response that signals the end of the MIB
/// view, leaves the subtree, or fails to advance past the previous OID.
/// endOfMibView is checked first because agents echo the request OID
/// with it, which would otherwise look like a non-advancing reply.
fn walk_column(
    session: &mut dyn DeviceSession,
    root: &Oid,
) -> Result<BTreeMap<Oid, WireValue>, PollError> {
    let mut entries = BTreeMap::new();
    let mut cursor = root.clone();
    loop {
        let varbinds = session.get_next(&cursor)?;
        let Some((oid, value)) = varbinds.into_iter().next() else {
            break;
        };
        if matches!(value, WireValue::EndOfMibView) {
            break;
        }
        if !oid.starts_with(root) {
            break;
        }
        if oid <= cursor {
            warn!("table walk at {} is not advancing, stopping", oid);
            break;
        }
        let Some(suffix) = oid.suffix_after(root) else {
            break;
        };
        entries.insert(suffix, value);
        cursor = oid;
    }
    Ok(entries)
}

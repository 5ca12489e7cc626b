use tracing::{debug, info, warn};

use crate::config::{ConfigError, ConfigItem, ConfigValue};
use crate::oid::Oid;
use crate::registry::{
    DataDefinition, DataRegistry, HostDefinition, HostRegistry, InstanceSpec, ProtocolVersion,
};
use crate::schema::{MetricSchema, SchemaRegistry};
use crate::secret::Community;

/// Counts from one binding pass, for startup logging and tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BindSummary {
    pub types_added: usize,
    pub data_rejected: usize,
    pub hosts_rejected: usize,
    pub collects_rejected: usize,
    pub bindings_bound: usize,
    pub bindings_skipped: usize,
}

/// Translates lowered declaration items into populated registries.
///
/// Declarations are independent: one bad declaration never aborts its
/// siblings. File order does not matter; types are applied first, then
/// data definitions, then hosts, then collect bindings. Collect
/// declarations are accepted both at the top level and nested in a host
/// block; the first argument names the target host either way.
pub fn bind(
    items: &[ConfigItem],
    schemas: &mut SchemaRegistry,
) -> (DataRegistry, HostRegistry, BindSummary) {
    let mut summary = BindSummary::default();
    let mut data = DataRegistry::new();
    let mut hosts = HostRegistry::new();

    let mut data_items = Vec::new();
    let mut host_items = Vec::new();
    let mut collect_items = Vec::new();

    for item in items {
        if item.key_is("types") {
            apply_types(item, schemas, &mut summary);
        } else if item.key_is("data") {
            data_items.push(item);
        } else if item.key_is("host") {
            host_items.push(item);
        } else if item.key_is("collect") {
            collect_items.push(item);
        } else {
            warn!("unknown config key `{}` ignored", item.key);
        }
    }

    for item in data_items {
        match build_data(item, schemas) {
            Ok(def) => {
                debug!(
                    "data `{}`: type {}, table {}, {} values",
                    def.name,
                    def.metric_type,
                    def.is_table(),
                    def.values.len()
                );
                if let Err(e) = data.register(def) {
                    warn!("rejecting data definition: {}", ConfigError::Duplicate(e.0));
                    summary.data_rejected += 1;
                }
            }
            Err(e) => {
                warn!("rejecting data definition: {e}");
                summary.data_rejected += 1;
            }
        }
    }

    for item in host_items {
        // TOML attaches keys written after a `[host.*]` header to that host
        // table, so collect declarations usually arrive as host children.
        // They carry the target host by name and bind like top-level ones.
        for child in &item.children {
            if child.key_is("collect") {
                collect_items.push(child);
            }
        }
        match build_host(item) {
            Ok(host) => {
                debug!(
                    "host `{}`: address {}, community {}, version {}",
                    host.name,
                    host.address,
                    host.community.preview(),
                    host.version
                );
                if let Err(e) = hosts.register(host) {
                    warn!("rejecting host: {}", ConfigError::Duplicate(e.0));
                    summary.hosts_rejected += 1;
                }
            }
            Err(e) => {
                warn!("rejecting host: {e}");
                summary.hosts_rejected += 1;
            }
        }
    }

    for item in collect_items {
        bind_collect(item, &data, &mut hosts, &mut summary);
    }

    for host in hosts.iter() {
        if host.collect_set.is_empty() {
            info!("host `{}` has no data definitions bound", host.name);
        }
    }

    (data, hosts, summary)
}

fn apply_types(item: &ConfigItem, schemas: &mut SchemaRegistry, summary: &mut BindSummary) {
    for child in &item.children {
        let entries: Option<Vec<String>> = child
            .values
            .iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect();
        let Some(entries) = entries else {
            warn!(
                "metric type `{}` slot entries must all be strings, ignored",
                child.key
            );
            continue;
        };
        match MetricSchema::parse(&child.key, &entries) {
            Ok(schema) => {
                if schemas.register(schema) {
                    debug!("metric type `{}` redefined by config", child.key);
                }
                summary.types_added += 1;
            }
            Err(e) => warn!("ignoring metric type: {}", ConfigError::Schema(e)),
        }
    }
}

fn block_name(item: &ConfigItem, block: &'static str) -> Result<String, ConfigError> {
    match item.values.as_slice() {
        [ConfigValue::String(name)] if !name.is_empty() => Ok(name.clone()),
        _ => Err(ConfigError::BadBlockName {
            block: block.to_string(),
        }),
    }
}

fn one_string(
    child: &ConfigItem,
    scope: &'static str,
    name: &str,
) -> Result<String, ConfigError> {
    match child.values.as_slice() {
        [ConfigValue::String(s)] => Ok(s.clone()),
        _ => Err(ConfigError::BadOption {
            key: child.key.clone(),
            scope,
            name: name.to_string(),
            expect: "exactly one string",
        }),
    }
}

fn one_bool(child: &ConfigItem, scope: &'static str, name: &str) -> Result<bool, ConfigError> {
    match child.values.as_slice() {
        [ConfigValue::Boolean(b)] => Ok(*b),
        _ => Err(ConfigError::BadOption {
            key: child.key.clone(),
            scope,
            name: name.to_string(),
            expect: "exactly one boolean",
        }),
    }
}

fn one_number(child: &ConfigItem, scope: &'static str, name: &str) -> Result<f64, ConfigError> {
    match child.values.as_slice() {
        [ConfigValue::Number(n)] => Ok(*n),
        _ => Err(ConfigError::BadOption {
            key: child.key.clone(),
            scope,
            name: name.to_string(),
            expect: "exactly one number",
        }),
    }
}

fn parse_values(child: &ConfigItem, name: &str) -> Result<Vec<Oid>, ConfigError> {
    if child.values.is_empty() {
        return Err(ConfigError::BadOption {
            key: child.key.clone(),
            scope: "data",
            name: name.to_string(),
            expect: "at least one string",
        });
    }
    let mut oids = Vec::with_capacity(child.values.len());
    for value in &child.values {
        let text = value.as_str().ok_or_else(|| ConfigError::BadOption {
            key: child.key.clone(),
            scope: "data",
            name: name.to_string(),
            expect: "only string values",
        })?;
        let oid = text.parse().map_err(|source| ConfigError::InvalidOid {
            name: name.to_string(),
            text: text.to_string(),
            source,
        })?;
        oids.push(oid);
    }
    Ok(oids)
}

fn build_data(item: &ConfigItem, schemas: &SchemaRegistry) -> Result<DataDefinition, ConfigError> {
    let name = block_name(item, "data")?;
    let mut metric_type: Option<String> = None;
    let mut is_table = false;
    let mut instance_raw: Option<String> = None;
    let mut values: Option<Vec<Oid>> = None;

    for child in &item.children {
        if child.key_is("type") {
            metric_type = Some(one_string(child, "data", &name)?);
        } else if child.key_is("table") {
            is_table = one_bool(child, "data", &name)?;
        } else if child.key_is("instance") {
            instance_raw = Some(one_string(child, "data", &name)?);
        } else if child.key_is("values") {
            values = Some(parse_values(child, &name)?);
        } else {
            warn!("unknown option `{}` in data `{}` ignored", child.key, name);
        }
    }

    let metric_type = metric_type.ok_or(ConfigError::MissingOption {
        scope: "data",
        name: name.clone(),
        key: "type",
    })?;
    let values = values.ok_or(ConfigError::MissingOption {
        scope: "data",
        name: name.clone(),
        key: "values",
    })?;
    let instance_raw = instance_raw.ok_or(ConfigError::MissingOption {
        scope: "data",
        name: name.clone(),
        key: "instance",
    })?;

    let instance = if is_table {
        let column = instance_raw
            .parse()
            .map_err(|source| ConfigError::InvalidOid {
                name: name.clone(),
                text: instance_raw.clone(),
                source,
            })?;
        InstanceSpec::Column(column)
    } else {
        InstanceSpec::Literal(instance_raw)
    };

    // Slot count is checked here when the type is known; unknown types are
    // re-checked when the definition is polled.
    if let Some(schema) = schemas.lookup(&metric_type) {
        if schema.slot_count() != values.len() {
            return Err(ConfigError::SlotCountMismatch {
                name,
                metric_type,
                expected: schema.slot_count(),
                actual: values.len(),
            });
        }
    } else {
        warn!(
            "data `{}` references unknown metric type `{}`, slot count will be checked when polled",
            name, metric_type
        );
    }

    Ok(DataDefinition {
        name,
        metric_type,
        instance,
        values,
    })
}

fn build_host(item: &ConfigItem) -> Result<HostDefinition, ConfigError> {
    let name = block_name(item, "host")?;
    let mut address: Option<String> = None;
    let mut community: Option<String> = None;
    let mut version = ProtocolVersion::default();

    for child in &item.children {
        if child.key_is("address") {
            address = Some(one_string(child, "host", &name)?);
        } else if child.key_is("community") {
            community = Some(one_string(child, "host", &name)?);
        } else if child.key_is("version") {
            let n = one_number(child, "host", &name)?;
            version = ProtocolVersion::from_number(n).ok_or(ConfigError::InvalidVersion {
                name: name.clone(),
                value: n,
            })?;
        } else if child.key_is("collect") {
            // Bound by the caller once every host is registered.
        } else {
            warn!("unknown option `{}` in host `{}` ignored", child.key, name);
        }
    }

    let address = address.ok_or(ConfigError::MissingOption {
        scope: "host",
        name: name.clone(),
        key: "address",
    })?;
    let community = community.ok_or(ConfigError::MissingOption {
        scope: "host",
        name: name.clone(),
        key: "community",
    })?;

    Ok(HostDefinition {
        name,
        address,
        community: Community::new(community),
        version,
        collect_set: Vec::new(),
    })
}

fn bind_collect(
    item: &ConfigItem,
    data: &DataRegistry,
    hosts: &mut HostRegistry,
    summary: &mut BindSummary,
) {
    let names: Option<Vec<&str>> = item.values.iter().map(|v| v.as_str()).collect();
    let Some(names) = names else {
        warn!("collect declaration arguments must all be strings, ignored");
        summary.collects_rejected += 1;
        return;
    };
    if names.len() < 2 {
        warn!("collect declaration needs a host name and at least one data name, ignored");
        summary.collects_rejected += 1;
        return;
    }
    let Some(host_handle) = hosts.lookup(names[0]) else {
        warn!(
            "collect references unknown host `{}`, declaration ignored",
            names[0]
        );
        summary.collects_rejected += 1;
        return;
    };
    for data_name in &names[1..] {
        match data.lookup(data_name) {
            Some(handle) => {
                hosts.push_collect(host_handle, handle);
                summary.bindings_bound += 1;
            }
            None => {
                warn!(
                    "collect for host `{}` references unknown data `{}`, skipped",
                    names[0], data_name
                );
                summary.bindings_skipped += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_str;

    fn bind_str(toml: &str) -> (DataRegistry, HostRegistry, BindSummary) {
        let items = parse_str(toml, "test").unwrap();
        let mut schemas = SchemaRegistry::with_builtins();
        bind(&items, &mut schemas)
    }

    #[test]
    fn test_full_config_binds() {
        let (data, hosts, summary) = bind_str(
            r#"
[data.std_traffic]
type = "if_octets"
table = true
instance = "1.3.6.1.2.1.2.2.1.2"
values = ["1.3.6.1.2.1.2.2.1.10", "1.3.6.1.2.1.2.2.1.16"]

[data.uptime]
type = "uptime"
instance = "boot"
values = ["1.3.6.1.4.1.2021.100.1"]

[host.router01]
address = "192.0.2.10"
community = "public"
version = 1

collect = [["router01", "std_traffic", "uptime"]]
"#,
        );

        assert_eq!(data.len(), 2);
        assert_eq!(hosts.len(), 1);
        assert_eq!(summary.data_rejected, 0);
        assert_eq!(summary.bindings_bound, 2);

        let traffic = data.get(data.lookup("std_traffic").unwrap()).unwrap();
        assert!(traffic.is_table());
        assert_eq!(
            traffic.instance,
            InstanceSpec::Column("1.3.6.1.2.1.2.2.1.2".parse().unwrap())
        );
        assert_eq!(traffic.values.len(), 2);

        let uptime = data.get(data.lookup("uptime").unwrap()).unwrap();
        assert_eq!(
            uptime.instance,
            InstanceSpec::Literal("boot".to_string())
        );

        let host = hosts.get(hosts.lookup("router01").unwrap()).unwrap();
        assert_eq!(host.version, ProtocolVersion::V1);
        assert_eq!(host.community.expose(), "public");
        assert_eq!(host.collect_set.len(), 2);
        assert_eq!(host.collect_set[0], data.lookup("std_traffic").unwrap());
        assert_eq!(host.collect_set[1], data.lookup("uptime").unwrap());
    }

    #[test]
    fn test_missing_type_rejects_definition_only() {
        let (data, _, summary) = bind_str(
            r#"
[data.broken]
instance = "x"
values = ["1.3.6.1"]

[data.fine]
type = "gauge"
instance = "x"
values = ["1.3.6.1"]
"#,
        );
        assert_eq!(data.len(), 1);
        assert!(data.lookup("fine").is_some());
        assert!(data.lookup("broken").is_none());
        assert_eq!(summary.data_rejected, 1);
    }

    #[test]
    fn test_missing_values_rejected() {
        let (data, _, summary) = bind_str(
            r#"
[data.broken]
type = "gauge"
instance = "x"
"#,
        );
        assert!(data.is_empty());
        assert_eq!(summary.data_rejected, 1);
    }

    #[test]
    fn test_empty_values_rejected() {
        let (data, _, _) = bind_str(
            r#"
[data.broken]
type = "gauge"
instance = "x"
values = []
"#,
        );
        assert!(data.is_empty());
    }

    #[test]
    fn test_missing_instance_rejected() {
        let (data, _, _) = bind_str(
            r#"
[data.broken]
type = "gauge"
values = ["1.3.6.1"]
"#,
        );
        assert!(data.is_empty());
    }

    #[test]
    fn test_bad_oid_rejected() {
        let (data, _, _) = bind_str(
            r#"
[data.broken]
type = "gauge"
instance = "x"
values = ["1.3.not-an-oid"]
"#,
        );
        assert!(data.is_empty());
    }

    #[test]
    fn test_table_instance_must_be_oid() {
        let (data, _, _) = bind_str(
            r#"
[data.broken]
type = "gauge"
table = true
instance = "eth0"
values = ["1.3.6.1"]
"#,
        );
        assert!(data.is_empty());
    }

    #[test]
    fn test_slot_count_checked_against_known_type() {
        let (data, _, summary) = bind_str(
            r#"
[data.broken]
type = "if_octets"
instance = "x"
values = ["1.3.6.1.1"]
"#,
        );
        assert!(data.is_empty());
        assert_eq!(summary.data_rejected, 1);
    }

    #[test]
    fn test_unknown_type_accepted_for_poll_time_check() {
        let (data, _, summary) = bind_str(
            r#"
[data.maybe]
type = "custom_widget"
instance = "x"
values = ["1.3.6.1.1"]
"#,
        );
        assert_eq!(data.len(), 1);
        assert_eq!(summary.data_rejected, 0);
    }

    #[test]
    fn test_types_section_extends_schemas() {
        let items = parse_str(
            r#"
[types]
port_pair = ["in:counter", "out:counter"]

[data.pair]
type = "port_pair"
instance = "x"
values = ["1.3.6.1.1", "1.3.6.1.2"]
"#,
            "test",
        )
        .unwrap();
        let mut schemas = SchemaRegistry::with_builtins();
        let (data, _, summary) = bind(&items, &mut schemas);
        assert_eq!(summary.types_added, 1);
        assert_eq!(data.len(), 1);
        assert_eq!(schemas.lookup("port_pair").unwrap().slot_count(), 2);
    }

    #[test]
    fn test_host_missing_community_rejected() {
        let (_, hosts, summary) = bind_str(
            r#"
[host.bad]
address = "192.0.2.1"

[host.good]
address = "192.0.2.2"
community = "public"
"#,
        );
        assert_eq!(hosts.len(), 1);
        assert!(hosts.lookup("good").is_some());
        assert_eq!(summary.hosts_rejected, 1);
    }

    #[test]
    fn test_host_version_out_of_range_rejected() {
        let (_, hosts, summary) = bind_str(
            r#"
[host.bad]
address = "192.0.2.1"
community = "public"
version = 3
"#,
        );
        assert!(hosts.is_empty());
        assert_eq!(summary.hosts_rejected, 1);
    }

    #[test]
    fn test_host_version_defaults_to_v2c() {
        let (_, hosts, _) = bind_str(
            r#"
[host.h]
address = "192.0.2.1"
community = "public"
"#,
        );
        let host = hosts.get(hosts.lookup("h").unwrap()).unwrap();
        assert_eq!(host.version, ProtocolVersion::V2c);
    }

    #[test]
    fn test_collect_unknown_host_rejects_declaration() {
        let (_, hosts, summary) = bind_str(
            r#"
[data.d]
type = "gauge"
instance = "x"
values = ["1.3.6.1"]

[host.h]
address = "192.0.2.1"
community = "public"

collect = [["nosuch", "d"]]
"#,
        );
        assert_eq!(summary.collects_rejected, 1);
        assert_eq!(summary.bindings_bound, 0);
        let host = hosts.get(hosts.lookup("h").unwrap()).unwrap();
        assert!(host.collect_set.is_empty());
    }

    #[test]
    fn test_collect_unknown_data_skips_that_name_only() {
        let (data, hosts, summary) = bind_str(
            r#"
[data.d]
type = "gauge"
instance = "x"
values = ["1.3.6.1"]

[host.h]
address = "192.0.2.1"
community = "public"

collect = [["h", "nosuch", "d"]]
"#,
        );
        assert_eq!(summary.bindings_bound, 1);
        assert_eq!(summary.bindings_skipped, 1);
        let host = hosts.get(hosts.lookup("h").unwrap()).unwrap();
        assert_eq!(host.collect_set, vec![data.lookup("d").unwrap()]);
    }

    #[test]
    fn test_collect_needs_two_arguments() {
        let (_, _, summary) = bind_str(
            r#"
[host.h]
address = "192.0.2.1"
community = "public"

collect = [["h"]]
"#,
        );
        assert_eq!(summary.collects_rejected, 1);
        assert_eq!(summary.bindings_bound, 0);
    }

    #[test]
    fn test_collect_names_resolve_case_insensitively() {
        let (_, hosts, summary) = bind_str(
            r#"
[data.Traffic]
type = "gauge"
instance = "x"
values = ["1.3.6.1"]

[host.Router]
address = "192.0.2.1"
community = "public"

collect = [["router", "TRAFFIC"]]
"#,
        );
        assert_eq!(summary.bindings_bound, 1);
        let host = hosts.get(hosts.lookup("Router").unwrap()).unwrap();
        assert_eq!(host.collect_set.len(), 1);
    }

    #[test]
    fn test_collect_binds_from_top_level_and_host_block() {
        // A root-level collect must precede the first section header in
        // TOML; one written after `[host.h]` lands inside the host table.
        // Both placements bind, top-level first.
        let (data, hosts, summary) = bind_str(
            r#"
collect = [["h", "a"]]

[data.a]
type = "gauge"
instance = "x"
values = ["1.3.6.1.1"]

[data.b]
type = "gauge"
instance = "y"
values = ["1.3.6.1.2"]

[host.h]
address = "192.0.2.1"
community = "public"
collect = [["h", "b"]]
"#,
        );
        assert_eq!(summary.bindings_bound, 2);
        assert_eq!(summary.collects_rejected, 0);
        let host = hosts.get(hosts.lookup("h").unwrap()).unwrap();
        assert_eq!(
            host.collect_set,
            vec![data.lookup("a").unwrap(), data.lookup("b").unwrap()]
        );
    }

    #[test]
    fn test_duplicate_data_name_rejected() {
        let (data, _, summary) = bind_str(
            r#"
[data.traffic]
type = "gauge"
instance = "x"
values = ["1.3.6.1"]

[data.TRAFFIC]
type = "gauge"
instance = "y"
values = ["1.3.6.2"]
"#,
        );
        assert_eq!(data.len(), 1);
        assert_eq!(summary.data_rejected, 1);
        let def = data.get(data.lookup("traffic").unwrap()).unwrap();
        assert_eq!(def.instance, InstanceSpec::Literal("x".to_string()));
    }

    #[test]
    fn test_unknown_keys_ignored_everywhere() {
        let (data, hosts, summary) = bind_str(
            r#"
flavor = "strawberry"

[data.d]
type = "gauge"
instance = "x"
values = ["1.3.6.1"]
comment = "not a recognized option"

[host.h]
address = "192.0.2.1"
community = "public"
location = "rack 4"
"#,
        );
        assert_eq!(data.len(), 1);
        assert_eq!(hosts.len(), 1);
        assert_eq!(summary.data_rejected, 0);
        assert_eq!(summary.hosts_rejected, 0);
    }
}

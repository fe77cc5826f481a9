//! Naming-convention resolution for flat converter records.
//!
//! Connections are declared positionally (`from_bus_0`, `to_bus_1`),
//! relations by bus name (`conversion_factor_gas`,
//! `flow_share_fix_hydro`, `flow_share_min_hydro`,
//! `flow_share_max_hydro`) and emission factors by source and emission
//! bus (`emission_factor_gas_co2`).
//! A connection may carry at most one relation; every field must be
//! consumed, so typos surface as errors instead of silently ignored
//! columns.

use std::collections::BTreeMap;

use mimo_core::{
    Connection, EmissionOutput, EmissionSource, MimoError, MimoNode, MimoResult, Sequence,
};

use crate::records::{FieldValue, NodeRecord};

pub fn resolve_node(record: &NodeRecord) -> MimoResult<MimoNode> {
    let mut fields: BTreeMap<&str, &FieldValue> = record
        .fields
        .iter()
        .map(|(k, v)| (k.as_str(), v))
        .collect();

    let inputs = take_buses(&record.name, &mut fields, "from_bus_")?;
    let outputs = take_buses(&record.name, &mut fields, "to_bus_")?;
    let known: Vec<&str> = inputs
        .iter()
        .chain(outputs.iter())
        .map(|s| s.as_str())
        .collect();

    let mut node = MimoNode::new(&record.name, &record.primary);
    node.year = record.year;
    if let Some(region) = &record.region {
        node = node.with_region(region);
    }

    for bus in &inputs {
        node = node.with_input(connection(&record.name, &mut fields, bus)?);
    }
    for bus in &outputs {
        node = node.with_output(connection(&record.name, &mut fields, bus)?);
    }

    for emission in take_emissions(&record.name, &mut fields, &known)? {
        node = node.with_emission(emission);
    }

    if let Some((key, _)) = fields.iter().next() {
        return Err(MimoError::config(
            &record.name,
            *key,
            "unrecognised field; expected from_bus_*, to_bus_*, conversion_factor_*, \
             flow_share_fix_*, flow_share_min_*, flow_share_max_* or emission_factor_*",
        ));
    }

    if record.capacity_cost.is_some() && !record.expandable {
        return Err(MimoError::config(
            &record.name,
            "capacity_cost",
            "capacity costs require 'expandable: true'",
        ));
    }
    if record.expandable {
        node = node.expandable(record.capacity_cost.unwrap_or(0.0));
    }
    if let Some(capacity) = record.capacity {
        node = node.with_capacity(capacity);
    }
    if let Some(potential) = record.capacity_potential {
        node = node.with_capacity_potential(potential);
    }
    if let Some(minimum) = record.capacity_minimum {
        node = node.with_capacity_minimum(minimum);
    }
    if let Some(bound) = &record.activity_bound_max {
        node = node.with_activity_bound_max(bound.to_sequence());
    }
    if let Some(bound) = &record.activity_bound_min {
        node = node.with_activity_bound_min(bound.to_sequence());
    }
    if let Some(bound) = &record.activity_bound_fix {
        node = node.with_activity_bound_fix(bound.to_sequence());
    }
    Ok(node)
}

/// Collect `<prefix><index>` fields into an index-ordered bus list.
fn take_buses(
    node: &str,
    fields: &mut BTreeMap<&str, &FieldValue>,
    prefix: &str,
) -> MimoResult<Vec<String>> {
    let mut found: Vec<(usize, String)> = Vec::new();
    let keys: Vec<&str> = fields
        .keys()
        .filter(|k| k.starts_with(prefix))
        .copied()
        .collect();
    for key in keys {
        let index: usize = key[prefix.len()..].parse().map_err(|_| {
            MimoError::config(
                node,
                key,
                format!("expected an integer suffix after '{prefix}'"),
            )
        })?;
        let bus = match fields.remove(key) {
            Some(FieldValue::Name(name)) => name.clone(),
            _ => return Err(MimoError::config(node, key, "expected a bus name")),
        };
        found.push((index, bus));
    }
    found.sort_by_key(|(index, _)| *index);
    Ok(found.into_iter().map(|(_, bus)| bus).collect())
}

/// At most one of conversion factor, fixed, minimum or maximum share
/// may be declared per connected bus.
fn connection(
    node: &str,
    fields: &mut BTreeMap<&str, &FieldValue>,
    bus: &str,
) -> MimoResult<Connection> {
    let conversion = format!("conversion_factor_{bus}");
    let fix = format!("flow_share_fix_{bus}");
    let min = format!("flow_share_min_{bus}");
    let max = format!("flow_share_max_{bus}");
    let present: Vec<&String> = [&conversion, &fix, &min, &max]
        .into_iter()
        .filter(|k| fields.contains_key(k.as_str()))
        .collect();
    if present.len() > 1 {
        return Err(MimoError::config(
            node,
            present[0].as_str(),
            format!(
                "declares both '{}' and '{}' for bus '{bus}'",
                present[0], present[1]
            ),
        ));
    }

    let take =
        |fields: &mut BTreeMap<&str, &FieldValue>, key: &str| -> Option<Sequence> {
            fields.remove(key).map(FieldValue::to_sequence)
        };
    if let Some(seq) = take(fields, &conversion) {
        Ok(Connection::conversion(bus, seq))
    } else if let Some(seq) = take(fields, &fix) {
        Ok(Connection::fixed_share(bus, seq))
    } else if let Some(seq) = take(fields, &min) {
        Ok(Connection::min_share(bus, seq))
    } else if let Some(seq) = take(fields, &max) {
        Ok(Connection::max_share(bus, seq))
    } else {
        Ok(Connection::free(bus))
    }
}

/// Split `emission_factor_<source>_<bus>` against the known connection
/// buses. Source names may contain underscores, so the split is found
/// by matching rather than position; two valid readings are an error.
fn take_emissions(
    node: &str,
    fields: &mut BTreeMap<&str, &FieldValue>,
    known: &[&str],
) -> MimoResult<Vec<EmissionOutput>> {
    const PREFIX: &str = "emission_factor_";
    let keys: Vec<&str> = fields
        .keys()
        .filter(|k| k.starts_with(PREFIX))
        .copied()
        .collect();

    let mut outputs: BTreeMap<String, Vec<EmissionSource>> = BTreeMap::new();
    for key in keys {
        let rest = &key[PREFIX.len()..];
        let mut readings: Vec<(&str, &str)> = Vec::new();
        for &source in known {
            if let Some(bus) = rest
                .strip_prefix(source)
                .and_then(|r| r.strip_prefix('_'))
            {
                if !bus.is_empty() {
                    readings.push((source, bus));
                }
            }
        }
        match readings.as_slice() {
            [] => {
                return Err(MimoError::config(
                    node,
                    key,
                    "does not start with the name of a connected bus",
                ));
            }
            [(source, bus)] => {
                let factor = fields
                    .remove(key)
                    .map(FieldValue::to_sequence)
                    .unwrap_or(Sequence::Constant(0.0));
                outputs.entry((*bus).to_string()).or_default().push(EmissionSource {
                    source: (*source).to_string(),
                    factor,
                });
            }
            _ => {
                let options: Vec<String> = readings
                    .iter()
                    .map(|(s, b)| format!("source '{s}' to bus '{b}'"))
                    .collect();
                return Err(MimoError::config(
                    node,
                    key,
                    format!("is ambiguous: could mean {}", options.join(" or ")),
                ));
            }
        }
    }

    Ok(outputs
        .into_iter()
        .map(|(bus, sources)| EmissionOutput { bus, sources })
        .collect())
}

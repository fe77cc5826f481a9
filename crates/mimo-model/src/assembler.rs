//! Per-node constraint assembly.
//!
//! For each converter the assembler resolves every declared sequence
//! against the horizon, validates the node as a whole, and only then
//! binds share, conversion, capacity and emission constraints. A
//! validation error aborts model construction before any constraint of
//! the offending node is kept.

use std::collections::HashSet;

use good_lp::{constraint, Expression, Variable};
use mimo_core::{
    FlowRelation, Horizon, MimoError, MimoNode, MimoResult, ResolvedSequence, SequenceStore, Side,
};

use crate::model::{EnergyModel, FlowKey, NodeGroup};
use crate::{capacity, relation, share};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RelationKind {
    FixedShare,
    MinShare,
    MaxShare,
    Conversion,
}

/// A relation with its sequence resolved once per horizon slice.
pub(crate) struct ResolvedRelation {
    pub kind: RelationKind,
    pub by_slice: Vec<ResolvedSequence>,
}

pub(crate) struct ResolvedConnection {
    pub bus: String,
    pub side: Side,
    pub relation: Option<ResolvedRelation>,
}

pub(crate) struct ResolvedEmission {
    pub bus: String,
    /// Source bus and its per-slice emission factors.
    pub sources: Vec<(String, Vec<ResolvedSequence>)>,
}

/// Per-slice activity bounds of one node.
pub(crate) struct ResolvedActivity {
    pub max: Vec<ResolvedSequence>,
    pub min: Option<Vec<ResolvedSequence>>,
    pub fix: Option<Vec<ResolvedSequence>>,
}

/// All sequences of one node resolved against the horizon.
pub(crate) struct ResolvedNode {
    pub connections: Vec<ResolvedConnection>,
    pub activity: ResolvedActivity,
    pub emissions: Vec<ResolvedEmission>,
}

/// The flow key of a connection seen from the converter.
pub(crate) fn key_for(node: &str, bus: &str, side: Side) -> FlowKey {
    match side {
        Side::Input => FlowKey::new(bus, node),
        Side::Output => FlowKey::new(node, bus),
    }
}

pub(crate) fn assemble(model: &mut EnergyModel<'_>, node: &MimoNode) -> MimoResult<()> {
    let resolved = resolve(model.store, model.horizon, node)?;
    validate(node, &resolved)?;
    share::validate_shares(node, &resolved, model.horizon)?;
    relation::validate_factors(node, &resolved, model.horizon)?;

    let primary = resolved
        .connections
        .iter()
        .find(|c| c.bus == node.primary)
        .map(|c| key_for(&node.name, &c.bus, c.side))
        .ok_or_else(|| {
            MimoError::config(
                &node.name,
                "primary",
                format!("primary bus '{}' is not connected to this node", node.primary),
            )
        })?;
    let primary_vars = model.flows[&primary].clone();

    let mut connections = Vec::with_capacity(resolved.connections.len());
    for conn in &resolved.connections {
        let key = key_for(&node.name, &conn.bus, conn.side);
        connections.push(key.clone());
        if let Some(rel) = &conn.relation {
            let flow_vars = model.flows[&key].clone();
            match rel.kind {
                RelationKind::Conversion => {
                    relation::bind(model, &flow_vars, &rel.by_slice, &primary_vars)
                }
                RelationKind::FixedShare => {
                    share::bind(model, share::ShareKind::Fixed, &flow_vars, &rel.by_slice, &primary_vars)
                }
                RelationKind::MinShare => {
                    share::bind(model, share::ShareKind::Min, &flow_vars, &rel.by_slice, &primary_vars)
                }
                RelationKind::MaxShare => {
                    share::bind(model, share::ShareKind::Max, &flow_vars, &rel.by_slice, &primary_vars)
                }
            }
        }
    }

    let capacity = capacity::bind(model, node, &resolved.activity, &primary_vars)?;
    let emissions = bind_emissions(model, node, &resolved)?;

    model.groups.insert(
        node.name.clone(),
        NodeGroup {
            node: node.name.clone(),
            primary,
            connections,
            emissions,
            capacity,
        },
    );
    Ok(())
}

fn resolve(
    store: &SequenceStore,
    horizon: &Horizon,
    node: &MimoNode,
) -> MimoResult<ResolvedNode> {
    let mut connections = Vec::new();
    for (side, conn) in node.connections() {
        let relation = match &conn.relation {
            FlowRelation::Free => None,
            FlowRelation::FixedShare(seq) => Some(ResolvedRelation {
                kind: RelationKind::FixedShare,
                by_slice: resolve_by_slice(
                    store,
                    horizon,
                    seq,
                    &node.name,
                    &format!("flow_share_fix_{}", conn.bus),
                )?,
            }),
            FlowRelation::MinShare(seq) => Some(ResolvedRelation {
                kind: RelationKind::MinShare,
                by_slice: resolve_by_slice(
                    store,
                    horizon,
                    seq,
                    &node.name,
                    &format!("flow_share_min_{}", conn.bus),
                )?,
            }),
            FlowRelation::MaxShare(seq) => Some(ResolvedRelation {
                kind: RelationKind::MaxShare,
                by_slice: resolve_by_slice(
                    store,
                    horizon,
                    seq,
                    &node.name,
                    &format!("flow_share_max_{}", conn.bus),
                )?,
            }),
            FlowRelation::Conversion(seq) => Some(ResolvedRelation {
                kind: RelationKind::Conversion,
                by_slice: resolve_by_slice(
                    store,
                    horizon,
                    seq,
                    &node.name,
                    &format!("conversion_factor_{}", conn.bus),
                )?,
            }),
        };
        connections.push(ResolvedConnection {
            bus: conn.bus.clone(),
            side,
            relation,
        });
    }

    let activity = ResolvedActivity {
        max: resolve_by_slice(
            store,
            horizon,
            &node.activity_bound_max,
            &node.name,
            "activity_bound_max",
        )?,
        min: node
            .activity_bound_min
            .as_ref()
            .map(|seq| resolve_by_slice(store, horizon, seq, &node.name, "activity_bound_min"))
            .transpose()?,
        fix: node
            .activity_bound_fix
            .as_ref()
            .map(|seq| resolve_by_slice(store, horizon, seq, &node.name, "activity_bound_fix"))
            .transpose()?,
    };

    let mut emissions = Vec::new();
    for emission in &node.emissions {
        let mut sources = Vec::new();
        for src in &emission.sources {
            let field = format!("emission_factor_{}_{}", src.source, emission.bus);
            let factors = resolve_by_slice(store, horizon, &src.factor, &node.name, &field)?;
            sources.push((src.source.clone(), factors));
        }
        emissions.push(ResolvedEmission {
            bus: emission.bus.clone(),
            sources,
        });
    }

    Ok(ResolvedNode {
        connections,
        activity,
        emissions,
    })
}

fn resolve_by_slice(
    store: &SequenceStore,
    horizon: &Horizon,
    sequence: &mimo_core::Sequence,
    node: &str,
    field: &str,
) -> MimoResult<Vec<ResolvedSequence>> {
    horizon
        .slices()
        .iter()
        .map(|s| store.resolve(sequence, s.period, s.timesteps, node, field))
        .collect()
}

/// Structural checks that do not depend on sequence values.
fn validate(node: &MimoNode, resolved: &ResolvedNode) -> MimoResult<()> {
    if resolved.connections.is_empty() {
        return Err(MimoError::config(
            &node.name,
            "connections",
            "node has no inputs or outputs",
        ));
    }

    let mut seen = HashSet::new();
    for conn in &resolved.connections {
        if !seen.insert(conn.bus.as_str()) {
            return Err(MimoError::config(
                &node.name,
                "connections",
                format!("bus '{}' is connected more than once", conn.bus),
            ));
        }
    }

    let primary = resolved
        .connections
        .iter()
        .find(|c| c.bus == node.primary)
        .ok_or_else(|| {
            MimoError::config(
                &node.name,
                "primary",
                format!("primary bus '{}' is not connected to this node", node.primary),
            )
        })?;
    if primary.relation.is_some() {
        return Err(MimoError::config(
            &node.name,
            "primary",
            "the primary connection cannot carry a conversion factor or flow share",
        ));
    }

    for emission in &resolved.emissions {
        for (source, _) in &emission.sources {
            if !seen.contains(source.as_str()) {
                return Err(MimoError::config(
                    &node.name,
                    format!("emission_factor_{}_{}", source, emission.bus),
                    format!("source '{source}' is not an input or output of this node"),
                ));
            }
        }
    }
    Ok(())
}

/// Emission reporting: the flow to each emission bus equals the
/// factor-weighted sum of the tracked source flows at every timestep.
fn bind_emissions(
    model: &mut EnergyModel<'_>,
    node: &MimoNode,
    resolved: &ResolvedNode,
) -> MimoResult<Vec<FlowKey>> {
    let horizon = model.horizon;
    let mut keys = Vec::with_capacity(resolved.emissions.len());
    for emission in &resolved.emissions {
        let e_key = FlowKey::new(&node.name, &emission.bus);
        let e_vars = model.flows[&e_key].clone();
        keys.push(e_key);

        let sources: Vec<(Vec<Variable>, &Vec<ResolvedSequence>)> = emission
            .sources
            .iter()
            .map(|(source, factors)| {
                let side = resolved
                    .connections
                    .iter()
                    .find(|c| &c.bus == source)
                    .map(|c| c.side)
                    .unwrap_or(Side::Input);
                let key = key_for(&node.name, source, side);
                (model.flows[&key].clone(), factors)
            })
            .collect();

        for (i, slice) in horizon.slices().iter().enumerate() {
            let offset = horizon.offset(slice.period).unwrap_or(0);
            for t in 0..slice.timesteps {
                let mut total = Expression::from(0.0);
                for (vars, factors) in &sources {
                    total += factors[i].value(t) * vars[offset + t];
                }
                model.push(constraint!(e_vars[offset + t] - total == 0.0));
            }
        }
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelConfig;
    use mimo_core::{
        Bus, Connection, EmissionOutput, EmissionSource, EnergySystem, Sink, Source,
    };

    /// Two inputs feeding one electricity output: gas is tied to the
    /// primary flow by a conversion factor, water by a fixed share.
    fn two_input_system() -> EnergySystem {
        let mut system = EnergySystem::new();
        system.add_bus(Bus::new("gas", "gas")).unwrap();
        system.add_bus(Bus::new("water", "water")).unwrap();
        system
            .add_bus(Bus::new("electricity", "electricity"))
            .unwrap();
        system
            .add_source(Source::new("gas_station", "gas").with_variable_cost(2.0))
            .unwrap();
        system
            .add_source(Source::new("pump", "water").with_variable_cost(3.0))
            .unwrap();
        system
            .add_sink(Sink::new("demand", "electricity").with_fix(50.0))
            .unwrap();
        system
            .add_converter(
                mimo_core::MimoNode::new("plant", "electricity")
                    .with_input(Connection::conversion("gas", 0.8))
                    .with_input(Connection::fixed_share("water", 0.2))
                    .with_output(Connection::free("electricity"))
                    .with_capacity(100.0)
                    .with_activity_bound_max(1.0),
            )
            .unwrap();
        system
    }

    fn solve(system: &EnergySystem) -> crate::model::SolvedModel {
        let horizon = Horizon::single(2030, 1).unwrap();
        let store = SequenceStore::new();
        EnergyModel::new(system, &horizon, &store, ModelConfig::default())
            .unwrap()
            .solve()
            .unwrap()
    }

    #[test]
    fn conversion_and_share_follow_the_primary_flow() {
        let solved = solve(&two_input_system());
        assert!((solved.flow("plant", "electricity").unwrap()[0] - 50.0).abs() < 1e-3);
        assert!((solved.flow("gas", "plant").unwrap()[0] - 40.0).abs() < 1e-3);
        assert!((solved.flow("water", "plant").unwrap()[0] - 10.0).abs() < 1e-3);
    }

    #[test]
    fn group_records_primary_and_connections() {
        let system = two_input_system();
        let horizon = Horizon::single(2030, 1).unwrap();
        let store = SequenceStore::new();
        let model = EnergyModel::new(&system, &horizon, &store, ModelConfig::default()).unwrap();
        let group = model.group("plant").unwrap();
        assert_eq!(group.primary, FlowKey::new("plant", "electricity"));
        assert_eq!(group.connections.len(), 3);
        assert!(matches!(
            group.capacity.as_slice(),
            [(_, crate::model::CapacityHandle::Fixed(c))] if (c - 100.0).abs() < f64::EPSILON
        ));
    }

    #[test]
    fn duplicate_bus_connection_is_rejected() {
        let mut system = EnergySystem::new();
        system.add_bus(Bus::new("gas", "gas")).unwrap();
        system
            .add_bus(Bus::new("electricity", "electricity"))
            .unwrap();
        system
            .add_converter(
                mimo_core::MimoNode::new("plant", "electricity")
                    .with_input(Connection::free("gas"))
                    .with_input(Connection::conversion("gas", 0.8))
                    .with_output(Connection::free("electricity")),
            )
            .unwrap();
        let horizon = Horizon::single(2030, 1).unwrap();
        let store = SequenceStore::new();
        let err =
            EnergyModel::new(&system, &horizon, &store, ModelConfig::default()).unwrap_err();
        assert!(err
            .to_string()
            .contains("bus 'gas' is connected more than once"));
    }

    #[test]
    fn primary_must_be_connected() {
        let mut system = EnergySystem::new();
        system.add_bus(Bus::new("gas", "gas")).unwrap();
        system
            .add_bus(Bus::new("electricity", "electricity"))
            .unwrap();
        system
            .add_converter(
                mimo_core::MimoNode::new("plant", "heat")
                    .with_input(Connection::free("gas"))
                    .with_output(Connection::free("electricity")),
            )
            .unwrap();
        let horizon = Horizon::single(2030, 1).unwrap();
        let store = SequenceStore::new();
        let err =
            EnergyModel::new(&system, &horizon, &store, ModelConfig::default()).unwrap_err();
        assert!(err.to_string().contains("primary bus 'heat'"));
    }

    #[test]
    fn primary_with_a_relation_is_rejected() {
        let mut system = EnergySystem::new();
        system.add_bus(Bus::new("gas", "gas")).unwrap();
        system
            .add_bus(Bus::new("electricity", "electricity"))
            .unwrap();
        system
            .add_converter(
                mimo_core::MimoNode::new("plant", "electricity")
                    .with_input(Connection::free("gas"))
                    .with_output(Connection::conversion("electricity", 0.9)),
            )
            .unwrap();
        let horizon = Horizon::single(2030, 1).unwrap();
        let store = SequenceStore::new();
        let err =
            EnergyModel::new(&system, &horizon, &store, ModelConfig::default()).unwrap_err();
        assert!(err.to_string().contains("primary connection"));
    }

    #[test]
    fn emission_flow_equals_weighted_sources() {
        let mut system = EnergySystem::new();
        system.add_bus(Bus::new("gas", "gas")).unwrap();
        system
            .add_bus(Bus::new("electricity", "electricity"))
            .unwrap();
        system.add_bus(Bus::new("co2", "co2").unbalanced()).unwrap();
        system
            .add_source(Source::new("gas_station", "gas").with_variable_cost(1.0))
            .unwrap();
        system
            .add_sink(Sink::new("demand", "electricity").with_fix(45.0))
            .unwrap();
        system
            .add_converter(
                mimo_core::MimoNode::new("plant", "electricity")
                    .with_input(Connection::conversion("gas", 2.0))
                    .with_output(Connection::free("electricity"))
                    .with_emission(EmissionOutput {
                        bus: "co2".into(),
                        sources: vec![EmissionSource {
                            source: "gas".into(),
                            factor: 0.2.into(),
                        }],
                    }),
            )
            .unwrap();
        let solved = solve(&system);
        // gas = 2.0 * 45 = 90, co2 = 0.2 * 90 = 18
        assert!((solved.flow("gas", "plant").unwrap()[0] - 90.0).abs() < 1e-3);
        assert!((solved.flow("plant", "co2").unwrap()[0] - 18.0).abs() < 1e-3);
    }

    #[test]
    fn emission_source_must_be_a_connection() {
        let mut system = EnergySystem::new();
        system.add_bus(Bus::new("gas", "gas")).unwrap();
        system
            .add_bus(Bus::new("electricity", "electricity"))
            .unwrap();
        system.add_bus(Bus::new("co2", "co2").unbalanced()).unwrap();
        system
            .add_converter(
                mimo_core::MimoNode::new("plant", "electricity")
                    .with_input(Connection::free("gas"))
                    .with_output(Connection::free("electricity"))
                    .with_emission(EmissionOutput {
                        bus: "co2".into(),
                        sources: vec![EmissionSource {
                            source: "coal".into(),
                            factor: 0.3.into(),
                        }],
                    }),
            )
            .unwrap();
        let horizon = Horizon::single(2030, 1).unwrap();
        let store = SequenceStore::new();
        let err =
            EnergyModel::new(&system, &horizon, &store, ModelConfig::default()).unwrap_err();
        assert!(err.to_string().contains("'coal'"));
    }

    #[test]
    fn free_connection_stays_unconstrained_when_shares_cover_the_side() {
        // Fixed shares of 0.6 and 0.4 fully allocate the share mechanism;
        // the third input is still governed only by its bus balance.
        let mut system = EnergySystem::new();
        for bus in ["a", "b", "c"] {
            system.add_bus(Bus::new(bus, bus)).unwrap();
        }
        system
            .add_bus(Bus::new("electricity", "electricity"))
            .unwrap();
        system.add_source(Source::new("sa", "a")).unwrap();
        system.add_source(Source::new("sb", "b")).unwrap();
        system
            .add_source(Source::new("sc", "c").with_fix(7.0))
            .unwrap();
        system
            .add_sink(Sink::new("demand", "electricity").with_fix(50.0))
            .unwrap();
        system
            .add_converter(
                mimo_core::MimoNode::new("plant", "electricity")
                    .with_input(Connection::fixed_share("a", 0.6))
                    .with_input(Connection::fixed_share("b", 0.4))
                    .with_input(Connection::free("c"))
                    .with_output(Connection::free("electricity")),
            )
            .unwrap();
        let solved = solve(&system);
        assert!((solved.flow("a", "plant").unwrap()[0] - 30.0).abs() < 1e-3);
        assert!((solved.flow("b", "plant").unwrap()[0] - 20.0).abs() < 1e-3);
        assert!((solved.flow("c", "plant").unwrap()[0] - 7.0).abs() < 1e-3);
    }
}

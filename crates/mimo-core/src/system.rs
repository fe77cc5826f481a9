//! Energy-system graph: buses, sources, sinks, and converters
//!
//! The system is a directed petgraph where buses and components are
//! nodes and every (component, bus) connection is an edge. Model
//! construction later creates one flow variable per edge and timestep,
//! so the graph is the single source of truth for which flows exist.

use crate::error::{MimoError, MimoResult};
use crate::node::MimoNode;
use crate::sequence::Sequence;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A named commodity pool. Balanced buses enforce conservation of flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bus {
    pub name: String,
    pub commodity: String,
    pub balanced: bool,
}

impl Bus {
    pub fn new(name: impl Into<String>, commodity: impl Into<String>) -> Self {
        Bus {
            name: name.into(),
            commodity: commodity.into(),
            balanced: true,
        }
    }

    /// Emission sinks and other accounting pools skip conservation.
    pub fn unbalanced(mut self) -> Self {
        self.balanced = false;
        self
    }
}

/// Commodity supply with an optional fixed or bounded profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub name: String,
    pub bus: String,
    pub nominal: f64,
    /// Supply exactly `fix(t) * nominal`.
    pub fix: Option<Sequence>,
    /// Supply at most `max(t) * nominal`.
    pub max: Option<Sequence>,
    pub variable_cost: f64,
}

impl Source {
    pub fn new(name: impl Into<String>, bus: impl Into<String>) -> Self {
        Source {
            name: name.into(),
            bus: bus.into(),
            nominal: 1.0,
            fix: None,
            max: None,
            variable_cost: 0.0,
        }
    }

    pub fn with_fix(mut self, fix: impl Into<Sequence>) -> Self {
        self.fix = Some(fix.into());
        self
    }

    pub fn with_max(mut self, max: impl Into<Sequence>) -> Self {
        self.max = Some(max.into());
        self
    }

    pub fn with_nominal(mut self, nominal: f64) -> Self {
        self.nominal = nominal;
        self
    }

    pub fn with_variable_cost(mut self, cost: f64) -> Self {
        self.variable_cost = cost;
        self
    }
}

/// Commodity demand with a fixed profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sink {
    pub name: String,
    pub bus: String,
    pub nominal: f64,
    /// Consume exactly `fix(t) * nominal`; free disposal when unset.
    pub fix: Option<Sequence>,
}

impl Sink {
    pub fn new(name: impl Into<String>, bus: impl Into<String>) -> Self {
        Sink {
            name: name.into(),
            bus: bus.into(),
            nominal: 1.0,
            fix: None,
        }
    }

    pub fn with_fix(mut self, fix: impl Into<Sequence>) -> Self {
        self.fix = Some(fix.into());
        self
    }

    pub fn with_nominal(mut self, nominal: f64) -> Self {
        self.nominal = nominal;
        self
    }
}

/// Node of the system graph.
#[derive(Debug, Clone)]
pub enum SystemNode {
    Bus(Bus),
    Source(Source),
    Sink(Sink),
    Converter(MimoNode),
}

impl SystemNode {
    pub fn label(&self) -> &str {
        match self {
            SystemNode::Bus(b) => &b.name,
            SystemNode::Source(s) => &s.name,
            SystemNode::Sink(s) => &s.name,
            SystemNode::Converter(n) => &n.name,
        }
    }
}

/// Whether an edge is an ordinary commodity flow or an emission report.
/// Emission flows may go negative (capture), ordinary flows are >= 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    Standard,
    Emission,
}

/// Directed flow between a component and a bus.
#[derive(Debug, Clone)]
pub struct FlowEdge {
    pub from: String,
    pub to: String,
    pub kind: FlowKind,
}

/// The energy-system graph under construction.
#[derive(Debug, Default)]
pub struct EnergySystem {
    pub graph: DiGraph<SystemNode, FlowEdge>,
    index: HashMap<String, NodeIndex>,
}

impl EnergySystem {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&mut self, node: SystemNode) -> MimoResult<NodeIndex> {
        let label = node.label().to_string();
        if self.index.contains_key(&label) {
            return Err(MimoError::config(
                &label,
                "name",
                "a component with this name already exists",
            ));
        }
        let idx = self.graph.add_node(node);
        self.index.insert(label, idx);
        Ok(idx)
    }

    fn bus_index(&self, name: &str, owner: &str, field: &str) -> MimoResult<NodeIndex> {
        let idx = self.index.get(name).copied().ok_or_else(|| {
            MimoError::config(owner, field, format!("references unknown bus '{name}'"))
        })?;
        match &self.graph[idx] {
            SystemNode::Bus(_) => Ok(idx),
            _ => Err(MimoError::config(
                owner,
                field,
                format!("'{name}' is not a bus"),
            )),
        }
    }

    pub fn add_bus(&mut self, bus: Bus) -> MimoResult<()> {
        self.register(SystemNode::Bus(bus))?;
        Ok(())
    }

    pub fn add_source(&mut self, source: Source) -> MimoResult<()> {
        let bus_idx = self.bus_index(&source.bus, &source.name, "bus")?;
        let edge = FlowEdge {
            from: source.name.clone(),
            to: source.bus.clone(),
            kind: FlowKind::Standard,
        };
        let idx = self.register(SystemNode::Source(source))?;
        self.graph.add_edge(idx, bus_idx, edge);
        Ok(())
    }

    pub fn add_sink(&mut self, sink: Sink) -> MimoResult<()> {
        let bus_idx = self.bus_index(&sink.bus, &sink.name, "bus")?;
        let edge = FlowEdge {
            from: sink.bus.clone(),
            to: sink.name.clone(),
            kind: FlowKind::Standard,
        };
        let idx = self.register(SystemNode::Sink(sink))?;
        self.graph.add_edge(bus_idx, idx, edge);
        Ok(())
    }

    /// Add a converter and wire edges for every declared connection:
    /// bus -> converter for inputs, converter -> bus for outputs and
    /// emission reports.
    pub fn add_converter(&mut self, node: MimoNode) -> MimoResult<()> {
        let name = node.name.clone();
        let mut input_edges = Vec::with_capacity(node.inputs.len());
        for conn in &node.inputs {
            let bus_idx = self.bus_index(&conn.bus, &name, "inputs")?;
            input_edges.push((bus_idx, conn.bus.clone()));
        }
        let mut output_edges = Vec::with_capacity(node.outputs.len());
        for conn in &node.outputs {
            let bus_idx = self.bus_index(&conn.bus, &name, "outputs")?;
            output_edges.push((bus_idx, conn.bus.clone()));
        }
        let mut emission_edges = Vec::with_capacity(node.emissions.len());
        for emission in &node.emissions {
            // An emission report must not alias a standard connection:
            // the pair (converter, bus) identifies a single flow.
            if node
                .connections()
                .any(|(_, conn)| conn.bus == emission.bus)
                || emission_edges
                    .iter()
                    .any(|(_, bus): &(NodeIndex, String)| *bus == emission.bus)
            {
                return Err(MimoError::config(
                    &name,
                    "emissions",
                    format!("bus '{}' already carries a flow of this node", emission.bus),
                ));
            }
            let bus_idx = self.bus_index(&emission.bus, &name, "emissions")?;
            emission_edges.push((bus_idx, emission.bus.clone()));
        }

        let idx = self.register(SystemNode::Converter(node))?;
        for (bus_idx, bus) in input_edges {
            self.graph.add_edge(
                bus_idx,
                idx,
                FlowEdge {
                    from: bus,
                    to: name.clone(),
                    kind: FlowKind::Standard,
                },
            );
        }
        for (bus_idx, bus) in output_edges {
            self.graph.add_edge(
                idx,
                bus_idx,
                FlowEdge {
                    from: name.clone(),
                    to: bus,
                    kind: FlowKind::Standard,
                },
            );
        }
        for (bus_idx, bus) in emission_edges {
            self.graph.add_edge(
                idx,
                bus_idx,
                FlowEdge {
                    from: name.clone(),
                    to: bus,
                    kind: FlowKind::Emission,
                },
            );
        }
        Ok(())
    }

    pub fn node_index(&self, name: &str) -> Option<NodeIndex> {
        self.index.get(name).copied()
    }

    pub fn bus(&self, name: &str) -> Option<&Bus> {
        match self.index.get(name).map(|idx| &self.graph[*idx]) {
            Some(SystemNode::Bus(bus)) => Some(bus),
            _ => None,
        }
    }

    pub fn buses(&self) -> impl Iterator<Item = (NodeIndex, &Bus)> {
        self.graph.node_indices().filter_map(|idx| match &self.graph[idx] {
            SystemNode::Bus(bus) => Some((idx, bus)),
            _ => None,
        })
    }

    pub fn converters(&self) -> impl Iterator<Item = &MimoNode> {
        self.graph.node_weights().filter_map(|node| match node {
            SystemNode::Converter(n) => Some(n),
            _ => None,
        })
    }

    /// Edges entering a bus (flows into the pool).
    pub fn inflows(&self, bus_idx: NodeIndex) -> impl Iterator<Item = &FlowEdge> {
        self.graph
            .edges_directed(bus_idx, Direction::Incoming)
            .map(|e| e.weight())
    }

    /// Edges leaving a bus (flows out of the pool).
    pub fn outflows(&self, bus_idx: NodeIndex) -> impl Iterator<Item = &FlowEdge> {
        self.graph
            .edges_directed(bus_idx, Direction::Outgoing)
            .map(|e| e.weight())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Connection, EmissionOutput, EmissionSource, MimoNode};

    fn two_bus_system() -> EnergySystem {
        let mut system = EnergySystem::new();
        system.add_bus(Bus::new("gas", "gas")).unwrap();
        system.add_bus(Bus::new("electricity", "electricity")).unwrap();
        system
    }

    #[test]
    fn test_source_and_sink_wiring() {
        let mut system = two_bus_system();
        system
            .add_source(Source::new("gas_station", "gas").with_variable_cost(20.0))
            .unwrap();
        system
            .add_sink(Sink::new("demand", "electricity").with_fix(100.0))
            .unwrap();
        assert_eq!(system.graph.edge_count(), 2);
        let bus_idx = system.node_index("gas").unwrap();
        assert_eq!(system.inflows(bus_idx).count(), 1);
    }

    #[test]
    fn test_converter_wiring_includes_emissions() {
        let mut system = two_bus_system();
        system
            .add_bus(Bus::new("co2", "co2").unbalanced())
            .unwrap();
        let node = MimoNode::new("mimo", "electricity")
            .with_input(Connection::free("gas"))
            .with_output(Connection::free("electricity"))
            .with_emission(EmissionOutput {
                bus: "co2".into(),
                sources: vec![EmissionSource {
                    source: "gas".into(),
                    factor: 0.2.into(),
                }],
            });
        system.add_converter(node).unwrap();
        assert_eq!(system.graph.edge_count(), 3);
        let co2_idx = system.node_index("co2").unwrap();
        let inflow = system.inflows(co2_idx).next().unwrap();
        assert_eq!(inflow.kind, FlowKind::Emission);
    }

    #[test]
    fn test_unknown_bus_rejected() {
        let mut system = two_bus_system();
        let err = system
            .add_source(Source::new("station", "hydrogen"))
            .unwrap_err();
        assert!(err.to_string().contains("unknown bus 'hydrogen'"));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut system = two_bus_system();
        let err = system.add_bus(Bus::new("gas", "gas")).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_component_is_not_a_bus() {
        let mut system = two_bus_system();
        system.add_source(Source::new("station", "gas")).unwrap();
        let err = system
            .add_sink(Sink::new("demand", "station"))
            .unwrap_err();
        assert!(err.to_string().contains("is not a bus"));
    }
}

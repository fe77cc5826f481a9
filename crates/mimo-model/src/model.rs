//! Linear model assembly on top of an [`EnergySystem`].
//!
//! [`EnergyModel`] walks the system graph, creates one flow variable per
//! edge and flattened timestep, and accumulates constraints from the
//! component builders. `solve` hands the finished problem to Clarabel and
//! returns a [`SolvedModel`] with flow series, capacities and emission
//! totals read back out of the solution.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use good_lp::solvers::clarabel::clarabel;
use good_lp::{
    constraint, variable, variables, Constraint, Expression, ProblemVariables, Solution,
    SolverModel, Variable, VariableDefinition,
};
use mimo_core::{
    EnergySystem, FlowKind, Horizon, MimoError, MimoResult, Period, SequenceStore, SystemNode,
};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};

use crate::assembler;

/// Model-wide knobs that change how constraints are generated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Allow installed capacity to shrink between periods. When false
    /// (the default), capacity is non-decreasing over the horizon.
    pub allow_decommission: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            allow_decommission: false,
        }
    }
}

/// Identifies a directed flow by the labels of its endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlowKey {
    pub from: String,
    pub to: String,
}

impl FlowKey {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

/// Capacity of a converter in one period: either a decision variable
/// (expandable nodes) or a fixed installed value.
#[derive(Debug, Clone, Copy)]
pub enum CapacityHandle {
    Decision(Variable),
    Fixed(f64),
}

/// Everything the model tracks about one converter node after assembly.
#[derive(Debug, Clone)]
pub struct NodeGroup {
    pub node: String,
    /// The flow every share and conversion factor of this node refers to.
    pub primary: FlowKey,
    /// All standard connections of the node, inputs then outputs.
    pub connections: Vec<FlowKey>,
    /// Edges carrying emissions out of the node.
    pub emissions: Vec<FlowKey>,
    /// One capacity handle per period, empty for uncapacitated nodes.
    pub capacity: Vec<(Period, CapacityHandle)>,
}

/// A linear optimisation model under construction.
pub struct EnergyModel<'a> {
    pub(crate) system: &'a EnergySystem,
    pub(crate) horizon: &'a Horizon,
    pub(crate) store: &'a SequenceStore,
    pub(crate) config: ModelConfig,
    vars: ProblemVariables,
    constraints: Vec<Constraint>,
    objective_terms: Vec<(Variable, f64)>,
    pub(crate) flows: HashMap<FlowKey, Vec<Variable>>,
    pub(crate) groups: HashMap<String, NodeGroup>,
    /// Weighted flow variables contributing to the CO2-equivalent total
    /// of each period, recorded whether or not a limit is enforced.
    pub(crate) emission_totals: BTreeMap<Period, Vec<(Variable, f64)>>,
}

impl std::fmt::Debug for EnergyModel<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnergyModel")
            .field("config", &self.config)
            .field("flows", &self.flows)
            .field("groups", &self.groups)
            .field("emission_totals", &self.emission_totals)
            .finish_non_exhaustive()
    }
}

impl<'a> EnergyModel<'a> {
    /// Builds the full constraint set for `system` over `horizon`.
    ///
    /// Fails without side effects if any node is misconfigured: an error
    /// from one converter discards the whole model.
    pub fn new(
        system: &'a EnergySystem,
        horizon: &'a Horizon,
        store: &'a SequenceStore,
        config: ModelConfig,
    ) -> MimoResult<Self> {
        let mut model = Self {
            system,
            horizon,
            store,
            config,
            vars: variables!(),
            constraints: Vec::new(),
            objective_terms: Vec::new(),
            flows: HashMap::new(),
            groups: HashMap::new(),
            emission_totals: BTreeMap::new(),
        };
        model.create_flow_variables();
        model.bind_profiles()?;
        for idx in system.graph.node_indices() {
            if let SystemNode::Converter(node) = &system.graph[idx] {
                assembler::assemble(&mut model, node)?;
            }
        }
        model.bind_bus_balances();
        Ok(model)
    }

    /// One variable per edge and flattened timestep. Standard flows are
    /// non-negative; emission flows are unbounded so that capture
    /// (negative emission factors) stays feasible.
    fn create_flow_variables(&mut self) {
        let steps = self.horizon.len();
        for edge in self.system.graph.edge_references() {
            let key = FlowKey::new(&edge.weight().from, &edge.weight().to);
            let mut series = Vec::with_capacity(steps);
            for _ in 0..steps {
                let var = match edge.weight().kind {
                    FlowKind::Standard => self.vars.add(variable().min(0.0)),
                    FlowKind::Emission => self.vars.add(variable()),
                };
                series.push(var);
            }
            self.flows.insert(key, series);
        }
    }

    /// Pins source and sink flows to their profiles and collects
    /// variable costs into the objective.
    fn bind_profiles(&mut self) -> MimoResult<()> {
        let system = self.system;
        let horizon = self.horizon;
        let store = self.store;
        for idx in system.graph.node_indices() {
            match &system.graph[idx] {
                SystemNode::Source(source) => {
                    if source.fix.is_some() && source.max.is_some() {
                        return Err(MimoError::config(
                            &source.name,
                            "fix",
                            "cannot combine 'fix' and 'max' on the same source",
                        ));
                    }
                    let key = FlowKey::new(&source.name, &source.bus);
                    let vars = self.flows[&key].clone();
                    for slice in horizon.slices() {
                        let offset = horizon.offset(slice.period).unwrap_or(0);
                        let steps = slice.timesteps;
                        if let Some(fix) = &source.fix {
                            let fix =
                                store.resolve(fix, slice.period, steps, &source.name, "fix")?;
                            for t in 0..steps {
                                let rhs = fix.value(t) * source.nominal;
                                self.constraints.push(constraint!(vars[offset + t] == rhs));
                            }
                        }
                        if let Some(max) = &source.max {
                            let max =
                                store.resolve(max, slice.period, steps, &source.name, "max")?;
                            for t in 0..steps {
                                let rhs = max.value(t) * source.nominal;
                                self.constraints.push(constraint!(vars[offset + t] <= rhs));
                            }
                        }
                    }
                    if source.variable_cost != 0.0 {
                        for var in &vars {
                            self.objective_terms.push((*var, source.variable_cost));
                        }
                    }
                }
                SystemNode::Sink(sink) => {
                    if let Some(fix) = &sink.fix {
                        let key = FlowKey::new(&sink.bus, &sink.name);
                        let vars = self.flows[&key].clone();
                        for slice in horizon.slices() {
                            let offset = horizon.offset(slice.period).unwrap_or(0);
                            let steps = slice.timesteps;
                            let fix = store.resolve(fix, slice.period, steps, &sink.name, "fix")?;
                            for t in 0..steps {
                                let rhs = fix.value(t) * sink.nominal;
                                self.constraints.push(constraint!(vars[offset + t] == rhs));
                            }
                        }
                    }
                }
                SystemNode::Bus(_) | SystemNode::Converter(_) => {}
            }
        }
        Ok(())
    }

    /// Conservation on every balanced bus: inflows equal outflows at
    /// each timestep.
    fn bind_bus_balances(&mut self) {
        let system = self.system;
        let steps = self.horizon.len();
        for (idx, bus) in system.buses() {
            if !bus.balanced {
                continue;
            }
            let inflows: Vec<Vec<Variable>> = system
                .inflows(idx)
                .map(|e| self.flows[&FlowKey::new(&e.from, &e.to)].clone())
                .collect();
            let outflows: Vec<Vec<Variable>> = system
                .outflows(idx)
                .map(|e| self.flows[&FlowKey::new(&e.from, &e.to)].clone())
                .collect();
            for t in 0..steps {
                let mut balance = Expression::from(0.0);
                for series in &inflows {
                    balance += series[t];
                }
                for series in &outflows {
                    balance -= series[t];
                }
                self.constraints.push(constraint!(balance == 0.0));
            }
        }
    }

    pub(crate) fn add_variable(&mut self, def: VariableDefinition) -> Variable {
        self.vars.add(def)
    }

    pub(crate) fn push(&mut self, c: Constraint) {
        self.constraints.push(c);
    }

    pub(crate) fn add_cost(&mut self, var: Variable, coeff: f64) {
        self.objective_terms.push((var, coeff));
    }

    /// The flow variables of one edge, in flattened timestep order.
    pub fn flow_vars(&self, from: &str, to: &str) -> Option<&[Variable]> {
        self.flows
            .get(&FlowKey::new(from, to))
            .map(|v| v.as_slice())
    }

    pub fn group(&self, node: &str) -> Option<&NodeGroup> {
        self.groups.get(node)
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    /// Minimises total cost with Clarabel and extracts the solution.
    pub fn solve(self) -> MimoResult<SolvedModel> {
        let Self {
            vars,
            constraints,
            objective_terms,
            flows,
            groups,
            emission_totals,
            ..
        } = self;
        let mut objective = Expression::from(0.0);
        for (var, coeff) in &objective_terms {
            objective += *coeff * *var;
        }
        let mut problem = vars.minimise(objective).using(clarabel);
        for c in constraints {
            problem = problem.with(c);
        }
        let solution = problem
            .solve()
            .map_err(|e| MimoError::Solver(format!("{e:?}")))?;

        let objective = objective_terms
            .iter()
            .map(|(var, coeff)| coeff * solution.value(*var))
            .sum();
        let flow_values: HashMap<FlowKey, Vec<f64>> = flows
            .iter()
            .map(|(key, vars)| {
                (
                    key.clone(),
                    vars.iter().map(|v| solution.value(*v)).collect(),
                )
            })
            .collect();
        let capacities: HashMap<String, BTreeMap<Period, f64>> = groups
            .iter()
            .map(|(name, group)| {
                let per_period = group
                    .capacity
                    .iter()
                    .map(|(period, handle)| {
                        let value = match handle {
                            CapacityHandle::Decision(var) => solution.value(*var),
                            CapacityHandle::Fixed(value) => *value,
                        };
                        (*period, value)
                    })
                    .collect();
                (name.clone(), per_period)
            })
            .collect();
        let co2_equivalent = emission_totals
            .iter()
            .map(|(period, terms)| {
                let total = terms
                    .iter()
                    .map(|(var, weight)| weight * solution.value(*var))
                    .sum();
                (*period, total)
            })
            .collect();
        Ok(SolvedModel {
            objective,
            flows: flow_values,
            capacities,
            co2_equivalent,
        })
    }
}

/// Results of a successful optimisation.
#[derive(Debug, Clone)]
pub struct SolvedModel {
    pub objective: f64,
    flows: HashMap<FlowKey, Vec<f64>>,
    capacities: HashMap<String, BTreeMap<Period, f64>>,
    co2_equivalent: BTreeMap<Period, f64>,
}

impl SolvedModel {
    /// The optimised flow series of one edge, in flattened timestep order.
    pub fn flow(&self, from: &str, to: &str) -> Option<&[f64]> {
        self.flows.get(&FlowKey::new(from, to)).map(|v| v.as_slice())
    }

    /// Installed capacity of a converter in one period.
    pub fn capacity(&self, node: &str, period: Period) -> Option<f64> {
        self.capacities.get(node)?.get(&period).copied()
    }

    /// CO2-equivalent emission total of one period. Present for every
    /// period an emission limit was registered for, bounded or not.
    pub fn co2_equivalent(&self, period: Period) -> Option<f64> {
        self.co2_equivalent.get(&period).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mimo_core::{Bus, Sequence, Sink, Source};

    fn simple_system() -> EnergySystem {
        let mut system = EnergySystem::new();
        system.add_bus(Bus::new("electricity", "electricity")).unwrap();
        system
            .add_source(Source::new("plant", "electricity").with_variable_cost(2.0))
            .unwrap();
        system
            .add_sink(Sink::new("demand", "electricity").with_fix(40.0))
            .unwrap();
        system
    }

    #[test]
    fn balanced_bus_forces_supply_to_demand() {
        let system = simple_system();
        let horizon = Horizon::single(2030, 2).unwrap();
        let store = SequenceStore::new();
        let model = EnergyModel::new(&system, &horizon, &store, ModelConfig::default()).unwrap();
        let solved = model.solve().unwrap();
        let supply = solved.flow("plant", "electricity").unwrap();
        assert!((supply[0] - 40.0).abs() < 1e-3);
        assert!((supply[1] - 40.0).abs() < 1e-3);
        assert!((solved.objective - 160.0).abs() < 1e-2);
    }

    #[test]
    fn source_max_caps_production() {
        let mut system = EnergySystem::new();
        system.add_bus(Bus::new("electricity", "electricity")).unwrap();
        system
            .add_source(Source::new("cheap", "electricity").with_variable_cost(1.0).with_max(10.0))
            .unwrap();
        system
            .add_source(Source::new("dear", "electricity").with_variable_cost(5.0))
            .unwrap();
        system
            .add_sink(Sink::new("demand", "electricity").with_fix(25.0))
            .unwrap();
        let horizon = Horizon::single(2030, 1).unwrap();
        let store = SequenceStore::new();
        let model = EnergyModel::new(&system, &horizon, &store, ModelConfig::default()).unwrap();
        let solved = model.solve().unwrap();
        assert!((solved.flow("cheap", "electricity").unwrap()[0] - 10.0).abs() < 1e-3);
        assert!((solved.flow("dear", "electricity").unwrap()[0] - 15.0).abs() < 1e-3);
    }

    #[test]
    fn fix_and_max_on_one_source_is_rejected() {
        let mut system = EnergySystem::new();
        system.add_bus(Bus::new("electricity", "electricity")).unwrap();
        system
            .add_source(
                Source::new("plant", "electricity")
                    .with_fix(5.0)
                    .with_max(10.0),
            )
            .unwrap();
        let horizon = Horizon::single(2030, 1).unwrap();
        let store = SequenceStore::new();
        let err = EnergyModel::new(&system, &horizon, &store, ModelConfig::default()).unwrap_err();
        assert!(err.to_string().contains("cannot combine"));
    }

    #[test]
    fn named_profile_is_resolved_per_period() {
        let mut system = EnergySystem::new();
        system.add_bus(Bus::new("electricity", "electricity")).unwrap();
        system
            .add_source(Source::new("plant", "electricity"))
            .unwrap();
        system
            .add_sink(Sink::new("demand", "electricity").with_fix(Sequence::named("load")))
            .unwrap();
        let horizon = Horizon::multi(vec![(2030, 2), (2040, 2)]).unwrap();
        let mut store = SequenceStore::new();
        store.insert("load", Period::new(2030), vec![5.0, 7.0]);
        store.insert("load", Period::new(2040), vec![3.0, 4.0]);
        let model = EnergyModel::new(&system, &horizon, &store, ModelConfig::default()).unwrap();
        let solved = model.solve().unwrap();
        let supply = solved.flow("plant", "electricity").unwrap();
        assert!((supply[0] - 5.0).abs() < 1e-3);
        assert!((supply[1] - 7.0).abs() < 1e-3);
        assert!((supply[2] - 3.0).abs() < 1e-3);
        assert!((supply[3] - 4.0).abs() < 1e-3);
    }
}

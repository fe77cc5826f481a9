//! Multi-input/multi-output converter declarations
//!
//! A [`MimoNode`] relates any number of input and output flows to one
//! designated primary connection. Every non-primary connection carries a
//! closed [`FlowRelation`]: free, a fixed or maximum share of the primary
//! flow, or a conversion factor. The closed enumeration makes the
//! "exactly one relation per connection" invariant hold by construction;
//! conflicting declarations are rejected at the record layer.

use crate::sequence::Sequence;
use serde::{Deserialize, Serialize};

/// Whether a connection feeds the node or is fed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Input,
    Output,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Input => write!(f, "input"),
            Side::Output => write!(f, "output"),
        }
    }
}

/// Relation of a non-primary flow to the node's primary flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FlowRelation {
    /// No relation declared; the flow is determined by bus conservation.
    Free,
    /// Equality share: `flow(t) = share(t) * primary(t)`.
    FixedShare(Sequence),
    /// Lower bound share: `flow(t) >= share(t) * primary(t)`.
    MinShare(Sequence),
    /// Upper bound share: `flow(t) <= share(t) * primary(t)`.
    MaxShare(Sequence),
    /// Linear conversion: `flow(t) = factor(t) * primary(t)`.
    Conversion(Sequence),
}

/// One connection of a converter to a bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub bus: String,
    pub relation: FlowRelation,
}

impl Connection {
    pub fn free(bus: impl Into<String>) -> Self {
        Connection {
            bus: bus.into(),
            relation: FlowRelation::Free,
        }
    }

    pub fn fixed_share(bus: impl Into<String>, share: impl Into<Sequence>) -> Self {
        Connection {
            bus: bus.into(),
            relation: FlowRelation::FixedShare(share.into()),
        }
    }

    pub fn min_share(bus: impl Into<String>, share: impl Into<Sequence>) -> Self {
        Connection {
            bus: bus.into(),
            relation: FlowRelation::MinShare(share.into()),
        }
    }

    pub fn max_share(bus: impl Into<String>, share: impl Into<Sequence>) -> Self {
        Connection {
            bus: bus.into(),
            relation: FlowRelation::MaxShare(share.into()),
        }
    }

    pub fn conversion(bus: impl Into<String>, factor: impl Into<Sequence>) -> Self {
        Connection {
            bus: bus.into(),
            relation: FlowRelation::Conversion(factor.into()),
        }
    }
}

/// One contributor to an emission output: a source connection of the
/// node and the factor mapping its flow to the emitted quantity.
/// Factors may be negative (capture/removal).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmissionSource {
    pub source: String,
    pub factor: Sequence,
}

/// An emission output of a converter: the emission bus it reports to and
/// the source flows contributing to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmissionOutput {
    pub bus: String,
    pub sources: Vec<EmissionSource>,
}

/// Industrial converter with n inputs and m outputs tied to one primary
/// flow, optional capacity investment, and emission reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MimoNode {
    pub name: String,
    pub region: Option<String>,
    /// Commissioning year; informational, the node spans the horizon.
    pub year: Option<u32>,
    pub inputs: Vec<Connection>,
    pub outputs: Vec<Connection>,
    pub emissions: Vec<EmissionOutput>,
    /// Bus name of the primary connection (the reference magnitude).
    pub primary: String,
    /// Whether capacity is a decision variable.
    pub expandable: bool,
    /// Nominal capacity used when the node is not expandable.
    pub capacity: Option<f64>,
    /// Cost per unit of installed capacity per period (already annualized).
    pub capacity_cost: Option<f64>,
    /// Upper bound on installed capacity; unbounded when unset.
    pub capacity_potential: Option<f64>,
    /// Lower bound on installed capacity for expandable nodes.
    pub capacity_minimum: Option<f64>,
    /// Per-timestep fraction of capacity available to the primary flow.
    pub activity_bound_max: Sequence,
    /// Per-timestep fraction of capacity the primary flow must reach.
    pub activity_bound_min: Option<Sequence>,
    /// Pins the primary flow to exactly this fraction of capacity;
    /// overrides the min/max bounds when set.
    pub activity_bound_fix: Option<Sequence>,
}

impl MimoNode {
    pub fn new(name: impl Into<String>, primary: impl Into<String>) -> Self {
        MimoNode {
            name: name.into(),
            region: None,
            year: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            emissions: Vec::new(),
            primary: primary.into(),
            expandable: false,
            capacity: None,
            capacity_cost: None,
            capacity_potential: None,
            capacity_minimum: None,
            activity_bound_max: Sequence::Constant(1.0),
            activity_bound_min: None,
            activity_bound_fix: None,
        }
    }

    pub fn with_input(mut self, connection: Connection) -> Self {
        self.inputs.push(connection);
        self
    }

    pub fn with_output(mut self, connection: Connection) -> Self {
        self.outputs.push(connection);
        self
    }

    pub fn with_emission(mut self, emission: EmissionOutput) -> Self {
        self.emissions.push(emission);
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Fix the node at a nominal capacity (no investment decision).
    pub fn with_capacity(mut self, capacity: f64) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Make capacity a decision variable with the given unit cost.
    pub fn expandable(mut self, capacity_cost: f64) -> Self {
        self.expandable = true;
        self.capacity_cost = Some(capacity_cost);
        self
    }

    pub fn with_capacity_potential(mut self, potential: f64) -> Self {
        self.capacity_potential = Some(potential);
        self
    }

    pub fn with_capacity_minimum(mut self, minimum: f64) -> Self {
        self.capacity_minimum = Some(minimum);
        self
    }

    pub fn with_activity_bound_max(mut self, bound: impl Into<Sequence>) -> Self {
        self.activity_bound_max = bound.into();
        self
    }

    pub fn with_activity_bound_min(mut self, bound: impl Into<Sequence>) -> Self {
        self.activity_bound_min = Some(bound.into());
        self
    }

    pub fn with_activity_bound_fix(mut self, bound: impl Into<Sequence>) -> Self {
        self.activity_bound_fix = Some(bound.into());
        self
    }

    /// All regular connections with their side, inputs first.
    pub fn connections(&self) -> impl Iterator<Item = (Side, &Connection)> {
        self.inputs
            .iter()
            .map(|c| (Side::Input, c))
            .chain(self.outputs.iter().map(|c| (Side::Output, c)))
    }

    /// Side and connection of the primary bus, if connected.
    pub fn primary_connection(&self) -> Option<(Side, &Connection)> {
        self.connections().find(|(_, c)| c.bus == self.primary)
    }
}

//! # mimo-core: Energy-System Data Model for MIMO Conversion
//!
//! Provides the data structures shared by the MIMO modeling crates: the
//! energy-system graph, the multi-input/multi-output converter
//! declarations, time sequences, periods, and the unified error type.
//!
//! ## Design Philosophy
//!
//! Systems are modeled as **directed graphs** where:
//! - **Nodes**: Buses (commodity pools), Sources, Sinks, Converters
//! - **Edges**: Flows between a component and a bus
//!
//! All declarations are immutable value types built once before the
//! optimization model is assembled. The constraint generation in
//! `mimo-model` reads this graph and never mutates it.
//!
//! ## Quick Start
//!
//! ```rust
//! use mimo_core::*;
//!
//! let mut system = EnergySystem::new();
//! system.add_bus(Bus::new("gas", "gas")).unwrap();
//! system.add_bus(Bus::new("heat", "heat")).unwrap();
//! system
//!     .add_source(Source::new("gas_station", "gas").with_variable_cost(20.0))
//!     .unwrap();
//! system
//!     .add_sink(Sink::new("demand", "heat").with_fix(100.0))
//!     .unwrap();
//! system
//!     .add_converter(
//!         MimoNode::new("boiler", "heat")
//!             .with_input(Connection::conversion("gas", 1.1))
//!             .with_output(Connection::free("heat")),
//!     )
//!     .unwrap();
//! ```
//!
//! ## Modules
//!
//! - [`system`] - Buses, sources, sinks, and the system graph
//! - [`node`] - Converter declarations and flow relations
//! - [`sequence`] - Scalars, named series, and the sequence store
//! - [`horizon`] - Periods and the flattened multi-period horizon
//! - [`gas`] - Greenhouse gases and default GWP multipliers
//! - [`error`] - Unified error type

pub mod error;
pub mod gas;
pub mod horizon;
pub mod node;
pub mod sequence;
pub mod system;

pub use error::{MimoError, MimoResult};
pub use gas::Gas;
pub use horizon::{Horizon, HorizonSlice, Period};
pub use node::{Connection, EmissionOutput, EmissionSource, FlowRelation, MimoNode, Side};
pub use petgraph::graph::NodeIndex;
pub use sequence::{ResolvedSequence, Sequence, SequenceStore};
pub use system::{Bus, EnergySystem, FlowEdge, FlowKind, Sink, Source, SystemNode};

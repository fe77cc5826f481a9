//! Constraint generation and optimisation for MIMO energy systems.
//!
//! The crate turns an [`mimo_core::EnergySystem`] into a linear
//! program: one flow variable per edge and timestep, bus balances,
//! converter shares and conversion factors tied to each node's primary
//! flow, per-period capacity with optional investment, and a
//! CO2-equivalent emission budget. Solving goes through `good_lp` with
//! the Clarabel backend.
//!
//! ```no_run
//! use mimo_core::{Bus, Connection, EnergySystem, Horizon, MimoNode, SequenceStore, Sink, Source};
//! use mimo_model::{EnergyModel, ModelConfig};
//!
//! # fn main() -> mimo_core::MimoResult<()> {
//! let mut system = EnergySystem::new();
//! system.add_bus(Bus::new("gas", "gas"))?;
//! system.add_bus(Bus::new("electricity", "electricity"))?;
//! system.add_source(Source::new("import", "gas").with_variable_cost(2.0))?;
//! system.add_sink(Sink::new("demand", "electricity").with_fix(50.0))?;
//! system.add_converter(
//!     MimoNode::new("plant", "electricity")
//!         .with_input(Connection::conversion("gas", 0.8))
//!         .with_output(Connection::free("electricity")),
//! )?;
//!
//! let horizon = Horizon::single(2030, 1)?;
//! let store = SequenceStore::new();
//! let model = EnergyModel::new(&system, &horizon, &store, ModelConfig::default())?;
//! let solved = model.solve()?;
//! assert!((solved.flow("gas", "plant").unwrap()[0] - 40.0).abs() < 1e-3);
//! # Ok(())
//! # }
//! ```

mod assembler;
mod capacity;
mod emission;
mod model;
mod relation;
mod share;

pub use emission::EmissionLimit;
pub use model::{
    CapacityHandle, EnergyModel, FlowKey, ModelConfig, NodeGroup, SolvedModel,
};

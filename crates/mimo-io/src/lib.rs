//! Package loading for MIMO energy studies.
//!
//! Reads YAML/JSON study packages, resolves flat converter records by
//! naming convention, and hands a typed [`mimo_core::EnergySystem`],
//! [`mimo_core::Horizon`] and [`mimo_core::SequenceStore`] plus any
//! emission limits to [`mimo_model`].

pub mod records;
pub mod resolve;

pub use records::{
    BusRecord, EmissionLimitRecord, FieldValue, HorizonRecord, NodeRecord, Package,
    ResolvedPackage, SeriesRecord, SinkRecord, SourceRecord,
};
pub use resolve::resolve_node;

//! Time sequences and the named-series store
//!
//! Conversion factors, flow shares, activity bounds and profiles are
//! either scalars (broadcast over all timesteps) or references to named
//! time series, keyed by period. All sequences a node references are
//! resolved once, before any constraint is emitted, so a bad reference
//! fails the assembly of that node instead of a later lookup.

use crate::error::{MimoError, MimoResult};
use crate::horizon::Period;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A scalar or a reference to a named time series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Sequence {
    Constant(f64),
    Named(String),
}

impl Sequence {
    pub fn constant(value: f64) -> Self {
        Sequence::Constant(value)
    }

    pub fn named(name: impl Into<String>) -> Self {
        Sequence::Named(name.into())
    }
}

impl From<f64> for Sequence {
    fn from(value: f64) -> Self {
        Sequence::Constant(value)
    }
}

/// A sequence resolved against a concrete period: either a broadcast
/// scalar or a per-timestep series of the right length.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedSequence {
    Constant(f64),
    Series(Vec<f64>),
}

impl ResolvedSequence {
    /// Value at timestep `t` (scalar broadcast or series lookup).
    #[inline]
    pub fn value(&self, t: usize) -> f64 {
        match self {
            ResolvedSequence::Constant(v) => *v,
            ResolvedSequence::Series(values) => values[t],
        }
    }
}

/// Store of named time series, keyed by series name and period.
#[derive(Debug, Clone, Default)]
pub struct SequenceStore {
    series: HashMap<String, HashMap<Period, Vec<f64>>>,
}

impl SequenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the values of a named series for one period.
    pub fn insert(&mut self, name: impl Into<String>, period: Period, values: Vec<f64>) {
        self.series
            .entry(name.into())
            .or_default()
            .insert(period, values);
    }

    /// Resolve a sequence for one period and expected length.
    ///
    /// `node` and `field` name the declaration site for error messages.
    /// Fails when a referenced series is unknown, has no values for the
    /// period, or its length does not match the period's timesteps.
    pub fn resolve(
        &self,
        sequence: &Sequence,
        period: Period,
        timesteps: usize,
        node: &str,
        field: &str,
    ) -> MimoResult<ResolvedSequence> {
        match sequence {
            Sequence::Constant(v) => Ok(ResolvedSequence::Constant(*v)),
            Sequence::Named(name) => {
                let by_period = self.series.get(name).ok_or_else(|| {
                    MimoError::config(node, field, format!("references unknown series '{name}'"))
                })?;
                let values = by_period.get(&period).ok_or_else(|| {
                    MimoError::config(
                        node,
                        field,
                        format!("series '{name}' has no values for period {period}"),
                    )
                })?;
                if values.len() != timesteps {
                    return Err(MimoError::config(
                        node,
                        field,
                        format!(
                            "series '{name}' has {} values for period {period}, expected {timesteps}",
                            values.len()
                        ),
                    ));
                }
                Ok(ResolvedSequence::Series(values.clone()))
            }
        }
    }
}

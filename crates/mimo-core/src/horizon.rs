//! Optimization horizon: periods and timesteps
//!
//! A model spans one or more [`Period`]s (years). Each period carries its
//! own number of timesteps; variables are indexed by a flattened
//! (period, timestep) position so multi-period models are built as one
//! constraint system in a single pass.

use crate::error::{MimoError, MimoResult};
use serde::{Deserialize, Serialize};

/// A distinct optimization horizon slice (a year) in a multi-period model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Period(u32);

impl Period {
    #[inline]
    pub fn new(year: u32) -> Self {
        Period(year)
    }
    #[inline]
    pub fn year(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One period of the horizon with its timestep count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HorizonSlice {
    pub period: Period,
    pub timesteps: usize,
}

/// Ordered sequence of periods making up the full optimization horizon.
#[derive(Debug, Clone)]
pub struct Horizon {
    slices: Vec<HorizonSlice>,
}

impl Horizon {
    /// Single-period horizon.
    pub fn single(year: u32, timesteps: usize) -> MimoResult<Self> {
        Self::multi(vec![(year, timesteps)])
    }

    /// Multi-period horizon. Periods must be strictly increasing and each
    /// slice must have at least one timestep.
    pub fn multi(periods: Vec<(u32, usize)>) -> MimoResult<Self> {
        if periods.is_empty() {
            return Err(MimoError::Other("horizon has no periods".into()));
        }
        let mut slices = Vec::with_capacity(periods.len());
        let mut last: Option<u32> = None;
        for (year, timesteps) in periods {
            if timesteps == 0 {
                return Err(MimoError::Other(format!(
                    "period {year} has zero timesteps"
                )));
            }
            if let Some(prev) = last {
                if year <= prev {
                    return Err(MimoError::Other(format!(
                        "periods must be strictly increasing, got {year} after {prev}"
                    )));
                }
            }
            last = Some(year);
            slices.push(HorizonSlice {
                period: Period::new(year),
                timesteps,
            });
        }
        Ok(Horizon { slices })
    }

    pub fn slices(&self) -> &[HorizonSlice] {
        &self.slices
    }

    pub fn periods(&self) -> impl Iterator<Item = Period> + '_ {
        self.slices.iter().map(|s| s.period)
    }

    /// Total number of (period, timestep) positions across all periods.
    pub fn len(&self) -> usize {
        self.slices.iter().map(|s| s.timesteps).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    pub fn contains(&self, period: Period) -> bool {
        self.slices.iter().any(|s| s.period == period)
    }

    pub fn timesteps(&self, period: Period) -> Option<usize> {
        self.slices
            .iter()
            .find(|s| s.period == period)
            .map(|s| s.timesteps)
    }

    /// Flattened index of (period, t=0); later timesteps follow contiguously.
    pub fn offset(&self, period: Period) -> Option<usize> {
        let mut offset = 0;
        for slice in &self.slices {
            if slice.period == period {
                return Some(offset);
            }
            offset += slice.timesteps;
        }
        None
    }
}

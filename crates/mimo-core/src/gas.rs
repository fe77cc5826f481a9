//! Greenhouse gases and default global-warming-potential multipliers

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Greenhouse gas tracked by the emission aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gas {
    Co2,
    Ch4,
    N2o,
}

/// GWP-100 multipliers converting one unit of gas to CO2-equivalent.
static GWP_100: Lazy<HashMap<Gas, f64>> = Lazy::new(|| {
    HashMap::from([(Gas::Co2, 1.0), (Gas::Ch4, 25.0), (Gas::N2o, 298.0)])
});

impl Gas {
    /// Default 100-year global-warming potential of this gas.
    pub fn default_gwp(&self) -> f64 {
        GWP_100[self]
    }
}

//! System-wide CO2-equivalent accounting.
//!
//! An [`EmissionLimit`] names the commodities whose bus inflows count
//! as CO2, CH4 or N2O in one period. CH4 and N2O are weighted by their
//! global-warming potential, captured commodities enter negatively,
//! and the weighted total is capped when a limit value is set. The
//! total is recorded either way so that an unbounded run still reports
//! its footprint.

use good_lp::{constraint, Expression, Variable};
use mimo_core::{Gas, MimoError, MimoResult, Period};

use crate::model::{EnergyModel, FlowKey};

/// A CO2-equivalent budget over one period.
#[derive(Debug, Clone)]
pub struct EmissionLimit {
    pub name: String,
    pub period: Period,
    /// Upper bound on the weighted total; `None` reports without capping.
    pub co2_limit: Option<f64>,
    pub ch4_factor: f64,
    pub n2o_factor: f64,
    pub co2_commodities: Vec<String>,
    pub ch4_commodities: Vec<String>,
    pub n2o_commodities: Vec<String>,
    /// Commodities whose inflows count as captured, i.e. negatively.
    pub negative_co2_commodities: Vec<String>,
}

impl EmissionLimit {
    pub fn new(name: impl Into<String>, period: Period) -> Self {
        Self {
            name: name.into(),
            period,
            co2_limit: None,
            ch4_factor: Gas::Ch4.default_gwp(),
            n2o_factor: Gas::N2o.default_gwp(),
            co2_commodities: Vec::new(),
            ch4_commodities: Vec::new(),
            n2o_commodities: Vec::new(),
            negative_co2_commodities: Vec::new(),
        }
    }

    pub fn with_limit(mut self, limit: f64) -> Self {
        self.co2_limit = Some(limit);
        self
    }

    pub fn with_co2(mut self, commodities: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.co2_commodities
            .extend(commodities.into_iter().map(Into::into));
        self
    }

    pub fn with_ch4(mut self, commodities: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.ch4_commodities
            .extend(commodities.into_iter().map(Into::into));
        self
    }

    pub fn with_n2o(mut self, commodities: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.n2o_commodities
            .extend(commodities.into_iter().map(Into::into));
        self
    }

    pub fn with_negative_co2(
        mut self,
        commodities: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.negative_co2_commodities
            .extend(commodities.into_iter().map(Into::into));
        self
    }
}

impl<'a> EnergyModel<'a> {
    /// Registers an emission limit on the model.
    ///
    /// Each commodity tag must match the name or commodity of at least
    /// one bus; every flow into a matching bus contributes to the
    /// period's total.
    pub fn constrain_emissions(&mut self, limit: &EmissionLimit) -> MimoResult<()> {
        let horizon = self.horizon;
        let system = self.system;
        if !horizon.contains(limit.period) {
            return Err(MimoError::config(
                &limit.name,
                "period",
                format!("period {} is not part of the horizon", limit.period),
            ));
        }
        let offset = horizon.offset(limit.period).unwrap_or(0);
        let timesteps = horizon.timesteps(limit.period).unwrap_or(0);

        let groups: [(&[String], f64); 4] = [
            (&limit.co2_commodities, 1.0),
            (&limit.ch4_commodities, limit.ch4_factor),
            (&limit.n2o_commodities, limit.n2o_factor),
            (&limit.negative_co2_commodities, -1.0),
        ];
        let mut terms: Vec<(Variable, f64)> = Vec::new();
        for (commodities, weight) in groups {
            for tag in commodities {
                let mut matched = false;
                for (idx, bus) in system.buses() {
                    if bus.name != *tag && bus.commodity != *tag {
                        continue;
                    }
                    matched = true;
                    for edge in system.inflows(idx) {
                        let vars = &self.flows[&FlowKey::new(&edge.from, &edge.to)];
                        for t in 0..timesteps {
                            terms.push((vars[offset + t], weight));
                        }
                    }
                }
                if !matched {
                    return Err(MimoError::config(
                        &limit.name,
                        "commodities",
                        format!("'{tag}' does not match any bus name or commodity"),
                    ));
                }
            }
        }

        if let Some(cap) = limit.co2_limit {
            let mut total = Expression::from(0.0);
            for (var, weight) in &terms {
                total += *weight * *var;
            }
            self.push(constraint!(total <= cap));
        }
        self.emission_totals
            .entry(limit.period)
            .or_default()
            .extend(terms);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelConfig;
    use mimo_core::{
        Bus, Connection, EmissionOutput, EmissionSource, EnergySystem, Horizon, MimoNode,
        SequenceStore, Sink, Source,
    };

    /// One plant serving a fixed demand of 900, emitting 1.0 CO2 per
    /// unit of product and 5 units of CH4 via a small byproduct stream.
    fn emitting_system() -> EnergySystem {
        let mut system = EnergySystem::new();
        system.add_bus(Bus::new("gas", "gas")).unwrap();
        system
            .add_bus(Bus::new("product", "product"))
            .unwrap();
        system
            .add_bus(Bus::new("byproduct", "byproduct").unbalanced())
            .unwrap();
        system.add_bus(Bus::new("co2", "co2").unbalanced()).unwrap();
        system.add_bus(Bus::new("ch4", "ch4").unbalanced()).unwrap();
        system
            .add_source(Source::new("gas_station", "gas").with_variable_cost(1.0))
            .unwrap();
        system
            .add_sink(Sink::new("demand", "product").with_fix(900.0))
            .unwrap();
        system
            .add_converter(
                MimoNode::new("plant", "product")
                    .with_input(Connection::conversion("gas", 1.0))
                    .with_output(Connection::free("product"))
                    .with_output(Connection::conversion("byproduct", 1.0 / 180.0))
                    .with_emission(EmissionOutput {
                        bus: "co2".into(),
                        sources: vec![EmissionSource {
                            source: "product".into(),
                            factor: 1.0.into(),
                        }],
                    })
                    .with_emission(EmissionOutput {
                        bus: "ch4".into(),
                        sources: vec![EmissionSource {
                            source: "byproduct".into(),
                            factor: 1.0.into(),
                        }],
                    }),
            )
            .unwrap();
        system
    }

    fn solve_with(limit: EmissionLimit) -> mimo_core::MimoResult<crate::model::SolvedModel> {
        let system = emitting_system();
        let horizon = Horizon::single(2030, 1).unwrap();
        let store = SequenceStore::new();
        let mut model = EnergyModel::new(&system, &horizon, &store, ModelConfig::default())?;
        model.constrain_emissions(&limit)?;
        model.solve()
    }

    fn base_limit() -> EmissionLimit {
        EmissionLimit::new("climate", Period::new(2030))
            .with_co2(["co2"])
            .with_ch4(["ch4"])
    }

    #[test]
    fn weighted_total_is_reported_without_a_cap() {
        // 900 CO2 + 25 * 5 CH4 = 1025 CO2-equivalent.
        let solved = solve_with(base_limit()).unwrap();
        assert!((solved.co2_equivalent(Period::new(2030)).unwrap() - 1025.0).abs() < 0.1);
    }

    #[test]
    fn total_above_the_cap_is_infeasible() {
        assert!(solve_with(base_limit().with_limit(1000.0)).is_err());
    }

    #[test]
    fn total_below_the_cap_is_feasible() {
        let solved = solve_with(base_limit().with_limit(1030.0)).unwrap();
        assert!((solved.co2_equivalent(Period::new(2030)).unwrap() - 1025.0).abs() < 0.1);
    }

    #[test]
    fn captured_commodities_count_negatively() {
        let mut system = emitting_system();
        system
            .add_bus(Bus::new("captured", "co2_captured").unbalanced())
            .unwrap();
        // A second reporting stream for the same product flow, scaled
        // to half, models capture of 450 units.
        let converter = MimoNode::new("scrubber", "co2_in")
            .with_input(Connection::free("co2_in"))
            .with_output(Connection::conversion("captured", 0.5));
        // The scrubber needs its own input bus fed at the product rate.
        system
            .add_bus(Bus::new("co2_in", "co2_in"))
            .unwrap();
        system
            .add_source(Source::new("co2_feed", "co2_in").with_fix(900.0))
            .unwrap();
        system.add_converter(converter).unwrap();

        let horizon = Horizon::single(2030, 1).unwrap();
        let store = SequenceStore::new();
        let mut model =
            EnergyModel::new(&system, &horizon, &store, ModelConfig::default()).unwrap();
        let limit = base_limit().with_negative_co2(["captured"]);
        model.constrain_emissions(&limit).unwrap();
        let solved = model.solve().unwrap();
        // 1025 minus 0.5 * 900 captured.
        assert!((solved.co2_equivalent(Period::new(2030)).unwrap() - 575.0).abs() < 0.1);
    }

    #[test]
    fn unknown_commodity_is_rejected() {
        let err = solve_with(base_limit().with_co2(["smoke"])).unwrap_err();
        assert!(err.to_string().contains("'smoke'"));
    }

    #[test]
    fn period_outside_the_horizon_is_rejected() {
        let err = solve_with(EmissionLimit::new("climate", Period::new(2050))).unwrap_err();
        assert!(err.to_string().contains("not part of the horizon"));
    }
}

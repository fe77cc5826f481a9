//! Conversion-factor constraints.
//!
//! A conversion ties a connection to the primary flow through an
//! equality, `flow(t) = cf(t) * primary(t)`. Factors must be strictly
//! positive; a zero factor silently disables the connection and a
//! negative one flips its direction, both of which are configuration
//! mistakes rather than modelling intents.

use good_lp::{constraint, Variable};
use mimo_core::{Horizon, MimoError, MimoNode, MimoResult, ResolvedSequence};

use crate::assembler::{RelationKind, ResolvedNode};
use crate::model::EnergyModel;

pub(crate) fn bind(
    model: &mut EnergyModel<'_>,
    flow: &[Variable],
    factors: &[ResolvedSequence],
    primary: &[Variable],
) {
    let horizon = model.horizon;
    for (i, slice) in horizon.slices().iter().enumerate() {
        let offset = horizon.offset(slice.period).unwrap_or(0);
        for t in 0..slice.timesteps {
            let cf = factors[i].value(t);
            let idx = offset + t;
            model.push(constraint!(flow[idx] - cf * primary[idx] == 0.0));
        }
    }
}

pub(crate) fn validate_factors(
    node: &MimoNode,
    resolved: &ResolvedNode,
    horizon: &Horizon,
) -> MimoResult<()> {
    for conn in &resolved.connections {
        let Some(rel) = &conn.relation else { continue };
        if rel.kind != RelationKind::Conversion {
            continue;
        }
        for (i, slice) in horizon.slices().iter().enumerate() {
            for t in 0..slice.timesteps {
                let cf = rel.by_slice[i].value(t);
                if cf <= 0.0 {
                    return Err(MimoError::config(
                        &node.name,
                        format!("conversion_factor_{}", conn.bus),
                        format!(
                            "factor {cf} at timestep {t} of period {} must be strictly positive",
                            slice.period
                        ),
                    ));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::model::{EnergyModel, ModelConfig};
    use mimo_core::{
        Bus, Connection, EnergySystem, Horizon, MimoNode, Sequence, SequenceStore, Sink, Source,
        Period,
    };

    fn build(
        factor: impl Into<Sequence>,
        store: &SequenceStore,
    ) -> mimo_core::MimoResult<crate::model::SolvedModel> {
        let mut system = EnergySystem::new();
        system.add_bus(Bus::new("gas", "gas")).unwrap();
        system
            .add_bus(Bus::new("electricity", "electricity"))
            .unwrap();
        system
            .add_source(Source::new("gas_station", "gas").with_variable_cost(1.0))
            .unwrap();
        system
            .add_sink(Sink::new("demand", "electricity").with_fix(20.0))
            .unwrap();
        system
            .add_converter(
                MimoNode::new("plant", "electricity")
                    .with_input(Connection::conversion("gas", factor))
                    .with_output(Connection::free("electricity")),
            )
            .unwrap();
        let horizon = Horizon::single(2030, 2).unwrap();
        EnergyModel::new(&system, &horizon, store, ModelConfig::default())?.solve()
    }

    #[test]
    fn scalar_and_constant_series_agree() {
        let store = SequenceStore::new();
        let scalar = build(0.8, &store).unwrap();

        let mut store = SequenceStore::new();
        store.insert("cf", Period::new(2030), vec![0.8, 0.8]);
        let series = build(Sequence::named("cf"), &store).unwrap();

        for t in 0..2 {
            let a = scalar.flow("gas", "plant").unwrap()[t];
            let b = series.flow("gas", "plant").unwrap()[t];
            assert!((a - b).abs() < 1e-6, "timestep {t}: {a} vs {b}");
            assert!((a - 16.0).abs() < 1e-3);
        }
    }

    #[test]
    fn time_varying_factor_is_applied_per_timestep() {
        let mut store = SequenceStore::new();
        store.insert("cf", Period::new(2030), vec![0.5, 2.0]);
        let solved = build(Sequence::named("cf"), &store).unwrap();
        let gas = solved.flow("gas", "plant").unwrap();
        assert!((gas[0] - 10.0).abs() < 1e-3);
        assert!((gas[1] - 40.0).abs() < 1e-3);
    }

    #[test]
    fn zero_factor_is_rejected() {
        let store = SequenceStore::new();
        let err = build(0.0, &store).unwrap_err();
        assert!(err.to_string().contains("strictly positive"));
    }

    #[test]
    fn negative_factor_is_rejected() {
        let store = SequenceStore::new();
        let err = build(-0.4, &store).unwrap_err();
        assert!(err.to_string().contains("conversion_factor_gas"));
    }
}

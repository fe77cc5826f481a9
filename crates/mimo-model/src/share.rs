//! Flow-share constraints.
//!
//! A share ties a connection to the node's primary flow: a fixed share
//! pins the flow to `s(t) * primary(t)`, a minimum share keeps it at or
//! above that value, a maximum share caps it. Shares are validated per
//! side so that the fixed shares declared on one side never exceed the
//! whole.

use good_lp::{constraint, Variable};
use mimo_core::{Horizon, MimoError, MimoNode, MimoResult, ResolvedSequence, Side};

use crate::assembler::{RelationKind, ResolvedNode};
use crate::model::EnergyModel;

const SUM_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ShareKind {
    Fixed,
    Min,
    Max,
}

/// One constraint per flattened timestep relating `flow` to `primary`.
pub(crate) fn bind(
    model: &mut EnergyModel<'_>,
    kind: ShareKind,
    flow: &[Variable],
    shares: &[ResolvedSequence],
    primary: &[Variable],
) {
    let horizon = model.horizon;
    for (i, slice) in horizon.slices().iter().enumerate() {
        let offset = horizon.offset(slice.period).unwrap_or(0);
        for t in 0..slice.timesteps {
            let s = shares[i].value(t);
            let idx = offset + t;
            let c = match kind {
                ShareKind::Fixed => constraint!(flow[idx] - s * primary[idx] == 0.0),
                ShareKind::Min => constraint!(flow[idx] - s * primary[idx] >= 0.0),
                ShareKind::Max => constraint!(flow[idx] - s * primary[idx] <= 0.0),
            };
            model.push(c);
        }
    }
}

/// Every share value must lie in `[0, 1]`, and the fixed shares of one
/// side must not sum above one at any timestep.
pub(crate) fn validate_shares(
    node: &MimoNode,
    resolved: &ResolvedNode,
    horizon: &Horizon,
) -> MimoResult<()> {
    for conn in &resolved.connections {
        let Some(rel) = &conn.relation else { continue };
        let field = match rel.kind {
            RelationKind::FixedShare => format!("flow_share_fix_{}", conn.bus),
            RelationKind::MinShare => format!("flow_share_min_{}", conn.bus),
            RelationKind::MaxShare => format!("flow_share_max_{}", conn.bus),
            RelationKind::Conversion => continue,
        };
        for (i, slice) in horizon.slices().iter().enumerate() {
            for t in 0..slice.timesteps {
                let s = rel.by_slice[i].value(t);
                if !(0.0..=1.0).contains(&s) {
                    return Err(MimoError::config(
                        &node.name,
                        field,
                        format!(
                            "share {s} at timestep {t} of period {} lies outside [0, 1]",
                            slice.period
                        ),
                    ));
                }
            }
        }
    }

    for side in [Side::Input, Side::Output] {
        let fixed: Vec<&[ResolvedSequence]> = resolved
            .connections
            .iter()
            .filter(|c| c.side == side)
            .filter_map(|c| c.relation.as_ref())
            .filter(|r| r.kind == RelationKind::FixedShare)
            .map(|r| r.by_slice.as_slice())
            .collect();
        if fixed.is_empty() {
            continue;
        }
        for (i, slice) in horizon.slices().iter().enumerate() {
            for t in 0..slice.timesteps {
                let sum: f64 = fixed.iter().map(|by_slice| by_slice[i].value(t)).sum();
                if sum > 1.0 + SUM_TOLERANCE {
                    return Err(MimoError::config(
                        &node.name,
                        "flow_share_fix",
                        format!(
                            "fixed shares on the {side} side sum to {sum} at timestep {t} of period {}, exceeding 1",
                            slice.period
                        ),
                    ));
                }
            }
        }
    }
    Ok(())
}

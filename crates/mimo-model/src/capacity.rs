//! Capacity limits and investment.
//!
//! The primary flow of a capacitated node is bounded by
//! `activity_bound_max(t) * capacity(p)` in every timestep of period
//! `p`; optional min/fix activity bounds add a floor or pin the flow to
//! the capacity. Fixed capacities enter as constants; expandable nodes
//! get one capacity decision variable per period, priced into the
//! objective, and non-decreasing across periods unless decommissioning
//! is allowed.

use good_lp::{constraint, variable, Expression, Variable};
use mimo_core::{MimoError, MimoNode, MimoResult, Period};

use crate::assembler::ResolvedActivity;
use crate::model::{CapacityHandle, EnergyModel};

pub(crate) fn bind(
    model: &mut EnergyModel<'_>,
    node: &MimoNode,
    activity: &ResolvedActivity,
    primary: &[Variable],
) -> MimoResult<Vec<(Period, CapacityHandle)>> {
    let horizon = model.horizon;
    let mut handles = Vec::new();

    if node.expandable {
        if let (Some(minimum), Some(potential)) =
            (node.capacity_minimum, node.capacity_potential)
        {
            if minimum > potential {
                return Err(MimoError::config(
                    &node.name,
                    "capacity_minimum",
                    format!(
                        "minimum {minimum} exceeds capacity_potential {potential}"
                    ),
                ));
            }
        }
        let mut previous: Option<Variable> = None;
        for (i, slice) in horizon.slices().iter().enumerate() {
            let mut def = variable().min(node.capacity_minimum.unwrap_or(0.0));
            if let Some(potential) = node.capacity_potential {
                def = def.max(potential);
            }
            let cap = model.add_variable(def);
            if let Some(cost) = node.capacity_cost {
                model.add_cost(cap, cost);
            }
            let offset = horizon.offset(slice.period).unwrap_or(0);
            for t in 0..slice.timesteps {
                bind_step(model, activity, i, t, primary[offset + t], cap.into());
            }
            if let Some(prev) = previous {
                if !model.config.allow_decommission {
                    model.push(constraint!(cap - prev >= 0.0));
                }
            }
            previous = Some(cap);
            handles.push((slice.period, CapacityHandle::Decision(cap)));
        }
    } else if let Some(capacity) = node.capacity {
        for (i, slice) in horizon.slices().iter().enumerate() {
            let offset = horizon.offset(slice.period).unwrap_or(0);
            for t in 0..slice.timesteps {
                bind_step(model, activity, i, t, primary[offset + t], capacity.into());
            }
            handles.push((slice.period, CapacityHandle::Fixed(capacity)));
        }
    }

    Ok(handles)
}

/// One timestep of activity bounds against the capacity (variable or
/// constant). A fix bound pins the flow and supersedes min/max.
fn bind_step(
    model: &mut EnergyModel<'_>,
    activity: &ResolvedActivity,
    slice: usize,
    t: usize,
    flow: Variable,
    capacity: Expression,
) {
    if let Some(fix) = &activity.fix {
        let a = fix[slice].value(t);
        model.push(constraint!(flow - a * capacity == 0.0));
        return;
    }
    let a = activity.max[slice].value(t);
    model.push(constraint!(flow - a * capacity.clone() <= 0.0));
    if let Some(min) = &activity.min {
        let a = min[slice].value(t);
        model.push(constraint!(flow - a * capacity >= 0.0));
    }
}

//! Scheduling of automation curves onto audio parameters.
//!
//! - `linearRamp`: the first point's value is set at `startTime`, then the
//!   parameter ramps linearly to each following point, arriving at
//!   `startTime + t`
//! - `points`: the value steps to each point at `startTime + t`, no
//!   interpolation
//!
//! Points landing after `endTime` are ignored. `expRamp` and `lfoRef` are
//! reserved and refused.

use crate::error::GraphError;
use crate::param::AudioParam;
use echoform_spec::{AutomationDef, CurveMode};

/// Schedules `def` onto `param`. Returns the number of events scheduled.
pub fn schedule(def: &AutomationDef, param: &mut AudioParam) -> Result<usize, GraphError> {
    let mode = def.curve.mode;
    if !mode.is_supported() {
        return Err(GraphError::UnsupportedCurve {
            automation: def.id.clone(),
            mode,
        });
    }

    let mut points = def
        .curve
        .points
        .iter()
        .filter(|p| def.start_time + p.t <= def.end_time);

    let mut scheduled = 0;
    match mode {
        CurveMode::LinearRamp => {
            if let Some(first) = points.next() {
                param.set_value_at(first.value as f32, def.start_time);
                scheduled += 1;
                for p in points {
                    param.linear_ramp_to(p.value as f32, def.start_time + p.t);
                    scheduled += 1;
                }
            }
        }
        CurveMode::Points => {
            for p in points {
                param.set_value_at(p.value as f32, def.start_time + p.t);
                scheduled += 1;
            }
        }
        CurveMode::ExpRamp | CurveMode::LfoRef => {}
    }
    Ok(scheduled)
}

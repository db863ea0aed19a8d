//! Result printing: one JSON object per line under `--json`, plain text otherwise.

use rig_core::MotorState;
use serde_json::{Map, Value};

use crate::cli::JSON_MODE;

pub fn json_mode() -> bool {
    JSON_MODE.get().copied().unwrap_or(false)
}

/// Print a result on stdout. `human` is only rendered in text mode.
pub fn emit(json: Value, human: impl FnOnce() -> String) {
    if json_mode() {
        println!("{json}");
    } else {
        println!("{}", human());
    }
}

pub fn positions_json(state: &MotorState) -> Value {
    let map: Map<String, Value> = state
        .iter()
        .map(|(axis, v)| (axis.to_string(), Value::from(v)))
        .collect();
    Value::Object(map)
}

/// `X:10.000 Y:0.000 ...` in configured axis order.
pub fn positions_line(state: &MotorState) -> String {
    state
        .iter()
        .map(|(axis, v)| format!("{axis}:{v:.3}"))
        .collect::<Vec<_>>()
        .join(" ")
}

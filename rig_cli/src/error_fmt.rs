//! Human-readable error descriptions and structured JSON error formatting.

use rig_core::RigError;

/// The run completed but the scale never settled (`weigh --strict`).
#[derive(Debug)]
pub struct NotSettled {
    pub value: f64,
    pub waited_ms: u64,
}

impl std::fmt::Display for NotSettled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "scale did not settle within {} ms (last mean {:.4})",
            self.waited_ms, self.value
        )
    }
}

impl std::error::Error for NotSettled {}

/// Map an `eyre::Report` to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(re) = err.downcast_ref::<RigError>() {
        return match re {
            RigError::InvalidAxis(axis) => format!(
                "What happened: Axis '{axis}' is not configured.\nLikely causes: Typo in the axis letter, or the [[axes]] table does not list it.\nHow to fix: Use one of the configured axes (see `rig position`) or add it to the config."
            ),
            RigError::ProtocolTimeout { command, waited_ms } => format!(
                "What happened: The controller did not acknowledge '{command}' within {waited_ms} ms.\nLikely causes: Long homing or move still running, wrong baud rate, or the board is stuck.\nHow to fix: Raise motion.response_timeout_ms, check motion.baud_rate, or power-cycle the controller."
            ),
            RigError::Connection { target, attempts, reason } => format!(
                "What happened: Lost the connection to {target} after {attempts} attempt(s) ({reason}).\nLikely causes: USB cable unplugged, port renamed after a reset, or another program holds the port.\nHow to fix: Reconnect the device, check motion.port, and close other serial monitors."
            ),
            RigError::Protocol(msg) => format!(
                "What happened: Reading the controller's response failed ({msg}).\nLikely causes: The port was closed mid-response or the link is noisy.\nHow to fix: Check the cable and rerun with --log-level=debug to see the traffic."
            ),
            RigError::State(msg) => format!(
                "What happened: The command was refused before anything was sent ({msg}).\nLikely causes: A required mode (positioning or tool) is not active for this move.\nHow to fix: Use `rig move` for relative moves and `rig move-to` for absolute ones."
            ),
            RigError::Config(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
            ),
        };
    }

    if let Some(ns) = err.downcast_ref::<NotSettled>() {
        return format!(
            "What happened: The scale reading did not settle within {} ms.\nLikely causes: Vibration, draft, or a threshold tighter than the scale's resolution.\nHow to fix: Raise stabilize.threshold or stabilize.timeout_ms, or rerun without --strict to accept the mean ({:.4}).",
            ns.waited_ms, ns.value
        );
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("read config") {
        return format!(
            "What happened: Could not read the config file.\nLikely causes: Wrong --config path or missing permissions.\nHow to fix: Pass --config <FILE> pointing at a readable TOML file. Original: {msg}"
        );
    }

    if lower.contains("invalid configuration")
        || lower.contains("parse config")
        || lower.contains("must be")
        || lower.contains("configured twice")
    {
        return format!(
            "What happened: Configuration is invalid or incomplete.\nLikely causes: A typo in a key or an out-of-range value.\nHow to fix: Edit the TOML config and try again. Original: {msg}"
        );
    }

    if lower.contains("hardware feature") {
        return format!(
            "What happened: No serial backend is compiled in.\nLikely causes: The binary was built without `--features hardware`.\nHow to fix: Rebuild with the hardware feature or pass --sim. Original: {msg}"
        );
    }

    if lower.contains("open scale") {
        return format!(
            "What happened: The scale port could not be opened.\nLikely causes: Wrong scale.port, device unplugged, or missing permissions.\nHow to fix: Check the [scale] section and the cable. Original: {msg}"
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit code per error kind; anything unclassified returns 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if let Some(re) = err.downcast_ref::<RigError>() {
        return match re {
            RigError::Connection { .. } => 3,
            RigError::ProtocolTimeout { .. } => 4,
            RigError::Protocol(_) => 5,
            RigError::State(_) => 6,
            RigError::InvalidAxis(_) => 7,
            RigError::Config(_) => 8,
        };
    }
    if err.downcast_ref::<NotSettled>().is_some() {
        return 9;
    }
    1
}

/// Stable name of the error kind for JSON consumers.
pub fn error_kind(err: &eyre::Report) -> &'static str {
    if let Some(re) = err.downcast_ref::<RigError>() {
        return match re {
            RigError::Connection { .. } => "Connection",
            RigError::ProtocolTimeout { .. } => "ProtocolTimeout",
            RigError::Protocol(_) => "Protocol",
            RigError::State(_) => "State",
            RigError::InvalidAxis(_) => "InvalidAxis",
            RigError::Config(_) => "Config",
        };
    }
    if err.downcast_ref::<NotSettled>().is_some() {
        return "NotSettled";
    }
    "Error"
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let details = match err.downcast_ref::<RigError>() {
        Some(RigError::ProtocolTimeout { command, waited_ms }) => {
            Some(json!({ "command": command, "waited_ms": waited_ms }))
        }
        Some(RigError::Connection {
            target, attempts, ..
        }) => Some(json!({ "target": target, "attempts": attempts })),
        Some(RigError::InvalidAxis(axis)) => Some(json!({ "axis": axis })),
        _ => err
            .downcast_ref::<NotSettled>()
            .map(|ns| json!({ "value": ns.value, "waited_ms": ns.waited_ms })),
    };

    let obj = match details {
        Some(d) => json!({
            "reason": error_kind(err),
            "exit_code": exit_code_for_error(err),
            "details": d,
            "message": humanize(err),
        }),
        None => json!({
            "reason": error_kind(err),
            "exit_code": exit_code_for_error(err),
            "message": humanize(err),
        }),
    };
    obj.to_string()
}

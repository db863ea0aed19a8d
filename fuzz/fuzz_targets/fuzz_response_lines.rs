#![no_main]
use libfuzzer_sys::fuzz_target;
use rig_core::framing::{apply_telemetry, classify};
use rig_core::{AxisSet, LineFramer, MotorState, parse_reading};

fuzz_target!(|data: &[u8]| {
    let axes = AxisSet::marlin_default();
    let mut framer = LineFramer::new();
    // Split the input in two so lines straddle chunk boundaries.
    let mid = data.len() / 2;
    framer.push(&data[..mid]);
    framer.push(&data[mid..]);

    let mut state = MotorState::zeroed(&axes);
    while let Some(line) = framer.next_line() {
        let _ = classify(&line, axes.primary());
        let _ = parse_reading(&line);
        let updated = apply_telemetry(&line, &axes, &mut state);
        assert!(updated <= axes.len());
        // Applying the same line twice changes nothing.
        let snapshot = state.clone();
        apply_telemetry(&line, &axes, &mut state);
        assert_eq!(snapshot, state);
    }
});

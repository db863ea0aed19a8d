#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse errors and validation errors are both fine; panics are not.
    let Ok(cfg) = rig_config::load_toml(data) else {
        return;
    };
    if cfg.validate().is_ok() {
        // Anything validate() accepts must also build the runtime types.
        let _ = rig_core::RigBuilder::from_config(&cfg).expect("validated config builds");
        let params = rig_core::StabilizeParams::from(&cfg.stabilize);
        assert!(params.validate().is_ok());
    }
});

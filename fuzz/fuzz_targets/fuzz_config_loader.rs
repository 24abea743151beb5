#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Arbitrary TOML must either fail to parse or validate without panicking.
    if let Ok(cfg) = jig_config::load_toml(data) {
        if cfg.validate().is_ok() {
            // A validated fine window always fits inside the fine iteration bound.
            let [lo, hi] = cfg.valve.fine_window;
            assert!(lo <= hi && hi < cfg.valve.fine_max_iterations);
        }
    }
});

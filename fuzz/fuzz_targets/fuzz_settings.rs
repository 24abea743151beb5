#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // A hand-edited settings file must never panic the loader, and whatever
    // parses must survive a write/read cycle unchanged.
    if let Ok(s) = toml::from_str::<jig_config::Settings>(data) {
        let text = toml::to_string(&s).expect("settings serialize");
        let back: jig_config::Settings = toml::from_str(&text).expect("settings reparse");
        assert_eq!(s, back);
    }
});

//! Fuzz target for store configuration parsing.
//!
//! Checks that:
//! 1. No TOML input causes a panic
//! 2. A config that validates has names safe to use as paths and prefixes
//!
//! Run with: `cargo +nightly fuzz run fuzz_config_parsing`

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use unikv::StoreConfig;
use unikv::config::is_valid_store_name;
use unikv::paths::escape_name;

#[derive(Arbitrary, Debug)]
struct ConfigInput {
    toml_string: String,
    store_name: Option<String>,
    driver_order: Vec<String>,
}

fuzz_target!(|input: ConfigInput| {
    if let Ok(config) = toml::from_str::<StoreConfig>(&input.toml_string) {
        check(&config);
    }

    let mut built = StoreConfig::new("fuzz").with_driver_order(input.driver_order);
    if let Some(store_name) = input.store_name {
        built = built.with_store_name(store_name);
    }
    check(&built);
});

fn check(config: &StoreConfig) {
    if config.validate().is_ok() {
        assert!(is_valid_store_name(&config.store_name));
        let stem = escape_name(&config.name);
        assert!(!stem.contains('/') && !stem.contains('\\'));
    }
}

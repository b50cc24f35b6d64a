use std::fs;

use hundun_core::config::{load_pass_config, Mode, PassConfig, DEBLOAT_MARKER, INSTRUMENT_MARKER};
use tempfile::tempdir;

#[test]
fn selector_maps_to_modes() {
    assert_eq!(Mode::from_selector(0), Mode::Snapshot);
    assert_eq!(Mode::from_selector(INSTRUMENT_MARKER), Mode::Instrument);
    assert_eq!(Mode::from_selector(DEBLOAT_MARKER), Mode::Debloat);
    assert_eq!(Mode::from_selector(65_536), Mode::Legacy { bound: 65_536 });
    assert_eq!(Mode::from_selector(1).as_str(), "legacy");
}

#[test]
fn minimal_config_fills_defaults() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("pass.json");
    fs::write(&path, format!(r#"{{ "out_dir": "/tmp/out", "shm_size": {INSTRUMENT_MARKER} }}"#))
        .expect("write config");

    let config = load_pass_config(&path).expect("load");
    assert_eq!(config, PassConfig::new("/tmp/out", INSTRUMENT_MARKER));
    assert_eq!(config.mode(), Mode::Instrument);
    assert_eq!(config.map.slot, "__hundun_area_ptr");
    assert_eq!(config.map.permissions, 0o220);
    assert!(!config.debloat.prune_unreachable);
}

#[test]
fn full_config_overrides_defaults() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("pass.json");
    let json = r#"{
        "out_dir": "out",
        "shm_size": 4294967294,
        "map": { "size": 1024 },
        "excluded_prefixes": ["third_party/"],
        "debloat": { "collapse_dead_functions": true }
    }"#;
    fs::write(&path, json).expect("write config");

    let config = load_pass_config(&path).expect("load");
    assert_eq!(config.mode(), Mode::Debloat);
    assert_eq!(config.map.size, 1024);
    assert_eq!(config.map.shm_key, 285_738_243);
    assert!(config.debloat.collapse_dead_functions);
    assert!(config.is_excluded("third_party/zlib/inflate.c"));
    assert!(!config.is_excluded("src/third_party.c"));
}

#[test]
fn unreadable_or_invalid_config_is_reported() {
    let dir = tempdir().expect("tempdir");
    let missing = load_pass_config(&dir.path().join("nope.json")).expect_err("missing");
    assert!(missing.to_string().contains("Failed to read pass config"));

    let bad = dir.path().join("bad.json");
    fs::write(&bad, "{ \"out_dir\": 3 }").expect("write");
    let invalid = load_pass_config(&bad).expect_err("invalid");
    assert!(invalid.to_string().contains("Failed to parse pass config JSON"));
}

use std::fs;

use hundun::commands::{resolve_pass_config, summarize_module, RunOptions};
use hundun::{canonicalize_or_current, load_module, write_module_json};
use hundun_core::config::Mode;
use hundun_core::model::mutate::chain_function;
use hundun_core::model::{Module, Op};
use hundun_core::store::{ModuleSnapshotter, OutputLayout};
use tempfile::tempdir;

#[test]
fn canonicalize_or_current_resolves_existing_directory() {
    let dir = tempdir().expect("tempdir");
    let resolved = canonicalize_or_current(&dir.path().to_string_lossy()).expect("resolve");
    assert_eq!(resolved, dir.path().canonicalize().expect("canonicalize"));
}

#[test]
fn load_module_detects_snapshots_by_magic() {
    let dir = tempdir().expect("tempdir");
    let module = Module::new("a/b.cc").with_function(chain_function("foo", 2));

    let snapshot = ModuleSnapshotter::new(OutputLayout::new(dir.path())).save(&module).expect("save");
    assert_eq!(load_module(&snapshot).expect("snapshot"), module);

    let json = dir.path().join("module.json");
    write_module_json(&module, &json).expect("write json");
    assert_eq!(load_module(&json).expect("json"), module);
}

#[test]
fn flags_override_config_file() {
    let dir = tempdir().expect("tempdir");
    let config = dir.path().join("pass.json");
    fs::write(&config, r#"{ "out_dir": "/does/not/matter", "shm_size": 0 }"#).expect("write");
    let out = dir.path().to_string_lossy().to_string();

    let opts = RunOptions {
        config: Some(config.as_path()),
        out_dir: Some(out.as_str()),
        shm_size: Some(u32::MAX - 1),
        ..RunOptions::default()
    };
    let resolved = resolve_pass_config(&opts).expect("resolve");
    assert_eq!(resolved.mode(), Mode::Debloat);
    assert_eq!(resolved.out_dir, dir.path().canonicalize().expect("canonicalize"));

    assert!(resolve_pass_config(&RunOptions::default()).is_err());
}

#[test]
fn summary_counts_traps_and_ids() {
    let mut module = Module::new("m.c").with_function(chain_function("f", 2));
    module.functions[0].blocks[0].ops.insert(0, Op::MarkCoverage { slot: "s".into(), id: 7 });
    module.functions[0].blocks[1].ops = vec![Op::Trap];

    let summary = summarize_module(&module);
    assert_eq!(summary.functions[0].coverage_ids, vec![7]);
    assert_eq!(summary.functions[0].trap_blocks, 1);
    assert!(summary.verify_error.is_none());
}

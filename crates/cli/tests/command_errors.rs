use std::fs;

use hundun_core::model::mutate::chain_function;
use hundun_core::model::Module;
use predicates::str::contains;
use tempfile::tempdir;

fn hundun() -> assert_cmd::Command {
    assert_cmd::cargo::cargo_bin_cmd!("hundun")
}

fn module_file(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("m.json");
    let module = Module::new("lib/util.c").with_function(chain_function("helper", 2));
    fs::write(&path, serde_json::to_string(&module).expect("serialize")).expect("write module");
    path
}

#[test]
fn run_requires_config_or_both_flags() {
    let dir = tempdir().expect("tempdir");
    let module = module_file(dir.path());

    hundun()
        .arg("run")
        .arg("--module")
        .arg(&module)
        .args(["--shm-size", "0"])
        .assert()
        .failure()
        .stderr(contains("Specify --config or both --out-dir and --shm-size"));
}

#[test]
fn instrument_without_id_file_fails() {
    let dir = tempdir().expect("tempdir");
    let module = module_file(dir.path());

    hundun()
        .args(["run", "--shm-size", "4294967295", "--module"])
        .arg(&module)
        .arg("--out-dir")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(contains("Pass failed for module `lib/util.c`"))
        .stderr(contains("No identifier file"));
}

#[test]
fn debloat_without_profile_fails() {
    let dir = tempdir().expect("tempdir");
    let module = module_file(dir.path());
    fs::write(dir.path().join("lib@util$c.bc.id"), "helper 0\n").expect("id file");

    hundun()
        .args(["run", "--shm-size", "4294967294", "--module"])
        .arg(&module)
        .arg("--out-dir")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(contains("Profile log not found"));
}

#[test]
fn assign_ids_twice_fails() {
    let dir = tempdir().expect("tempdir");
    let module = module_file(dir.path());

    let assign = || {
        let mut cmd = hundun();
        cmd.args(["assign-ids", "--out-dir"]).arg(dir.path()).arg(&module);
        cmd
    };
    assign().assert().success();
    assign().assert().failure().stderr(contains("already exists"));
}

#[test]
fn malformed_profile_fails_coverage() {
    let dir = tempdir().expect("tempdir");
    let module = module_file(dir.path());
    fs::write(dir.path().join("lib@util$c.bc.id"), "helper 0\n").expect("id file");
    fs::write(dir.path().join("profile.log"), "0\nnot-an-id\n").expect("profile");

    hundun()
        .args(["coverage", "--out-dir"])
        .arg(dir.path())
        .arg("--module")
        .arg(&module)
        .assert()
        .failure()
        .stderr(contains("Failed to load profile log"));
}

#[test]
fn inspect_rejects_unparseable_module() {
    let dir = tempdir().expect("tempdir");
    let bogus = dir.path().join("bogus.json");
    fs::write(&bogus, "{ not json").expect("write");

    hundun()
        .arg("inspect")
        .arg(&bogus)
        .assert()
        .failure()
        .stderr(contains("Failed to parse module JSON"));
}

#[test]
fn show_ids_reports_missing_record() {
    let dir = tempdir().expect("tempdir");
    hundun()
        .args(["show-ids", "--module-path", "x/y.c", "--out-dir"])
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(contains("No identifier file for `x/y.c`"));
}

#[test]
fn coverage_rejects_ids_past_the_id_space() {
    let dir = tempdir().expect("tempdir");
    let module = module_file(dir.path());
    fs::write(dir.path().join("lib@util$c.bc.id"), "helper 4294967295\n").expect("id file");
    fs::write(dir.path().join("profile.log"), "4294967295\n").expect("profile");

    hundun()
        .args(["coverage", "--out-dir"])
        .arg(dir.path())
        .arg("--module")
        .arg(&module)
        .assert()
        .failure()
        .stderr(contains("overflow the coverage id space"));
}

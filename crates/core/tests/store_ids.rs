use std::fs;
use std::path::Path;

use hundun_core::model::mutate::chain_function;
use hundun_core::model::{Function, Module};
use hundun_core::store::{
    assign_ids, canonicalize, FsIdStore, IdMapping, IdentifierStore, MemoryIdStore, OutputLayout,
    StoreError,
};
use proptest::prelude::*;
use tempfile::tempdir;

#[test]
fn canonicalize_replaces_separators_and_dots() {
    assert_eq!(canonicalize("a/b.cc"), "a@b$cc");
    assert_eq!(canonicalize("src/lib/x.y.cpp"), "src@lib@x$y$cpp");
    assert_eq!(canonicalize("plain"), "plain");
}

#[test]
fn layout_places_files_under_out_dir() {
    let layout = OutputLayout::new("/tmp/out");
    assert_eq!(layout.module_id_file_path("a/b.cc"), Path::new("/tmp/out/a@b$cc.bc.id"));
    assert_eq!(layout.module_snapshot_path("a/b.cc"), Path::new("/tmp/out/a@b$cc.bc"));
    assert_eq!(layout.profile_log_path, Path::new("/tmp/out/profile.log"));
}

#[test]
fn parse_reads_name_and_base_per_line() {
    let text = "foo 100\nbar 103\n\n";
    let mapping = IdMapping::parse(text, Path::new("x.bc.id")).expect("parse");
    assert_eq!(mapping.len(), 2);
    assert_eq!(mapping.resolve("foo"), Some(100));
    assert_eq!(mapping.resolve("bar"), Some(103));
    assert_eq!(mapping.resolve("baz"), None);
}

#[test]
fn parse_splits_on_last_space() {
    // Demangled names may contain spaces; the id is always the last field.
    let mapping =
        IdMapping::parse("operator new(unsigned long) 7\n", Path::new("x")).expect("parse");
    assert_eq!(mapping.resolve("operator new(unsigned long)"), Some(7));
}

#[test]
fn parse_rejects_malformed_lines() {
    for text in ["foo\n", "foo abc\n", " 12\n", "foo -1\n", "foo +100\n"] {
        let err = IdMapping::parse(text, Path::new("bad.bc.id")).expect_err(text);
        assert!(matches!(err, StoreError::MalformedRecord { line: 1, .. }), "{text}: {err}");
    }
}

#[test]
fn parse_rejects_duplicate_function_names() {
    let err = IdMapping::parse("foo 1\nfoo 2\n", Path::new("dup")).expect_err("duplicate");
    match err {
        StoreError::MalformedRecord { line, reason, .. } => {
            assert_eq!(line, 2);
            assert!(reason.contains("foo"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn file_string_is_sorted_by_base() {
    let mut mapping = IdMapping::new();
    mapping.insert("late", 50);
    mapping.insert("early", 3);
    assert_eq!(mapping.to_file_string(), "early 3\nlate 50\n");
}

#[test]
fn allocate_skips_functions_without_body() {
    let module = Module::new("a/b.cc")
        .with_function(chain_function("foo", 3))
        .with_function(Function::declaration("printf"))
        .with_function(Function::intrinsic("llvm.memcpy"))
        .with_function(chain_function("bar", 2));

    let (mapping, next) = IdMapping::allocate(&module, 100).expect("allocate");
    assert_eq!(mapping.resolve("foo"), Some(100));
    assert_eq!(mapping.resolve("bar"), Some(103));
    assert_eq!(mapping.resolve("printf"), None);
    assert_eq!(next, 105);
    assert!(mapping.overlaps(&module).is_empty());
}

#[test]
fn allocate_reports_exhausted_id_space() {
    let module = Module::new("m.c").with_function(chain_function("foo", 4));
    let err = IdMapping::allocate(&module, u32::MAX - 1).expect_err("overflow");
    assert!(matches!(err, StoreError::IdSpaceExhausted { .. }));
}

#[test]
fn overlaps_lists_intersecting_ranges() {
    let module = Module::new("m.c")
        .with_function(chain_function("foo", 3))
        .with_function(chain_function("bar", 3));
    let mut mapping = IdMapping::new();
    mapping.insert("foo", 10);
    mapping.insert("bar", 12);

    assert_eq!(mapping.overlaps(&module), vec![("foo".to_string(), "bar".to_string())]);
}

#[test]
fn fs_store_load_returns_none_when_file_absent() {
    let dir = tempdir().expect("tempdir");
    let store = FsIdStore::new(OutputLayout::new(dir.path()));
    assert!(store.load("a@b$cc").expect("load").is_none());
}

#[test]
fn fs_store_writes_once_and_reads_back() {
    let dir = tempdir().expect("tempdir");
    let layout = OutputLayout::new(dir.path());
    let store = FsIdStore::new(layout.clone());

    let mut mapping = IdMapping::new();
    mapping.insert("foo", 100);
    store.create("a@b$cc", &mapping).expect("create");

    let on_disk = fs::read_to_string(layout.id_file_path("a@b$cc")).expect("read id file");
    assert_eq!(on_disk, "foo 100\n");
    assert_eq!(store.load("a@b$cc").expect("load"), Some(mapping.clone()));

    let err = store.create("a@b$cc", &mapping).expect_err("second create");
    assert!(matches!(err, StoreError::IdFileExists(_)));
    assert!(err.is_configuration());
}

#[test]
fn fs_store_surfaces_malformed_files() {
    let dir = tempdir().expect("tempdir");
    let layout = OutputLayout::new(dir.path());
    fs::write(layout.id_file_path("m$c"), "foo 1\nnot-a-record\n").expect("write");

    let err = FsIdStore::new(layout).load("m$c").expect_err("malformed");
    assert!(matches!(err, StoreError::MalformedRecord { line: 2, .. }));
}

#[test]
fn assign_ids_gives_modules_disjoint_ranges() {
    let store = MemoryIdStore::new();
    let modules = vec![
        Module::new("a/one.cc").with_function(chain_function("f", 2)),
        Module::new("a/empty.cc").with_function(Function::declaration("g")),
        Module::new("b/two.cc")
            .with_function(chain_function("f", 3))
            .with_function(chain_function("h", 1)),
    ];

    let next = assign_ids(&store, &modules, 10).expect("assign");
    assert_eq!(next, 16);

    let one = store.load(&canonicalize("a/one.cc")).expect("load").expect("one");
    let two = store.load(&canonicalize("b/two.cc")).expect("load").expect("two");
    assert_eq!(one.resolve("f"), Some(10));
    assert_eq!(two.resolve("f"), Some(12));
    assert_eq!(two.resolve("h"), Some(15));
    assert!(store.load(&canonicalize("a/empty.cc")).expect("load").is_none());
}

#[test]
fn unrecordable_names_get_no_ids() {
    let module = Module::new("a.c")
        .with_function(chain_function("", 2))
        .with_function(chain_function("two\nlines", 2))
        .with_function(chain_function("main", 3));
    let dir = tempdir().expect("tempdir");
    let store = FsIdStore::new(OutputLayout::new(dir.path()));

    let next = assign_ids(&store, std::slice::from_ref(&module), 0).expect("assign");
    assert_eq!(next, 3);

    let mapping = store.load("a$c").expect("id file loads").expect("id file written");
    assert_eq!(mapping.len(), 1);
    assert_eq!(mapping.resolve("main"), Some(0));
    assert_eq!(mapping.resolve(""), None);
    assert!(!IdMapping::is_recordable_name("two\nlines"));
    assert!(IdMapping::is_recordable_name("operator new(unsigned long)"));
}

#[test]
fn failed_create_leaves_existing_record_and_no_stray_files() {
    let dir = tempdir().expect("tempdir");
    let layout = OutputLayout::new(dir.path());
    let store = FsIdStore::new(layout.clone());

    let mut first = IdMapping::new();
    first.insert("foo", 1);
    store.create("m$c", &first).expect("create");
    let mut second = IdMapping::new();
    second.insert("bar", 9);
    assert!(matches!(store.create("m$c", &second), Err(StoreError::IdFileExists(_))));

    assert_eq!(fs::read_to_string(layout.id_file_path("m$c")).expect("read"), "foo 1\n");
    let entries: Vec<_> = fs::read_dir(dir.path()).expect("read_dir").collect();
    assert_eq!(entries.len(), 1, "only the id file should remain");
}

#[test]
fn assign_ids_refuses_to_reassign() {
    let dir = tempdir().expect("tempdir");
    let store = FsIdStore::new(OutputLayout::new(dir.path()));
    let modules = vec![Module::new("a.c").with_function(chain_function("main", 1))];

    assign_ids(&store, &modules, 0).expect("first assignment");
    let err = assign_ids(&store, &modules, 0).expect_err("second assignment");
    assert!(matches!(err, StoreError::IdFileExists(_)));
}

fn module_strategy() -> impl Strategy<Value = Module> {
    module_with_names("[a-z_][a-z0-9_]{0,8}")
}

fn module_with_names(names: &'static str) -> impl Strategy<Value = Module> {
    prop::collection::btree_map(names, 1usize..6, 0..6).prop_map(|funcs| {
        funcs
            .into_iter()
            .fold(Module::new("gen.cc"), |m, (name, blocks)| m.with_function(chain_function(name, blocks)))
    })
}

proptest! {
    #[test]
    fn file_format_survives_a_write_read_cycle(
        module in module_with_names("(?s).{0,12}"),
        start in 0u32..1_000_000,
    ) {
        let (mapping, _) = IdMapping::allocate(&module, start).expect("allocate");
        let reparsed = IdMapping::parse(&mapping.to_file_string(), Path::new("gen")).expect("parse");
        prop_assert_eq!(&reparsed, &mapping);
        for f in &module.functions {
            prop_assert_eq!(
                mapping.resolve(&f.name).is_some(),
                IdMapping::is_recordable_name(&f.name)
            );
        }
    }

    #[test]
    fn allocated_ranges_never_overlap(modules in prop::collection::vec(module_strategy(), 1..4)) {
        let mut ranges: Vec<(u32, u32)> = Vec::new();
        let mut next = 0;
        for module in &modules {
            let (mapping, after) = IdMapping::allocate(module, next).expect("allocate");
            prop_assert!(mapping.overlaps(module).is_empty());
            for f in &module.functions {
                let base = mapping.resolve(&f.name).expect("every body gets an id");
                ranges.push((base, base + f.blocks.len() as u32));
            }
            next = after;
        }
        ranges.sort();
        for pair in ranges.windows(2) {
            prop_assert!(pair[0].1 <= pair[1].0, "{:?} overlaps {:?}", pair[0], pair[1]);
        }
    }
}

//! Include scanner tests: line parsing and the recursive implicit-dep walk.

mod common;

use std::fs;

use common::{DagBuilder, NodeSpec, ScannerSpec};
use tempfile::TempDir;
use tundra2::binfmt::dag::{DagView, Keyword, scanner_flags};
use tundra2::binfmt::{DAG_MAGIC, map_frozen_file};
use tundra2::mem::LinearAllocator;
use tundra2::scan_cache::ScanCache;
use tundra2::scanner::{scan_cpp_line, scan_generic_line, scan_implicit_deps};
use tundra2::stat_cache::StatCache;
use tundra2::stats::Stats;

// --- cpp line scanning ---

fn cpp(line: &str) -> Option<(String, bool)> {
    scan_cpp_line(line.as_bytes()).map(|inc| (inc.path, inc.is_system))
}

#[test]
fn test_cpp_quoted_include() {
    assert_eq!(cpp("#include \"foo.h\""), Some(("foo.h".to_string(), false)));
}

#[test]
fn test_cpp_angle_include_is_system() {
    assert_eq!(cpp("#include <stdio.h>"), Some(("stdio.h".to_string(), true)));
}

#[test]
fn test_cpp_leading_whitespace_and_hash_spacing() {
    assert_eq!(cpp("   #include \"a.h\""), Some(("a.h".to_string(), false)));
    assert_eq!(cpp("#  include <b.h>"), Some(("b.h".to_string(), true)));
    assert_eq!(cpp("\t#\tinclude <c.h>"), Some(("c.h".to_string(), true)));
}

#[test]
fn test_cpp_requires_whitespace_after_keyword() {
    assert_eq!(cpp("#include\"foo.h\""), None);
    assert_eq!(cpp("#include<foo.h>"), None);
}

#[test]
fn test_cpp_rejects_non_include_lines() {
    assert_eq!(cpp("int x = 0;"), None);
    assert_eq!(cpp("// #include inside a comment"), None);
    assert_eq!(cpp("#define FOO"), None);
    assert_eq!(cpp("#includex \"foo.h\""), None);
    assert_eq!(cpp(""), None);
}

#[test]
fn test_cpp_rejects_unterminated_name() {
    assert_eq!(cpp("#include \"foo.h"), None);
    assert_eq!(cpp("#include <foo.h"), None);
}

// --- generic line scanning ---

fn keywords() -> Vec<(String, bool)> {
    vec![("include".to_string(), true)]
}

fn generic(line: &str, kw: &[(String, bool)], flags: u32) -> Option<(String, bool)> {
    let owned: Vec<Keyword> = kw
        .iter()
        .map(|(text, follow)| Keyword {
            text,
            should_follow: *follow,
        })
        .collect();
    scan_generic_line(line.as_bytes(), &owned, flags).map(|inc| (inc.path, inc.is_system))
}

#[test]
fn test_generic_bare_token() {
    assert_eq!(
        generic("include common.inc", &keywords(), 0),
        Some(("common.inc".to_string(), false))
    );
}

#[test]
fn test_generic_bare_means_system_flag() {
    assert_eq!(
        generic("include common.inc", &keywords(), scanner_flags::BARE_MEANS_SYSTEM),
        Some(("common.inc".to_string(), true))
    );
}

#[test]
fn test_generic_require_whitespace_flag() {
    let flags = scanner_flags::REQUIRE_WHITESPACE;
    assert_eq!(generic("include x.inc", &keywords(), flags), None);
    assert_eq!(
        generic("  include x.inc", &keywords(), flags),
        Some(("x.inc".to_string(), false))
    );
}

#[test]
fn test_generic_separator_forms() {
    let flags = scanner_flags::USE_SEPARATORS;
    assert_eq!(
        generic("include \"q.inc\"", &keywords(), flags),
        Some(("q.inc".to_string(), false))
    );
    assert_eq!(
        generic("include <sys.inc>", &keywords(), flags),
        Some(("sys.inc".to_string(), true))
    );
    // The crude `>path<` form for XML-ish files.
    assert_eq!(
        generic("include >res/icon.png<", &keywords(), flags),
        Some(("res/icon.png".to_string(), false))
    );
    assert_eq!(generic("include bare.inc", &keywords(), flags), None);
}

#[test]
fn test_generic_keyword_follow_flag_carries_through() {
    let kws = vec![("import".to_string(), false)];
    let owned: Vec<Keyword> = kws
        .iter()
        .map(|(text, follow)| Keyword {
            text,
            should_follow: *follow,
        })
        .collect();
    let inc = tundra2::scanner::scan_generic_line(b"import other.s", &owned, 0).unwrap();
    assert!(!inc.should_follow);
}

// --- implicit dependency walk ---

struct ScanFixture {
    _dir: TempDir,
    root: std::path::PathBuf,
    dag_mapping: tundra2::binfmt::MappedFile,
    stat_cache: StatCache,
    scan_cache: ScanCache,
    stats: Stats,
}

/// Lay out a small C tree: src/main.c includes "local.h" and <sys.h>;
/// local.h includes <nested.h>. System headers live under inc/.
fn build_scan_fixture() -> ScanFixture {
    let dir = TempDir::new().unwrap();
    let root = dir.path().to_path_buf();

    fs::create_dir_all(root.join("src")).unwrap();
    fs::create_dir_all(root.join("inc")).unwrap();
    fs::write(
        root.join("src/main.c"),
        "#include \"local.h\"\n#include <sys.h>\nint main(void) { return 0; }\n",
    )
    .unwrap();
    fs::write(root.join("src/local.h"), "#include <nested.h>\n#pragma once\n").unwrap();
    fs::write(root.join("inc/sys.h"), "typedef int sys_t;\n").unwrap();
    fs::write(root.join("inc/nested.h"), "typedef int nested_t;\n").unwrap();

    let dag_path = root.join("scan.dag");
    let mut builder = DagBuilder::new();
    builder.add_node(
        NodeSpec::new("Compile main.c", "true")
            .with_input(root.join("src/main.c").to_str().unwrap())
            .with_scanner(ScannerSpec::cpp(&[root.join("inc").to_str().unwrap()])),
    );
    builder.write(&dag_path);
    let dag_mapping = map_frozen_file(&dag_path, DAG_MAGIC).unwrap();

    ScanFixture {
        root: root.clone(),
        _dir: dir,
        dag_mapping,
        stat_cache: StatCache::new(),
        scan_cache: ScanCache::new(&root.join(".scancache")),
        stats: Stats::new(),
    }
}

#[test]
fn test_scan_implicit_deps_resolves_closure() {
    let fixture = build_scan_fixture();
    let dag = DagView::new(fixture.dag_mapping.bytes());
    let scanner = dag.node(0).scanner().unwrap();
    let main_c = fixture.root.join("src/main.c");

    let mut scratch = LinearAllocator::new(1 << 20, "scan test");
    let includes = scan_implicit_deps(
        &fixture.stat_cache,
        &fixture.scan_cache,
        scanner,
        main_c.to_str().unwrap(),
        &mut scratch,
        &fixture.stats,
    );

    let mut paths: Vec<&str> = includes.iter().map(|f| f.path.as_str()).collect();
    paths.sort_unstable();

    let local = fixture.root.join("src/local.h");
    let sys = fixture.root.join("inc/sys.h");
    let nested = fixture.root.join("inc/nested.h");
    let mut expected = vec![
        local.to_str().unwrap(),
        sys.to_str().unwrap(),
        nested.to_str().unwrap(),
    ];
    expected.sort_unstable();

    assert_eq!(paths, expected);
}

#[test]
fn test_scan_results_come_from_cache_on_second_walk() {
    let fixture = build_scan_fixture();
    let dag = DagView::new(fixture.dag_mapping.bytes());
    let scanner = dag.node(0).scanner().unwrap();
    let main_c = fixture.root.join("src/main.c");

    let mut scratch = LinearAllocator::new(1 << 20, "scan test");
    let first = scan_implicit_deps(
        &fixture.stat_cache,
        &fixture.scan_cache,
        scanner,
        main_c.to_str().unwrap(),
        &mut scratch,
        &fixture.stats,
    );

    let misses_after_first = fixture
        .stats
        .scan_cache_misses
        .load(std::sync::atomic::Ordering::Relaxed);
    assert!(misses_after_first > 0);

    let second = scan_implicit_deps(
        &fixture.stat_cache,
        &fixture.scan_cache,
        scanner,
        main_c.to_str().unwrap(),
        &mut scratch,
        &fixture.stats,
    );

    assert_eq!(first, second);
    // Unchanged files: every per-file scan is served from the cache.
    assert_eq!(
        fixture
            .stats
            .scan_cache_misses
            .load(std::sync::atomic::Ordering::Relaxed),
        misses_after_first
    );
}

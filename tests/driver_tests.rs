//! End-to-end build scenarios through the driver.
//!
//! The driver works against fixed file names in the working directory, so
//! every test takes the cwd lock, switches into a fresh temp directory and
//! runs real builds with shell actions.

#![cfg(unix)]

mod common;

use std::fs::{self, File, FileTimes};
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

use common::{DagBuilder, NodeSpec, ScannerSpec};
use tempfile::TempDir;
use tundra2::binfmt::dag::node_flags;
use tundra2::binfmt::state::StateView;
use tundra2::binfmt::{STATE_MAGIC, map_frozen_file};
use tundra2::driver::{Driver, DriverOptions};
use tundra2::hash::HashDigest;
use tundra2::signal::SignalState;
use tundra2::types::{BuildProgress, BuildResult, NodeState};

static CWD_LOCK: Mutex<()> = Mutex::new(());

struct BuildDir {
    _guard: MutexGuard<'static, ()>,
    _dir: TempDir,
}

/// Enter a fresh working directory; restored implicitly by the next test.
fn enter_build_dir() -> BuildDir {
    let guard = CWD_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let dir = TempDir::new().unwrap();
    std::env::set_current_dir(dir.path()).unwrap();
    BuildDir {
        _guard: guard,
        _dir: dir,
    }
}

fn options(threads: usize) -> DriverOptions {
    DriverOptions {
        thread_count: threads,
        quiet: true,
        ..DriverOptions::default()
    }
}

/// One full driver cycle: load, prepare, build, save.
fn run_build(opts: DriverOptions) -> (BuildResult, Driver) {
    let signals = SignalState::new();
    let mut driver = Driver::new(opts, signals);
    driver.init_data().unwrap();
    driver.remove_stale_outputs();
    driver.prepare_nodes().unwrap();
    let result = driver.build().unwrap();
    driver.save_all().unwrap();
    (result, driver)
}

fn state_of<'a>(driver: &'a Driver, dag_index: usize) -> &'a NodeState {
    driver
        .node_states()
        .iter()
        .find(|n| n.dag_index == dag_index)
        .expect("node state")
}

fn load_state_view(bytes: &[u8]) -> StateView<'_> {
    StateView::new(bytes)
}

/// Set a file's mtime to now + `offset_secs`.
fn bump_mtime(path: &Path, offset_secs: i64) {
    let now = SystemTime::now();
    let new_time = if offset_secs >= 0 {
        now + Duration::from_secs(offset_secs as u64)
    } else {
        now - Duration::from_secs(offset_secs.unsigned_abs())
    };
    let file = File::options().write(true).open(path).unwrap();
    file.set_times(FileTimes::new().set_modified(new_time)).unwrap();
}

// --- scenario: trivial no-op build ---

#[test]
fn test_empty_action_node_succeeds_without_spawning() {
    let _cwd = enter_build_dir();

    fs::write("out.txt", b"already here").unwrap();

    let mut builder = DagBuilder::new();
    let node = builder.add_node(NodeSpec::new("No-op", "").with_output("out.txt"));
    builder.write(Path::new(".tundra2.dag"));

    let (result, driver) = run_build(options(2));
    assert_eq!(result, BuildResult::Ok);
    assert_eq!(state_of(&driver, node).progress, BuildProgress::Completed);
    assert_eq!(state_of(&driver, node).build_result, 0);
    assert_eq!(driver.stats.exec_count.load(Ordering::Relaxed), 0);

    // Second run: up to date, still no process spawned.
    let (result, driver) = run_build(options(2));
    assert_eq!(result, BuildResult::Ok);
    assert_eq!(driver.stats.exec_count.load(Ordering::Relaxed), 0);
}

// --- scenario: cold build of a two-node chain, then incremental no-op ---

fn chain_builder() -> (DagBuilder, usize, usize) {
    let mut builder = DagBuilder::new();
    let emit = builder.add_node(
        NodeSpec::new("Emit a.o", "echo object-code > a.o")
            .with_input("a.src")
            .with_output("a.o"),
    );
    let link = builder.add_node(
        NodeSpec::new("Link out", "cat a.o > out")
            .with_input("a.o")
            .with_output("out")
            .with_dep(emit),
    );
    (builder, emit, link)
}

#[test]
fn test_two_node_chain_builds_in_dependency_order() {
    let _cwd = enter_build_dir();

    fs::write("a.src", b"source").unwrap();
    let (builder, emit, link) = chain_builder();
    builder.write(Path::new(".tundra2.dag"));

    let (result, driver) = run_build(options(3));
    assert_eq!(result, BuildResult::Ok);
    assert_eq!(state_of(&driver, emit).progress, BuildProgress::Completed);
    assert_eq!(state_of(&driver, link).progress, BuildProgress::Completed);
    assert_eq!(fs::read_to_string("out").unwrap(), "object-code\n");
    assert_eq!(driver.stats.exec_count.load(Ordering::Relaxed), 2);

    // The state file holds both guid/signature pairs.
    let mapping = map_frozen_file(Path::new(".tundra2.state"), STATE_MAGIC).unwrap();
    let state = load_state_view(mapping.bytes());
    assert_eq!(state.node_count(), 2);
    assert!(state.find_by_guid(&DagBuilder::guid(emit)).is_some());
    assert!(state.find_by_guid(&DagBuilder::guid(link)).is_some());
    let record = state.node_state(state.find_by_guid(&DagBuilder::guid(link)).unwrap());
    assert_eq!(record.build_result(), 0);
    assert_ne!(record.input_signature(), HashDigest::default());
    assert_eq!(record.output_files().collect::<Vec<_>>(), vec!["out"]);
}

#[test]
fn test_incremental_rerun_is_all_up_to_date() {
    let _cwd = enter_build_dir();

    fs::write("a.src", b"source").unwrap();
    let (builder, emit, link) = chain_builder();
    builder.write(Path::new(".tundra2.dag"));

    run_build(options(3));

    let (result, driver) = run_build(options(3));
    assert_eq!(result, BuildResult::Ok);
    assert_eq!(driver.stats.exec_count.load(Ordering::Relaxed), 0);
    assert_eq!(state_of(&driver, emit).build_result, 0);
    assert_eq!(state_of(&driver, link).build_result, 0);
}

#[test]
fn test_touched_input_triggers_rebuild_of_chain() {
    let _cwd = enter_build_dir();

    fs::write("a.src", b"source").unwrap();
    let (builder, ..) = chain_builder();
    builder.write(Path::new(".tundra2.dag"));

    run_build(options(3));

    // Push a.o into the past and let the link node re-sign against it, so
    // the recorded signatures cannot collide with fresh mtimes below.
    bump_mtime(Path::new("a.o"), -100);
    let (_, driver) = run_build(options(3));
    assert_eq!(driver.stats.exec_count.load(Ordering::Relaxed), 1);

    // Now touch the source: the emitter re-runs and rewrites a.o with a
    // current mtime, which re-signs the link node as well.
    bump_mtime(Path::new("a.src"), 30);

    let (result, driver) = run_build(options(3));
    assert_eq!(result, BuildResult::Ok);
    assert_eq!(driver.stats.exec_count.load(Ordering::Relaxed), 2);
}

// --- scenario: header change triggers recompile ---

#[test]
fn test_header_change_triggers_recompile() {
    let _cwd = enter_build_dir();

    fs::create_dir_all("inc").unwrap();
    fs::write("src.c", "#include \"hdr.h\"\nint main(void) { return 0; }\n").unwrap();
    fs::write("inc/hdr.h", "#define VALUE 1\n").unwrap();

    let mut builder = DagBuilder::new();
    builder.add_node(
        NodeSpec::new("Compile src.c", "echo compiled > src.o")
            .with_input("src.c")
            .with_output("src.o")
            .with_scanner(ScannerSpec::cpp(&["inc"])),
    );
    builder.write(Path::new(".tundra2.dag"));

    let (result, driver) = run_build(options(2));
    assert_eq!(result, BuildResult::Ok);
    assert_eq!(driver.stats.exec_count.load(Ordering::Relaxed), 1);

    // Unchanged: the scan cache serves the include list, nothing re-runs.
    let (_, driver) = run_build(options(2));
    assert_eq!(driver.stats.exec_count.load(Ordering::Relaxed), 0);

    // Touch the header only. src.c's mtime is unchanged, so the include
    // list still comes from the scan cache, but the header's stat feeds
    // the input signature and forces a recompile.
    bump_mtime(Path::new("inc/hdr.h"), 30);

    let (result, driver) = run_build(options(2));
    assert_eq!(result, BuildResult::Ok);
    assert_eq!(driver.stats.exec_count.load(Ordering::Relaxed), 1);
    assert!(driver.stats.old_scan_cache_hits.load(Ordering::Relaxed) > 0);
}

// --- failure handling ---

#[test]
fn test_failing_node_blocks_dependents() {
    let _cwd = enter_build_dir();

    let mut builder = DagBuilder::new();
    let bad = builder.add_node(NodeSpec::new("Fail", "false").with_output("bad.out"));
    let dependent = builder.add_node(
        NodeSpec::new("Never runs", "echo no > never.out")
            .with_output("never.out")
            .with_dep(bad),
    );
    builder.write(Path::new(".tundra2.dag"));

    let (result, driver) = run_build(options(2));
    assert_eq!(result, BuildResult::BuildError);
    assert_eq!(state_of(&driver, bad).progress, BuildProgress::Completed);
    assert_eq!(state_of(&driver, bad).build_result, 1);
    // The dependent never reached its action.
    assert_ne!(state_of(&driver, dependent).progress, BuildProgress::Completed);
    assert!(!Path::new("never.out").exists());

    // A failed previous result forces a retry on the next run.
    let (result, driver) = run_build(options(2));
    assert_eq!(result, BuildResult::BuildError);
    assert_eq!(driver.stats.exec_count.load(Ordering::Relaxed), 1);
}

#[test]
fn test_failed_outputs_removed_unless_precious() {
    let _cwd = enter_build_dir();

    let mut builder = DagBuilder::new();
    builder.add_node(NodeSpec::new("Fail loudly", "echo partial > trash.out; false").with_output("trash.out"));
    builder.add_node(
        NodeSpec::new("Fail precious", "echo partial > kept.out; false")
            .with_output("kept.out")
            .with_flags(node_flags::PRECIOUS_OUTPUTS),
    );
    builder.write(Path::new(".tundra2.dag"));

    let (result, _) = run_build(DriverOptions {
        continue_on_error: true,
        ..options(2)
    });
    assert_eq!(result, BuildResult::BuildError);
    assert!(!Path::new("trash.out").exists());
    assert!(Path::new("kept.out").exists());
}

#[test]
fn test_unexpected_output_fails_validation() {
    let _cwd = enter_build_dir();

    let mut builder = DagBuilder::new();
    let noisy = builder.add_node(NodeSpec::new("Noisy", "echo unexpected chatter; true").with_output("n.out"));
    let mut allowed = NodeSpec::new("Allowed", "echo known warning; echo ok > a.out").with_output("a.out");
    allowed.allowed_output_substrings = vec!["known warning".to_string()];
    let allowed = builder.add_node(allowed);
    builder.write(Path::new(".tundra2.dag"));

    let (result, driver) = run_build(DriverOptions {
        continue_on_error: true,
        ..options(2)
    });
    assert_eq!(result, BuildResult::BuildError);
    assert_eq!(state_of(&driver, noisy).build_result, 1);
    assert_eq!(state_of(&driver, allowed).build_result, 0);
}

// --- output hygiene ---

#[test]
fn test_output_parent_directories_are_created() {
    let _cwd = enter_build_dir();

    let mut builder = DagBuilder::new();
    builder.add_node(
        NodeSpec::new("Deep output", "echo data > build/objs/deep/file.o").with_output("build/objs/deep/file.o"),
    );
    builder.write(Path::new(".tundra2.dag"));

    let (result, _) = run_build(options(2));
    assert_eq!(result, BuildResult::Ok);
    assert!(Path::new("build/objs/deep/file.o").exists());
}

#[test]
fn test_stale_outputs_removed_when_dag_shrinks() {
    let _cwd = enter_build_dir();

    let mut builder = DagBuilder::new();
    builder.add_node(NodeSpec::new("Old", "echo old > gone/old.out").with_output("gone/old.out"));
    builder.add_node(NodeSpec::new("Keep", "echo keep > keep.out").with_output("keep.out"));
    builder.write(Path::new(".tundra2.dag"));

    run_build(options(2));
    assert!(Path::new("gone/old.out").exists());

    // New DAG drops the first node and its output.
    let mut smaller = DagBuilder::new();
    smaller.add_node(NodeSpec::new("Keep", "echo keep > keep.out").with_output("keep.out"));
    smaller.write(Path::new(".tundra2.dag"));

    run_build(options(2));
    assert!(!Path::new("gone/old.out").exists());
    // The emptied parent directory is pruned as well.
    assert!(!Path::new("gone").exists());
    assert!(Path::new("keep.out").exists());
}

// --- expensive throttling ---

#[test]
fn test_expensive_nodes_all_complete_under_cap() {
    let _cwd = enter_build_dir();

    let mut builder = DagBuilder::new();
    let indices: Vec<usize> = (0..6)
        .map(|i| {
            builder.add_node(
                NodeSpec::new(
                    &format!("Expensive {}", i),
                    &format!("sleep 0.05; echo done > exp{}.out", i),
                )
                .with_output(&format!("exp{}.out", i))
                .with_flags(node_flags::EXPENSIVE),
            )
        })
        .collect();
    builder.max_expensive = 2;
    builder.write(Path::new(".tundra2.dag"));

    let (result, driver) = run_build(options(4));
    assert_eq!(result, BuildResult::Ok);
    for index in indices {
        assert_eq!(state_of(&driver, index).progress, BuildProgress::Completed);
        assert_eq!(state_of(&driver, index).build_result, 0);
    }
    assert_eq!(driver.stats.exec_count.load(Ordering::Relaxed), 6);
}

// --- cancellation ---

#[test]
fn test_latched_signal_drains_build_and_preserves_state() {
    let _cwd = enter_build_dir();

    fs::write("a.src", b"source").unwrap();
    let (builder, emit, _) = chain_builder();
    builder.write(Path::new(".tundra2.dag"));

    // A successful run establishes state.
    run_build(options(2));
    let mapping = map_frozen_file(Path::new(".tundra2.state"), STATE_MAGIC).unwrap();
    let before = load_state_view(mapping.bytes());
    let emit_sig = before
        .node_state(before.find_by_guid(&DagBuilder::guid(emit)).unwrap())
        .input_signature();
    let record_count = before.node_count();
    drop(mapping);

    // Invalidate an input, but latch the signal before building: nothing
    // runs, and the state file carries the previous records forward.
    bump_mtime(Path::new("a.src"), 30);

    let signals = SignalState::new();
    signals.set("test interrupt");
    let mut driver = Driver::new(options(2), signals);
    driver.init_data().unwrap();
    driver.prepare_nodes().unwrap();
    let result = driver.build().unwrap();
    driver.save_all().unwrap();

    assert_eq!(result, BuildResult::Interrupted);
    assert_eq!(driver.stats.exec_count.load(Ordering::Relaxed), 0);

    let mapping = map_frozen_file(Path::new(".tundra2.state"), STATE_MAGIC).unwrap();
    let after = load_state_view(mapping.bytes());
    assert_eq!(after.node_count(), record_count);
    let sig = after
        .node_state(after.find_by_guid(&DagBuilder::guid(emit)).unwrap())
        .input_signature();
    assert_eq!(sig, emit_sig);
}

// --- passes ---

#[test]
fn test_passes_run_in_order() {
    let _cwd = enter_build_dir();

    let mut builder = DagBuilder::new();
    builder.passes = vec!["CodeGen".to_string(), "Compile".to_string()];
    let generate = {
        let mut node = NodeSpec::new("Generate", "echo generated > gen.h").with_output("gen.h");
        node.pass_index = 0;
        builder.add_node(node)
    };
    {
        // Second-pass node consumes the first pass's output without an
        // explicit dependency edge; the pass barrier orders them.
        let mut node = NodeSpec::new("Use", "cat gen.h > use.out")
            .with_input("gen.h")
            .with_output("use.out");
        node.pass_index = 1;
        builder.add_node(node);
    }
    let _ = generate;
    builder.write(Path::new(".tundra2.dag"));

    let (result, _) = run_build(options(2));
    assert_eq!(result, BuildResult::Ok);
    assert_eq!(fs::read_to_string("use.out").unwrap(), "generated\n");
}

// --- clean ---

#[test]
fn test_clean_outputs_removes_declared_outputs() {
    let _cwd = enter_build_dir();

    let mut builder = DagBuilder::new();
    builder.add_node(NodeSpec::new("Make", "echo x > made.out").with_output("made.out"));
    builder.write(Path::new(".tundra2.dag"));

    run_build(options(2));
    assert!(Path::new("made.out").exists());

    let signals = SignalState::new();
    let mut driver = Driver::new(options(2), signals);
    driver.init_data().unwrap();
    driver.prepare_nodes().unwrap();
    driver.clean_outputs();
    assert!(!Path::new("made.out").exists());
}

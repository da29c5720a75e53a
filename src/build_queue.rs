//! The build scheduler: a thread pool advancing nodes through the progress
//! lattice.
//!
//! All queue state lives under one mutex paired with one condvar. Worker
//! threads pop node indices off a ring buffer and advance them; the two
//! long-running transitions (input signature computation and action
//! execution) release the lock for the duration of their I/O and re-acquire
//! it to commit the new progress. Thread 0 is the master: it runs the same
//! loop but additionally ends the pass once the pending count reaches zero.

use std::io::Write as _;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::Instant;

use log::{debug, error, trace, warn};

use crate::binfmt::dag::{DagView, NodeView, node_flags};
use crate::binfmt::state::StateView;
use crate::digest_cache::DigestCache;
use crate::exec::{ExecResult, execute_process, write_text_file};
use crate::file_sign::compute_file_signature;
use crate::fileinfo::make_directory;
use crate::hash::HashState;
use crate::mem::LinearAllocator;
use crate::paths::PathBuffer;
use crate::print::{Printer, ValidationResult};
use crate::scan_cache::ScanCache;
use crate::scanner::scan_implicit_deps;
use crate::signal::SignalState;
use crate::stat_cache::StatCache;
use crate::stats::Stats;
use crate::types::{BuildProgress, BuildResult, NodeState};

pub const MAX_BUILD_THREADS: usize = 64;

/// Per-thread scratch region for include scanning.
const THREAD_SCRATCH_SIZE: usize = 32 * 1024 * 1024;

pub mod queue_flags {
    /// Print command lines to the TTY as actions are executed.
    pub const ECHO_COMMAND_LINES: u32 = 1 << 0;
    /// Print annotations to the TTY as actions are executed.
    pub const ECHO_ANNOTATIONS: u32 = 1 << 1;
    /// Continue building even if there are errors.
    pub const CONTINUE_ON_ERROR: u32 = 1 << 2;
}

pub struct BuildQueueConfig<'a> {
    pub flags: u32,
    pub thread_count: usize,
    pub dag: DagView<'a>,
    pub prev_state: Option<StateView<'a>>,
    /// DAG index → runtime state index, -1 for unselected nodes.
    pub node_remap: &'a [i32],
    pub digest_ext_hashes: &'a [u32],
    pub max_expensive: usize,
    pub stat_cache: &'a StatCache,
    pub scan_cache: &'a ScanCache,
    pub digest_cache: &'a DigestCache,
    pub printer: &'a Printer,
    pub signals: &'a SignalState,
    pub stats: &'a Stats,
    /// Signature trace sink for --debug-signing.
    pub sign_log: Option<&'a Mutex<std::fs::File>>,
}

/// A contiguous slice of the runtime node array, all in one pass.
#[derive(Clone, Copy, Debug)]
pub struct NodeRange<'a> {
    pub start: usize,
    pub count: usize,
    pub pass_index: i32,
    pub pass_name: &'a str,
}

struct QueueState {
    queue: Vec<i32>,
    read_index: usize,
    write_index: usize,
    nodes: Vec<NodeState>,
    pending_count: i32,
    failed_count: i32,
    processed_count: usize,
    current_pass: i32,
    expensive_running: usize,
    parked_expensive: Vec<usize>,
    quit: bool,
}

impl QueueState {
    fn queue_mask(&self) -> usize {
        self.queue.len() - 1
    }

    fn available_count(&self) -> usize {
        (self.write_index.wrapping_sub(self.read_index)) & self.queue_mask()
    }

    fn enqueue(&mut self, state_index: usize) {
        debug_assert!(!self.nodes[state_index].queued);
        debug_assert!(!self.nodes[state_index].active);
        debug_assert!(!self.nodes[state_index].is_completed());

        let write = self.write_index;
        self.queue[write] = state_index as i32;
        self.write_index = (write + 1) & self.queue_mask();
        self.nodes[state_index].queued = true;
    }

    fn next_node(&mut self) -> Option<usize> {
        if self.available_count() == 0 {
            return None;
        }
        let read = self.read_index;
        let state_index = self.queue[read] as usize;
        self.read_index = (read + 1) & self.queue_mask();

        let node = &mut self.nodes[state_index];
        debug_assert!(node.queued && !node.active);
        node.queued = false;
        node.active = true;
        Some(state_index)
    }

    fn state_index_for_dag_node(&self, remap: &[i32], dag_index: i32) -> Option<usize> {
        let mapped = *remap.get(dag_index as usize)?;
        if mapped < 0 { None } else { Some(mapped as usize) }
    }
}

pub struct BuildQueue<'a> {
    lock: Mutex<QueueState>,
    work_available: Arc<Condvar>,
    config: BuildQueueConfig<'a>,
}

impl<'a> BuildQueue<'a> {
    pub fn new(mut config: BuildQueueConfig<'a>, nodes: Vec<NodeState>) -> BuildQueue<'a> {
        if config.thread_count > MAX_BUILD_THREADS {
            warn!(
                "too many build threads ({}) - clamping to {}",
                config.thread_count, MAX_BUILD_THREADS
            );
            config.thread_count = MAX_BUILD_THREADS;
        }
        debug_assert!(config.max_expensive >= 1 && config.max_expensive <= config.thread_count.max(1));

        // Ring buffer capacity: power of two at least one larger than the
        // node count, so write == read always means empty.
        let capacity = (nodes.len() + 1).next_power_of_two();
        debug!("build queue initialized; ring buffer capacity = {}", capacity);

        BuildQueue {
            lock: Mutex::new(QueueState {
                queue: vec![0; capacity],
                read_index: 0,
                write_index: 0,
                nodes,
                pending_count: 0,
                failed_count: 0,
                processed_count: 0,
                current_pass: 0,
                expensive_running: 0,
                parked_expensive: Vec::new(),
                quit: false,
            }),
            work_available: Arc::new(Condvar::new()),
            config,
        }
    }

    /// Run every pass range in order, stopping at the first pass that does
    /// not succeed. Worker threads live across all passes.
    pub fn execute_passes(&self, ranges: &[NodeRange<'_>]) -> BuildResult {
        self.config
            .signals
            .set_condition(Some(Arc::clone(&self.work_available)));

        let result = thread::scope(|scope| {
            for thread_index in 1..self.config.thread_count {
                debug!("starting build thread {}", thread_index);
                scope.spawn(move || self.build_loop(thread_index));
            }

            let mut result = BuildResult::Ok;
            for range in ranges {
                if range.count > 0 {
                    debug!(
                        "begin pass {} (nodes: {} - {} ({}))",
                        range.pass_name,
                        range.start,
                        range.start + range.count - 1,
                        range.count
                    );
                }
                result = self.build_node_range(*range);
                if range.count > 0 {
                    debug!("end pass {}", range.pass_name);
                }
                if result != BuildResult::Ok {
                    break;
                }
            }

            self.lock.lock().unwrap().quit = true;
            self.work_available.notify_all();
            result
        });

        self.config.signals.set_condition(None);
        result
    }

    /// Recover the node state array once the build is over.
    pub fn into_nodes(self) -> Vec<NodeState> {
        self.lock.into_inner().unwrap().nodes
    }

    fn build_node_range(&self, range: NodeRange<'_>) -> BuildResult {
        {
            let mut q = self.lock.lock().unwrap();
            q.current_pass = range.pass_index;

            for i in 0..range.count {
                let state_index = range.start + i;
                debug_assert_eq!(q.nodes[state_index].progress, BuildProgress::Initial);
                q.nodes[state_index].queued = true;
                q.queue[i] = state_index as i32;
            }

            q.pending_count = range.count as i32;
            q.failed_count = 0;
            q.read_index = 0;
            q.write_index = range.count;
        }

        self.work_available.notify_all();

        // This thread is thread 0.
        self.build_loop(0);

        let q = self.lock.lock().unwrap();
        if self.config.signals.is_signalled() {
            BuildResult::Interrupted
        } else if q.failed_count > 0 {
            BuildResult::BuildError
        } else {
            BuildResult::Ok
        }
    }

    fn should_keep_building(&self, q: &QueueState, thread_index: usize) -> bool {
        if self.config.signals.is_signalled() {
            return false;
        }

        if q.failed_count > 0 && self.config.flags & queue_flags::CONTINUE_ON_ERROR == 0 {
            return false;
        }

        if q.quit {
            return false;
        }

        // Workers keep running until told to quit; the master loops until
        // the current pass has drained.
        if thread_index != 0 {
            return true;
        }
        q.pending_count > 0
    }

    fn build_loop(&self, thread_index: usize) {
        let mut scratch = LinearAllocator::new(THREAD_SCRATCH_SIZE, "thread scratch");
        scratch.set_owner_current_thread();

        let mut guard = self.lock.lock().unwrap();
        while self.should_keep_building(&guard, thread_index) {
            match guard.next_node() {
                Some(state_index) => {
                    guard = self.advance_node(guard, state_index, thread_index, &mut scratch);
                }
                None => {
                    guard = self.work_available.wait(guard).unwrap();
                }
            }
        }
        drop(guard);

        trace!("build thread {} exiting", thread_index);
    }

    fn advance_node<'g>(
        &'g self,
        mut guard: MutexGuard<'g, QueueState>,
        state_index: usize,
        thread_index: usize,
        scratch: &mut LinearAllocator,
    ) -> MutexGuard<'g, QueueState> {
        trace!(
            "T={} advancing {:?} [{}]",
            thread_index,
            guard.nodes[state_index].progress,
            self.annotation_of(&guard, state_index)
        );

        loop {
            match guard.nodes[state_index].progress {
                BuildProgress::Initial => {
                    let next = self.setup_dependencies(&mut guard, state_index);
                    guard.nodes[state_index].progress = next;

                    if next == BuildProgress::Blocked {
                        // Inactive until our dependencies are ready.
                        guard.nodes[state_index].active = false;
                        return guard;
                    }
                }

                BuildProgress::Blocked => {
                    guard.nodes[state_index].progress = BuildProgress::Unblocked;
                }

                BuildProgress::Unblocked => {
                    guard = self.check_input_signature(guard, state_index, thread_index, scratch);
                }

                BuildProgress::RunAction => {
                    let was_expensive = self
                        .dag_node(&guard, state_index)
                        .has_flag(node_flags::EXPENSIVE);

                    guard = self.run_action(guard, state_index, thread_index);

                    // Still RunAction means we were parked; another expensive
                    // job will put us back on the queue when it finishes.
                    if guard.nodes[state_index].progress == BuildProgress::RunAction {
                        return guard;
                    }

                    if was_expensive {
                        guard.expensive_running -= 1;
                        self.unpark_expensive_node(&mut guard);
                    }
                }

                BuildProgress::Succeeded | BuildProgress::UpToDate => {
                    guard.nodes[state_index].build_result = 0;
                    guard.nodes[state_index].progress = BuildProgress::Completed;
                }

                BuildProgress::Failed => {
                    guard.failed_count += 1;
                    self.work_available.notify_all();
                    guard.nodes[state_index].build_result = 1;
                    guard.nodes[state_index].progress = BuildProgress::Completed;
                }

                BuildProgress::Completed => {
                    guard.pending_count -= 1;
                    guard.nodes[state_index].active = false;
                    self.unblock_waiters(&mut guard, state_index);
                    self.work_available.notify_all();
                    return guard;
                }
            }
        }
    }

    fn dag_node<'g>(&self, q: &MutexGuard<'g, QueueState>, state_index: usize) -> NodeView<'a> {
        self.config.dag.node(q.nodes[state_index].dag_index)
    }

    fn annotation_of(&self, q: &MutexGuard<'_, QueueState>, state_index: usize) -> &'a str {
        self.dag_node(q, state_index).annotation()
    }

    fn all_dependencies_ready(&self, q: &QueueState, state_index: usize) -> bool {
        let dag_index = q.nodes[state_index].dag_index;
        self.config.dag.node(dag_index).dependencies().all(|dep| {
            match q.state_index_for_dag_node(self.config.node_remap, dep) {
                Some(dep_state) => q.nodes[dep_state].is_completed(),
                None => true,
            }
        })
    }

    fn wake_waiters(&self, count: usize) {
        if count > 1 {
            self.work_available.notify_all();
        } else if count == 1 {
            self.work_available.notify_one();
        }
    }

    /// See how our dependencies are doing; queue up any that have not been
    /// started yet. Returns Blocked when at least one is incomplete.
    fn setup_dependencies(&self, q: &mut QueueState, state_index: usize) -> BuildProgress {
        let dag_index = q.nodes[state_index].dag_index;
        let mut dep_waits_needed = 0usize;
        let mut enqueue_count = 0usize;

        for dep in self.config.dag.node(dag_index).dependencies() {
            let Some(dep_state) = q.state_index_for_dag_node(self.config.node_remap, dep) else {
                continue;
            };

            if q.nodes[dep_state].is_completed() {
                continue;
            }

            dep_waits_needed += 1;

            let dep_node = &q.nodes[dep_state];
            if !dep_node.queued && !dep_node.active && dep_node.progress != BuildProgress::Blocked {
                q.enqueue(dep_state);
                enqueue_count += 1;
            }
        }

        self.wake_waiters(enqueue_count);

        if dep_waits_needed > 0 {
            BuildProgress::Blocked
        } else {
            BuildProgress::Unblocked
        }
    }

    /// Re-queue nodes that were waiting on us, now that we completed.
    fn unblock_waiters(&self, q: &mut QueueState, state_index: usize) {
        let dag_index = q.nodes[state_index].dag_index;
        let mut enqueue_count = 0usize;

        for link in self.config.dag.node(dag_index).back_links() {
            let Some(waiter) = q.state_index_for_dag_node(self.config.node_remap, link) else {
                continue;
            };

            // Only wake nodes in our current pass.
            if i32::from(q.nodes[waiter].pass_index) != q.current_pass {
                continue;
            }

            if !self.all_dependencies_ready(q, waiter) {
                continue;
            }

            // Did someone else get to the node first?
            if q.nodes[waiter].queued || q.nodes[waiter].active {
                continue;
            }

            q.enqueue(waiter);
            enqueue_count += 1;
        }

        self.wake_waiters(enqueue_count);
    }

    fn park_expensive_node(&self, q: &mut QueueState, state_index: usize) {
        q.nodes[state_index].queued = true;
        q.nodes[state_index].active = false;
        q.parked_expensive.push(state_index);
    }

    fn unpark_expensive_node(&self, q: &mut QueueState) {
        if let Some(state_index) = q.parked_expensive.pop() {
            debug_assert!(q.nodes[state_index].queued);
            q.nodes[state_index].queued = false;
            q.enqueue(state_index);
            self.work_available.notify_one();
        }
    }

    /// Compute the node's input signature and compare it against the
    /// previous build. The queue lock is released across the I/O.
    fn check_input_signature<'g>(
        &'g self,
        guard: MutexGuard<'g, QueueState>,
        state_index: usize,
        thread_index: usize,
        scratch: &mut LinearAllocator,
    ) -> MutexGuard<'g, QueueState> {
        debug_assert!(self.all_dependencies_ready(&guard, state_index));

        let dag_index = guard.nodes[state_index].dag_index;
        let prev_index = guard.nodes[state_index].prev_state;
        drop(guard);

        let config = &self.config;
        let node = config.dag.node(dag_index);

        let mut h = HashState::new();

        // Start with the command line action. If that changes, we will
        // definitely have to rebuild.
        h.add_string(node.action());
        h.add_separator();

        if let Some(pre_action) = node.pre_action() {
            h.add_string(pre_action);
            h.add_separator();
        }

        let scanner = node.scanner();

        for (input_path, input_hash) in node.input_files() {
            // Path and signature of every direct input file.
            h.add_path(input_path);
            compute_file_signature(
                &mut h,
                config.stat_cache,
                config.digest_cache,
                input_path,
                input_hash,
                config.digest_ext_hashes,
                config.stats,
            );

            if let Some(scanner) = scanner {
                let includes = scan_implicit_deps(
                    config.stat_cache,
                    config.scan_cache,
                    scanner,
                    input_path,
                    scratch,
                    config.stats,
                );
                for include in includes {
                    // Path and signature of every implicit input (#includes).
                    h.add_path(&include.path);
                    compute_file_signature(
                        &mut h,
                        config.stat_cache,
                        config.digest_cache,
                        &include.path,
                        include.hash,
                        config.digest_ext_hashes,
                        config.stats,
                    );
                }
            }
        }

        for substring in node.allowed_output_substrings() {
            h.add_string(substring);
        }
        h.add_integer(u64::from(node.has_flag(node_flags::ALLOW_UNEXPECTED_OUTPUT)));

        let signature = h.finalize();

        if let Some(sign_log) = config.sign_log {
            let mut file = sign_log.lock().unwrap();
            let _ = writeln!(file, "input_sig(\"{}\"):\n  => {}", node.annotation(), signature);
        }

        let prev_state = match (config.prev_state, prev_index) {
            (Some(state), Some(index)) => Some(state.node_state(index)),
            _ => None,
        };

        let next = match prev_state {
            None => {
                trace!("T={}: building {} - new node", thread_index, node.annotation());
                BuildProgress::RunAction
            }
            Some(prev) if prev.input_signature() != signature => {
                trace!(
                    "T={}: building {} - input signature changed. was:{} now:{}",
                    thread_index,
                    node.annotation(),
                    prev.input_signature(),
                    signature
                );
                BuildProgress::RunAction
            }
            Some(prev) if prev.build_result() != 0 => {
                trace!(
                    "T={}: building {} - previous build failed",
                    thread_index,
                    node.annotation()
                );
                BuildProgress::RunAction
            }
            Some(prev) if output_files_differ(&node, &prev) => {
                trace!(
                    "T={}: building {} - output files have changed",
                    thread_index,
                    node.annotation()
                );
                BuildProgress::RunAction
            }
            Some(_) if self.output_files_missing(&node) => {
                trace!(
                    "T={}: building {} - output files are missing",
                    thread_index,
                    node.annotation()
                );
                BuildProgress::RunAction
            }
            Some(_) => {
                trace!("T={}: {} - up to date", thread_index, node.annotation());
                BuildProgress::UpToDate
            }
        };

        let mut guard = self.lock.lock().unwrap();
        guard.nodes[state_index].input_signature = signature;
        guard.nodes[state_index].progress = next;
        if next == BuildProgress::UpToDate {
            guard.processed_count += 1;
        }
        guard
    }

    fn output_files_missing(&self, node: &NodeView<'_>) -> bool {
        node.output_files().any(|(path, hash)| {
            !self
                .config
                .stat_cache
                .stat(path, hash, self.config.stats)
                .exists
        })
    }

    /// Run the node's action. The queue lock is released across directory
    /// creation, output pre-cleaning and process execution.
    fn run_action<'g>(
        &'g self,
        mut guard: MutexGuard<'g, QueueState>,
        state_index: usize,
        thread_index: usize,
    ) -> MutexGuard<'g, QueueState> {
        let dag_index = guard.nodes[state_index].dag_index;
        let node = self.config.dag.node(dag_index);
        let is_write_file_action = node.has_flag(node_flags::WRITE_TEXT_FILE);
        let cmd_line = node.action();

        if !is_write_file_action && cmd_line.is_empty() {
            guard.processed_count += 1;
            guard.nodes[state_index].progress = BuildProgress::Succeeded;
            return guard;
        }

        if node.has_flag(node_flags::EXPENSIVE) {
            if guard.expensive_running == self.config.max_expensive {
                self.park_expensive_node(&mut guard, state_index);
                return guard;
            }
            guard.expensive_running += 1;
        }

        drop(guard);

        let config = &self.config;
        let stats = config.stats;
        let stat_cache = config.stat_cache;
        let annotation = node.annotation();
        let echo_cmdline = config.flags & queue_flags::ECHO_COMMAND_LINES != 0;
        let echo_annotation = config.flags & queue_flags::ECHO_ANNOTATIONS != 0;

        let env_vars: Vec<(String, String)> = node
            .env_vars()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();

        for (output, _) in node.output_files() {
            if !make_directories_for_file(stat_cache, stats, output) {
                error!("failed to create output directories for {}", output);
                let mut guard = self.lock.lock().unwrap();
                guard.nodes[state_index].progress = BuildProgress::Failed;
                return guard;
            }
        }

        // Remove output files before running anything, unless the action
        // declared in-place overwriting safe.
        if !node.has_flag(node_flags::OVERWRITE_OUTPUTS) {
            for (output, hash) in node.output_files() {
                debug!("removing output file {} before running action", output);
                let _ = std::fs::remove_file(output);
                stat_cache.mark_dirty(output, hash);
            }
        }

        let time_of_start = Instant::now();
        let mut slow_callback = |annotation: &str| -> u64 {
            let (processed, total) = {
                let q = self.lock.lock().unwrap();
                (q.processed_count, q.nodes.len())
            };
            config
                .printer
                .print_node_in_progress(thread_index, annotation, time_of_start, processed, total)
        };

        let mut result = ExecResult::default();
        let mut last_cmd_line = None;

        if let Some(pre_action) = node.pre_action() {
            trace!("launching pre-action process");
            Stats::bump(&stats.exec_count);
            last_cmd_line = Some(pre_action);
            let mut on_slow = || slow_callback(annotation);
            result = execute_process(pre_action, &env_vars, config.signals, Some(&mut on_slow), 1);
            trace!("process return code {}", result.return_code);
        }

        let mut validation = ValidationResult::Pass;
        if result.return_code == 0 {
            trace!("launching process");
            Stats::bump(&stats.exec_count);
            if is_write_file_action {
                let target = node.output_files().next().map(|(path, _)| path).unwrap_or("");
                result = write_text_file(cmd_line, target);
            } else {
                last_cmd_line = Some(cmd_line);
                let mut on_slow = || slow_callback(annotation);
                result = execute_process(
                    cmd_line,
                    &env_vars,
                    config.signals,
                    Some(&mut on_slow),
                    crate::utils::config::SLOW_JOB_FIRST_REPORT_SECS,
                );
                validation = validate_against_allowed_output(&node, &result);
            }
            trace!("process return code {}", result.return_code);
        }

        for (output, hash) in node.output_files() {
            stat_cache.mark_dirty(output, hash);
        }

        let mut guard = self.lock.lock().unwrap();
        guard.processed_count += 1;

        config.printer.print_node_result(
            &result,
            annotation,
            last_cmd_line,
            thread_index,
            echo_cmdline,
            echo_annotation,
            validation,
            guard.processed_count,
            guard.nodes.len(),
        );

        if result.was_aborted {
            config.signals.set("child process was aborted");
        }

        if result.return_code == 0 && validation != ValidationResult::Fail {
            guard.nodes[state_index].progress = BuildProgress::Succeeded;
        } else {
            // Clean up output files after a failed build unless they are
            // precious.
            if !node.has_flag(node_flags::PRECIOUS_OUTPUTS) {
                for (output, hash) in node.output_files() {
                    debug!("removing output file {} from failed build", output);
                    let _ = std::fs::remove_file(output);
                    stat_cache.mark_dirty(output, hash);
                }
            }
            guard.nodes[state_index].progress = BuildProgress::Failed;
        }
        guard
    }
}

/// Does the declared output list differ from what the previous build
/// recorded?
fn output_files_differ(node: &NodeView<'_>, prev: &crate::binfmt::state::NodeStateView<'_>) -> bool {
    if node.output_file_count() != prev.output_file_count() {
        return true;
    }
    node.output_files()
        .zip(prev.output_files())
        .any(|((current, _), recorded)| current != recorded)
}

/// Check process output against the node's allowed-output rules. Output that
/// matches an allowed substring is swallowed; unexpected output fails the
/// node unless it opted out.
pub fn validate_against_allowed_output(node: &NodeView<'_>, result: &ExecResult) -> ValidationResult {
    let allow_unexpected = node.has_flag(node_flags::ALLOW_UNEXPECTED_OUTPUT);
    let mut allowed = node.allowed_output_substrings().peekable();

    if allow_unexpected && allowed.peek().is_none() {
        return ValidationResult::Pass;
    }

    if !result.has_interesting_output() {
        return ValidationResult::Pass;
    }

    let text = result.output_text();
    if allowed.any(|substring| text.contains(substring)) {
        return ValidationResult::SwallowOutput;
    }

    if allow_unexpected {
        ValidationResult::Pass
    } else {
        ValidationResult::Fail
    }
}

fn make_directories_recursive(stat_cache: &StatCache, stats: &Stats, dir: &PathBuffer) -> bool {
    let mut parent = dir.clone();
    parent.strip_last();

    // Can't go any higher.
    if *dir == parent {
        return true;
    }

    if !make_directories_recursive(stat_cache, stats, &parent) {
        return false;
    }

    let path = dir.format();
    let info = stat_cache.stat_path(&path, stats);

    if info.exists {
        // Assume an existing entry is a directory; a file in the way will
        // fail the action with a sensible message anyway.
        true
    } else {
        trace!("create dir \"{}\"", path);
        let success = make_directory(&path);
        stat_cache.mark_dirty(&path, crate::hash::djb2_hash_path(&path));
        success
    }
}

/// Create the parent directory chain for an output file.
pub fn make_directories_for_file(stat_cache: &StatCache, stats: &Stats, file_path: &str) -> bool {
    let Ok(mut buffer) = PathBuffer::native(file_path) else {
        return false;
    };
    buffer.strip_last();
    make_directories_recursive(stat_cache, stats, &buffer)
}

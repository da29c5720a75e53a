//! Build orchestration: load the frozen inputs, decide what to build, run
//! the queue and persist new state.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, bail};
use log::{debug, info, warn};

use crate::binfmt::dag::{DagView, MAX_PASSES};
use crate::binfmt::state::StateView;
use crate::binfmt::writer::{BinaryWriter, SegmentId};
use crate::binfmt::{DAG_MAGIC, MappedFile, STATE_MAGIC, commit_cache_file, map_frozen_file};
use crate::build_queue::{BuildQueue, BuildQueueConfig, NodeRange, queue_flags};
use crate::digest_cache::DigestCache;
use crate::file_sign::calculate_glob_signature;
use crate::fileinfo::{get_file_info, remove_file_or_dir};
use crate::hash::{HashDigest, djb2_hash_path};
use crate::hashtable::HashSet;
use crate::merge::{MergeElem, traverse_sorted_arrays};
use crate::paths::PathBuffer;
use crate::print::Printer;
use crate::scan_cache::ScanCache;
use crate::signal::SignalState;
use crate::stat_cache::StatCache;
use crate::stats::Stats;
use crate::target_select::select_targets;
use crate::types::{BuildProgress, BuildResult, NodeState};
use crate::utils::config::{
    BUILD_FILENAME, DIGEST_CACHE_FILENAME, DIGEST_CACHE_FILENAME_TMP, ENV_DAGTOOL, ENV_HOME,
    SCAN_CACHE_FILENAME, SCAN_CACHE_FILENAME_TMP, SIGN_DEBUG_FILENAME, STATE_FILENAME,
    STATE_FILENAME_TMP,
};

#[derive(Clone, Debug)]
pub struct DriverOptions {
    pub targets: Vec<String>,
    pub thread_count: usize,
    pub dry_run: bool,
    pub force_dag_regen: bool,
    pub show_targets: bool,
    pub verbose: bool,
    pub quiet: bool,
    pub debug_signing: bool,
    pub continue_on_error: bool,
    pub clean: bool,
    pub rebuild: bool,
    pub dag_filename: String,
}

impl Default for DriverOptions {
    fn default() -> Self {
        DriverOptions {
            targets: Vec::new(),
            thread_count: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            dry_run: false,
            force_dag_regen: false,
            show_targets: false,
            verbose: false,
            quiet: false,
            debug_signing: false,
            continue_on_error: false,
            clean: false,
            rebuild: false,
            dag_filename: crate::utils::config::DAG_FILENAME.to_string(),
        }
    }
}

pub struct Driver {
    options: DriverOptions,
    signals: Arc<SignalState>,
    pub stats: Stats,
    stat_cache: StatCache,
    scan_cache: ScanCache,
    digest_cache: DigestCache,
    dag_mapping: Option<MappedFile>,
    state_mapping: Option<MappedFile>,
    nodes: Vec<NodeState>,
    node_remap: Vec<i32>,
    pass_node_count: [usize; MAX_PASSES],
}

impl Driver {
    pub fn new(options: DriverOptions, signals: Arc<SignalState>) -> Driver {
        Driver {
            options,
            signals,
            stats: Stats::new(),
            stat_cache: StatCache::new(),
            scan_cache: ScanCache::new(Path::new(SCAN_CACHE_FILENAME)),
            digest_cache: DigestCache::new(Path::new(DIGEST_CACHE_FILENAME)),
            dag_mapping: None,
            state_mapping: None,
            nodes: Vec::new(),
            node_remap: Vec::new(),
            pass_node_count: [0; MAX_PASSES],
        }
    }

    fn dag(&self) -> DagView<'_> {
        DagView::new(self.dag_mapping.as_ref().expect("DAG not loaded").bytes())
    }

    /// Runtime node states, in pass order before [`Self::save_all`] and in
    /// DAG order afterwards.
    pub fn node_states(&self) -> &[NodeState] {
        &self.nodes
    }

    fn prev_state(&self) -> Option<StateView<'_>> {
        self.state_mapping.as_ref().map(|m| StateView::new(m.bytes()))
    }

    /// Map the DAG (regenerating it when stale) and the previous build
    /// state. A missing or invalid state file is tolerated.
    pub fn init_data(&mut self) -> Result<()> {
        self.prepare_dag()?;
        self.state_mapping = map_frozen_file(Path::new(STATE_FILENAME), STATE_MAGIC);
        Ok(())
    }

    fn prepare_dag(&mut self) -> Result<()> {
        let dag_path = self.options.dag_filename.clone();

        // Try to use an existing DAG.
        if !self.options.force_dag_regen {
            if let Some(mapping) = map_frozen_file(Path::new(&dag_path), DAG_MAGIC) {
                self.dag_mapping = Some(mapping);
                if self.check_dag_signatures()? {
                    debug!("DAG signatures match - using existing data");
                    return Ok(());
                }
                self.dag_mapping = None;
            }
        }

        // We need to generate the DAG data.
        self.generate_dag(&dag_path)?;

        // The DAG had better map in now, or we can give up.
        match map_frozen_file(Path::new(&dag_path), DAG_MAGIC) {
            Some(mapping) => {
                self.dag_mapping = Some(mapping);
                self.check_dag_signatures()?;
                Ok(())
            }
            None => bail!("couldn't load freshly generated DAG {}", dag_path),
        }
    }

    fn generate_dag(&self, dag_path: &str) -> Result<()> {
        // TUNDRA_DAGTOOL names the generator; failing that, look for it in
        // the support-script home.
        let tool = match std::env::var(ENV_DAGTOOL) {
            Ok(tool) => tool,
            Err(_) => {
                let home = std::env::var(ENV_HOME).with_context(|| {
                    format!(
                        "neither {} nor {} is set; cannot regenerate {}",
                        ENV_DAGTOOL, ENV_HOME, dag_path
                    )
                })?;
                Path::new(&home)
                    .join("tundra2-dag")
                    .to_string_lossy()
                    .into_owned()
            }
        };

        info!("regenerating DAG from {}", BUILD_FILENAME);
        let status = std::process::Command::new(&tool)
            .arg(BUILD_FILENAME)
            .arg(dag_path)
            .status()
            .with_context(|| format!("running DAG generator {}", tool))?;

        if !status.success() {
            bail!("DAG generator failed with {}", status);
        }
        Ok(())
    }

    /// Validate the mapped DAG: pass cap, sorted unique guids, input file
    /// timestamps and glob signatures. `Ok(false)` means "stale, regenerate";
    /// errors are fatal setup problems.
    fn check_dag_signatures(&self) -> Result<bool> {
        let dag = self.dag();

        if dag.pass_count() > MAX_PASSES {
            bail!("too many passes, max is {}", MAX_PASSES);
        }

        for i in 1..dag.node_count() {
            match dag.node_guid(i - 1).cmp(&dag.node_guid(i)) {
                std::cmp::Ordering::Less => {}
                std::cmp::Ordering::Equal => bail!("duplicate node guid {}", dag.node_guid(i)),
                std::cmp::Ordering::Greater => bail!("DAG node guids are not sorted"),
            }
        }

        debug!("checking file signatures for DAG data");

        for (path, timestamp) in dag.file_signatures() {
            let info = get_file_info(path);
            if info.timestamp != timestamp {
                info!("DAG out of date: timestamp change for {}", path);
                return Ok(false);
            }
        }

        for (path, digest) in dag.glob_signatures() {
            let actual = calculate_glob_signature(path);
            if actual != digest {
                info!("DAG out of date: file glob change for {} ({} => {})", path, digest, actual);
                return Ok(false);
            }
        }

        Ok(true)
    }

    pub fn show_targets(&self) {
        let dag = self.dag();

        println!("{:<20} {:<20} {:<20}", "Config", "Variant", "SubVariant");
        println!("----------------------------------------------------------------");

        for i in 0..dag.build_tuple_count() {
            let tuple = dag.build_tuple(i);
            println!(
                "{:<20} {:<20} {:<20}",
                dag.config_names().name(tuple.config_index() as usize),
                dag.variant_names().name(tuple.variant_index() as usize),
                dag.subvariant_names().name(tuple.subvariant_index() as usize)
            );
        }

        println!("\nNamed nodes and aliases:");
        println!("----------------------------------------------------------------");

        // The named nodes are the same for every build tuple; one is enough.
        if dag.build_tuple_count() > 0 {
            let tuple = dag.build_tuple(0);
            let mut names: Vec<&str> = tuple.named_nodes().map(|(name, _)| name).collect();
            names.sort_unstable();
            for name in names {
                println!(" - {}", name);
            }
        }
    }

    /// Delete files recorded by the previous build that no node produces
    /// anymore, then prune newly empty parent directories.
    pub fn remove_stale_outputs(&mut self) {
        let Some(state) = self.prev_state() else {
            debug!("unable to clean up stale output files - no previous build state");
            return;
        };
        let dag = self.dag();

        // Every output the current DAG can produce.
        let mut file_table = HashSet::for_paths();
        for i in 0..dag.node_count() {
            let node = dag.node(i);
            for (path, hash) in node.output_files().chain(node.aux_output_files()) {
                file_table.insert(hash, path);
            }
        }

        // Anything recorded but no longer produced is scheduled for removal,
        // along with its parent directory chain. rmdir on non-empty
        // directories fails, which is exactly what we want.
        let mut nuke_table = HashSet::for_paths();
        let mut check_file = |path: &str| {
            let path_hash = djb2_hash_path(path);
            if file_table.contains(path_hash, path) {
                return;
            }
            nuke_table.insert(path_hash, path);

            if let Ok(mut buffer) = PathBuffer::native(path) {
                while buffer.strip_last() {
                    if buffer.seg_count() == 0 {
                        break;
                    }
                    let dir = buffer.format();
                    nuke_table.insert(djb2_hash_path(&dir), &dir);
                }
            }
        };

        for i in 0..state.node_count() {
            let record = state.node_state(i);
            for path in record.output_files().chain(record.aux_output_files()) {
                check_file(path);
            }
        }

        // Longest paths first, so files and subdirectories go before their
        // parent directories.
        let mut paths: Vec<String> = Vec::with_capacity(nuke_table.len());
        nuke_table.walk(|_, _, path| paths.push(path.to_string()));
        paths.sort_by(|a, b| b.len().cmp(&a.len()));

        for path in &paths {
            debug!("cleaning up {}", path);
            remove_file_or_dir(path);
        }
    }

    /// Print the selected nodes in execution order without building them
    /// (--dry-run).
    pub fn list_selected_nodes(&self) {
        let dag = self.dag();
        for node_state in &self.nodes {
            let node = dag.node(node_state.dag_index);
            println!(
                "{:<12} {}",
                dag.pass_name(node_state.pass_index as usize),
                node.annotation()
            );
        }
    }

    /// Remove the declared outputs of every selected node (--clean and
    /// --rebuild).
    pub fn clean_outputs(&self) {
        let dag = self.dag();
        let mut count = 0usize;
        for node_state in &self.nodes {
            for (path, _) in dag.node(node_state.dag_index).output_files() {
                if remove_file_or_dir(path) {
                    count += 1;
                }
            }
        }
        info!("removed {} output files", count);
    }

    /// Resolve targets, close over dependencies and lay out the runtime
    /// node array sorted by pass. Returns the number of selected nodes.
    pub fn prepare_nodes(&mut self) -> Result<usize> {
        let dag = self.dag();

        let roots = self.select_nodes(&dag)?;

        // Dependency closure over the selected roots.
        let mut visited = vec![false; dag.node_count()];
        let mut stack = roots;
        let mut node_indices: Vec<usize> = Vec::new();
        let mut pass_node_count = [0usize; MAX_PASSES];

        while let Some(dag_index) = stack.pop() {
            if visited[dag_index] {
                continue;
            }
            visited[dag_index] = true;

            let node = dag.node(dag_index);
            let pass_index = node.pass_index();
            if pass_index < 0 || pass_index as usize >= dag.pass_count() {
                bail!("node {} has pass index {} out of range", dag_index, pass_index);
            }

            node_indices.push(dag_index);
            pass_node_count[pass_index as usize] += 1;

            stack.extend(node.dependencies().map(|d| d as usize));
        }

        let mut nodes: Vec<NodeState> = node_indices
            .iter()
            .map(|&dag_index| NodeState::new(dag_index, dag.node(dag_index).pass_index() as u16))
            .collect();

        // Attach previous-build records by guid.
        if let Some(state) = self.prev_state() {
            for node in &mut nodes {
                let guid = dag.node_guid(node.dag_index);
                node.prev_state = state.find_by_guid(&guid);
            }
        }

        // Pass order decides execution order; the queue is handed one
        // contiguous range per pass.
        nodes.sort_by_key(|n| n.pass_index);

        // Remap from global (dag) index to local (state) index, so any DAG
        // node reference can reach its runtime state.
        let mut node_remap = vec![-1i32; dag.node_count()];
        for (local_index, node) in nodes.iter().enumerate() {
            debug_assert_eq!(node_remap[node.dag_index], -1);
            node_remap[node.dag_index] = local_index as i32;
        }

        debug!(
            "node remap: {} src nodes, {} active nodes",
            dag.node_count(),
            nodes.len()
        );

        let count = nodes.len();
        self.nodes = nodes;
        self.node_remap = node_remap;
        self.pass_node_count = pass_node_count;
        Ok(count)
    }

    /// Resolve command-line targets to root DAG node indices.
    fn select_nodes(&self, dag: &DagView<'_>) -> Result<Vec<usize>> {
        let (target_specs, named_targets) = select_targets(dag, &self.options.targets)?;

        let mut out_nodes: Vec<usize> = Vec::new();

        for spec in &target_specs {
            let tuple = (0..dag.build_tuple_count())
                .map(|i| dag.build_tuple(i))
                .find(|t| {
                    t.config_index() == spec.config_index
                        && t.variant_index() == spec.variant_index
                        && t.subvariant_index() == spec.subvariant_index
                })
                .context("couldn't find build tuple in DAG")?;

            if !named_targets.is_empty() {
                find_nodes_by_name(dag, &tuple, &named_targets, &mut out_nodes);
            } else {
                out_nodes.extend(tuple.default_nodes().map(|n| n as usize));
            }

            out_nodes.extend(tuple.always_nodes().map(|n| n as usize));
        }

        out_nodes.sort_unstable();
        out_nodes.dedup();
        debug!("node selection finished with {} nodes to build", out_nodes.len());
        Ok(out_nodes)
    }

    /// Run every pass through a build queue.
    pub fn build(&mut self) -> Result<BuildResult> {
        let nodes = std::mem::take(&mut self.nodes);
        let dag = self.dag();
        let pass_count = dag.pass_count();

        let thread_count = self
            .options
            .thread_count
            .clamp(1, crate::build_queue::MAX_BUILD_THREADS);
        let max_expensive = {
            let raw = dag.max_expensive_count();
            if raw < 0 {
                thread_count
            } else {
                (raw as usize).min(thread_count).max(1)
            }
        };
        debug!("max # expensive jobs: {}", max_expensive);

        let mut flags = 0u32;
        if self.options.verbose {
            flags |= queue_flags::ECHO_ANNOTATIONS | queue_flags::ECHO_COMMAND_LINES;
        }
        if !self.options.quiet {
            flags |= queue_flags::ECHO_ANNOTATIONS;
        }
        if self.options.continue_on_error {
            flags |= queue_flags::CONTINUE_ON_ERROR;
        }

        let sign_log = if self.options.debug_signing {
            Some(Mutex::new(
                std::fs::File::create(SIGN_DEBUG_FILENAME)
                    .with_context(|| format!("creating {}", SIGN_DEBUG_FILENAME))?,
            ))
        } else {
            None
        };

        let digest_ext_hashes = dag.digest_extension_hashes();
        let printer = Printer::new();

        let mut ranges: Vec<NodeRange<'_>> = Vec::with_capacity(pass_count);
        let mut start = 0usize;
        for pass in 0..pass_count {
            let count = self.pass_node_count[pass];
            ranges.push(NodeRange {
                start,
                count,
                pass_index: pass as i32,
                pass_name: dag.pass_name(pass),
            });
            start += count;
        }

        let config = BuildQueueConfig {
            flags,
            thread_count,
            dag,
            prev_state: self.prev_state(),
            node_remap: &self.node_remap,
            digest_ext_hashes: &digest_ext_hashes,
            max_expensive,
            stat_cache: &self.stat_cache,
            scan_cache: &self.scan_cache,
            digest_cache: &self.digest_cache,
            printer: &printer,
            signals: self.signals.as_ref(),
            stats: &self.stats,
            sign_log: sign_log.as_ref(),
        };

        let queue = BuildQueue::new(config, nodes);

        let result = if ranges.is_empty() {
            BuildResult::Ok
        } else {
            queue.execute_passes(&ranges)
        };

        self.nodes = queue.into_nodes();

        printer.print_concluding_message(result.is_success(), &result.to_string());
        Ok(result)
    }

    /// Persist everything: build state, scan cache, digest cache. Each file
    /// is written to a temp name and renamed into place.
    pub fn save_all(&mut self) -> Result<()> {
        self.save_build_state()?;
        self.save_scan_cache()?;
        self.digest_cache.save(Path::new(DIGEST_CACHE_FILENAME_TMP))?;
        Ok(())
    }

    fn save_scan_cache(&mut self) -> Result<()> {
        if !self.scan_cache.is_dirty() {
            return Ok(());
        }
        self.scan_cache.save(Path::new(SCAN_CACHE_FILENAME_TMP))
    }

    /// Merge this run's node results with surviving previous records and
    /// write the new state file. Nodes that never computed a signature this
    /// run keep their previous record.
    fn save_build_state(&mut self) -> Result<()> {
        // DAG order is guid order, so sorting by dag index sorts by key.
        self.nodes.sort_by_key(|n| n.dag_index);

        let dag = self.dag();
        let nodes = &self.nodes;

        let mut writer = BinaryWriter::new();
        let main_seg = writer.add_segment();
        let guid_seg = writer.add_segment();
        let state_seg = writer.add_segment();
        let array_seg = writer.add_segment();
        let string_seg = writer.add_segment();

        let guid_pos = writer.position(guid_seg);
        let state_pos = writer.position(state_seg);

        let segs = StateSegments {
            guid_seg,
            state_seg,
            array_seg,
            string_seg,
        };

        let old_state = self.prev_state();
        let old_count = old_state.map(|s| s.node_count()).unwrap_or(0);

        let mut entry_count = 0i32;
        let stats = &self.stats;

        traverse_sorted_arrays(
            nodes.len(),
            |index| dag.node_guid(nodes[index].dag_index),
            old_count,
            |index| old_state.unwrap().node_guid(index),
            |elem| match elem {
                MergeElem::First(index) => {
                    let node = &nodes[index];
                    let guid = dag.node_guid(node.dag_index);

                    if node.progress < BuildProgress::Unblocked {
                        // No signature was computed (error or cancellation);
                        // retain the previous record to keep the history.
                        if let Some(state) = old_state
                            && let Some(old_index) = state.find_by_guid(&guid)
                        {
                            let old = state.node_state(old_index);
                            write_state_record(
                                &mut writer,
                                &segs,
                                &guid,
                                old.build_result(),
                                &old.input_signature(),
                                old.output_files(),
                                old.aux_output_files(),
                            );
                            entry_count += 1;
                            Stats::bump(&stats.state_save_new);
                        }
                    } else {
                        let dag_node = dag.node(node.dag_index);
                        write_state_record(
                            &mut writer,
                            &segs,
                            &guid,
                            node.build_result,
                            &node.input_signature,
                            dag_node.output_files().map(|(path, _)| path),
                            dag_node.aux_output_files().map(|(path, _)| path),
                        );
                        entry_count += 1;
                        Stats::bump(&stats.state_save_new);
                    }
                }
                MergeElem::Second(index) => {
                    let state = old_state.unwrap();
                    let guid = state.node_guid(index);

                    // Only carry the record forward while the node is still
                    // in the DAG.
                    if let Some(dag_index) = dag.find_node_by_guid(&guid) {
                        let dag_node = dag.node(dag_index);
                        let old = state.node_state(index);
                        write_state_record(
                            &mut writer,
                            &segs,
                            &guid,
                            old.build_result(),
                            &old.input_signature(),
                            dag_node.output_files().map(|(path, _)| path),
                            dag_node.aux_output_files().map(|(path, _)| path),
                        );
                        entry_count += 1;
                        Stats::bump(&stats.state_save_old);
                    } else {
                        Stats::bump(&stats.state_save_dropped);
                    }
                }
            },
        );

        writer.write_u32(main_seg, STATE_MAGIC);
        writer.write_i32(main_seg, entry_count);
        if entry_count == 0 {
            writer.write_null_pointer(main_seg);
            writer.write_null_pointer(main_seg);
        } else {
            writer.write_pointer(main_seg, guid_pos);
            writer.write_pointer(main_seg, state_pos);
        }

        // Unmap the old state before replacing it on disk.
        self.state_mapping = None;

        commit_cache_file(writer, Path::new(STATE_FILENAME_TMP), Path::new(STATE_FILENAME))
            .context("saving build state")
    }
}

struct StateSegments {
    guid_seg: SegmentId,
    state_seg: SegmentId,
    array_seg: SegmentId,
    string_seg: SegmentId,
}

fn write_state_record<'s>(
    writer: &mut BinaryWriter,
    segs: &StateSegments,
    guid: &HashDigest,
    build_result: i32,
    input_signature: &HashDigest,
    output_files: impl Iterator<Item = &'s str>,
    aux_output_files: impl Iterator<Item = &'s str>,
) {
    writer.write_bytes(segs.guid_seg, &guid.0);

    writer.write_i32(segs.state_seg, build_result);
    writer.write_bytes(segs.state_seg, &input_signature.0);

    for files in [
        output_files.collect::<Vec<_>>(),
        aux_output_files.collect::<Vec<_>>(),
    ] {
        let array_pos = writer.position(segs.array_seg);
        for path in &files {
            let string_pos = writer.position(segs.string_seg);
            writer.write_pointer(segs.array_seg, string_pos);
            writer.write_string_data(segs.string_seg, path);
        }
        writer.write_array_header(segs.state_seg, files.len() as i32, array_pos);
    }
}

/// Map target names to nodes: named-node tables first, then input/output
/// file names of nodes reachable from the tuple (normalized against the
/// working directory).
fn find_nodes_by_name(
    dag: &DagView<'_>,
    tuple: &crate::binfmt::dag::BuildTupleView<'_>,
    names: &[String],
    out_nodes: &mut Vec<usize>,
) {
    let mut reachable: Option<Vec<bool>> = None;

    for name in names {
        // Try all named nodes first.
        if let Some((_, node_index)) = tuple.named_nodes().find(|(n, _)| *n == name.as_str()) {
            debug!("mapped {} to node {}", name, node_index);
            out_nodes.push(node_index as usize);
            continue;
        }

        // Normalize and strip the working directory so absolute paths match
        // the DAG's relative file names.
        let mut filename = name.clone();
        if let Ok(buffer) = PathBuffer::native(name) {
            let formatted = buffer.format();
            if let Ok(cwd) = std::env::current_dir() {
                let mut prefix = cwd.to_string_lossy().into_owned();
                prefix.push(std::path::MAIN_SEPARATOR);
                if let Some(stripped) = strip_path_prefix(&formatted, &prefix) {
                    debug!("mapped {} to {} for DAG searching", formatted, stripped);
                    filename = stripped.to_string();
                } else {
                    filename = formatted;
                }
            }
        }
        let filename_hash = djb2_hash_path(&filename);

        let bits = reachable.get_or_insert_with(|| find_reachable_nodes(dag, tuple));

        let found = (0..dag.node_count())
            .filter(|&i| bits[i])
            .find(|&i| {
                let node = dag.node(i);
                node.input_files()
                    .chain(node.output_files())
                    .any(|(path, hash)| hash == filename_hash && path_names_equal(path, &filename))
            });

        match found {
            Some(node_index) => {
                debug!("mapped {} to node {} (based on file name)", name, node_index);
                out_nodes.push(node_index);
            }
            None => warn!("unable to map {} to any named node or input/output file", name),
        }
    }
}

fn strip_path_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    if crate::hash::CASE_INSENSITIVE_FILESYSTEM {
        let head = path.as_bytes().get(..prefix.len())?;
        if head.eq_ignore_ascii_case(prefix.as_bytes()) {
            path.get(prefix.len()..)
        } else {
            None
        }
    } else {
        path.strip_prefix(prefix)
    }
}

fn path_names_equal(a: &str, b: &str) -> bool {
    if crate::hash::CASE_INSENSITIVE_FILESYSTEM {
        a.eq_ignore_ascii_case(b)
    } else {
        a == b
    }
}

/// Mark every node reachable from the tuple's named-node entry points.
fn find_reachable_nodes(dag: &DagView<'_>, tuple: &crate::binfmt::dag::BuildTupleView<'_>) -> Vec<bool> {
    let mut bits = vec![false; dag.node_count()];
    let mut stack: Vec<usize> = tuple.named_nodes().map(|(_, index)| index as usize).collect();

    while let Some(index) = stack.pop() {
        if bits[index] {
            continue;
        }
        bits[index] = true;
        stack.extend(dag.node(index).dependencies().map(|d| d as usize));
    }
    bits
}

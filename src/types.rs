//! Shared types for the build engine: node progress, build outcomes and the
//! per-node runtime state record.

use std::fmt;

use crate::hash::HashDigest;

/// Outcome of a build (or of a single pass).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BuildResult {
    Ok,
    Interrupted,
    BuildError,
    SetupError,
}

impl BuildResult {
    pub fn exit_code(self) -> i32 {
        match self {
            BuildResult::Ok => 0,
            _ => 1,
        }
    }

    pub fn is_success(self) -> bool {
        self == BuildResult::Ok
    }
}

impl fmt::Display for BuildResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildResult::Ok => "build success",
            BuildResult::Interrupted => "build interrupted",
            BuildResult::BuildError => "build failed",
            BuildResult::SetupError => "build failed to setup",
        };
        f.write_str(name)
    }
}

/// Progress lattice for one node. Declaration order is significant: anything
/// below `Unblocked` never computed an input signature this run.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum BuildProgress {
    Initial,
    Blocked,
    Unblocked,
    RunAction,
    Succeeded,
    UpToDate,
    Failed,
    Completed,
}

/// Runtime state for one selected node. Frozen data is referenced by index
/// (into the DAG node array and the previous-state record array) rather than
/// by pointer, so this struct stays free of lifetimes.
#[derive(Clone, Debug)]
pub struct NodeState {
    pub queued: bool,
    pub active: bool,
    pub progress: BuildProgress,
    pub pass_index: u16,
    /// Index of this node in the frozen DAG.
    pub dag_index: usize,
    /// Index of the matching record in the previous-state file, if any.
    pub prev_state: Option<usize>,
    pub build_result: i32,
    pub input_signature: HashDigest,
}

impl NodeState {
    pub fn new(dag_index: usize, pass_index: u16) -> NodeState {
        NodeState {
            queued: false,
            active: false,
            progress: BuildProgress::Initial,
            pass_index,
            dag_index,
            prev_state: None,
            build_result: 0,
            input_signature: HashDigest::default(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.progress == BuildProgress::Completed
    }
}

/// A resolved file path together with its 32-bit path hash.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileAndHash {
    pub path: String,
    pub hash: u32,
}

impl FileAndHash {
    pub fn new(path: String) -> FileAndHash {
        let hash = crate::hash::djb2_hash_path(&path);
        FileAndHash { path, hash }
    }
}

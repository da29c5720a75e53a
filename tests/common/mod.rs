//! Test fixtures: an in-test DAG file builder that emits the same frozen
//! format the external generator produces.

#![allow(dead_code)]

use std::path::Path;

use tundra2::binfmt::writer::{BinaryLocator, BinaryWriter, SegmentId};
use tundra2::binfmt::DAG_MAGIC;
use tundra2::hash::{HashDigest, djb2_hash, djb2_hash_path, hash_single_string};

#[derive(Clone, Default)]
pub struct ScannerSpec {
    /// 0 = cpp, 1 = generic.
    pub kind: i32,
    pub include_paths: Vec<String>,
    pub generic_flags: u32,
    /// (keyword, should_follow)
    pub keywords: Vec<(String, bool)>,
}

impl ScannerSpec {
    pub fn cpp(include_paths: &[&str]) -> ScannerSpec {
        ScannerSpec {
            kind: 0,
            include_paths: include_paths.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn guid(&self) -> HashDigest {
        let mut text = format!("scanner:{}", self.kind);
        for path in &self.include_paths {
            text.push(':');
            text.push_str(path);
        }
        hash_single_string(&text)
    }
}

#[derive(Clone, Default)]
pub struct NodeSpec {
    pub action: String,
    pub pre_action: Option<String>,
    pub annotation: String,
    pub pass_index: i32,
    pub deps: Vec<usize>,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub aux_outputs: Vec<String>,
    pub allowed_output_substrings: Vec<String>,
    pub env: Vec<(String, String)>,
    pub scanner: Option<ScannerSpec>,
    pub flags: u32,
}

impl NodeSpec {
    pub fn new(annotation: &str, action: &str) -> NodeSpec {
        NodeSpec {
            action: action.to_string(),
            annotation: annotation.to_string(),
            ..Default::default()
        }
    }

    pub fn with_output(mut self, path: &str) -> NodeSpec {
        self.outputs.push(path.to_string());
        self
    }

    pub fn with_input(mut self, path: &str) -> NodeSpec {
        self.inputs.push(path.to_string());
        self
    }

    pub fn with_dep(mut self, dep: usize) -> NodeSpec {
        self.deps.push(dep);
        self
    }

    pub fn with_flags(mut self, flags: u32) -> NodeSpec {
        self.flags |= flags;
        self
    }

    pub fn with_scanner(mut self, scanner: ScannerSpec) -> NodeSpec {
        self.scanner = Some(scanner);
        self
    }
}

pub struct DagBuilder {
    pub nodes: Vec<NodeSpec>,
    pub passes: Vec<String>,
    pub configs: Vec<String>,
    pub variants: Vec<String>,
    pub subvariants: Vec<String>,
    /// (name, node index) pairs exposed in the single build tuple.
    pub named_nodes: Vec<(String, usize)>,
    pub digest_ext_hashes: Vec<u32>,
    pub file_signatures: Vec<(String, u64)>,
    pub glob_signatures: Vec<(String, HashDigest)>,
    pub max_expensive: i32,
}

impl Default for DagBuilder {
    fn default() -> Self {
        DagBuilder {
            nodes: Vec::new(),
            passes: vec!["Default".to_string()],
            configs: vec!["default".to_string()],
            variants: vec!["debug".to_string()],
            subvariants: vec!["default".to_string()],
            named_nodes: Vec::new(),
            digest_ext_hashes: Vec::new(),
            file_signatures: Vec::new(),
            glob_signatures: Vec::new(),
            max_expensive: -1,
        }
    }
}

impl DagBuilder {
    pub fn new() -> DagBuilder {
        DagBuilder::default()
    }

    pub fn add_node(&mut self, node: NodeSpec) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Deterministic, strictly ascending guid for node `index`.
    pub fn guid(index: usize) -> HashDigest {
        let mut bytes = [0u8; 16];
        bytes[8..16].copy_from_slice(&(index as u64).to_be_bytes());
        HashDigest(bytes)
    }

    fn back_links(&self) -> Vec<Vec<i32>> {
        let mut links = vec![Vec::new(); self.nodes.len()];
        for (index, node) in self.nodes.iter().enumerate() {
            for &dep in &node.deps {
                links[dep].push(index as i32);
            }
        }
        links
    }

    pub fn write(&self, path: &Path) {
        let mut w = BinaryWriter::new();
        let main_seg = w.add_segment();
        let guid_seg = w.add_segment();
        let node_seg = w.add_segment();
        let scanner_seg = w.add_segment();
        let array_seg = w.add_segment();
        let string_seg = w.add_segment();

        let mut write_string = |w: &mut BinaryWriter, s: &str| -> BinaryLocator {
            let pos = w.position(string_seg);
            w.write_string_data(string_seg, s);
            pos
        };

        // Guids, ascending by construction.
        let guid_pos = w.position(guid_seg);
        for index in 0..self.nodes.len() {
            w.write_bytes(guid_seg, &Self::guid(index).0);
        }

        // Scanners first so node records can point at them.
        let mut scanner_positions: Vec<Option<BinaryLocator>> = Vec::new();
        for node in &self.nodes {
            match &node.scanner {
                None => scanner_positions.push(None),
                Some(spec) => {
                    let include_ptrs: Vec<BinaryLocator> = spec
                        .include_paths
                        .iter()
                        .map(|p| write_string(&mut w, p))
                        .collect();
                    let includes_pos = w.position(array_seg);
                    for ptr in include_ptrs {
                        w.write_pointer(array_seg, ptr);
                    }

                    let keyword_entries: Vec<(BinaryLocator, usize, bool)> = spec
                        .keywords
                        .iter()
                        .map(|(kw, follow)| (write_string(&mut w, kw), kw.len(), *follow))
                        .collect();
                    let keywords_pos = w.position(array_seg);
                    for (ptr, len, follow) in keyword_entries {
                        w.write_pointer(array_seg, ptr);
                        w.write_i16(array_seg, len as i16);
                        w.write_u8(array_seg, follow as u8);
                        w.write_u8(array_seg, 0);
                    }

                    let pos = w.position(scanner_seg);
                    w.write_i32(scanner_seg, spec.kind);
                    w.write_array_header(scanner_seg, spec.include_paths.len() as i32, includes_pos);
                    w.write_bytes(scanner_seg, &spec.guid().0);
                    w.write_u32(scanner_seg, spec.generic_flags);
                    w.write_array_header(scanner_seg, spec.keywords.len() as i32, keywords_pos);
                    scanner_positions.push(Some(pos));
                }
            }
        }

        // Variable-length node arrays, then the fixed-size node records.
        let back_links = self.back_links();

        struct NodeArrays {
            deps: BinaryLocator,
            back_links: BinaryLocator,
            inputs: BinaryLocator,
            outputs: BinaryLocator,
            aux_outputs: BinaryLocator,
            allowed: BinaryLocator,
            env: BinaryLocator,
        }

        let mut write_i32_list = |w: &mut BinaryWriter, list: &[i32]| -> BinaryLocator {
            let pos = w.position(array_seg);
            for &value in list {
                w.write_i32(array_seg, value);
            }
            pos
        };

        let mut node_arrays: Vec<NodeArrays> = Vec::new();
        for (index, node) in self.nodes.iter().enumerate() {
            let deps: Vec<i32> = node.deps.iter().map(|&d| d as i32).collect();
            let deps_pos = write_i32_list(&mut w, &deps);
            let links_pos = write_i32_list(&mut w, &back_links[index]);

            let mut write_file_list = |w: &mut BinaryWriter, list: &[String]| -> BinaryLocator {
                let ptrs: Vec<(BinaryLocator, u32)> = list
                    .iter()
                    .map(|p| {
                        let pos = w.position(string_seg);
                        w.write_string_data(string_seg, p);
                        (pos, djb2_hash_path(p))
                    })
                    .collect();
                let pos = w.position(array_seg);
                for (ptr, hash) in ptrs {
                    w.write_pointer(array_seg, ptr);
                    w.write_u32(array_seg, hash);
                }
                pos
            };

            let inputs_pos = write_file_list(&mut w, &node.inputs);
            let outputs_pos = write_file_list(&mut w, &node.outputs);
            let aux_pos = write_file_list(&mut w, &node.aux_outputs);

            let allowed_ptrs: Vec<BinaryLocator> = node
                .allowed_output_substrings
                .iter()
                .map(|s| write_string(&mut w, s))
                .collect();
            let allowed_pos = w.position(array_seg);
            for ptr in allowed_ptrs {
                w.write_pointer(array_seg, ptr);
            }

            let env_ptrs: Vec<(BinaryLocator, BinaryLocator)> = node
                .env
                .iter()
                .map(|(name, value)| (write_string(&mut w, name), write_string(&mut w, value)))
                .collect();
            let env_pos = w.position(array_seg);
            for (name_ptr, value_ptr) in env_ptrs {
                w.write_pointer(array_seg, name_ptr);
                w.write_pointer(array_seg, value_ptr);
            }

            node_arrays.push(NodeArrays {
                deps: deps_pos,
                back_links: links_pos,
                inputs: inputs_pos,
                outputs: outputs_pos,
                aux_outputs: aux_pos,
                allowed: allowed_pos,
                env: env_pos,
            });
        }

        let node_pos = w.position(node_seg);
        for (index, node) in self.nodes.iter().enumerate() {
            let arrays = &node_arrays[index];

            let action_ptr = write_string(&mut w, &node.action);
            w.write_pointer(node_seg, action_ptr);
            match &node.pre_action {
                Some(pre) => {
                    let ptr = write_string(&mut w, pre);
                    w.write_pointer(node_seg, ptr);
                }
                None => w.write_null_pointer(node_seg),
            }
            let annotation_ptr = write_string(&mut w, &node.annotation);
            w.write_pointer(node_seg, annotation_ptr);
            w.write_i32(node_seg, node.pass_index);
            w.write_array_header(node_seg, node.deps.len() as i32, arrays.deps);
            w.write_array_header(node_seg, back_links[index].len() as i32, arrays.back_links);
            w.write_array_header(node_seg, node.inputs.len() as i32, arrays.inputs);
            w.write_array_header(node_seg, node.outputs.len() as i32, arrays.outputs);
            w.write_array_header(node_seg, node.aux_outputs.len() as i32, arrays.aux_outputs);
            w.write_array_header(
                node_seg,
                node.allowed_output_substrings.len() as i32,
                arrays.allowed,
            );
            w.write_array_header(node_seg, node.env.len() as i32, arrays.env);
            match scanner_positions[index] {
                Some(pos) => w.write_pointer(node_seg, pos),
                None => w.write_null_pointer(node_seg),
            }
            w.write_u32(node_seg, node.flags);
        }

        // Pass table.
        let pass_ptrs: Vec<BinaryLocator> = self.passes.iter().map(|p| write_string(&mut w, p)).collect();
        let passes_pos = w.position(array_seg);
        for ptr in pass_ptrs {
            w.write_pointer(array_seg, ptr);
        }

        // Config/variant/subvariant name+hash tables.
        let mut write_name_table = |w: &mut BinaryWriter, names: &[String]| -> (BinaryLocator, BinaryLocator) {
            let ptrs: Vec<BinaryLocator> = names.iter().map(|n| write_string(w, n)).collect();
            let names_pos = w.position(array_seg);
            for ptr in ptrs {
                w.write_pointer(array_seg, ptr);
            }
            let hashes_pos = w.position(array_seg);
            for name in names {
                w.write_u32(array_seg, djb2_hash(name));
            }
            (names_pos, hashes_pos)
        };

        let (config_names_pos, config_hashes_pos) = write_name_table(&mut w, &self.configs);
        let (variant_names_pos, variant_hashes_pos) = write_name_table(&mut w, &self.variants);
        let (subvariant_names_pos, subvariant_hashes_pos) = write_name_table(&mut w, &self.subvariants);

        // One build tuple covering every node.
        let default_nodes: Vec<i32> = (0..self.nodes.len() as i32).collect();
        let default_nodes_pos = write_i32_list(&mut w, &default_nodes);
        let always_nodes_pos = w.position(array_seg);

        let named_ptrs: Vec<(BinaryLocator, i32)> = self
            .named_nodes
            .iter()
            .map(|(name, index)| (write_string(&mut w, name), *index as i32))
            .collect();
        let named_pos = w.position(array_seg);
        for (ptr, index) in named_ptrs {
            w.write_pointer(array_seg, ptr);
            w.write_i32(array_seg, index);
        }

        let tuples_pos = w.position(array_seg);
        w.write_i32(array_seg, 0);
        w.write_i32(array_seg, 0);
        w.write_i32(array_seg, 0);
        w.write_array_header(array_seg, default_nodes.len() as i32, default_nodes_pos);
        w.write_array_header(array_seg, 0, always_nodes_pos);
        w.write_array_header(array_seg, self.named_nodes.len() as i32, named_pos);

        // DAG input file signatures and glob signatures.
        let sig_ptrs: Vec<(BinaryLocator, u64)> = self
            .file_signatures
            .iter()
            .map(|(path, ts)| (write_string(&mut w, path), *ts))
            .collect();
        let file_sigs_pos = w.position(array_seg);
        for (ptr, timestamp) in sig_ptrs {
            w.write_pointer(array_seg, ptr);
            w.write_u32(array_seg, 0);
            w.write_u64(array_seg, timestamp);
        }

        let glob_ptrs: Vec<(BinaryLocator, HashDigest)> = self
            .glob_signatures
            .iter()
            .map(|(path, digest)| (write_string(&mut w, path), *digest))
            .collect();
        let glob_sigs_pos = w.position(array_seg);
        for (ptr, digest) in glob_ptrs {
            w.write_pointer(array_seg, ptr);
            w.write_bytes(array_seg, &digest.0);
        }

        let ext_pos = w.position(array_seg);
        for &hash in &self.digest_ext_hashes {
            w.write_u32(array_seg, hash);
        }

        // Header, matching the DagView field offsets.
        w.write_u32(main_seg, DAG_MAGIC);
        w.write_i32(main_seg, self.nodes.len() as i32);
        write_ptr_or_null(&mut w, main_seg, guid_pos, !self.nodes.is_empty());
        write_ptr_or_null(&mut w, main_seg, node_pos, !self.nodes.is_empty());
        w.write_array_header(main_seg, self.passes.len() as i32, passes_pos);
        w.write_i32(main_seg, self.configs.len() as i32);
        w.write_pointer(main_seg, config_names_pos);
        w.write_pointer(main_seg, config_hashes_pos);
        w.write_i32(main_seg, self.variants.len() as i32);
        w.write_pointer(main_seg, variant_names_pos);
        w.write_pointer(main_seg, variant_hashes_pos);
        w.write_i32(main_seg, self.subvariants.len() as i32);
        w.write_pointer(main_seg, subvariant_names_pos);
        w.write_pointer(main_seg, subvariant_hashes_pos);
        w.write_array_header(main_seg, 1, tuples_pos);
        w.write_i32(main_seg, 0); // default config
        w.write_i32(main_seg, 0); // default variant
        w.write_i32(main_seg, 0); // default subvariant
        w.write_array_header(main_seg, self.file_signatures.len() as i32, file_sigs_pos);
        w.write_array_header(main_seg, self.glob_signatures.len() as i32, glob_sigs_pos);
        w.write_array_header(main_seg, self.digest_ext_hashes.len() as i32, ext_pos);
        w.write_i32(main_seg, self.max_expensive);

        w.flush(path).expect("writing test DAG");
    }
}

fn write_ptr_or_null(w: &mut BinaryWriter, seg: SegmentId, pos: BinaryLocator, valid: bool) {
    if valid {
        w.write_pointer(seg, pos);
    } else {
        w.write_null_pointer(seg);
    }
}

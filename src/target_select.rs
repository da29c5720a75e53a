//! Resolving command-line target tokens against build tuples.
//!
//! Tokens naming a config, variant or subvariant filter the cross product;
//! `config-variant[-subvariant]` tokens pin specific tuples; anything else
//! is handed back as a named-target request for the driver to resolve
//! against named-node tables and file names.

use anyhow::{Result, bail};

use crate::binfmt::dag::DagView;
use crate::hash::djb2_hash;

/// One concrete (config, variant, subvariant) selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TargetSpec {
    pub config_index: i32,
    pub variant_index: i32,
    pub subvariant_index: i32,
}

struct InputSpec {
    config_index: i32,
    /// -1 when the token did not pin a variant.
    variant_index: i32,
    subvariant_index: i32,
}

/// Pick apart `win32-msvc-debug-default` into config `win32-msvc`, variant
/// `debug`, subvariant `default`. Config names carry one internal dash.
fn destructure_input_spec(dag: &DagView<'_>, name: &str) -> Option<InputSpec> {
    let d1 = name.find('-')?;
    let d2 = name[d1 + 1..].find('-').map(|i| d1 + 1 + i);
    let d3 = d2.and_then(|d2| name[d2 + 1..].find('-').map(|i| d2 + 1 + i));

    let (config, variant, subvariant) = match (d2, d3) {
        (None, _) => (name, None, None),
        (Some(d2), None) => (&name[..d2], Some(&name[d2 + 1..]), None),
        (Some(d2), Some(d3)) => (&name[..d2], Some(&name[d2 + 1..d3]), Some(&name[d3 + 1..])),
    };

    let config_index = dag.config_names().find_hash(djb2_hash(config))? as i32;

    let variant_index = match variant {
        Some(v) => dag.variant_names().find_hash(djb2_hash(v))? as i32,
        None => -1,
    };

    let subvariant_index = match subvariant {
        Some(sv) => dag.subvariant_names().find_hash(djb2_hash(sv))? as i32,
        None => -1,
    };

    Some(InputSpec {
        config_index,
        variant_index,
        subvariant_index,
    })
}

/// Resolve `target_names` into concrete tuples plus leftover named-target
/// tokens.
pub fn select_targets(dag: &DagView<'_>, target_names: &[String]) -> Result<(Vec<TargetSpec>, Vec<String>)> {
    let configs = dag.config_names();
    let variants = dag.variant_names();
    let subvariants = dag.subvariant_names();

    if configs.len() > 32 || variants.len() > 32 || subvariants.len() > 32 {
        bail!("too many configs/variants/subvariants -- keep it below 32");
    }

    let mut specs: Vec<InputSpec> = Vec::new();
    let mut named_targets: Vec<String> = Vec::new();
    let mut variant_bits: u32 = 0;
    let mut subvariant_bits: u32 = 0;

    for name in target_names {
        let hash = djb2_hash(name);

        if let Some(index) = subvariants.find_hash(hash) {
            subvariant_bits |= 1 << index;
        } else if let Some(index) = variants.find_hash(hash) {
            variant_bits |= 1 << index;
        } else if let Some(spec) = destructure_input_spec(dag, name) {
            specs.push(spec);
        } else {
            named_targets.push(name.clone());
        }
    }

    if specs.is_empty() && dag.default_config_index() >= 0 {
        specs.push(InputSpec {
            config_index: dag.default_config_index(),
            variant_index: -1,
            subvariant_index: -1,
        });
    }

    if variant_bits == 0 && dag.default_variant_index() >= 0 {
        variant_bits |= 1 << dag.default_variant_index();
    }

    if subvariant_bits == 0 && dag.default_subvariant_index() >= 0 {
        subvariant_bits |= 1 << dag.default_subvariant_index();
    }

    let mut output: Vec<TargetSpec> = Vec::new();

    for spec in &specs {
        let vbits = if spec.variant_index >= 0 {
            1u32 << spec.variant_index
        } else {
            variant_bits
        };

        let mut v = vbits;
        while v != 0 {
            let variant_index = v.trailing_zeros() as i32;
            v &= !(1 << variant_index);

            let svbits = if spec.subvariant_index >= 0 {
                1u32 << spec.subvariant_index
            } else {
                subvariant_bits
            };

            let mut sv = svbits;
            while sv != 0 {
                let subvariant_index = sv.trailing_zeros() as i32;
                sv &= !(1 << subvariant_index);

                output.push(TargetSpec {
                    config_index: spec.config_index,
                    variant_index,
                    subvariant_index,
                });
            }
        }
    }

    Ok((output, named_targets))
}

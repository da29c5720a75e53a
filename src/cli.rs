use clap::Parser;
use std::path::PathBuf;

use crate::driver::DriverOptions;
use crate::utils::options_toml::OptionsFile;

/// Incremental, parallel build engine driven by a frozen build DAG.
#[derive(Clone, Parser)]
#[command(name = "tundra2")]
#[command(about = "Build the named targets; with no targets, build the default node set.")]
pub struct Cli {
    /// Target tokens: config, variant or subvariant names,
    /// `config-variant[-subvariant]` tuples, named nodes or file names.
    #[arg(value_name = "TARGET")]
    pub targets: Vec<String>,

    /// Worker thread count (including the master thread). Default: CPU count.
    #[arg(long, short = 'j', value_name = "N")]
    pub threads: Option<usize>,

    /// Show what would be built without executing anything.
    #[arg(long, short = 'n')]
    pub dry_run: bool,

    /// Regenerate the DAG even if its signatures are intact.
    #[arg(long, short = 'f')]
    pub force_dag_regen: bool,

    /// List build tuples and named nodes, then exit.
    #[arg(long, short = 't')]
    pub show_targets: bool,

    /// Verbose output: echo command lines and debug messages.
    #[arg(long, short = 'v')]
    pub verbose: bool,

    /// Extremely verbose output (scheduler traces).
    #[arg(long, short = 'w')]
    pub spammy_verbose: bool,

    /// Quiet: suppress per-node annotations and info messages.
    #[arg(long, short = 'q')]
    pub quiet: bool,

    /// Dump build statistics at the end of the run.
    #[arg(long, short = 'D')]
    pub debug: bool,

    /// Trace every input signature computation to signing-debug.txt.
    #[arg(long)]
    pub debug_signing: bool,

    /// Keep building other nodes after a node fails.
    #[arg(long, short = 'k')]
    pub continue_on_error: bool,

    /// Remove the outputs of the selected nodes, then exit.
    #[arg(long, short = 'c')]
    pub clean: bool,

    /// Remove the outputs of the selected nodes, then build them again.
    #[arg(long, short = 'b')]
    pub rebuild: bool,

    /// Change to this directory before doing anything else.
    #[arg(long, short = 'C', value_name = "DIR")]
    pub working_dir: Option<PathBuf>,

    /// Override the DAG file name.
    #[arg(long, value_name = "FILE")]
    pub dag_file: Option<String>,
}

impl Cli {
    /// Fold the options file and this command line into driver options.
    /// Explicit command-line flags win over the file.
    pub fn to_driver_options(&self, file: Option<&OptionsFile>) -> DriverOptions {
        let mut options = DriverOptions::default();

        if let Some(file) = file {
            if let Some(threads) = file.threads {
                options.thread_count = threads;
            }
            if let Some(continue_on_error) = file.continue_on_error {
                options.continue_on_error = continue_on_error;
            }
            if let Some(verbose) = file.verbose {
                options.verbose = verbose;
            }
            if let Some(quiet) = file.quiet {
                options.quiet = quiet;
            }
            if let Some(dag_file) = &file.dag_file {
                options.dag_filename = dag_file.clone();
            }
        }

        if let Some(threads) = self.threads {
            options.thread_count = threads.max(1);
        }
        if let Some(dag_file) = &self.dag_file {
            options.dag_filename = dag_file.clone();
        }

        options.targets = self.targets.clone();
        options.dry_run = self.dry_run;
        options.force_dag_regen = self.force_dag_regen;
        options.show_targets = self.show_targets;
        options.verbose = options.verbose || self.verbose || self.spammy_verbose;
        options.quiet = (options.quiet || self.quiet) && !options.verbose;
        options.debug_signing = self.debug_signing;
        options.continue_on_error = options.continue_on_error || self.continue_on_error;
        options.clean = self.clean;
        options.rebuild = self.rebuild;

        options
    }
}

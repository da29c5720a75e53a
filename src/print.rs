//! Thread-safe, merged per-job result printing.
//!
//! One job at a time owns the terminal; other jobs' bytes park in a fixed
//! pool of buffers and are flushed, sorted by sort key, when their job
//! exits. Producers wait on a condvar when the pool is full. ANSI color
//! sequences are stripped when stdout is not a terminal. A progress line is
//! printed for long-running jobs, rate-limited per job.

use std::collections::HashMap;
use std::io::{IsTerminal, Write};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use colored::Colorize;

use crate::exec::{ExecResult, OutputChunk};

/// Fixed number of parked line buffers shared by all jobs.
const LINE_BUFFER_POOL_SIZE: usize = 64;

/// A job must run at least this long before a progress line appears...
const PROGRESS_AFTER_SECS: u64 = 5;
/// ...unless nothing has printed recently, in which case it appears at once.
const QUIET_TERMINAL_SECS: u64 = 5;
/// At most one progress line per job per this interval.
const PROGRESS_REPEAT_SECS: u64 = 10;

/// How a node's output fared against its allowed-output rules.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ValidationResult {
    Pass,
    /// Output matched an allowed substring; swallow it on success.
    SwallowOutput,
    Fail,
}

struct QueuedBuffer {
    job_id: usize,
    sort_key: i32,
    is_stderr: bool,
    data: Vec<u8>,
}

struct PrintState {
    tty_owner: Option<usize>,
    pool: Vec<QueuedBuffer>,
    last_print: Instant,
    job_progress: HashMap<usize, Instant>,
    results_printed: usize,
}

pub struct Printer {
    state: Mutex<PrintState>,
    pool_available: Condvar,
    emit_colors: bool,
}

impl Printer {
    pub fn new() -> Printer {
        let mut emit_colors = std::io::stdout().is_terminal();
        // Downstream consumers (IDEs, CI wrappers) can override detection.
        if let Ok(value) = std::env::var("DOWNSTREAM_STDOUT_CONSUMER_SUPPORTS_COLOR") {
            match value.as_str() {
                "1" => emit_colors = true,
                "0" => emit_colors = false,
                _ => {}
            }
        }

        Printer {
            state: Mutex::new(PrintState {
                tty_owner: None,
                pool: Vec::new(),
                last_print: Instant::now()
                    .checked_sub(Duration::from_secs(QUIET_TERMINAL_SECS))
                    .unwrap_or_else(Instant::now),
                job_progress: HashMap::new(),
                results_printed: 0,
            }),
            pool_available: Condvar::new(),
            emit_colors,
        }
    }

    pub fn emit_colors(&self) -> bool {
        self.emit_colors
    }

    fn write_direct(&self, is_stderr: bool, data: &[u8]) {
        let bytes;
        let data = if self.emit_colors {
            data
        } else {
            bytes = strip_ansi_colors(data);
            &bytes
        };
        if is_stderr {
            let _ = std::io::stderr().write_all(data);
        } else {
            let _ = std::io::stdout().write_all(data);
        }
    }

    /// Hand `data` to the terminal. The owning job writes straight through;
    /// other jobs park their bytes in the pool, waiting while it is full.
    pub fn emit(&self, job_id: usize, is_stderr: bool, sort_key: i32, data: &[u8]) {
        let mut state = self.state.lock().unwrap();

        if state.tty_owner.is_none() {
            state.tty_owner = Some(job_id);
        }

        if state.tty_owner == Some(job_id) {
            state.last_print = Instant::now();
            drop(state);
            self.write_direct(is_stderr, data);
            return;
        }

        while state.pool.len() >= LINE_BUFFER_POOL_SIZE {
            state = self.pool_available.wait(state).unwrap();
        }
        state.pool.push(QueuedBuffer {
            job_id,
            sort_key,
            is_stderr,
            data: data.to_vec(),
        });
    }

    /// The job is done with the terminal: flush anything it parked (sorted
    /// by sort key) and release ownership.
    pub fn job_exit(&self, job_id: usize) {
        let mut state = self.state.lock().unwrap();

        let mut mine: Vec<QueuedBuffer> = Vec::new();
        let mut i = 0;
        while i < state.pool.len() {
            if state.pool[i].job_id == job_id {
                mine.push(state.pool.remove(i));
            } else {
                i += 1;
            }
        }
        mine.sort_by_key(|b| b.sort_key);

        if !mine.is_empty() {
            state.last_print = Instant::now();
        }
        if state.tty_owner == Some(job_id) {
            state.tty_owner = None;
        }
        drop(state);

        for buffer in &mine {
            self.write_direct(buffer.is_stderr, &buffer.data);
        }
        let _ = std::io::stdout().flush();

        self.pool_available.notify_all();
    }

    /// Print the completion block for one node: counter, annotation, and on
    /// failure (or when echoing) the command line and captured output.
    #[allow(clippy::too_many_arguments)]
    pub fn print_node_result(
        &self,
        result: &ExecResult,
        annotation: &str,
        cmd_line: Option<&str>,
        job_id: usize,
        echo_cmdline: bool,
        echo_annotation: bool,
        validation: ValidationResult,
        processed: usize,
        total: usize,
    ) {
        let failed = !result.success() || validation == ValidationResult::Fail;

        {
            let mut state = self.state.lock().unwrap();
            state.results_printed += 1;
            state.job_progress.remove(&job_id);
        }

        let mut header = String::new();
        if echo_annotation || failed {
            let counter = format!("[{}/{}]", processed, total);
            let counter = if failed {
                counter.red().to_string()
            } else if self.emit_colors {
                counter.green().to_string()
            } else {
                counter
            };
            header.push_str(&format!("{} {}\n", counter, annotation));
        }
        if let Some(cmd) = cmd_line
            && (echo_cmdline || failed)
        {
            header.push_str(cmd);
            header.push('\n');
        }
        if failed {
            header.push_str(&format!(
                "{} exited with code {}\n",
                if result.was_aborted { "aborted:" } else { "failed:" },
                result.return_code
            ));
        }

        if !header.is_empty() {
            self.emit(job_id, false, i32::MIN, header.as_bytes());
        }

        let show_output =
            result.has_interesting_output() && (failed || validation != ValidationResult::SwallowOutput);
        if show_output {
            for OutputChunk {
                sort_key,
                is_stderr,
                data,
            } in &result.chunks
            {
                self.emit(job_id, *is_stderr, *sort_key, data);
            }
            // Terminate partial last lines so jobs never share one.
            if !result.merged_output().ends_with(b"\n") {
                self.emit(job_id, false, i32::MAX, b"\n");
            }
        }

        self.job_exit(job_id);
    }

    /// Progress line for a job that has been running a while. Returns the
    /// number of seconds until the caller should check again.
    pub fn print_node_in_progress(
        &self,
        job_id: usize,
        annotation: &str,
        time_of_start: Instant,
        processed: usize,
        total: usize,
    ) -> u64 {
        let mut state = self.state.lock().unwrap();

        let running_secs = time_of_start.elapsed().as_secs();
        let terminal_quiet = state.last_print.elapsed() >= Duration::from_secs(QUIET_TERMINAL_SECS);
        let threshold = if terminal_quiet { 0 } else { PROGRESS_AFTER_SECS };

        let job_recently_reported = state
            .job_progress
            .get(&job_id)
            .is_some_and(|at| at.elapsed() < Duration::from_secs(PROGRESS_REPEAT_SECS));

        if running_secs >= threshold && !job_recently_reported {
            state.job_progress.insert(job_id, Instant::now());
            state.last_print = Instant::now();
            let line = format!(
                "[{}/{}] {} ({}s)\n",
                processed, total, annotation, running_secs
            );
            drop(state);
            self.write_direct(false, line.as_bytes());
        }

        1
    }

    /// One-line closing message, green on success and red otherwise.
    pub fn print_concluding_message(&self, success: bool, message: &str) {
        let line = if !self.emit_colors {
            format!("{}\n", message)
        } else if success {
            format!("{}\n", message.green())
        } else {
            format!("{}\n", message.red())
        };
        self.write_direct(false, line.as_bytes());
    }
}

impl Default for Printer {
    fn default() -> Self {
        Self::new()
    }
}

fn is_ansi_terminator(c: u8) -> bool {
    (0x40..=0x7e).contains(&c)
}

/// Drop `ESC [ ... <terminator>` sequences; anything else passes through.
pub fn strip_ansi_colors(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        if data[i] == 0x1b && data.get(i + 1) == Some(&b'[') {
            let mut j = i + 2;
            while j < data.len() && !is_ansi_terminator(data[j]) {
                j += 1;
            }
            if j < data.len() {
                i = j + 1;
                continue;
            }
        }
        out.push(data[i]);
        i += 1;
    }
    out
}

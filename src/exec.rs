//! Child process execution with merged output capture.
//!
//! Commands run through the shell with the node's environment overlaid on
//! the host environment. Stdout and stderr are drained by reader threads
//! into one buffer, ordered by a per-job sort key so interleaving reflects
//! the child's write order. Cancellation never kills the child; it is waited
//! on so temporaries get cleaned up.

use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicI32, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Sender, unbounded};
use log::debug;
use tempfile::NamedTempFile;

use crate::signal::SignalState;

/// One run of captured output. `sort_key` orders chunks across the stdout
/// and stderr streams.
#[derive(Clone, Debug)]
pub struct OutputChunk {
    pub sort_key: i32,
    pub is_stderr: bool,
    pub data: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct ExecResult {
    pub return_code: i32,
    pub was_aborted: bool,
    /// Captured output, sorted by sort key.
    pub chunks: Vec<OutputChunk>,
}

impl ExecResult {
    pub fn success(&self) -> bool {
        self.return_code == 0
    }

    /// All captured bytes in write order.
    pub fn merged_output(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for chunk in &self.chunks {
            out.extend_from_slice(&chunk.data);
        }
        out
    }

    pub fn output_text(&self) -> String {
        String::from_utf8_lossy(&self.merged_output()).into_owned()
    }

    /// True when the output holds anything beyond newlines.
    pub fn has_interesting_output(&self) -> bool {
        self.chunks
            .iter()
            .flat_map(|c| c.data.iter())
            .any(|&b| b != b'\n' && b != b'\r')
    }

    fn from_error_message(message: String) -> ExecResult {
        ExecResult {
            return_code: 1,
            was_aborted: false,
            chunks: vec![OutputChunk {
                sort_key: 0,
                is_stderr: true,
                data: message.into_bytes(),
            }],
        }
    }
}

/// Command lines longer than this are rewritten through a response file.
const RESPONSE_FILE_THRESHOLD: usize = 8000;

const RESPONSE_MARKER: &str = "@RESPONSE";

/// Handle an `@RESPONSE|opt|args` (or `@RESPONSE!|opt|args`) suffix: when
/// the command line is oversized (or the `!` form forces it), `args` is
/// written to a temp file and the suffix becomes `opt<tempfile>`. The temp
/// file must outlive the child, so it is returned to the caller.
fn expand_response_file(cmd_line: &str) -> (String, Option<NamedTempFile>) {
    let Some(marker_at) = cmd_line.find(RESPONSE_MARKER) else {
        return (cmd_line.to_string(), None);
    };

    let mut rest = &cmd_line[marker_at + RESPONSE_MARKER.len()..];
    let forced = rest.starts_with('!');
    if forced {
        rest = &rest[1..];
    }
    let Some(rest) = rest.strip_prefix('|') else {
        return (cmd_line.to_string(), None);
    };
    let Some((option, args)) = rest.split_once('|') else {
        return (cmd_line.to_string(), None);
    };

    let prefix = &cmd_line[..marker_at];

    if !forced && cmd_line.len() <= RESPONSE_FILE_THRESHOLD {
        return (format!("{}{}", prefix, args), None);
    }

    match NamedTempFile::new().and_then(|file| {
        std::fs::write(file.path(), args)?;
        Ok(file)
    }) {
        Ok(file) => {
            let rewritten = format!("{}{}{}", prefix, option, file.path().display());
            debug!("response file rewrite: {} bytes of args", args.len());
            (rewritten, Some(file))
        }
        Err(_) => (format!("{}{}", prefix, args), None),
    }
}

fn reader_thread(mut stream: impl Read, is_stderr: bool, tx: Sender<OutputChunk>, sort_key: &AtomicI32) {
    let mut buffer = [0u8; 8192];
    loop {
        match stream.read(&mut buffer) {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let chunk = OutputChunk {
                    sort_key: sort_key.fetch_add(1, Ordering::Relaxed),
                    is_stderr,
                    data: buffer[..n].to_vec(),
                };
                if tx.send(chunk).is_err() {
                    break;
                }
            }
        }
    }
}

/// Run `cmd_line` with `env_vars` overlaid on the host environment (the
/// provided variables win). The slow callback fires after
/// `time_until_first_slow` seconds and returns the delay until it wants to
/// fire again.
pub fn execute_process(
    cmd_line: &str,
    env_vars: &[(String, String)],
    signals: &SignalState,
    mut slow_callback: Option<&mut dyn FnMut() -> u64>,
    time_until_first_slow: u64,
) -> ExecResult {
    let (cmd_line, _response_file) = expand_response_file(cmd_line);

    let shell = if cfg!(windows) { "cmd" } else { "/bin/sh" };
    let shell_flag = if cfg!(windows) { "/c" } else { "-c" };

    let mut command = Command::new(shell);
    command
        .arg(shell_flag)
        .arg(&cmd_line)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    for (name, value) in env_vars {
        command.env(name, value);
    }

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) => {
            return ExecResult::from_error_message(format!("failed to spawn '{}': {}", cmd_line, err));
        }
    };

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let (tx, rx) = unbounded();
    let sort_key = AtomicI32::new(0);

    let status = thread::scope(|scope| {
        if let Some(stdout) = stdout {
            let tx = tx.clone();
            let sort_key = &sort_key;
            scope.spawn(move || reader_thread(stdout, false, tx, sort_key));
        }
        if let Some(stderr) = stderr {
            let tx = tx.clone();
            let sort_key = &sort_key;
            scope.spawn(move || reader_thread(stderr, true, tx, sort_key));
        }
        drop(tx);

        let start = Instant::now();
        let mut next_slow_at = start + Duration::from_secs(time_until_first_slow);

        loop {
            match child.try_wait() {
                Ok(Some(status)) => break Ok(status),
                Ok(None) => {}
                Err(err) => break Err(err),
            }

            if let Some(callback) = slow_callback.as_deref_mut()
                && Instant::now() >= next_slow_at
            {
                let again_in = callback();
                next_slow_at = Instant::now() + Duration::from_secs(again_in.max(1));
            }

            thread::sleep(Duration::from_millis(50));
        }
    });

    let mut chunks: Vec<OutputChunk> = rx.iter().collect();
    chunks.sort_by_key(|c| c.sort_key);

    let mut result = match status {
        Ok(status) => {
            #[cfg(unix)]
            let killed_by_signal = {
                use std::os::unix::process::ExitStatusExt;
                status.signal().is_some()
            };
            #[cfg(not(unix))]
            let killed_by_signal = false;

            ExecResult {
                return_code: status.code().unwrap_or(1),
                was_aborted: killed_by_signal,
                chunks,
            }
        }
        Err(err) => {
            let mut result = ExecResult::from_error_message(format!("waitpid failed: {}", err));
            result.chunks.extend(chunks);
            result
        }
    };

    // A signal that landed during the run aborts the node even if the child
    // exited cleanly; its output is still captured.
    if signals.is_signalled() {
        result.was_aborted = true;
    }
    if result.was_aborted && result.return_code == 0 {
        result.return_code = 1;
    }

    result
}

/// The write-text-file action: `payload` goes to `target_file`, reported
/// exactly like a process run.
pub fn write_text_file(payload: &str, target_file: &str) -> ExecResult {
    match std::fs::write(target_file, payload) {
        Ok(()) => ExecResult::default(),
        Err(err) => {
            ExecResult::from_error_message(format!("error writing file {}: {}", target_file, err))
        }
    }
}

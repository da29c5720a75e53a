//! Cancellation latch.
//!
//! The signal handler stores a reason string here; `should_keep_building`
//! polls it. The reason is latched for the rest of the run and is never
//! cleared. The build queue registers its condvar so a signal arriving while
//! workers sleep wakes them up to drain.

use std::sync::{Arc, Condvar, Mutex};

use anyhow::Result;
use log::debug;

#[derive(Default)]
pub struct SignalState {
    reason: Mutex<Option<&'static str>>,
    wakeup: Mutex<Option<Arc<Condvar>>>,
}

impl SignalState {
    pub fn new() -> Arc<SignalState> {
        Arc::new(SignalState::default())
    }

    /// Latch the cancellation reason. The first reason wins; later signals
    /// are ignored.
    pub fn set(&self, reason: &'static str) {
        let mut guard = self.reason.lock().unwrap();
        if guard.is_none() {
            *guard = Some(reason);
            debug!("signal latched: {}", reason);
        }
        drop(guard);

        if let Some(cv) = self.wakeup.lock().unwrap().as_ref() {
            cv.notify_all();
        }
    }

    pub fn reason(&self) -> Option<&'static str> {
        *self.reason.lock().unwrap()
    }

    pub fn is_signalled(&self) -> bool {
        self.reason().is_some()
    }

    /// Register (or clear) the condvar to poke when a signal lands.
    pub fn set_condition(&self, cv: Option<Arc<Condvar>>) {
        *self.wakeup.lock().unwrap() = cv;
    }
}

/// Install the process signal handler (SIGINT/SIGTERM, Ctrl+C on Windows)
/// that latches into `state`.
pub fn install_handler(state: &Arc<SignalState>) -> Result<()> {
    let state = Arc::clone(state);
    ctrlc::set_handler(move || state.set("interrupted by signal"))?;
    Ok(())
}

//! Termination signal handling.
//!
//! SIGINT/SIGTERM flip a process-wide flag. Long-running tool invocations poll the flag
//! so the in-flight child can be killed and the loop can return cleanly.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::debug;

static PROCESS_SHUTDOWN: OnceLock<Arc<AtomicBool>> = OnceLock::new();

fn process_flag() -> &'static Arc<AtomicBool> {
    PROCESS_SHUTDOWN.get_or_init(|| Arc::new(AtomicBool::new(false)))
}

extern "C" fn handle_termination(_: libc::c_int) {
    // Only touch the atomic here; anything else is not async-signal-safe.
    if let Some(flag) = PROCESS_SHUTDOWN.get() {
        flag.store(true, Ordering::SeqCst);
    }
}

/// Cloneable handle on a stop flag.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
}

impl Shutdown {
    /// Independent handle, not wired to any signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle on the flag the signal handlers set.
    pub fn process() -> Self {
        Self {
            flag: Arc::clone(process_flag()),
        }
    }

    pub fn request(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Install SIGINT and SIGTERM handlers that trip [`Shutdown::process`].
pub fn install_signal_handlers() -> Result<Shutdown> {
    let shutdown = Shutdown::process();
    for (signal, name) in [(libc::SIGINT, "SIGINT"), (libc::SIGTERM, "SIGTERM")] {
        unsafe {
            // SAFETY: handle_termination only stores to an atomic that was initialised
            // above, which is async-signal-safe.
            let handler = handle_termination as *const () as libc::sighandler_t;
            if libc::signal(signal, handler) == libc::SIG_ERR {
                return Err(anyhow!("failed to install {name} handler"));
            }
        }
        debug!(signal = name, "installed termination handler");
    }
    Ok(shutdown)
}

//! Ctrl+C and SIGTERM handling.
//!
//! The handler only raises a shared `AtomicBool`. Workers stop picking up
//! files when they see it, and the writer thread flushes and finalizes the
//! manifest on its own. No file is touched from inside the handler.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// The run's cancellation flag, raised by the signal handler.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    raised: Arc<AtomicBool>,
}

impl Interrupt {
    /// A lowered flag not yet tied to any signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a signal arrived (or [`Interrupt::raise`] was called).
    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }

    /// Raise the flag by hand, as a signal would.
    pub fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
    }

    /// The flag to hand to [`crate::engine::GenerateConfig::with_shutdown_flag`].
    #[must_use]
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.raised)
    }

    fn clear(&self) {
        self.raised.store(false, Ordering::SeqCst);
    }
}

/// `ctrlc` refused the handler.
#[derive(Debug, thiserror::Error)]
#[error("Failed to install signal handler: {0}")]
pub struct SignalError(#[from] ctrlc::Error);

static INSTALLED: OnceLock<Interrupt> = OnceLock::new();

/// Hook SIGINT/SIGTERM to a fresh [`Interrupt`], or hand back the one
/// already hooked with its flag cleared.
///
/// `ctrlc` takes a single handler per process, and several runs can share a
/// process (tests call `run_app` repeatedly).
///
/// # Errors
///
/// Returns [`SignalError`] if the first installation fails for a reason
/// other than a handler already being registered.
pub fn install_handler() -> Result<Interrupt, SignalError> {
    if let Some(interrupt) = INSTALLED.get() {
        interrupt.clear();
        return Ok(interrupt.clone());
    }

    let interrupt = Interrupt::new();
    let raised = interrupt.flag();
    let hooked = ctrlc::set_handler(move || {
        if !raised.swap(true, Ordering::SeqCst) {
            let _ = writeln!(std::io::stderr(), "\nInterrupted. Finishing manifest...");
        }
    });

    match hooked {
        Ok(()) => Ok(INSTALLED.get_or_init(|| interrupt).clone()),
        // Someone else owns the signal; the flag still works when raised by hand.
        Err(ctrlc::Error::MultipleHandlers) => {
            log::debug!("Signal handler already registered elsewhere");
            Ok(INSTALLED.get_or_init(Interrupt::new).clone())
        }
        Err(e) => Err(e.into()),
    }
}

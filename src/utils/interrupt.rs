//! Cancellation flag raised by SIGINT/SIGTERM

use anyhow::{Context, Result};
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag checked between and during backups
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag on SIGINT and SIGTERM instead of terminating
    pub fn register_signals(&self) -> Result<()> {
        for signal in [SIGINT, SIGTERM] {
            signal_hook::flag::register(signal, Arc::clone(&self.0))
                .with_context(|| format!("Failed to register handler for signal {}", signal))?;
        }
        Ok(())
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Whether a finished process reports that it was interrupted
pub fn is_interrupt_signal(signal: Option<i32>) -> bool {
    matches!(signal, Some(s) if s == SIGINT || s == SIGTERM)
}

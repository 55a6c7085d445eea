//! Bus error / end-of-stream handling and run-loop termination.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use gstreamer as gst;
use gstreamer::prelude::*;
use tracing::{error, info};

/// Anything that can be asked to stop blocking the main thread.
pub trait RunLoop: Send + Sync {
    fn quit(&self);
}

impl RunLoop for glib::MainLoop {
    fn quit(&self) {
        glib::MainLoop::quit(self);
    }
}

/// Owned copy of an error message posted on the pipeline bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusError {
    pub source: String,
    pub message: String,
    pub debug: Option<String>,
}

impl BusError {
    pub fn from_message(err: &gst::message::Error) -> Self {
        BusError {
            source: err
                .src()
                .map(|s| s.name().to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            message: err.error().message().to_string(),
            debug: err.debug().map(|d| d.to_string()),
        }
    }

    pub fn debug_info(&self) -> &str {
        self.debug.as_deref().unwrap_or("none")
    }
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Error received from element {}: {}",
            self.source, self.message
        )
    }
}

/// Stops the run loop on the first bus error or end-of-stream.
pub struct LifecycleMonitor<L: RunLoop> {
    run_loop: L,
    stopping: AtomicBool,
}

impl<L: RunLoop> LifecycleMonitor<L> {
    pub fn new(run_loop: L) -> Self {
        LifecycleMonitor {
            run_loop,
            stopping: AtomicBool::new(false),
        }
    }

    /// Logs `err` and asks the loop to quit. Returns `true` only for the call
    /// that actually requested termination.
    pub fn on_error(&self, err: &BusError) -> bool {
        error!(element = %err.source, "{err}");
        error!("Debugging information: {}", err.debug_info());
        self.stop()
    }

    pub fn on_eos(&self) -> bool {
        info!("end of stream");
        self.stop()
    }

    /// Used by the interrupt handler.
    pub fn interrupt(&self) -> bool {
        info!("interrupted, stopping");
        self.stop()
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    fn stop(&self) -> bool {
        if self.stopping.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.run_loop.quit();
        true
    }
}

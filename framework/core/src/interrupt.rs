use std::sync::Arc;

use tokio::sync::watch;

/// Signals that no further (scenario, version) pairs should be started.
///
/// An interrupt never cancels the build that is currently running. The flag is sticky: once raised,
/// every listener keeps reporting it.
#[derive(Debug, Clone)]
pub struct InterruptHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for InterruptHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptHandle {
    pub fn new() -> Self {
        Self {
            sender: Arc::new(watch::channel(false).0),
        }
    }

    pub fn interrupt(&self) {
        if !self.sender.send_replace(true) {
            log::warn!("Interrupt requested, remaining scenarios will be skipped");
        }
    }

    pub fn new_listener(&self) -> InterruptListener {
        InterruptListener {
            receiver: self.sender.subscribe(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InterruptListener {
    receiver: watch::Receiver<bool>,
}

impl InterruptListener {
    /// Point in time check, made between pairs.
    pub fn is_interrupted(&self) -> bool {
        *self.receiver.borrow()
    }
}

#[derive(derive_more::Error, derive_more::Display, Debug)]
pub struct RunInterrupted {
    msg: String,
}

impl Default for RunInterrupted {
    fn default() -> Self {
        Self {
            msg: "Skipped because the run was interrupted".to_string(),
        }
    }
}

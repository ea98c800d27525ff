use build_profiler_core::prelude::InterruptHandle;
use tokio::signal;

use crate::executor::Executor;

pub(crate) fn start_interrupt_listener(executor: &Executor) -> InterruptHandle {
    let handle = InterruptHandle::default();

    let listener_handle = handle.clone();
    executor.spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl-C: {e}");
            return;
        }
        println!("Received interrupt, finishing the current scenario before stopping...");
        listener_handle.interrupt();
    });

    handle
}

use std::sync::Arc;

use build_profiler_core::prelude::{InterruptHandle, InvocationId};

use crate::exec::OutputSink;
use crate::executor::Executor;
use crate::settings::InvocationSettings;
use crate::shutdown::start_interrupt_listener;
use crate::transport::{BuildToolchain, CommandLineToolchain};

/// State shared by every scenario of one run.
pub struct RunContext {
    invocation_id: Arc<InvocationId>,
    settings: InvocationSettings,
    executor: Arc<Executor>,
    sink: OutputSink,
    toolchain: Arc<dyn BuildToolchain>,
    interrupt: InterruptHandle,
}

impl RunContext {
    /// Starts the runtime and the Ctrl-C listener, and opens the build log.
    pub fn new(settings: InvocationSettings) -> anyhow::Result<Self> {
        let executor = Arc::new(Executor::new()?);
        let sink = OutputSink::new(settings.build_log.as_deref())?;
        let interrupt = start_interrupt_listener(&executor);
        let toolchain = Arc::new(CommandLineToolchain::new(executor.clone(), sink.clone()));
        let invocation_id = Arc::new(InvocationId::generate());
        log::info!("Invocation id {invocation_id}");

        Ok(Self {
            invocation_id,
            settings,
            executor,
            sink,
            toolchain,
            interrupt,
        })
    }

    /// Replace how build tools are reached.
    pub fn with_toolchain(mut self, toolchain: Arc<dyn BuildToolchain>) -> Self {
        self.toolchain = toolchain;
        self
    }

    pub fn invocation_id(&self) -> &Arc<InvocationId> {
        &self.invocation_id
    }

    pub fn settings(&self) -> &InvocationSettings {
        &self.settings
    }

    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    pub fn sink(&self) -> &OutputSink {
        &self.sink
    }

    pub fn toolchain(&self) -> &dyn BuildToolchain {
        self.toolchain.as_ref()
    }

    /// Stops the run once the current (scenario, version) pair is done.
    pub fn interrupt_handle(&self) -> &InterruptHandle {
        &self.interrupt
    }
}

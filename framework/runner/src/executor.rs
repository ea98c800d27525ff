use std::future::Future;

#[derive(Debug)]
pub struct Executor {
    runtime: tokio::runtime::Runtime,
}

impl Executor {
    pub(crate) fn new() -> anyhow::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("build-profiler")
            .build()?;
        Ok(Self { runtime })
    }

    /// Run async code in place, blocking until it completes.
    ///
    /// Never cancelled by an interrupt: a build that has started always runs to completion. Must not
    /// be called from inside the runtime.
    pub fn execute_in_place<T>(
        &self,
        fut: impl Future<Output = anyhow::Result<T>>,
    ) -> anyhow::Result<T> {
        self.runtime.block_on(fut)
    }

    /// Submit async code to be run in the background.
    pub fn spawn(&self, fut: impl Future<Output = ()> + Send + 'static) {
        self.runtime.spawn(fut);
    }
}

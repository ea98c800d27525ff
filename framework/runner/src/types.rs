pub type BuildProfilerResult<T> = anyhow::Result<T>;

/// Result of a mutator or profiler lifecycle hook.
pub type HookResult = anyhow::Result<()>;

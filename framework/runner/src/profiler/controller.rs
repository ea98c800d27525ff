use build_profiler_core::prelude::{InvariantViolation, WorkerId};

use crate::profiler::{Profiler, ProfilerTarget};
use crate::transport::TransportKind;
use crate::types::HookResult;

/// Brackets profiling around builds: `start_session`, then any number of
/// `start_recording`/`stop_recording` pairs, then `stop_session`.
pub trait ProfilerController: Send {
    fn start_session(&mut self) -> HookResult;

    fn start_recording(&mut self) -> HookResult;

    /// `worker` is the worker of the build that was just recorded, when known.
    fn stop_recording(&mut self, worker: Option<&WorkerId>) -> HookResult;

    fn stop_session(&mut self) -> HookResult;
}

#[derive(Debug, Default)]
pub struct NoOpController;

impl ProfilerController for NoOpController {
    fn start_session(&mut self) -> HookResult {
        Ok(())
    }

    fn start_recording(&mut self) -> HookResult {
        Ok(())
    }

    fn stop_recording(&mut self, _worker: Option<&WorkerId>) -> HookResult {
        Ok(())
    }

    fn stop_session(&mut self) -> HookResult {
        Ok(())
    }
}

/// Which controller calls reach the profiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerShape {
    /// Every call is forwarded. The snapshot is captured when the session ends.
    CaptureOnSessionEnd,
    /// The worker records from launch, so starting is skipped. Stopping captures the recording.
    RecordingAlreadyStarted,
    /// The worker records from launch and captures on exit. Only session calls are forwarded.
    SessionOnly,
}

impl ControllerShape {
    pub fn for_transport(kind: TransportKind) -> Self {
        match kind {
            TransportKind::ReusedWorker => ControllerShape::CaptureOnSessionEnd,
            TransportKind::ColdThenKill => ControllerShape::RecordingAlreadyStarted,
            TransportKind::ColdWorkerPerInvocation => ControllerShape::SessionOnly,
        }
    }
}

pub struct ShapedController {
    shape: ControllerShape,
    inner: Box<dyn ProfilerController>,
}

impl ShapedController {
    pub fn new(shape: ControllerShape, inner: Box<dyn ProfilerController>) -> Self {
        Self { shape, inner }
    }
}

impl ProfilerController for ShapedController {
    fn start_session(&mut self) -> HookResult {
        self.inner.start_session()
    }

    fn start_recording(&mut self) -> HookResult {
        match self.shape {
            ControllerShape::CaptureOnSessionEnd => self.inner.start_recording(),
            ControllerShape::RecordingAlreadyStarted | ControllerShape::SessionOnly => Ok(()),
        }
    }

    fn stop_recording(&mut self, worker: Option<&WorkerId>) -> HookResult {
        match self.shape {
            ControllerShape::CaptureOnSessionEnd | ControllerShape::RecordingAlreadyStarted => {
                self.inner.stop_recording(worker)
            }
            ControllerShape::SessionOnly => Ok(()),
        }
    }

    fn stop_session(&mut self) -> HookResult {
        self.inner.stop_session()
    }
}

/// Fails a second `start_recording` for profilers that can only record once per session.
pub struct RestartGuard {
    profiler: String,
    started: bool,
    inner: Box<dyn ProfilerController>,
}

impl RestartGuard {
    pub fn new(profiler: impl Into<String>, inner: Box<dyn ProfilerController>) -> Self {
        Self {
            profiler: profiler.into(),
            started: false,
            inner,
        }
    }
}

impl ProfilerController for RestartGuard {
    fn start_session(&mut self) -> HookResult {
        self.inner.start_session()
    }

    fn start_recording(&mut self) -> HookResult {
        if self.started {
            return Err(InvariantViolation::ProfilerCannotRestart {
                profiler: self.profiler.clone(),
            }
            .into());
        }
        self.started = true;
        self.inner.start_recording()
    }

    fn stop_recording(&mut self, worker: Option<&WorkerId>) -> HookResult {
        self.inner.stop_recording(worker)
    }

    fn stop_session(&mut self) -> HookResult {
        self.inner.stop_session()
    }
}

/// Creates the controller for one pair, shaped for the transport it runs on.
pub fn controller_for(
    profiler: &dyn Profiler,
    kind: TransportKind,
    target: &ProfilerTarget,
) -> anyhow::Result<Box<dyn ProfilerController>> {
    let mut controller = profiler.new_controller(target)?;
    if !profiler.can_restart_recording() {
        controller = Box::new(RestartGuard::new(profiler.name(), controller));
    }
    Ok(Box::new(ShapedController::new(
        ControllerShape::for_transport(kind),
        controller,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    struct Recording(Arc<Mutex<Vec<&'static str>>>);

    impl ProfilerController for Recording {
        fn start_session(&mut self) -> HookResult {
            self.0.lock().push("start_session");
            Ok(())
        }

        fn start_recording(&mut self) -> HookResult {
            self.0.lock().push("start_recording");
            Ok(())
        }

        fn stop_recording(&mut self, _worker: Option<&WorkerId>) -> HookResult {
            self.0.lock().push("stop_recording");
            Ok(())
        }

        fn stop_session(&mut self) -> HookResult {
            self.0.lock().push("stop_session");
            Ok(())
        }
    }

    fn drive(shape: ControllerShape) -> Vec<&'static str> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut controller = ShapedController::new(shape, Box::new(Recording(log.clone())));
        controller.start_session().unwrap();
        controller.start_recording().unwrap();
        controller.stop_recording(None).unwrap();
        controller.stop_session().unwrap();
        let calls = log.lock().clone();
        calls
    }

    #[test]
    fn shapes_forward_the_right_calls() {
        assert_eq!(
            vec!["start_session", "start_recording", "stop_recording", "stop_session"],
            drive(ControllerShape::CaptureOnSessionEnd)
        );
        assert_eq!(
            vec!["start_session", "stop_recording", "stop_session"],
            drive(ControllerShape::RecordingAlreadyStarted)
        );
        assert_eq!(
            vec!["start_session", "stop_session"],
            drive(ControllerShape::SessionOnly)
        );
    }

    #[test]
    fn shape_follows_transport() {
        assert_eq!(
            ControllerShape::CaptureOnSessionEnd,
            ControllerShape::for_transport(TransportKind::ReusedWorker)
        );
        assert_eq!(
            ControllerShape::RecordingAlreadyStarted,
            ControllerShape::for_transport(TransportKind::ColdThenKill)
        );
        assert_eq!(
            ControllerShape::SessionOnly,
            ControllerShape::for_transport(TransportKind::ColdWorkerPerInvocation)
        );
    }

    #[test]
    fn restart_guard_rejects_second_recording() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut guard = RestartGuard::new("once", Box::new(Recording(log)));
        guard.start_recording().unwrap();
        guard.stop_recording(None).unwrap();

        let err = guard.start_recording().unwrap_err();

        assert!(matches!(
            err.downcast_ref::<InvariantViolation>(),
            Some(InvariantViolation::ProfilerCannotRestart { .. })
        ));
    }
}

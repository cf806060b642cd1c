use crate::cell::ActorId;

/// Counter sink for runtime events. Every method defaults to a no-op.
pub trait ActorMetrics: Send + Sync + 'static {
	fn message_enqueued(&self, _actor: ActorId) {}

	fn restart(&self, _child: &str) {}

	fn death(&self, _actor: ActorId, _abnormal: bool) {}
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl ActorMetrics for NoopMetrics {}

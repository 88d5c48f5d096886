use super::connector::Tracer;

/// Extension points run on the tracer thread.
///
/// Both default to doing nothing. Records emitted from a hook go out on
/// the tracer thread's own slot in the next flush cycle.
pub trait ConnectionHooks: Send + 'static {
    /// A peer was accepted. Runs after `is_connected` turns true and before
    /// `is_connected_finished` does, so it is the place for a handshake.
    fn on_connection(&mut self, _tracer: &Tracer) {}

    /// Text the peer sent since the last cycle, when message handling is on.
    fn on_receive_messages(&mut self, _messages: &str, _tracer: &Tracer) {}
}

/// Hooks that do nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl ConnectionHooks for NoHooks {}

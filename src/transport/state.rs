use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// Where the tracer thread is in its accept/stream/teardown cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Idle = 0,
    Listening = 1,
    Connected = 2,
    Streaming = 3,
    Disconnecting = 4,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => ConnectionState::Listening,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Streaming,
            4 => ConnectionState::Disconnecting,
            _ => ConnectionState::Idle,
        }
    }
}

/// Connection flags read by producers and written by the tracer thread.
/// Terminating lives in the cancellation token, not here.
#[derive(Debug)]
pub struct LinkStatus {
    state: AtomicU8,
    inited: AtomicBool,
    connected: AtomicBool,
    connected_finished: AtomicBool,
    disconnected: AtomicBool,
    handle_messages: AtomicBool,
}

impl LinkStatus {
    pub fn new(handle_messages: bool) -> Self {
        Self {
            state: AtomicU8::new(ConnectionState::Idle as u8),
            inited: AtomicBool::new(false),
            connected: AtomicBool::new(false),
            connected_finished: AtomicBool::new(false),
            disconnected: AtomicBool::new(false),
            handle_messages: AtomicBool::new(handle_messages),
        }
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn is_inited(&self) -> bool {
        self.inited.load(Ordering::Acquire)
    }

    pub fn set_inited(&self, v: bool) {
        self.inited.store(v, Ordering::Release);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn set_connected(&self, v: bool) {
        self.connected.store(v, Ordering::Release);
    }

    pub fn is_connected_finished(&self) -> bool {
        self.connected_finished.load(Ordering::Acquire)
    }

    pub fn set_connected_finished(&self, v: bool) {
        self.connected_finished.store(v, Ordering::Release);
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::Acquire)
    }

    pub fn set_disconnected(&self, v: bool) {
        self.disconnected.store(v, Ordering::Release);
    }

    pub fn handles_messages(&self) -> bool {
        self.handle_messages.load(Ordering::Relaxed)
    }

    pub fn set_handle_messages(&self, v: bool) {
        self.handle_messages.store(v, Ordering::Relaxed);
    }

    /// Per-connection flags back to their pre-accept values.
    pub fn reset_connection(&self) {
        self.set_connected(false);
        self.set_connected_finished(false);
    }
}

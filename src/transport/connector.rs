use std::net::TcpListener;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::thread::{JoinHandle, ThreadId};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::TransportConfig;

use super::error::TransportError;
use super::hooks::{ConnectionHooks, NoHooks};
use super::inbound::InboundBuffer;
use super::pool::{RecordHandle, RecordPool};
use super::record::{CommandId, Record};
use super::registry::{SlotIndex, ThreadRegistry};
use super::sequence::Sequencer;
use super::state::{ConnectionState, LinkStatus};
use super::worker;

/// Poll interval of a blocking `init` waiting for the peer.
const ATTACH_POLL: Duration = Duration::from_millis(100);

/// Log one warning per this many dropped records.
const DROP_LOG_EVERY: u64 = 1024;

/// State shared by producers, the tracer thread and the owning `Connector`.
pub(crate) struct Shared {
    pub config: TransportConfig,
    pub status: LinkStatus,
    pub cancel: CancellationToken,
    pub sequencer: &'static Sequencer,
    pub pool: RecordPool,
    pub registry: ThreadRegistry<RecordHandle>,
    pub inbound: InboundBuffer,
    pub local_port: u16,
    pub packets: AtomicUsize,
    pub dropped: AtomicU64,
    pub session: Mutex<Option<Uuid>>,
    pub io_thread: OnceLock<ThreadId>,
}

impl Shared {
    pub fn session(&self) -> MutexGuard<'_, Option<Uuid>> {
        self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Whether a producer stuck on a full queue should keep waiting. The
    /// tracer thread itself never waits: nobody else would drain its queue.
    fn keep_waiting(&self) -> bool {
        self.status.is_connected()
            && !self.cancel.is_cancelled()
            && self.io_thread.get() != Some(&std::thread::current().id())
    }

    fn note_drop(&self, reason: &'static str) {
        let dropped = self.dropped.fetch_add(1, Ordering::Relaxed);
        if dropped % DROP_LOG_EVERY == 0 {
            warn!(reason, dropped = dropped + 1, "trace record dropped");
        }
    }
}

/// Cheap, cloneable producer handle. Hand one to every thread that emits
/// trace records; all emits are fire-and-forget.
#[derive(Clone)]
pub struct Tracer {
    pub(crate) shared: Arc<Shared>,
}

impl Tracer {
    /// Reserves the calling thread's slot ahead of its first emit.
    /// `None` when every slot is taken.
    pub fn reserve_slot(&self) -> Option<SlotIndex> {
        self.shared.registry.reserve().ok()
    }

    /// Emits a text record with the given command id. No-op while no peer
    /// is attached.
    pub fn send_text(&self, text: &str, command: CommandId) {
        self.emit(|sequence| Record::text(command, sequence, text));
    }

    pub fn record_text(&self, text: &str) {
        self.send_text(text, CommandId::TEXT);
    }

    /// Emits a binary record. Payload beyond the record's capacity is cut.
    pub fn record_event(&self, kind: CommandId, payload: &[u8]) {
        self.emit(|sequence| Record::with_payload(kind, sequence, payload).0);
    }

    fn emit(&self, build: impl FnOnce(u64) -> Record) {
        let shared = &*self.shared;
        if !shared.status.is_connected() || shared.cancel.is_cancelled() {
            return;
        }

        let record = build(shared.sequencer.next());
        let Some(handle) = shared.pool.allocate(record) else {
            shared.note_drop("record pool exhausted");
            return;
        };

        match shared.registry.push(handle, || shared.keep_waiting()) {
            Ok(_) => {
                shared.packets.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                let _ = shared.pool.free(e.into_inner());
                shared.note_drop("no queue space or no slot");
            }
        }
    }

    /// Text the peer sent since the last call. Only while connected, and
    /// only when message handling is off (otherwise the hook consumes it).
    pub fn read_text(&self) -> Option<String> {
        if !self.is_connected() {
            return None;
        }
        self.shared.inbound.drain()
    }

    pub fn set_message_handling(&self, enabled: bool) {
        self.shared.status.set_handle_messages(enabled);
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.status.state()
    }

    pub fn is_inited(&self) -> bool {
        self.shared.status.is_inited()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.status.is_connected()
    }

    pub fn is_connected_finished(&self) -> bool {
        self.shared.status.is_connected_finished()
    }

    pub fn is_disconnected(&self) -> bool {
        self.shared.status.is_disconnected()
    }

    pub fn is_terminating(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// Port actually listened on, useful when configured with port 0.
    pub fn local_port(&self) -> u16 {
        self.shared.local_port
    }

    /// Id of the current peer session, if one is attached.
    pub fn session_id(&self) -> Option<Uuid> {
        *self.shared.session()
    }

    /// Records pushed since the last flush cycle.
    pub fn packets_count(&self) -> usize {
        self.shared.packets.load(Ordering::Relaxed)
    }

    /// Records lost to backpressure, pool exhaustion or missing slots.
    pub fn dropped_count(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    pub fn tracked_threads(&self) -> usize {
        self.shared.registry.tracked_threads()
    }

    /// Bytes held by queues, the collector and the record pool.
    pub fn memory_overhead(&self) -> usize {
        let config = &self.shared.config;
        let queues = self.tracked_threads() * config.queue_capacity * std::mem::size_of::<RecordHandle>();
        let collector = if config.sequential {
            config.collector_capacity * std::mem::size_of::<Record>()
        } else {
            0
        };
        queues + collector + self.shared.pool.memory_usage()
    }
}

/// Owner of the tracing transport: the listening socket, the tracer
/// thread and every queue. Dropping it closes the transport.
pub struct Connector {
    tracer: Tracer,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Connector {
    pub fn init(config: TransportConfig) -> Result<Self, TransportError> {
        Self::init_with_hooks(config, NoHooks)
    }

    /// Builds the registry and pool, binds the listen socket, reserves the
    /// caller's slot and starts the tracer thread. With `config.blocking`
    /// this waits until a peer attached.
    pub fn init_with_hooks<H: ConnectionHooks>(config: TransportConfig, hooks: H) -> Result<Self, TransportError> {
        config.validate()?;

        let registry = ThreadRegistry::new(config.max_traced_threads, config.queue_capacity)?;
        let pool = RecordPool::new(config.pool_segment_len, config.pool_max_segments);

        let addr = format!("{}:{}", config.bind_address, config.port);
        let listener = TcpListener::bind(&addr)
            .and_then(|l| l.set_nonblocking(true).map(|_| l))
            .map_err(|source| TransportError::Bind { addr: addr.clone(), source })?;
        let local_port = listener
            .local_addr()
            .map_err(|source| TransportError::Bind { addr: addr.clone(), source })?
            .port();

        info!(port = local_port, "tracelink listening");

        let blocking = config.blocking;
        let inbound_capacity = config.inbound_capacity;
        let shared = Arc::new(Shared {
            status: LinkStatus::new(config.handle_messages),
            config,
            cancel: CancellationToken::new(),
            sequencer: Sequencer::global(),
            pool,
            registry,
            inbound: InboundBuffer::new(inbound_capacity),
            local_port,
            packets: AtomicUsize::new(0),
            dropped: AtomicU64::new(0),
            session: Mutex::new(None),
            io_thread: OnceLock::new(),
        });

        let tracer = Tracer { shared: Arc::clone(&shared) };
        if tracer.reserve_slot().is_none() {
            warn!("init thread could not reserve a trace slot");
        }

        shared.status.set_state(ConnectionState::Listening);
        let handle = std::thread::Builder::new()
            .name("tracelink-io".to_string())
            .spawn(move || worker::run(shared, listener, hooks))
            .map_err(TransportError::Spawn)?;

        let connector = Connector {
            tracer,
            worker: Mutex::new(Some(handle)),
        };

        if blocking {
            warn!("init is blocking, attach a peer to continue");
            connector.wait_for_peer()?;
        }

        connector.tracer.shared.status.set_inited(true);
        Ok(connector)
    }

    fn wait_for_peer(&self) -> Result<(), TransportError> {
        while !self.is_connected() || !self.is_connected_finished() {
            let exited = self
                .worker_handle()
                .as_ref()
                .map_or(true, |handle| handle.is_finished());
            if exited {
                self.close();
                return Err(TransportError::WorkerExited);
            }
            std::thread::sleep(ATTACH_POLL);
        }
        info!("tracelink peer attached");
        Ok(())
    }

    fn worker_handle(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.worker.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn tracer(&self) -> Tracer {
        self.tracer.clone()
    }

    /// Stops the tracer thread and releases queues, pooled records and the
    /// socket. Safe to call more than once.
    pub fn close(&self) {
        let shared = &self.tracer.shared;
        shared.cancel.cancel();
        shared.status.set_connected_finished(false);
        shared.status.set_disconnected(true);

        let handle = self.worker_handle().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("tracer thread panicked");
            }
            info!("tracelink closed");
        }

        shared.status.reset_connection();
        shared.status.set_state(ConnectionState::Idle);
        shared.pool.release_all();
        shared.inbound.clear();
        shared.packets.store(0, Ordering::Relaxed);
        shared.status.set_inited(false);
    }
}

impl Deref for Connector {
    type Target = Tracer;

    fn deref(&self) -> &Tracer {
        &self.tracer
    }
}

impl Drop for Connector {
    fn drop(&mut self) {
        self.close();
    }
}

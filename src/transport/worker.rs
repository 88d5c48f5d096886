use std::io::{self, ErrorKind, Read};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::connector::{Shared, Tracer};
use super::hooks::ConnectionHooks;
use super::outbox::{FlushReport, Outbox};
use super::state::ConnectionState;

const READ_CHUNK: usize = 2048;

/// Caps reads per cycle so a chatty peer cannot starve the flush.
const MAX_READS_PER_CYCLE: usize = 16;

/// Tracer thread body: listen, accept one peer, stream until it goes away,
/// reset, listen again. Exits once the transport is cancelled.
pub(crate) fn run<H: ConnectionHooks>(shared: Arc<Shared>, listener: TcpListener, mut hooks: H) {
    let _ = shared.io_thread.set(std::thread::current().id());
    info!(port = shared.local_port, "tracer thread starting");

    let tracer = Tracer { shared: Arc::clone(&shared) };
    // Hooks emit from this thread.
    let _ = tracer.reserve_slot();

    let collector_capacity = shared.config.sequential.then_some(shared.config.collector_capacity);
    let mut outbox = Outbox::new(shared.config.max_traced_threads, collector_capacity);

    while !shared.cancel.is_cancelled() {
        shared.status.set_state(ConnectionState::Listening);

        let Some((stream, peer)) = accept(&shared, &listener) else {
            break;
        };
        stream_session(&shared, &tracer, &mut hooks, &mut outbox, stream, peer);
    }

    clear(&shared, &mut outbox);
    shared.status.set_state(ConnectionState::Idle);
    info!("tracer thread exited");
}

fn accept(shared: &Shared, listener: &TcpListener) -> Option<(TcpStream, SocketAddr)> {
    debug!("accepting...");
    loop {
        if shared.cancel.is_cancelled() {
            return None;
        }
        match listener.accept() {
            Ok(pair) => return Some(pair),
            Err(e) if e.kind() == ErrorKind::WouldBlock => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => warn!(error = %e, "accept failed"),
        }
        std::thread::sleep(shared.config.accept_poll());
    }
}

fn configure(shared: &Shared, stream: &TcpStream) -> io::Result<()> {
    // Accepted sockets inherit non-blocking mode on some platforms.
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true)?;
    // The read timeout doubles as the pause between flush cycles.
    stream.set_read_timeout(Some(shared.config.flush_interval()))?;
    stream.set_write_timeout(Some(shared.config.write_timeout()))?;
    Ok(())
}

fn stream_session<H: ConnectionHooks>(
    shared: &Shared,
    tracer: &Tracer,
    hooks: &mut H,
    outbox: &mut Outbox,
    mut stream: TcpStream,
    peer: SocketAddr,
) {
    if let Err(e) = configure(shared, &stream) {
        warn!(error = %e, %peer, "couldn't configure accepted socket");
        return;
    }

    // Stragglers from the previous session must not leak into this one.
    outbox.adopt(&shared.registry);
    clear(shared, outbox);

    let session = Uuid::new_v4();
    *shared.session() = Some(session);
    shared.status.set_disconnected(false);
    shared.status.set_state(ConnectionState::Connected);
    shared.status.set_connected(true);
    info!(%session, %peer, "connection accepted");

    hooks.on_connection(tracer);

    shared.status.set_connected_finished(true);
    shared.status.set_state(ConnectionState::Streaming);

    let mut live = true;
    while live && !shared.cancel.is_cancelled() {
        live = flush(shared, outbox, &mut stream);
        if !live {
            break;
        }

        live = receive(shared, &mut stream);
        if shared.status.handles_messages() {
            if let Some(messages) = shared.inbound.drain() {
                hooks.on_receive_messages(&messages, tracer);
            }
        }
    }

    shared.status.set_state(ConnectionState::Disconnecting);

    // Terminating with the peer still there: send what is left.
    if live {
        flush(shared, outbox, &mut stream);
    }

    let _ = stream.shutdown(Shutdown::Both);
    clear(shared, outbox);
    shared.status.set_disconnected(true);
    info!(%session, %peer, "disconnected");
}

/// One flush cycle. Returns false when the connection is no longer usable.
fn flush(shared: &Shared, outbox: &mut Outbox, stream: &mut TcpStream) -> bool {
    outbox.adopt(&shared.registry);
    let report = outbox.flush(&shared.pool, stream);
    shared.packets.store(0, Ordering::Relaxed);
    !is_fatal(&report)
}

fn is_fatal(report: &FlushReport) -> bool {
    match &report.failure {
        None => false,
        Some(_) if report.torn => true,
        Some(e) => matches!(
            e.kind(),
            ErrorKind::BrokenPipe
                | ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::NotConnected
                | ErrorKind::UnexpectedEof
                | ErrorKind::WriteZero
        ),
    }
}

/// Reads whatever the peer sent into the inbound buffer. Returns false
/// when the peer closed the connection or the read failed.
fn receive(shared: &Shared, stream: &mut TcpStream) -> bool {
    let mut buf = [0u8; READ_CHUNK];

    for _ in 0..MAX_READS_PER_CYCLE {
        match stream.read(&mut buf) {
            Ok(0) => return false,
            Ok(n) => {
                shared.inbound.append(&buf[..n]);
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => return true,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => {
                warn!(error = %e, "socket read failed");
                return false;
            }
        }
    }
    true
}

/// Drops all per-connection state: flags, queued and pooled records, and
/// unread peer text.
fn clear(shared: &Shared, outbox: &mut Outbox) {
    shared.status.reset_connection();
    *shared.session() = None;

    let discarded = outbox.discard(&shared.pool);
    let released = shared.pool.release_all();
    shared.inbound.clear();
    shared.packets.store(0, Ordering::Relaxed);

    if discarded > 0 || released > 0 {
        debug!(discarded, released, "cleared unsent records");
    }
}

use std::io::{self, Write};

use tracing::{debug, warn};

use super::collector::Collector;
use super::pool::{RecordHandle, RecordPool};
use super::queue::QueueConsumer;
use super::record::WIRE_RECORD_SIZE;
use super::registry::ThreadRegistry;

/// Outcome of one flush cycle.
#[derive(Debug, Default)]
pub struct FlushReport {
    pub sent: usize,
    /// Records taken off their queues but not written because the sink failed.
    pub dropped: usize,
    /// Handles whose record had already been released (e.g. by a reset).
    pub stale: usize,
    /// The collector filled up; the rest stays queued for the next cycle.
    pub backlogged: bool,
    pub failure: Option<io::Error>,
    /// The failed write stopped inside a record; the peer's stream is out
    /// of frame and the connection cannot be reused.
    pub torn: bool,
}

struct WriteFailure {
    error: io::Error,
    torn: bool,
}

fn write_frame<W: Write>(sink: &mut W, frame: &[u8]) -> Result<(), WriteFailure> {
    let mut written = 0;
    while written < frame.len() {
        match sink.write(&frame[written..]) {
            Ok(0) => {
                return Err(WriteFailure {
                    error: io::ErrorKind::WriteZero.into(),
                    torn: written > 0,
                })
            }
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(error) => return Err(WriteFailure { error, torn: written > 0 }),
        }
    }
    Ok(())
}

/// Consumer side of every per-thread queue. Lives on the tracer thread.
pub struct Outbox {
    consumers: Vec<Option<QueueConsumer<RecordHandle>>>,
    collector: Option<Collector>,
    frame: [u8; WIRE_RECORD_SIZE],
}

impl Outbox {
    /// `collector_capacity` of `Some` turns on sequential mode.
    pub fn new(max_slots: usize, collector_capacity: Option<usize>) -> Self {
        let mut consumers = Vec::with_capacity(max_slots);
        consumers.resize_with(max_slots, || None);
        Self {
            consumers,
            collector: collector_capacity.map(Collector::new),
            frame: [0u8; WIRE_RECORD_SIZE],
        }
    }

    pub fn is_sequential(&self) -> bool {
        self.collector.is_some()
    }

    /// Takes ownership of queues reserved since the last call.
    pub fn adopt(&mut self, registry: &ThreadRegistry<RecordHandle>) {
        for (slot, consumer) in registry.adopt_new() {
            if let Some(cell) = self.consumers.get_mut(slot) {
                debug!(slot, "tracer adopted queue");
                *cell = Some(consumer);
            }
        }
    }

    /// Records waiting across all adopted queues.
    pub fn queued(&self) -> usize {
        self.consumers.iter().flatten().map(|c| c.len()).sum()
    }

    pub fn collector_overhead(&self) -> usize {
        self.collector.as_ref().map_or(0, |c| c.memory_overhead())
    }

    /// Drains every queue into `sink`, lowest slot first.
    ///
    /// In sequential mode records are gathered into the collector, sorted
    /// by sequence and written in one pass. Otherwise each queue is written
    /// in FIFO order and a record is popped only after it was written. A
    /// write failure ends the cycle; nothing is retried.
    pub fn flush<W: Write>(&mut self, pool: &RecordPool, sink: &mut W) -> FlushReport {
        let mut report = match self.collector.take() {
            Some(mut collector) => {
                let report = self.flush_sequential(&mut collector, pool, sink);
                self.collector = Some(collector);
                report
            }
            None => self.flush_fifo(pool, sink),
        };

        if report.failure.is_none() {
            if let Err(e) = sink.flush() {
                report.failure = Some(e);
            }
        }
        if let Some(e) = &report.failure {
            warn!(error = %e, sent = report.sent, dropped = report.dropped, "record not correctly sent");
        }
        report
    }

    fn flush_sequential<W: Write>(
        &mut self,
        collector: &mut Collector,
        pool: &RecordPool,
        sink: &mut W,
    ) -> FlushReport {
        let mut report = FlushReport::default();

        'slots: for consumer in self.consumers.iter_mut().flatten() {
            while let Some(&handle) = consumer.peek() {
                match pool.get(handle) {
                    Some(record) => {
                        if !collector.add(record) {
                            report.backlogged = true;
                            break 'slots;
                        }
                    }
                    None => report.stale += 1,
                }
                consumer.pop();
                let _ = pool.free(handle);
            }
        }

        collector.sort();
        let records = collector.records();
        for (i, record) in records.iter().enumerate() {
            record.encode_into(&mut self.frame);
            if let Err(failure) = write_frame(sink, &self.frame) {
                report.dropped = records.len() - i;
                report.failure = Some(failure.error);
                report.torn = failure.torn;
                break;
            }
            report.sent += 1;
        }
        collector.reset();

        report
    }

    fn flush_fifo<W: Write>(&mut self, pool: &RecordPool, sink: &mut W) -> FlushReport {
        let mut report = FlushReport::default();

        'slots: for consumer in self.consumers.iter_mut().flatten() {
            while let Some(&handle) = consumer.peek() {
                let Some(record) = pool.get(handle) else {
                    consumer.pop();
                    report.stale += 1;
                    continue;
                };

                record.encode_into(&mut self.frame);
                if let Err(failure) = write_frame(sink, &self.frame) {
                    // Left queued; the next cycle tries again.
                    report.failure = Some(failure.error);
                    report.torn = failure.torn;
                    break 'slots;
                }
                consumer.pop();
                let _ = pool.free(handle);
                report.sent += 1;
            }
        }

        report
    }

    /// Empties every queue without sending, returning records to the pool.
    pub fn discard(&mut self, pool: &RecordPool) -> usize {
        let mut discarded = 0;
        for consumer in self.consumers.iter_mut().flatten() {
            while let Some(handle) = consumer.pop() {
                let _ = pool.free(handle);
                discarded += 1;
            }
        }
        if let Some(collector) = self.collector.as_mut() {
            collector.reset();
        }
        discarded
    }
}

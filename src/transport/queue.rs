use std::time::Duration;

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use super::error::{PushError, TransportError};

/// First sleep when a queue is full; doubles up to `MAX_BACKOFF`.
const MIN_BACKOFF: Duration = Duration::from_micros(50);
const MAX_BACKOFF: Duration = Duration::from_millis(1);

/// Rejects capacities the ring cannot index with a mask.
pub fn check_capacity(capacity: usize) -> Result<(), TransportError> {
    if capacity.is_power_of_two() {
        Ok(())
    } else {
        Err(TransportError::InvalidQueueCapacity(capacity))
    }
}

/// Builds one per-thread queue and splits it into its two ends. Exactly one
/// thread may own each end.
pub fn channel<T>(capacity: usize) -> Result<(QueueProducer<T>, QueueConsumer<T>), TransportError> {
    check_capacity(capacity)?;
    let (producer, consumer) = HeapRb::<T>::new(capacity).split();
    Ok((QueueProducer { inner: producer }, QueueConsumer { inner: consumer }))
}

/// Write end, owned by the traced thread bound to the slot.
pub struct QueueProducer<T> {
    inner: HeapProd<T>,
}

impl<T> QueueProducer<T> {
    pub fn try_push(&mut self, item: T) -> Result<(), T> {
        self.inner.try_push(item)
    }

    /// Pushes `item`, sleeping with a growing backoff while the ring is
    /// full. Gives up and hands the item back as soon as `keep_waiting`
    /// returns false, so the stall is bounded by connection liveness.
    pub fn push_with_backoff(
        &mut self,
        item: T,
        keep_waiting: impl Fn() -> bool,
    ) -> Result<(), PushError<T>> {
        let mut item = item;
        let mut backoff = MIN_BACKOFF;

        loop {
            match self.inner.try_push(item) {
                Ok(()) => return Ok(()),
                Err(rejected) => item = rejected,
            }

            // Producing faster than the tracer thread drains.
            if !keep_waiting() {
                return Err(PushError::Abandoned(item));
            }
            std::thread::sleep(backoff);
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    pub fn is_full(&self) -> bool {
        self.inner.is_full()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity().get()
    }
}

/// Read end, owned by the tracer thread for the queue's whole lifetime.
pub struct QueueConsumer<T> {
    inner: HeapCons<T>,
}

impl<T> QueueConsumer<T> {
    pub fn peek(&self) -> Option<&T> {
        self.inner.try_peek()
    }

    pub fn pop(&mut self) -> Option<T> {
        self.inner.try_pop()
    }

    pub fn len(&self) -> usize {
        self.inner.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity().get()
    }
}

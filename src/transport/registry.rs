//! Thread registry: binds each traced thread to one per-thread queue.
//!
//! Reservation (first claim) takes the registry lock. After that the thread
//! keeps its producer end in thread-local storage and pushes without any
//! lock; the tracer thread owns every consumer end.
//!
//! A slot stays bound until the registry is dropped. A traced thread that
//! exits does not give its slot back. A thread that outlives the registry
//! keeps the queue in its thread-local storage until it next reserves or
//! asks for its slot on any registry of the same item type.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tracing::{debug, error};

use super::error::{PushError, RegistryError, TransportError};
use super::queue::{self, QueueConsumer, QueueProducer};

static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

/// Index of a slot in the registry's fixed array.
pub type SlotIndex = usize;

struct Slot<T> {
    free: bool,
    // Present until the owning thread takes it into its binding.
    producer: Option<QueueProducer<T>>,
}

struct RegistryInner<T> {
    id: u64,
    queue_capacity: usize,
    slots: Mutex<Vec<Option<Slot<T>>>>,
    // Consumer ends of freshly built queues, waiting for the drain side.
    unadopted: Mutex<Vec<(SlotIndex, QueueConsumer<T>)>>,
    claimed: AtomicUsize,
}

/// Fixed-size array of per-thread queues, shared between traced threads
/// (producers) and the tracer thread (consumer).
pub struct ThreadRegistry<T> {
    inner: Arc<RegistryInner<T>>,
}

impl<T> Clone for ThreadRegistry<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

enum BoundState<T> {
    Bound { slot: SlotIndex, producer: QueueProducer<T> },
    // Reservation failed once; the thread stays silent for this registry.
    Denied,
}

struct Binding<T> {
    registry_id: u64,
    registry: Weak<RegistryInner<T>>,
    state: BoundState<T>,
}

type AnyBindings = RefCell<Vec<Box<dyn std::any::Any>>>;

thread_local! {
    static BINDINGS: AnyBindings = RefCell::new(Vec::new());
}

/// Forgets this thread's bindings to registries that were dropped, which
/// frees their queues.
fn prune_dropped<T: 'static>(bindings: &mut Vec<Box<dyn std::any::Any>>) {
    bindings.retain(|b| match b.downcast_ref::<Binding<T>>() {
        Some(b) => b.registry.strong_count() > 0,
        None => true,
    });
}

fn lock<U>(m: &Mutex<U>) -> MutexGuard<'_, U> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<T: Send + 'static> ThreadRegistry<T> {
    pub fn new(max_threads: usize, queue_capacity: usize) -> Result<Self, TransportError> {
        queue::check_capacity(queue_capacity)?;
        if max_threads == 0 {
            return Err(TransportError::InvalidConfig("max_traced_threads must be at least 1".into()));
        }

        let mut slots = Vec::with_capacity(max_threads);
        slots.resize_with(max_threads, || None);

        Ok(Self {
            inner: Arc::new(RegistryInner {
                id: NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed),
                queue_capacity,
                slots: Mutex::new(slots),
                unadopted: Mutex::new(Vec::new()),
                claimed: AtomicUsize::new(0),
            }),
        })
    }

    pub fn max_threads(&self) -> usize {
        lock(&self.inner.slots).len()
    }

    pub fn queue_capacity(&self) -> usize {
        self.inner.queue_capacity
    }

    /// Slots currently bound to a thread.
    pub fn tracked_threads(&self) -> usize {
        self.inner.claimed.load(Ordering::Relaxed)
    }

    /// Slot of the calling thread, reserving one on first call. Repeated
    /// calls from the same thread return the same slot.
    pub fn reserve(&self) -> Result<SlotIndex, RegistryError> {
        self.with_binding(|state| match state {
            BoundState::Bound { slot, .. } => Ok(*slot),
            BoundState::Denied => Err(RegistryError::Exhausted { max: self.max_threads() }),
        })
    }

    /// Slot the calling thread is bound to, without reserving.
    pub fn current_slot(&self) -> Option<SlotIndex> {
        let id = self.inner.id;
        BINDINGS.with(|bindings| {
            let mut bindings = bindings.borrow_mut();
            prune_dropped::<T>(&mut bindings);
            bindings.iter().find_map(|b| {
                b.downcast_ref::<Binding<T>>()
                    .filter(|b| b.registry_id == id)
                    .and_then(|b| match &b.state {
                        BoundState::Bound { slot, .. } => Some(*slot),
                        BoundState::Denied => None,
                    })
            })
        })
    }

    /// Pushes into the calling thread's queue, reserving a slot first if the
    /// thread has none. While the queue is full this sleeps with backoff
    /// until space frees or `keep_waiting` says to stop.
    pub fn push(&self, item: T, keep_waiting: impl Fn() -> bool) -> Result<SlotIndex, PushError<T>> {
        self.with_binding(move |state| match state {
            BoundState::Bound { slot, producer } => {
                producer.push_with_backoff(item, keep_waiting)?;
                Ok(*slot)
            }
            BoundState::Denied => Err(PushError::NoSlot(item)),
        })
    }

    /// Hands consumer ends of newly built queues to the drain side. Only the
    /// tracer thread calls this.
    pub fn adopt_new(&self) -> Vec<(SlotIndex, QueueConsumer<T>)> {
        match self.inner.unadopted.try_lock() {
            Ok(mut pending) => std::mem::take(&mut *pending),
            Err(std::sync::TryLockError::Poisoned(poisoned)) => std::mem::take(&mut *poisoned.into_inner()),
            // A reservation is in flight; pick it up next cycle.
            Err(std::sync::TryLockError::WouldBlock) => Vec::new(),
        }
    }

    fn with_binding<R>(&self, f: impl FnOnce(&mut BoundState<T>) -> R) -> R {
        let id = self.inner.id;
        BINDINGS.with(|bindings| {
            let mut bindings = bindings.borrow_mut();

            let position = bindings.iter().position(|b| {
                b.downcast_ref::<Binding<T>>().is_some_and(|b| b.registry_id == id)
            });

            let position = match position {
                Some(p) => p,
                None => {
                    prune_dropped::<T>(&mut bindings);
                    let state = self.claim_slot();
                    bindings.push(Box::new(Binding {
                        registry_id: id,
                        registry: Arc::downgrade(&self.inner),
                        state,
                    }));
                    bindings.len() - 1
                }
            };

            match bindings[position].downcast_mut::<Binding<T>>() {
                Some(binding) => f(&mut binding.state),
                None => f(&mut BoundState::Denied),
            }
        })
    }

    fn claim_slot(&self) -> BoundState<T> {
        let mut slots = lock(&self.inner.slots);

        // Scan from the top. The first thread to reserve (usually the
        // thread that called init) lands in the last slot and is drained
        // last in every flush pass, after all other threads' records.
        for index in (0..slots.len()).rev() {
            if slots[index].is_none() {
                match queue::channel::<T>(self.inner.queue_capacity) {
                    Ok((producer, consumer)) => {
                        slots[index] = Some(Slot { free: true, producer: Some(producer) });
                        lock(&self.inner.unadopted).push((index, consumer));
                    }
                    Err(e) => {
                        error!(error = %e, "failed to build trace queue");
                        break;
                    }
                }
            }

            if let Some(slot) = slots[index].as_mut() {
                if slot.free {
                    if let Some(producer) = slot.producer.take() {
                        slot.free = false;
                        self.inner.claimed.fetch_add(1, Ordering::Relaxed);
                        debug!(slot = index, "trace slot reserved");
                        return BoundState::Bound { slot: index, producer };
                    }
                }
            }
        }

        error!(max = slots.len(), "couldn't reserve a trace slot, too many active threads");
        BoundState::Denied
    }
}

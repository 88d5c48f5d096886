use std::collections::HashSet;
use std::sync::{Arc, Barrier};

use tracelink::transport::error::{PushError, RegistryError, TransportError};
use tracelink::transport::registry::ThreadRegistry;

#[test]
fn test_distinct_threads_get_distinct_slots() {
    let registry = ThreadRegistry::<u32>::new(8, 16).unwrap();
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = registry.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                barrier.wait();
                let first = registry.reserve().unwrap();
                let second = registry.reserve().unwrap();
                assert_eq!(first, second, "second reservation must be idempotent");
                assert_eq!(registry.current_slot(), Some(first));
                first
            })
        })
        .collect();

    let slots: HashSet<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(slots.len(), 8);
    assert_eq!(registry.tracked_threads(), 8);
}

#[test]
fn test_first_reservation_takes_highest_slot() {
    let registry = ThreadRegistry::<u32>::new(4, 16).unwrap();

    // The first claimer lands in the last slot, so it is drained last.
    assert_eq!(registry.reserve(), Ok(3));

    let next = {
        let registry = registry.clone();
        std::thread::spawn(move || registry.reserve()).join().unwrap()
    };
    assert_eq!(next, Ok(2));
}

#[test]
fn test_exhaustion_is_reported_not_retried() {
    let registry = ThreadRegistry::<u32>::new(1, 16).unwrap();
    assert_eq!(registry.reserve(), Ok(0));

    let registry2 = registry.clone();
    let (reserve, push) = std::thread::spawn(move || {
        let reserve = registry2.reserve();
        let push = registry2.push(7, || true);
        (reserve, push)
    })
    .join()
    .unwrap();

    assert_eq!(reserve, Err(RegistryError::Exhausted { max: 1 }));
    assert_eq!(push, Err(PushError::NoSlot(7)), "item is handed back to the caller");
    assert_eq!(registry.tracked_threads(), 1);
}

#[test]
fn test_push_lands_in_callers_queue() {
    let registry = ThreadRegistry::<u32>::new(2, 16).unwrap();

    let slot = registry.push(11, || true).unwrap();
    registry.push(12, || true).unwrap();

    // 1. The drain side picks up the new queue once
    let mut adopted = registry.adopt_new();
    assert_eq!(adopted.len(), 1);
    assert!(registry.adopt_new().is_empty());

    // 2. Records come out in push order
    let (adopted_slot, consumer) = &mut adopted[0];
    assert_eq!(*adopted_slot, slot);
    assert_eq!(consumer.pop(), Some(11));
    assert_eq!(consumer.pop(), Some(12));
    assert_eq!(consumer.pop(), None);
}

#[test]
fn test_fresh_registry_rebinds_thread() {
    let first = ThreadRegistry::<u32>::new(4, 16).unwrap();
    assert_eq!(first.reserve(), Ok(3));
    drop(first);

    // Same thread, new registry: a new binding, starting from the top again.
    let second = ThreadRegistry::<u32>::new(4, 16).unwrap();
    assert_eq!(second.current_slot(), None);
    assert_eq!(second.reserve(), Ok(3));
    assert_eq!(second.tracked_threads(), 1);
}

#[test]
fn test_invalid_registry_config() {
    assert!(matches!(
        ThreadRegistry::<u32>::new(4, 12),
        Err(TransportError::InvalidQueueCapacity(12))
    ));
    assert!(matches!(ThreadRegistry::<u32>::new(0, 16), Err(TransportError::InvalidConfig(_))));
}

#[test]
fn test_dropped_registry_queue_freed_on_next_lookup() {
    let marker = Arc::new(());
    let registry = ThreadRegistry::<Arc<()>>::new(2, 4).unwrap();
    registry.push(marker.clone(), || true).unwrap();
    assert_eq!(Arc::strong_count(&marker), 2);

    // 1. The thread still holds the old queue in its binding
    drop(registry);
    assert_eq!(Arc::strong_count(&marker), 2);

    // 2. A plain lookup on any registry of this type lets it go
    let next = ThreadRegistry::<Arc<()>>::new(2, 4).unwrap();
    assert_eq!(next.current_slot(), None);
    assert_eq!(Arc::strong_count(&marker), 1, "queued item freed with its queue");
}

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use tracelink::transport::error::{PushError, TransportError};
use tracelink::transport::queue;

#[test]
fn test_non_power_of_two_capacity_is_rejected() {
    for capacity in [0usize, 3, 6, 1000] {
        match queue::channel::<u32>(capacity) {
            Err(TransportError::InvalidQueueCapacity(c)) => assert_eq!(c, capacity),
            _ => panic!("capacity {} should be rejected", capacity),
        }
    }
    assert!(queue::channel::<u32>(1).is_ok());
    assert!(queue::channel::<u32>(64).is_ok());
}

#[test]
fn test_full_queue_blocks_until_consumer_drains() {
    // 1. Fill the ring with no consumer running
    let (mut producer, mut consumer) = queue::channel::<u32>(4).unwrap();
    for i in 0..4 {
        producer.try_push(i).unwrap();
    }
    assert!(producer.is_full());
    assert_eq!(producer.try_push(99), Err(99), "full ring must reject, not overwrite");

    // 2. Producer spins on the 5th push
    let pushed = Arc::new(AtomicBool::new(false));
    let flag = pushed.clone();
    let handle = std::thread::spawn(move || {
        producer.push_with_backoff(4, || true).unwrap();
        flag.store(true, Ordering::SeqCst);
        producer
    });

    std::thread::sleep(Duration::from_millis(50));
    assert!(!pushed.load(Ordering::SeqCst), "push must wait while full");

    // 3. Free one slot; the waiting push lands
    assert_eq!(consumer.pop(), Some(0));
    let _producer = handle.join().unwrap();
    assert!(pushed.load(Ordering::SeqCst));

    // 4. Nothing was overwritten in place
    let drained: Vec<u32> = std::iter::from_fn(|| consumer.pop()).collect();
    assert_eq!(drained, vec![1, 2, 3, 4]);
}

#[test]
fn test_push_is_abandoned_when_wait_is_cancelled() {
    let (mut producer, consumer) = queue::channel::<u32>(2).unwrap();
    producer.try_push(1).unwrap();
    producer.try_push(2).unwrap();

    let connected = Arc::new(AtomicBool::new(true));
    let link = connected.clone();
    let dropper = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(30));
        link.store(false, Ordering::SeqCst);
    });

    let result = producer.push_with_backoff(3, || connected.load(Ordering::SeqCst));
    dropper.join().unwrap();

    assert_eq!(result, Err(PushError::Abandoned(3)));
    assert_eq!(consumer.len(), 2);
}

#[test]
fn test_peek_does_not_consume() {
    let (mut producer, mut consumer) = queue::channel::<&str>(8).unwrap();
    assert!(consumer.peek().is_none());
    producer.try_push("a").unwrap();
    producer.try_push("b").unwrap();

    assert_eq!(consumer.peek(), Some(&"a"));
    assert_eq!(consumer.peek(), Some(&"a"));
    assert_eq!(consumer.pop(), Some("a"));
    assert_eq!(consumer.peek(), Some(&"b"));
}

proptest! {
    #[test]
    fn fifo_law_holds_below_capacity(items in proptest::collection::vec(any::<u64>(), 0..=32)) {
        let (mut producer, mut consumer) = queue::channel::<u64>(32).unwrap();
        for &item in &items {
            prop_assert!(producer.try_push(item).is_ok());
        }

        let mut out = Vec::new();
        while let Some(&head) = consumer.peek() {
            prop_assert_eq!(consumer.pop(), Some(head));
            out.push(head);
        }
        prop_assert_eq!(out, items);
    }
}

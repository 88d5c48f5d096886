use std::collections::HashSet;
use std::sync::Arc;

use tracelink::transport::error::PoolError;
use tracelink::transport::pool::RecordPool;
use tracelink::transport::record::{CommandId, Record};

fn text(seq: u64) -> Record {
    Record::text(CommandId::TEXT, seq, &format!("r{}", seq))
}

#[test]
fn test_freed_slot_is_reused() {
    let pool = RecordPool::new(4, None);

    let a = pool.allocate(text(1)).unwrap();
    assert_eq!(pool.get(a), Some(text(1)));
    assert_eq!(pool.free(a), Ok(text(1)));

    let b = pool.allocate(text(2)).unwrap();
    assert_eq!(b.index(), a.index(), "freed slot should be handed out again");
    assert_ne!(a, b, "reused slot carries a new generation");
    assert_eq!(pool.len(), 1);
}

#[test]
fn test_double_free_is_detected() {
    let pool = RecordPool::new(4, None);
    let handle = pool.allocate(text(1)).unwrap();

    pool.free(handle).unwrap();
    assert_eq!(pool.free(handle), Err(PoolError::StaleHandle(handle)));

    // A stale handle cannot read the slot's next occupant either.
    let _fresh = pool.allocate(text(2)).unwrap();
    assert_eq!(pool.get(handle), None);
    assert_eq!(pool.free(handle), Err(PoolError::StaleHandle(handle)));
}

#[test]
fn test_capped_pool_exhausts_without_panicking() {
    let pool = RecordPool::new(2, Some(2));
    let handles: Vec<_> = (0..4).map(|i| pool.allocate(text(i)).unwrap()).collect();

    assert!(pool.allocate(text(99)).is_none(), "fifth record exceeds two segments of two");
    assert_eq!(pool.capacity(), 4);

    pool.free(handles[0]).unwrap();
    assert!(pool.allocate(text(100)).is_some());
}

#[test]
fn test_pool_grows_by_segment() {
    let pool = RecordPool::new(3, None);
    assert_eq!(pool.capacity(), 0);
    assert_eq!(pool.memory_usage(), 0);

    pool.allocate(text(0)).unwrap();
    assert_eq!(pool.capacity(), 3);
    for i in 1..4 {
        pool.allocate(text(i)).unwrap();
    }
    assert_eq!(pool.capacity(), 6);
    assert!(pool.memory_usage() > 0);
}

#[test]
fn test_outstanding_and_release_all() {
    let pool = RecordPool::new(8, None);
    let kept: Vec<_> = (0..5).map(|i| pool.allocate(text(i)).unwrap()).collect();
    pool.free(kept[2]).unwrap();

    // 1. Iteration sees exactly the live handles
    let outstanding: HashSet<_> = pool.outstanding().into_iter().collect();
    let expected: HashSet<_> = kept.iter().copied().filter(|h| *h != kept[2]).collect();
    assert_eq!(outstanding, expected);

    // 2. Teardown frees them all and invalidates the old handles
    assert_eq!(pool.release_all(), 4);
    assert!(pool.is_empty());
    assert!(kept.iter().all(|h| pool.get(*h).is_none()));
}

#[test]
fn test_concurrent_allocation_yields_unique_handles() {
    let pool = Arc::new(RecordPool::new(16, None));

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let pool = pool.clone();
            std::thread::spawn(move || {
                (0..100)
                    .map(|i| pool.allocate(text(t * 1000 + i)).unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let all: Vec<_> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
    let unique: HashSet<_> = all.iter().copied().collect();
    assert_eq!(unique.len(), 400);
    assert_eq!(pool.len(), 400);
}

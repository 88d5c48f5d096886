use proptest::prelude::*;
use tracelink::transport::collector::Collector;
use tracelink::transport::record::{CommandId, Record};

#[test]
fn test_add_fails_when_full() {
    let mut collector = Collector::new(2);
    assert!(collector.add(Record::new(CommandId::TEXT, 5)));
    assert!(collector.add(Record::new(CommandId::TEXT, 3)));
    assert!(collector.is_full());

    assert!(!collector.add(Record::new(CommandId::TEXT, 1)), "full collector must refuse");
    assert_eq!(collector.len(), 2);
}

#[test]
fn test_reset_keeps_capacity() {
    let mut collector = Collector::new(4);
    for seq in 0..4 {
        collector.add(Record::new(CommandId::EVENT, seq));
    }
    let overhead = collector.memory_overhead();

    collector.reset();
    assert!(collector.is_empty());
    assert_eq!(collector.capacity(), 4);
    assert_eq!(collector.memory_overhead(), overhead);
    assert!(collector.add(Record::new(CommandId::EVENT, 9)));
}

proptest! {
    #[test]
    fn sort_orders_by_sequence(seqs in proptest::collection::vec(any::<u64>(), 0..64)) {
        let mut collector = Collector::new(64);
        for &seq in &seqs {
            prop_assert!(collector.add(Record::new(CommandId::TEXT, seq)));
        }
        collector.sort();

        let sorted = collector.records();
        prop_assert_eq!(sorted.len(), seqs.len());
        for pair in sorted.windows(2) {
            prop_assert!(pair[0].sequence <= pair[1].sequence);
        }
    }
}

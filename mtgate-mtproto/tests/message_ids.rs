use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use mtgate_mtproto::message_id::{MessageIdGenerator, MessageKind, next_message_id};

#[test]
fn sequential_ids_strictly_increase() {
    let ids: Vec<i64> = (0..10_000).map(|_| next_message_id(MessageKind::Response)).collect();
    assert!(ids.windows(2).all(|w| w[0] < w[1]));
    assert!(ids.iter().all(|id| id & 3 == 1));
}

#[test]
fn concurrent_ids_are_unique_and_ordered_per_thread() {
    let generator = Arc::new(MessageIdGenerator::new());
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let generator = Arc::clone(&generator);
            thread::spawn(move || {
                let kind = if i % 2 == 0 { MessageKind::Response } else { MessageKind::Notification };
                (0..2_000).map(|_| generator.next(kind)).collect::<Vec<i64>>()
            })
        })
        .collect();

    let mut seen = HashSet::new();
    for handle in handles {
        let ids = handle.join().unwrap();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        for id in ids {
            assert!(seen.insert(id >> 2), "duplicate base {id}");
        }
    }
    assert_eq!(seen.len(), 16_000);
}

use std::{sync::Arc, thread};

use super::*;

#[test]
fn test_shard_set_basic() {
    let set: ShardedHashSet<String> = ShardedHashSet::default();

    assert!(set.insert("alpha".to_string()));
    assert!(set.insert("beta".to_string()));
    assert!(!set.insert("alpha".to_string()));

    assert!(set.contains(&"alpha".to_string()));
    assert_eq!(set.len(), 2);

    assert!(set.remove(&"alpha".to_string()));
    assert!(!set.remove(&"alpha".to_string()));
    assert_eq!(set.len(), 1);
}

#[test]
fn test_shard_set_scan_releases_latches() {
    let set: ShardedHashSet<u64> = ShardedHashSet::new(4);
    for value in 0..100_u64 {
        set.insert(value);
    }

    let mut seen = vec![];
    set.scan(|value| seen.push(*value));
    seen.sort_unstable();
    assert_eq!(seen, (0..100).collect::<Vec<u64>>());

    // scan left no latch behind; writers proceed.
    assert!(set.insert(1000));
    assert!(set.remove(&1000));
}

#[test]
fn test_shard_set_concurrent() {
    let set: Arc<ShardedHashSet<u64>> = Arc::new(ShardedHashSet::default());
    let n_threads = 8_u64;
    let n_values = 500_u64;

    let mut handles = vec![];
    for id in 0..n_threads {
        let set = Arc::clone(&set);
        handles.push(thread::spawn(move || {
            for i in 0..n_values {
                set.insert(id * n_values + i);
            }
        }));
    }
    for handle in handles.into_iter() {
        handle.join().unwrap();
    }

    assert_eq!(set.len(), (n_threads * n_values) as usize);
    let values = set.to_vec();
    assert_eq!(values.len(), (n_threads * n_values) as usize);
}

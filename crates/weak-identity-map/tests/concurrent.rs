//! Stress tests: concurrent `put`/`get`/`len` racing reclamation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use weak_identity_map::{collect, Key, WeakIdentityMap};

const THREADS: usize = 8;
const KEYS_PER_THREAD: usize = 500;

#[test]
fn test_concurrent_put_get_with_eviction() {
    let map: Arc<WeakIdentityMap<usize>> = Arc::new(WeakIdentityMap::new());
    let survivors: Arc<Vec<Key<usize>>> = Arc::new((0..THREADS).map(Key::new).collect());
    for (i, key) in survivors.iter().enumerate() {
        map.put(key, i).unwrap();
    }

    let barrier = Arc::new(Barrier::new(THREADS + 1));
    let done = Arc::new(AtomicBool::new(false));

    let reader = thread::spawn({
        let map = Arc::clone(&map);
        let survivors = Arc::clone(&survivors);
        let done = Arc::clone(&done);
        move || {
            let mut polls = 0usize;
            while !done.load(Ordering::Acquire) {
                assert!(map.len() >= THREADS);
                for (i, key) in survivors.iter().enumerate() {
                    assert_eq!(map.get(key), Some(i));
                }
                polls += 1;
            }
            polls
        }
    });

    let writers: Vec<_> = (0..THREADS)
        .map(|t| {
            let map = Arc::clone(&map);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..KEYS_PER_THREAD {
                    let key = Key::new(t * KEYS_PER_THREAD + i);
                    map.put(&key, *key).unwrap();
                    assert_eq!(map.get(&key), Some(*key));
                    if i % 64 == 0 {
                        collect();
                    }
                }
            })
        })
        .collect();

    barrier.wait();
    for writer in writers {
        writer.join().unwrap();
    }
    done.store(true, Ordering::Release);
    reader.join().unwrap();

    collect();
    assert_eq!(map.len(), THREADS);
    for (i, key) in survivors.iter().enumerate() {
        assert_eq!(map.get(key), Some(i));
    }
}

#[test]
fn test_shared_keys_dropped_on_many_threads() {
    let map = Arc::new(WeakIdentityMap::new());
    let keys: Vec<Key<u32>> = (0..200).map(Key::new).collect();
    for key in &keys {
        map.put(key, **key).unwrap();
    }

    // Every thread gets a clone of every key; the last clone dropped decides
    // which thread queues the key.
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let clones: Vec<Key<u32>> = keys.iter().cloned().collect();
            let map = Arc::clone(&map);
            thread::spawn(move || {
                for key in clones {
                    assert_eq!(map.get(&key), Some(*key));
                    drop(key);
                }
            })
        })
        .collect();
    drop(keys);

    for handle in handles {
        handle.join().unwrap();
    }
    collect();
    assert!(map.is_empty());
}

#[test]
fn test_many_maps_one_reclaimer() {
    let maps: Vec<Arc<WeakIdentityMap<usize>>> =
        (0..4).map(|_| Arc::new(WeakIdentityMap::new())).collect();

    let handles: Vec<_> = maps
        .iter()
        .map(|map| {
            let map = Arc::clone(map);
            thread::spawn(move || {
                let keys: Vec<Key<usize>> = (0..250).map(Key::new).collect();
                for key in &keys {
                    map.put(key, **key).unwrap();
                }
                assert_eq!(map.len(), 250);
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    collect();
    for map in &maps {
        assert!(map.is_empty());
    }
}

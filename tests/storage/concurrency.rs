//! Concurrent access to a shared entity store
//!
//! Several threads queue requests and mutate data while the main thread
//! flushes between rounds. Seeds are fixed so failures reproduce.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use cadence_foundation::EntityHandle;
use cadence_storage::{EntityAccess, EntityStore};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

struct Counter(u64);

struct Mass(u64);
struct Charge(u64);

/// Polls `progress` until every thread finishes, failing if it stops moving.
fn await_progress(threads: Vec<thread::JoinHandle<()>>, progress: &AtomicU64) {
    let mut last = progress.load(Ordering::SeqCst);
    let mut since = Instant::now();
    while !threads.iter().all(thread::JoinHandle::is_finished) {
        thread::sleep(Duration::from_millis(10));
        let now = progress.load(Ordering::SeqCst);
        if now != last {
            last = now;
            since = Instant::now();
        }
        assert!(
            since.elapsed() < Duration::from_secs(10),
            "column access stalled after {last} operations"
        );
    }
    for handle in threads {
        handle.join().unwrap();
    }
}

#[test]
fn concurrent_creates_all_land_after_flush() {
    let store = EntityStore::shared();
    let threads: Vec<_> = (0..8)
        .map(|t| {
            let access = EntityAccess::new(Arc::clone(&store));
            thread::spawn(move || {
                (0..50)
                    .map(|i| access.create_entity(Some(&format!("t{t}-{i}"))))
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    let uuids: Vec<_> = threads
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();

    assert_eq!(store.pending_len(), 400);
    assert_eq!(store.flush().created, 400);
    assert!(uuids.iter().all(|u| store.handle_of(*u).is_some()));
}

#[test]
fn concurrent_writers_on_disjoint_kinds() {
    let store = EntityStore::shared();
    let uuids: Vec<_> = (0..64).map(|_| store.create_entity(None)).collect();
    store.flush();
    let handles: Vec<EntityHandle> = uuids.iter().map(|u| store.handle_of(*u).unwrap()).collect();
    for &h in &handles {
        store.add_data(h, Counter(0)).unwrap();
        store.add_data(h, 0u32).unwrap();
    }

    let a = EntityAccess::new(Arc::clone(&store));
    let b = EntityAccess::new(Arc::clone(&store));
    let t1 = thread::spawn(move || {
        for _ in 0..100 {
            for (_, c) in a.write::<Counter>().iter_mut() {
                c.0 += 1;
            }
        }
    });
    let t2 = thread::spawn(move || {
        for _ in 0..100 {
            for (_, n) in b.write::<u32>().iter_mut() {
                *n += 2;
            }
        }
    });
    t1.join().unwrap();
    t2.join().unwrap();

    let view = store.view::<(Counter, u32)>();
    assert_eq!(view.len(), 64);
    for (_, (c, n)) in view.iter() {
        assert_eq!(c.0, 100);
        assert_eq!(*n, 200);
    }
}

#[test]
fn randomized_rounds_keep_store_consistent() {
    let store = EntityStore::shared();
    let mut expected_live = 0usize;

    for round in 0..20u64 {
        let workers: Vec<_> = (0..4u64)
            .map(|w| {
                let access = EntityAccess::new(Arc::clone(&store));
                thread::spawn(move || {
                    let mut rng = ChaCha8Rng::seed_from_u64(round * 16 + w);
                    let mut created = 0usize;
                    let mut removed = Vec::new();
                    let live = access.view::<(Counter,)>().handles().collect::<Vec<_>>();
                    for _ in 0..rng.gen_range(1..10) {
                        access.create_entity(None);
                        created += 1;
                    }
                    // Each worker owns every fourth live entity.
                    for handle in live.into_iter().filter(|h| u64::from(h.index) % 4 == w) {
                        if rng.gen_bool(0.3) {
                            access.remove_entity(handle).unwrap();
                            removed.push(handle);
                        }
                    }
                    (created, removed.len())
                })
            })
            .collect();

        let mut created = 0;
        let mut removed = 0;
        for worker in workers {
            let (c, r) = worker.join().unwrap();
            created += c;
            removed += r;
        }

        let stats = store.flush();
        assert_eq!(stats.created, created);
        assert_eq!(stats.destroyed, removed);
        expected_live = expected_live + created - removed;
        assert_eq!(store.len(), expected_live);

        for handle in store.entities() {
            if !store.has_data::<Counter>(handle) {
                store.add_data(handle, Counter(round)).unwrap();
            }
        }
        assert_eq!(store.view::<(Counter,)>().len(), expected_live);
    }
}

#[test]
fn overlapping_views_and_writes_make_progress() {
    let store = EntityStore::shared();
    let uuids: Vec<_> = (0..16).map(|_| store.create_entity(None)).collect();
    store.flush();
    for uuid in uuids {
        let handle = store.handle_of(uuid).unwrap();
        store.add_data(handle, Mass(0)).unwrap();
        store.add_data(handle, Charge(0)).unwrap();
    }

    let progress = Arc::new(AtomicU64::new(0));
    let mass_writes = Arc::new(AtomicU64::new(0));
    let charge_writes = Arc::new(AtomicU64::new(0));
    let threads: Vec<_> = (0..4u64)
        .map(|t| {
            let access = EntityAccess::new(Arc::clone(&store));
            let progress = Arc::clone(&progress);
            let mass_writes = Arc::clone(&mass_writes);
            let charge_writes = Arc::clone(&charge_writes);
            thread::spawn(move || {
                let mut rng = ChaCha8Rng::seed_from_u64(0x5EED + t);
                for _ in 0..4_000 {
                    match rng.gen_range(0..4) {
                        0 => assert_eq!(access.view::<(Mass, Charge)>().len(), 16),
                        1 => assert_eq!(access.view::<(Charge, Mass)>().len(), 16),
                        2 => {
                            for (_, mass) in access.write::<Mass>().iter_mut() {
                                mass.0 += 1;
                            }
                            mass_writes.fetch_add(1, Ordering::SeqCst);
                        }
                        _ => {
                            for (_, charge) in access.write::<Charge>().iter_mut() {
                                charge.0 += 1;
                            }
                            charge_writes.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                    progress.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();

    await_progress(threads, &progress);

    assert_eq!(progress.load(Ordering::SeqCst), 16_000);
    let view = store.view::<(Mass, Charge)>();
    for (_, (mass, charge)) in view.iter() {
        assert_eq!(mass.0, mass_writes.load(Ordering::SeqCst));
        assert_eq!(charge.0, charge_writes.load(Ordering::SeqCst));
    }
}

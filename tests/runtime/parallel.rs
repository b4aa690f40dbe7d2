//! Integration tests for ParallelRuntime
//!
//! Tests dependency-respecting dispatch over randomized graphs, deferred
//! structural changes, units contending for data columns, and failure
//! reporting.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use cadence_foundation::{Error, ErrorKind, Identity, MetaInfo, MetaRegistry, Result};
use cadence_runtime::{BehavioralUnit, FromStore, ParallelRuntime};
use cadence_storage::{EntityAccess, EntityStore};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

// =============================================================================
// Randomized Graphs
// =============================================================================

const NODES: usize = 8;

/// Shared bookkeeping: which nodes finished this tick, and who depends on whom.
struct Board {
    done: Vec<AtomicBool>,
    preds: Vec<Vec<usize>>,
    violations: AtomicUsize,
    runs: AtomicUsize,
}

impl Board {
    fn new(preds: Vec<Vec<usize>>) -> Arc<Self> {
        Arc::new(Self {
            done: (0..NODES).map(|_| AtomicBool::new(false)).collect(),
            preds,
            violations: AtomicUsize::new(0),
            runs: AtomicUsize::new(0),
        })
    }

    fn reset(&self) {
        for flag in &self.done {
            flag.store(false, Ordering::SeqCst);
        }
    }
}

struct Node<const N: usize>(Arc<Board>);

impl<const N: usize> BehavioralUnit for Node<N> {
    fn update(&mut self, _dt: f32) -> Result<()> {
        let board = &self.0;
        if board.preds[N].iter().any(|&p| !board.done[p].load(Ordering::SeqCst)) {
            board.violations.fetch_add(1, Ordering::SeqCst);
        }
        board.runs.fetch_add(1, Ordering::SeqCst);
        board.done[N].store(true, Ordering::SeqCst);
        Ok(())
    }
}

fn node_ids() -> [Identity; NODES] {
    [
        Identity::of::<Node<0>>(),
        Identity::of::<Node<1>>(),
        Identity::of::<Node<2>>(),
        Identity::of::<Node<3>>(),
        Identity::of::<Node<4>>(),
        Identity::of::<Node<5>>(),
        Identity::of::<Node<6>>(),
        Identity::of::<Node<7>>(),
    ]
}

fn register_nodes(rt: &mut ParallelRuntime, board: &Arc<Board>) {
    macro_rules! reg {
        ($($n:literal),+) => {
            $(rt.register_with(|_| Node::<$n>(Arc::clone(board))).unwrap();)+
        };
    }
    // Registration order is scrambled relative to node numbering.
    reg!(5, 2, 7, 0, 3, 6, 1, 4);
}

/// Random forward edges i -> j (i < j), declared as a mix of before and after.
fn random_graph(rng: &mut ChaCha8Rng) -> (MetaRegistry, Vec<Vec<usize>>) {
    let ids = node_ids();
    let mut metas: Vec<MetaInfo> = (0..NODES).map(|_| MetaInfo::new()).collect();
    let mut preds = vec![Vec::new(); NODES];
    for j in 1..NODES {
        for i in 0..j {
            if rng.gen_bool(0.3) {
                preds[j].push(i);
                if rng.gen_bool(0.5) {
                    metas[j] = std::mem::take(&mut metas[j]).update_after_id(ids[i]);
                } else {
                    metas[i] = std::mem::take(&mut metas[i]).update_before_id(ids[j]);
                }
            }
        }
    }
    let mut reg = MetaRegistry::new();
    for (id, meta) in ids.into_iter().zip(metas) {
        reg.declare_id(id, meta).unwrap();
    }
    (reg, preds)
}

#[test]
fn random_graphs_never_start_a_unit_early() {
    let mut rng = ChaCha8Rng::seed_from_u64(0x00C0_FFEE);
    for _ in 0..25 {
        let (reg, preds) = random_graph(&mut rng);
        let board = Board::new(preds);
        let workers = rng.gen_range(1..=4);
        let mut rt = ParallelRuntime::new(EntityStore::shared(), Arc::new(reg), workers).unwrap();
        register_nodes(&mut rt, &board);
        rt.resolve_order().unwrap();

        for _ in 0..10 {
            board.reset();
            let report = rt.tick(0.016).unwrap();
            assert_eq!(report.units_run, NODES);
        }
        assert_eq!(board.violations.load(Ordering::SeqCst), 0);
        assert_eq!(board.runs.load(Ordering::SeqCst), NODES * 10);
    }
}

#[test]
fn cyclic_unit_constraints_fail_to_compile() {
    let ids = node_ids();
    let mut reg = MetaRegistry::new();
    for (i, id) in ids.iter().enumerate() {
        let next = ids[(i + 1) % NODES];
        reg.declare_id(*id, MetaInfo::new().update_before_id(next)).unwrap();
    }
    let board = Board::new(vec![Vec::new(); NODES]);
    let mut rt = ParallelRuntime::new(EntityStore::shared(), Arc::new(reg), 2).unwrap();
    register_nodes(&mut rt, &board);

    let err = rt.resolve_order().unwrap_err();
    let ErrorKind::DependencyCycle { residual } = &err.kind else {
        panic!("expected a cycle, got {err}");
    };
    assert_eq!(residual.len(), NODES);
    assert_eq!(err.context, vec!["resolving behavioral unit order"]);
}

// =============================================================================
// Store Interaction
// =============================================================================

struct Label(&'static str);

struct Creator {
    access: EntityAccess,
    seen: Arc<AtomicUsize>,
}

impl BehavioralUnit for Creator {
    fn update(&mut self, _dt: f32) -> Result<()> {
        self.seen.store(self.access.len(), Ordering::SeqCst);
        self.access.create_entity(Some("spawned"));
        Ok(())
    }
}

struct Labeler {
    access: EntityAccess,
}

impl FromStore for Labeler {
    fn from_store(access: EntityAccess) -> Self {
        Self { access }
    }
}

impl BehavioralUnit for Labeler {
    fn update(&mut self, _dt: f32) -> Result<()> {
        for handle in self.access.entities() {
            if !self.access.has_data::<Label>(handle) {
                self.access.add_data(handle, Label("fresh"))?;
            }
        }
        Ok(())
    }
}

fn creator_registry() -> MetaRegistry {
    let mut reg = MetaRegistry::new();
    reg.declare::<Creator>(MetaInfo::new().update_before::<Labeler>())
        .unwrap();
    reg.declare::<Labeler>(MetaInfo::new()).unwrap();
    reg
}

#[test]
fn creations_become_visible_on_the_next_tick() {
    let store = EntityStore::shared();
    let seen = Arc::new(AtomicUsize::new(usize::MAX));
    let mut rt = ParallelRuntime::new(Arc::clone(&store), Arc::new(creator_registry()), 2).unwrap();
    let seen_by_unit = Arc::clone(&seen);
    rt.register_with(move |access| Creator {
        access,
        seen: seen_by_unit,
    })
    .unwrap();
    rt.register::<Labeler>().unwrap();
    rt.resolve_order().unwrap();

    for tick in 0..4 {
        let report = rt.tick(0.016).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), tick);
        assert_eq!(report.flush.created, usize::from(tick > 0));
    }
    assert_eq!(store.pending_len(), 1);
    assert_eq!(store.len(), 3);
    let view = store.view::<(Label,)>();
    assert_eq!(view.len(), 3);
    assert!(view.iter().all(|(_, (label,))| label.0 == "fresh"));
}

// =============================================================================
// Contended Columns
// =============================================================================

struct Mass(usize);
struct Charge(usize);

#[derive(Default)]
struct Tally {
    operations: AtomicUsize,
    mass_writes: AtomicUsize,
    charge_writes: AtomicUsize,
}

/// Independent unit that mixes two-kind views in both tuple orders with
/// writes to each column.
struct Contender<const N: usize> {
    access: EntityAccess,
    rng: ChaCha8Rng,
    tally: Arc<Tally>,
}

impl<const N: usize> BehavioralUnit for Contender<N> {
    fn update(&mut self, _dt: f32) -> Result<()> {
        for _ in 0..self.rng.gen_range(10..40) {
            let live = self.access.len();
            match self.rng.gen_range(0..4) {
                0 => rows_match(self.access.view::<(Mass, Charge)>().len(), live)?,
                1 => rows_match(self.access.view::<(Charge, Mass)>().len(), live)?,
                2 => {
                    for (_, mass) in self.access.write::<Mass>().iter_mut() {
                        mass.0 += 1;
                    }
                    self.tally.mass_writes.fetch_add(1, Ordering::SeqCst);
                }
                _ => {
                    for (_, charge) in self.access.write::<Charge>().iter_mut() {
                        charge.0 += 1;
                    }
                    self.tally.charge_writes.fetch_add(1, Ordering::SeqCst);
                }
            }
            self.tally.operations.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

fn rows_match(rows: usize, live: usize) -> Result<()> {
    if rows == live {
        Ok(())
    } else {
        Err(Error::new(ErrorKind::Internal(format!("view saw {rows} of {live} entities"))))
    }
}

fn contended_runtime(store: &Arc<EntityStore>, tally: &Arc<Tally>) -> ParallelRuntime {
    let mut reg = MetaRegistry::new();
    reg.declare::<Contender<0>>(MetaInfo::new()).unwrap();
    reg.declare::<Contender<1>>(MetaInfo::new()).unwrap();
    reg.declare::<Contender<2>>(MetaInfo::new()).unwrap();
    reg.declare::<Contender<3>>(MetaInfo::new()).unwrap();
    reg.declare::<Contender<4>>(MetaInfo::new()).unwrap();
    reg.declare::<Contender<5>>(MetaInfo::new()).unwrap();

    let mut rt = ParallelRuntime::new(Arc::clone(store), Arc::new(reg), 4).unwrap();
    macro_rules! contend {
        ($($n:literal),+) => {
            $(rt.register_with(|access| Contender::<$n> {
                access,
                rng: ChaCha8Rng::seed_from_u64(0xC01D + $n),
                tally: Arc::clone(tally),
            })
            .unwrap();)+
        };
    }
    contend!(0, 1, 2, 3, 4, 5);
    rt.resolve_order().unwrap();
    rt
}

#[test]
fn independent_units_share_columns_without_stalling() {
    let store = EntityStore::shared();
    let uuids: Vec<_> = (0..12).map(|_| store.create_entity(None)).collect();
    store.flush();
    for uuid in uuids {
        let handle = store.handle_of(uuid).unwrap();
        store.add_data(handle, Mass(0)).unwrap();
        store.add_data(handle, Charge(0)).unwrap();
    }

    let tally = Arc::new(Tally::default());
    let driver = {
        let store = Arc::clone(&store);
        let tally = Arc::clone(&tally);
        thread::spawn(move || {
            let mut rt = contended_runtime(&store, &tally);
            for _ in 0..200 {
                let report = rt.tick(0.016).unwrap();
                assert_eq!(report.units_run, 6);
            }
        })
    };

    let mut last = 0;
    let mut since = Instant::now();
    while !driver.is_finished() {
        thread::sleep(Duration::from_millis(10));
        let now = tally.operations.load(Ordering::SeqCst);
        if now != last {
            last = now;
            since = Instant::now();
        }
        assert!(
            since.elapsed() < Duration::from_secs(10),
            "units stalled after {last} column operations"
        );
    }
    driver.join().unwrap();

    let view = store.view::<(Mass, Charge)>();
    assert_eq!(view.len(), 12);
    for (_, (mass, charge)) in view.iter() {
        assert_eq!(mass.0, tally.mass_writes.load(Ordering::SeqCst));
        assert_eq!(charge.0, tally.charge_writes.load(Ordering::SeqCst));
    }
}

// =============================================================================
// Failures
// =============================================================================

struct Faulty {
    ran: Arc<AtomicUsize>,
}

struct Panicky {
    ran: Arc<AtomicUsize>,
}

struct Downstream {
    ran: Arc<AtomicUsize>,
}

impl BehavioralUnit for Faulty {
    fn update(&mut self, _dt: f32) -> Result<()> {
        self.ran.fetch_add(1, Ordering::SeqCst);
        Err(Error::new(ErrorKind::Internal("sensor offline".to_string())))
    }
}

impl BehavioralUnit for Panicky {
    fn update(&mut self, _dt: f32) -> Result<()> {
        self.ran.fetch_add(1, Ordering::SeqCst);
        panic!("lost the plot");
    }
}

impl BehavioralUnit for Downstream {
    fn update(&mut self, _dt: f32) -> Result<()> {
        self.ran.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn failures_are_collected_and_dependents_still_run() {
    let mut reg = MetaRegistry::new();
    reg.declare::<Faulty>(MetaInfo::new().update_before::<Downstream>())
        .unwrap();
    reg.declare::<Panicky>(MetaInfo::new().update_before::<Downstream>())
        .unwrap();
    reg.declare::<Downstream>(MetaInfo::new()).unwrap();

    let ran = Arc::new(AtomicUsize::new(0));
    let mut rt = ParallelRuntime::new(EntityStore::shared(), Arc::new(reg), 3).unwrap();
    let (a, b, c) = (Arc::clone(&ran), Arc::clone(&ran), Arc::clone(&ran));
    rt.register_with(move |_| Faulty { ran: a }).unwrap();
    rt.register_with(move |_| Panicky { ran: b }).unwrap();
    rt.register_with(move |_| Downstream { ran: c }).unwrap();
    rt.resolve_order().unwrap();

    let err = rt.tick(0.016).unwrap_err();
    assert_eq!(ran.load(Ordering::SeqCst), 3);
    assert_eq!(err.context, vec!["running tick 1"]);
    let ErrorKind::TickFailed { failures } = &err.kind else {
        panic!("expected a failed tick, got {err}");
    };
    assert_eq!(failures.len(), 2);
    let faulty = failures.iter().find(|f| f.unit == "Faulty").unwrap();
    assert!(!faulty.panicked);
    assert!(faulty.message.contains("sensor offline"));
    let panicky = failures.iter().find(|f| f.unit == "Panicky").unwrap();
    assert!(panicky.panicked);
    assert_eq!(panicky.message, "lost the plot");

    // The runtime stays usable.
    assert!(rt.tick(0.016).is_err());
    assert_eq!(ran.load(Ordering::SeqCst), 6);
    assert_eq!(rt.ticks(), 2);
}

// =============================================================================
// Lifecycle
// =============================================================================

#[test]
fn tick_before_resolve_fails() {
    let mut rt =
        ParallelRuntime::new(EntityStore::shared(), Arc::new(creator_registry()), 1).unwrap();
    rt.register::<Labeler>().unwrap();
    let err = rt.tick(0.016).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::InvalidState { .. }));
    assert_eq!(rt.ticks(), 0);
}

#[test]
fn zero_workers_rejected() {
    let err = ParallelRuntime::new(EntityStore::shared(), Arc::new(creator_registry()), 0)
        .err()
        .unwrap();
    assert!(matches!(err.kind, ErrorKind::InvalidConfig(_)));
}

#[test]
fn undeclared_unit_registration_fails() {
    let mut rt =
        ParallelRuntime::new(EntityStore::shared(), Arc::new(MetaRegistry::new()), 1).unwrap();
    let err = rt.register::<Labeler>().unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Undeclared(_)));
    assert!(rt.is_empty());
}

#[test]
fn empty_runtime_ticks_and_flushes() {
    let store = EntityStore::shared();
    let mut rt =
        ParallelRuntime::new(Arc::clone(&store), Arc::new(MetaRegistry::new()), 1).unwrap();
    rt.resolve_order().unwrap();
    store.create_entity(None);

    let report = rt.tick(0.016).unwrap();
    assert_eq!(report.units_run, 0);
    assert_eq!(report.flush.created, 1);
    assert_eq!(report.store_version(), 1);
}

//! Parallel runtime for behavioral units.
//!
//! Behavioral units are per-tick jobs over a shared [`EntityStore`]. Their
//! declared precedence edges are compiled into a [`TaskGraph`]; each tick the
//! graph is dispatched onto a fixed rayon pool. A finished unit decrements the
//! pending counter of each successor and spawns the ones that reach zero, so a
//! unit starts only after everything it depends on has completed.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use cadence_foundation::{Error, ErrorKind, Identity, MetaRegistry, Phase, Result, UnitFailure};
use cadence_storage::{EntityAccess, EntityStore, FlushStats};
use parking_lot::Mutex;
use rayon::{Scope, ThreadPool, ThreadPoolBuilder};
use tracing::{debug, error, info};

use crate::sequential::RuntimeState;
use crate::task_graph::TaskGraph;

/// A per-tick job bound to the entity store.
///
/// Units run on pool workers, possibly concurrently with any unit they are
/// not ordered against. Structural changes go through the store's deferred
/// queue and become visible at the next tick.
pub trait BehavioralUnit: Send + 'static {
    /// Runs one tick.
    ///
    /// # Errors
    ///
    /// A returned error is recorded as a failure of this tick; it does not
    /// stop other units.
    fn update(&mut self, dt: f32) -> Result<()>;
}

/// Units that can be built from nothing but store access.
pub trait FromStore: Sized {
    /// Builds the unit.
    fn from_store(access: EntityAccess) -> Self;
}

/// What a successful parallel tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// One-based tick counter.
    pub tick: u64,
    /// Units that ran.
    pub units_run: usize,
    /// Wall time spent in the task graph.
    pub elapsed: Duration,
    /// What the pre-tick flush applied.
    pub flush: FlushStats,
}

impl TickReport {
    /// Store version the units observed.
    #[must_use]
    pub fn store_version(&self) -> u64 {
        self.flush.version
    }
}

struct UnitSlot {
    id: Identity,
    unit: Mutex<Box<dyn BehavioralUnit>>,
}

/// Registry and parallel driver of behavioral units.
pub struct ParallelRuntime {
    store: Arc<EntityStore>,
    registry: Arc<MetaRegistry>,
    pool: ThreadPool,
    workers: usize,
    units: Vec<UnitSlot>,
    index: HashMap<Identity, usize>,
    task_graph: Option<TaskGraph>,
    ticks: u64,
    state: RuntimeState,
}

impl ParallelRuntime {
    /// Creates a runtime over `store` with a pool of `workers` threads.
    ///
    /// # Errors
    ///
    /// Returns an error if `workers` is zero or the pool cannot be built.
    pub fn new(store: Arc<EntityStore>, registry: Arc<MetaRegistry>, workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(Error::new(ErrorKind::InvalidConfig(
                "worker pool needs at least one thread".to_string(),
            )));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("cadence-worker-{i}"))
            .build()
            .map_err(|e| Error::new(ErrorKind::WorkerPool(e.to_string())))?;
        info!(workers, "started behavioral unit pool");

        Ok(Self {
            store,
            registry,
            pool,
            workers,
            units: Vec::new(),
            index: HashMap::new(),
            task_graph: None,
            ticks: 0,
            state: RuntimeState::Registering,
        })
    }

    /// Registers `T`, built from store access.
    ///
    /// # Errors
    ///
    /// See [`register_with`](Self::register_with).
    pub fn register<T: BehavioralUnit + FromStore>(&mut self) -> Result<()> {
        self.register_with(T::from_store)
    }

    /// Registers `T`, built by `factory` from store access.
    ///
    /// Units are not filtered by domain. Registering invalidates any
    /// previously compiled task graph.
    ///
    /// # Errors
    ///
    /// Returns an error if `T` has no declared metadata, is already
    /// registered, or the runtime has shut down.
    pub fn register_with<T, F>(&mut self, factory: F) -> Result<()>
    where
        T: BehavioralUnit,
        F: FnOnce(EntityAccess) -> T,
    {
        if !self.state.can_register() {
            return Err(Error::invalid_state("register a unit", self.state));
        }
        let id = Identity::of::<T>();
        self.registry.require(id)?;
        if self.index.contains_key(&id) {
            return Err(Error::already_registered(id));
        }

        let unit = factory(EntityAccess::new(Arc::clone(&self.store)));
        debug!(unit = %id, "registered behavioral unit");

        self.index.insert(id, self.units.len());
        self.units.push(UnitSlot {
            id,
            unit: Mutex::new(Box::new(unit)),
        });
        self.task_graph = None;
        self.state = RuntimeState::Registering;
        Ok(())
    }

    /// Compiles the task graph from the units' update constraints.
    ///
    /// # Errors
    ///
    /// Returns an error on cyclic constraints or undeclared identities.
    pub fn resolve_order(&mut self) -> Result<()> {
        if !self.state.can_register() {
            return Err(Error::invalid_state("resolve unit order", self.state));
        }
        let nodes: Vec<Identity> = self.units.iter().map(|slot| slot.id).collect();
        let graph = self
            .registry
            .dependency_graph(&nodes, Phase::Update)
            .and_then(|graph| TaskGraph::compile(&graph))
            .map_err(|e| e.with_context("resolving behavioral unit order"))?;

        info!(
            units = graph.len(),
            edges = graph.edge_count(),
            critical_path = graph.critical_path_len(),
            "compiled task graph"
        );
        self.task_graph = Some(graph);
        self.state = RuntimeState::Ordered;
        Ok(())
    }

    /// Flushes the store, then runs every unit once.
    ///
    /// Blocks until the whole graph has drained. A unit that returns an error
    /// or panics is recorded; its dependents still run.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the graph has not been compiled, `TickFailed` with
    /// every recorded failure if any unit failed.
    pub fn tick(&mut self, dt: f32) -> Result<TickReport> {
        if !self.state.can_tick() {
            return Err(Error::invalid_state("tick units", self.state));
        }
        let Some(graph) = self.task_graph.as_ref() else {
            return Err(Error::invalid_state("tick units", "task graph is not compiled"));
        };
        self.state = RuntimeState::Running;
        self.ticks += 1;
        let tick = self.ticks;

        let flush = self.store.flush();
        let started = Instant::now();

        let dispatch = Dispatch::new(graph, &self.units, dt);
        self.pool.scope(|scope| {
            for &root in graph.roots() {
                dispatch.spawn(scope, root);
            }
        });

        let elapsed = started.elapsed();
        let Dispatch { failures, ran, .. } = dispatch;
        let failures = failures.into_inner();
        let units_run = ran.into_inner();

        if !failures.is_empty() {
            return Err(Error::tick_failed(failures).with_context(format!("running tick {tick}")));
        }
        debug!(tick, units_run, elapsed = ?elapsed, "tick complete");
        Ok(TickReport {
            tick,
            units_run,
            elapsed,
            flush,
        })
    }

    /// Destroys every unit in reverse registration order.
    ///
    /// Calling it again is a no-op.
    pub fn shutdown(&mut self) {
        if self.state == RuntimeState::Destroyed {
            return;
        }
        self.state = RuntimeState::ShuttingDown;
        while let Some(slot) = self.units.pop() {
            debug!(unit = %slot.id, "destroying behavioral unit");
            drop(slot);
        }
        self.index.clear();
        self.task_graph = None;
        self.state = RuntimeState::Destroyed;
    }

    /// The compiled task graph, if resolved.
    #[must_use]
    pub fn task_graph(&self) -> Option<&TaskGraph> {
        self.task_graph.as_ref()
    }

    /// Worker threads in the pool.
    #[must_use]
    pub fn worker_threads(&self) -> usize {
        self.workers
    }

    /// Number of registered units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Returns true if no unit is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Registered identities in registration order.
    #[must_use]
    pub fn registered(&self) -> Vec<Identity> {
        self.units.iter().map(|slot| slot.id).collect()
    }

    /// Ticks run so far.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> RuntimeState {
        self.state
    }

    /// The store the units are bound to.
    #[must_use]
    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }
}

impl Drop for ParallelRuntime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for ParallelRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParallelRuntime")
            .field("workers", &self.workers)
            .field("state", &self.state)
            .field("units", &self.registered())
            .field("ticks", &self.ticks)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Dispatch
// =============================================================================

/// Per-tick dispatch state shared by every spawned task.
struct Dispatch<'a> {
    graph: &'a TaskGraph,
    units: &'a [UnitSlot],
    pending: Vec<AtomicUsize>,
    failures: Mutex<Vec<UnitFailure>>,
    ran: AtomicUsize,
    dt: f32,
}

impl<'a> Dispatch<'a> {
    fn new(graph: &'a TaskGraph, units: &'a [UnitSlot], dt: f32) -> Self {
        let pending = (0..graph.len())
            .map(|i| AtomicUsize::new(graph.predecessor_count(i)))
            .collect();
        Self {
            graph,
            units,
            pending,
            failures: Mutex::new(Vec::new()),
            ran: AtomicUsize::new(0),
            dt,
        }
    }

    fn spawn<'s>(&'s self, scope: &Scope<'s>, node: usize) {
        scope.spawn(move |scope| {
            self.run(node);
            for &next in self.graph.successors(node) {
                // AcqRel: the last predecessor's writes happen-before `next` starts.
                if self.pending[next].fetch_sub(1, Ordering::AcqRel) == 1 {
                    self.spawn(scope, next);
                }
            }
        });
    }

    fn run(&self, node: usize) {
        let slot = &self.units[node];
        let mut unit = slot.unit.lock();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| unit.update(self.dt)));
        drop(unit);
        self.ran.fetch_add(1, Ordering::Relaxed);

        let failure = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(err)) => UnitFailure {
                unit: slot.id.to_string(),
                message: err.diagnostic(),
                panicked: false,
            },
            Err(payload) => UnitFailure {
                unit: slot.id.to_string(),
                message: panic_message(payload.as_ref()),
                panicked: true,
            },
        };
        error!(unit = %slot.id, failure = %failure, "behavioral unit failed");
        self.failures.lock().push(failure);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// =============================================================================
// Tests
// =============================================================================

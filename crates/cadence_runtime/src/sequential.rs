//! Sequential runtime for singleton subsystems.
//!
//! Subsystems are side-effecting singletons (window, renderer, UI layer) that
//! must run one after another on the calling thread. Each one is registered at
//! most once per runtime, filtered by capability domain, and ticked in two
//! passes whose orders come from the declared metadata.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use cadence_foundation::{Domain, Error, ErrorKind, Identity, MetaRegistry, Phase, Result};
use tracing::{debug, info, trace};

/// A singleton component driven by the [`SequentialRuntime`].
///
/// Both passes default to doing nothing, so a subsystem only implements the
/// ones it takes part in. Teardown belongs in `Drop`, which runs in reverse
/// registration order at shutdown.
pub trait Subsystem: 'static {
    /// Main update pass.
    fn update(&mut self, _dt: f32) {}

    /// Post-update pass, run after the behavioral units.
    fn post_update(&mut self, _dt: f32) {}
}

/// Object-safe wrapper adding downcasting to [`Subsystem`].
trait ErasedSubsystem {
    fn update(&mut self, dt: f32);
    fn post_update(&mut self, dt: f32);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Subsystem> ErasedSubsystem for T {
    fn update(&mut self, dt: f32) {
        Subsystem::update(self, dt);
    }

    fn post_update(&mut self, dt: f32) {
        Subsystem::post_update(self, dt);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Lifecycle of a runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RuntimeState {
    /// Accepting registrations; no order resolved yet.
    Registering,
    /// Orders resolved; ready to tick.
    Ordered,
    /// At least one tick has run.
    Running,
    /// Instances are being destroyed.
    ShuttingDown,
    /// Every instance has been destroyed.
    Destroyed,
}

impl RuntimeState {
    /// Returns true if ticks may run.
    #[must_use]
    pub fn can_tick(self) -> bool {
        matches!(self, RuntimeState::Ordered | RuntimeState::Running)
    }

    /// Returns true if new components may be registered.
    #[must_use]
    pub fn can_register(self) -> bool {
        matches!(self, RuntimeState::Registering | RuntimeState::Ordered)
    }
}

impl fmt::Display for RuntimeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RuntimeState::Registering => "registering",
            RuntimeState::Ordered => "ordered",
            RuntimeState::Running => "running",
            RuntimeState::ShuttingDown => "shutting down",
            RuntimeState::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

struct Slot {
    id: Identity,
    instance: Box<dyn ErasedSubsystem>,
}

/// Registry and driver of singleton subsystems.
pub struct SequentialRuntime {
    domain: Domain,
    registry: Arc<MetaRegistry>,
    slots: Vec<Slot>,
    index: HashMap<Identity, usize>,
    skipped: Vec<(Identity, Domain)>,
    update_order: Vec<usize>,
    post_update_order: Vec<usize>,
    state: RuntimeState,
}

impl SequentialRuntime {
    /// Creates a runtime for the given active domain.
    #[must_use]
    pub fn new(domain: Domain, registry: Arc<MetaRegistry>) -> Self {
        Self {
            domain,
            registry,
            slots: Vec::new(),
            index: HashMap::new(),
            skipped: Vec::new(),
            update_order: Vec::new(),
            post_update_order: Vec::new(),
            state: RuntimeState::Registering,
        }
    }

    /// Registers `T`, constructing it with `Default`.
    ///
    /// # Errors
    ///
    /// See [`register_with`](Self::register_with).
    pub fn register<T: Subsystem + Default>(&mut self) -> Result<bool> {
        self.register_with(T::default)
    }

    /// Registers `T`, constructing it with `factory`.
    ///
    /// Returns `Ok(false)` without calling the factory when `T`'s declared
    /// domain does not fit the active domain. Registering invalidates any
    /// previously resolved order.
    ///
    /// # Errors
    ///
    /// Returns an error if `T` has no declared metadata, is already
    /// registered, or the runtime is past its registration phase.
    pub fn register_with<T, F>(&mut self, factory: F) -> Result<bool>
    where
        T: Subsystem,
        F: FnOnce() -> T,
    {
        if !self.state.can_register() {
            return Err(Error::invalid_state("register a subsystem", self.state));
        }

        let id = Identity::of::<T>();
        let required = self.registry.require(id)?.domain_mask();

        if self.index.contains_key(&id) {
            return Err(Error::already_registered(id));
        }
        if !self.domain.admits(required) {
            info!(
                subsystem = %id,
                required = %required,
                active = %self.domain,
                "skipping subsystem outside active domain"
            );
            if !self.skipped.iter().any(|(skipped, _)| *skipped == id) {
                self.skipped.push((id, required));
            }
            return Ok(false);
        }

        let started = Instant::now();
        let instance = factory();
        let elapsed = started.elapsed();
        info!(
            subsystem = %id,
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            "created subsystem"
        );

        self.index.insert(id, self.slots.len());
        self.slots.push(Slot {
            id,
            instance: Box::new(instance),
        });
        self.state = RuntimeState::Registering;
        Ok(true)
    }

    /// Resolves the update and post-update orders.
    ///
    /// Only registered subsystems take part; constraints naming declared but
    /// unregistered identities are treated as satisfied.
    ///
    /// # Errors
    ///
    /// Returns an error on cyclic constraints or undeclared identities.
    pub fn resolve_order(&mut self) -> Result<()> {
        if !self.state.can_register() {
            return Err(Error::invalid_state("resolve subsystem order", self.state));
        }
        let nodes: Vec<Identity> = self.slots.iter().map(|slot| slot.id).collect();

        let update = self.sorted_indices(&nodes, Phase::Update)?;
        let post_update = self.sorted_indices(&nodes, Phase::PostUpdate)?;

        info!(order = %self.describe(&update), "resolved subsystem update order");
        info!(order = %self.describe(&post_update), "resolved subsystem post-update order");

        self.update_order = update;
        self.post_update_order = post_update;
        self.state = RuntimeState::Ordered;
        Ok(())
    }

    fn sorted_indices(&self, nodes: &[Identity], phase: Phase) -> Result<Vec<usize>> {
        let context = || format!("resolving subsystem {phase} order");
        let order = self
            .registry
            .dependency_graph(nodes, phase)
            .and_then(|graph| graph.sort())
            .map_err(|e| e.with_context(context()))?;
        order
            .into_iter()
            .map(|id| {
                self.index
                    .get(&id)
                    .copied()
                    .ok_or_else(|| Error::not_registered(id).with_context(context()))
            })
            .collect()
    }

    fn describe(&self, order: &[usize]) -> String {
        order
            .iter()
            .map(|&i| self.slots[i].id.name())
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    /// Runs the update pass.
    ///
    /// # Errors
    ///
    /// Returns an error if the order has not been resolved.
    pub fn tick(&mut self, dt: f32) -> Result<()> {
        self.begin_pass("tick subsystems")?;
        for &i in &self.update_order {
            let slot = &mut self.slots[i];
            trace!(subsystem = %slot.id, "update");
            slot.instance.update(dt);
        }
        Ok(())
    }

    /// Runs the post-update pass.
    ///
    /// # Errors
    ///
    /// Returns an error if the order has not been resolved.
    pub fn post_tick(&mut self, dt: f32) -> Result<()> {
        self.begin_pass("post-tick subsystems")?;
        for &i in &self.post_update_order {
            let slot = &mut self.slots[i];
            trace!(subsystem = %slot.id, "post-update");
            slot.instance.post_update(dt);
        }
        Ok(())
    }

    fn begin_pass(&mut self, operation: &'static str) -> Result<()> {
        if !self.state.can_tick() {
            return Err(Error::invalid_state(operation, self.state));
        }
        self.state = RuntimeState::Running;
        Ok(())
    }

    /// Shared access to the registered instance of `T`.
    ///
    /// # Errors
    ///
    /// `FilteredByDomain` if `T` was skipped at registration,
    /// `NotRegistered` if it never was registered.
    pub fn lookup<T: Subsystem>(&self) -> Result<&T> {
        let i = self.slot_of::<T>()?;
        self.slots[i]
            .instance
            .as_any()
            .downcast_ref::<T>()
            .ok_or_else(mismatched::<T>)
    }

    /// Exclusive access to the registered instance of `T`.
    ///
    /// # Errors
    ///
    /// Same as [`lookup`](Self::lookup).
    pub fn lookup_mut<T: Subsystem>(&mut self) -> Result<&mut T> {
        let i = self.slot_of::<T>()?;
        self.slots[i]
            .instance
            .as_any_mut()
            .downcast_mut::<T>()
            .ok_or_else(mismatched::<T>)
    }

    fn slot_of<T: Subsystem>(&self) -> Result<usize> {
        let id = Identity::of::<T>();
        if let Some(&i) = self.index.get(&id) {
            return Ok(i);
        }
        if let Some(&(_, required)) = self.skipped.iter().find(|(skipped, _)| *skipped == id) {
            return Err(Error::new(ErrorKind::FilteredByDomain {
                identity: id.to_string(),
                required,
                active: self.domain,
            }));
        }
        Err(Error::not_registered(id))
    }

    /// Returns true if `T` is registered.
    #[must_use]
    pub fn contains<T: Subsystem>(&self) -> bool {
        self.index.contains_key(&Identity::of::<T>())
    }

    /// Destroys every instance in reverse registration order.
    ///
    /// Calling it again is a no-op.
    pub fn shutdown(&mut self) {
        if self.state == RuntimeState::Destroyed {
            return;
        }
        self.state = RuntimeState::ShuttingDown;
        while let Some(slot) = self.slots.pop() {
            info!(subsystem = %slot.id, "destroying subsystem");
            drop(slot);
        }
        self.index.clear();
        self.update_order.clear();
        self.post_update_order.clear();
        self.state = RuntimeState::Destroyed;
        debug!("sequential runtime destroyed");
    }

    /// Resolved update order.
    #[must_use]
    pub fn update_order(&self) -> Vec<Identity> {
        self.update_order.iter().map(|&i| self.slots[i].id).collect()
    }

    /// Resolved post-update order.
    #[must_use]
    pub fn post_update_order(&self) -> Vec<Identity> {
        self.post_update_order
            .iter()
            .map(|&i| self.slots[i].id)
            .collect()
    }

    /// Registered identities in registration order.
    #[must_use]
    pub fn registered(&self) -> Vec<Identity> {
        self.slots.iter().map(|slot| slot.id).collect()
    }

    /// Identities skipped because of their domain.
    #[must_use]
    pub fn skipped(&self) -> Vec<Identity> {
        self.skipped.iter().map(|(id, _)| *id).collect()
    }

    /// Number of registered subsystems.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> RuntimeState {
        self.state
    }

    /// Active capability domain.
    #[must_use]
    pub fn domain(&self) -> Domain {
        self.domain
    }
}

fn mismatched<T: 'static>() -> Error {
    Error::new(ErrorKind::Internal(format!(
        "slot for {} holds another type",
        Identity::of::<T>()
    )))
}

impl Drop for SequentialRuntime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for SequentialRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequentialRuntime")
            .field("domain", &self.domain)
            .field("state", &self.state)
            .field("registered", &self.registered())
            .field("skipped", &self.skipped())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================

//! The engine frame loop.
//!
//! Each frame runs the subsystem update pass, then the behavioral units (which
//! flush the entity store first), then the subsystem post-update pass. Any
//! error aborts the loop and is returned to the caller.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use cadence_foundation::{MetaRegistry, Result};
use cadence_storage::EntityStore;
use tracing::{debug, info};

use crate::config::RuntimeConfig;
use crate::parallel::{ParallelRuntime, TickReport};
use crate::sequential::SequentialRuntime;

/// Cloneable handle that asks a running engine to stop after the current frame.
#[derive(Clone, Debug, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Requests a stop.
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Returns true once a stop was requested.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// What one frame did.
#[derive(Debug, Clone, Copy)]
pub struct FrameReport {
    /// One-based frame counter.
    pub frame: u64,
    /// Delta time handed to every pass, in seconds.
    pub dt: f32,
    /// Report of the parallel tick.
    pub tick: TickReport,
    /// Time the frame limiter slept.
    pub slept: Duration,
}

/// Owns the entity store and both runtimes and drives them frame by frame.
pub struct Engine {
    config: RuntimeConfig,
    store: Arc<EntityStore>,
    subsystems: SequentialRuntime,
    units: ParallelRuntime,
    stop: StopHandle,
    last_frame: Option<Instant>,
    frames: u64,
}

impl Engine {
    /// Creates an engine from a configuration and the declared metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the worker pool
    /// cannot be created.
    pub fn new(config: RuntimeConfig, registry: MetaRegistry) -> Result<Self> {
        config.validate()?;
        let registry = Arc::new(registry);
        let store = EntityStore::shared();
        let subsystems = SequentialRuntime::new(config.domain, Arc::clone(&registry));
        let units = ParallelRuntime::new(
            Arc::clone(&store),
            registry,
            config.resolved_worker_threads(),
        )?;
        info!(domain = %config.domain, workers = units.worker_threads(), "engine created");

        Ok(Self {
            config,
            store,
            subsystems,
            units,
            stop: StopHandle::default(),
            last_frame: None,
            frames: 0,
        })
    }

    /// The subsystem runtime, for registration and lookup.
    pub fn subsystems(&mut self) -> &mut SequentialRuntime {
        &mut self.subsystems
    }

    /// The behavioral unit runtime, for registration.
    pub fn units(&mut self) -> &mut ParallelRuntime {
        &mut self.units
    }

    /// The shared entity store.
    #[must_use]
    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    /// The configuration the engine was built with.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// A handle that stops [`run`](Self::run) from another thread.
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Frames run so far.
    #[must_use]
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Resolves both runtimes' orders and starts the frame clock.
    ///
    /// # Errors
    ///
    /// Returns an error on cyclic or undeclared constraints.
    pub fn start(&mut self) -> Result<()> {
        self.subsystems
            .resolve_order()
            .map_err(|e| e.with_context("starting engine"))?;
        self.units
            .resolve_order()
            .map_err(|e| e.with_context("starting engine"))?;
        self.last_frame = Some(Instant::now());
        info!(
            subsystems = self.subsystems.len(),
            skipped = self.subsystems.skipped().len(),
            units = self.units.len(),
            "engine started"
        );
        Ok(())
    }

    /// Runs one frame: update pass, parallel tick, post-update pass.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine was not started or any pass fails.
    pub fn frame(&mut self) -> Result<FrameReport> {
        let frame_start = Instant::now();
        let since_last = self
            .last_frame
            .map_or(Duration::ZERO, |last| frame_start.duration_since(last));
        self.last_frame = Some(frame_start);
        let dt = since_last.as_secs_f32().max(self.config.min_delta);

        self.frames += 1;
        let frame = self.frames;
        let context = || format!("running frame {frame}");

        self.subsystems.tick(dt).map_err(|e| e.with_context(context()))?;
        let tick = self.units.tick(dt).map_err(|e| e.with_context(context()))?;
        self.subsystems
            .post_tick(dt)
            .map_err(|e| e.with_context(context()))?;

        let slept = self.limit_frame(frame_start.elapsed());
        debug!(frame, dt, slept = ?slept, "frame complete");
        Ok(FrameReport {
            frame,
            dt,
            tick,
            slept,
        })
    }

    /// Sleeps half of the time left in the frame budget.
    fn limit_frame(&self, spent: Duration) -> Duration {
        if !self.config.frame_limiter {
            return Duration::ZERO;
        }
        match self.config.target_frame_time.checked_sub(spent) {
            Some(remaining) if !remaining.is_zero() => {
                let nap = remaining / 2;
                thread::sleep(nap);
                nap
            }
            _ => Duration::ZERO,
        }
    }

    /// Runs frames until stopped or `max_frames` have run.
    ///
    /// Starts the engine first if needed. Returns the number of frames run by
    /// this call.
    ///
    /// # Errors
    ///
    /// Returns the first error of any frame.
    pub fn run(&mut self, max_frames: Option<u64>) -> Result<u64> {
        if self.last_frame.is_none() {
            self.start()?;
        }
        let mut ran = 0;
        while !self.stop.is_stopped() && max_frames.is_none_or(|max| ran < max) {
            self.frame()?;
            ran += 1;
        }
        info!(frames = ran, "frame loop finished");
        Ok(ran)
    }

    /// Tears down units, then subsystems in reverse registration order.
    pub fn shutdown(&mut self) {
        info!(frames = self.frames, "engine shutting down");
        self.units.shutdown();
        self.subsystems.shutdown();
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.units.shutdown();
        self.subsystems.shutdown();
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("frames", &self.frames)
            .field("subsystems", &self.subsystems)
            .field("units", &self.units)
            .finish_non_exhaustive()
    }
}

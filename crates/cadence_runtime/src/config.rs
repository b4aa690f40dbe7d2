//! Runtime configuration.

use std::time::Duration;

use cadence_foundation::{Domain, Error, ErrorKind, LaunchMode, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Target frame time of the frame limiter (about 60 frames per second).
pub const DEFAULT_TARGET_FRAME_TIME: Duration = Duration::from_micros(16_600);

/// Smallest delta time handed to a tick, in seconds.
pub const DEFAULT_MIN_DELTA: f32 = 0.0001;

/// Configuration for an [`Engine`](crate::Engine) and its runtimes.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RuntimeConfig {
    /// Active capability domain.
    pub domain: Domain,

    /// Worker threads for behavioral units (`None` = half the available cores).
    pub worker_threads: Option<usize>,

    /// Frame time the limiter aims for.
    pub target_frame_time: Duration,

    /// Lower bound for the delta time passed to ticks, in seconds.
    pub min_delta: f32,

    /// Whether the frame loop sleeps off spare frame time.
    pub frame_limiter: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            domain: Domain::ALL,
            worker_threads: None,
            target_frame_time: DEFAULT_TARGET_FRAME_TIME,
            min_delta: DEFAULT_MIN_DELTA,
            frame_limiter: true,
        }
    }
}

impl RuntimeConfig {
    /// Configuration for a launch mode.
    #[must_use]
    pub fn for_mode(mode: LaunchMode) -> Self {
        Self::default().with_domain(mode.domain())
    }

    /// Editor preset: every domain enabled.
    #[must_use]
    pub fn editor() -> Self {
        Self::for_mode(LaunchMode::Editor)
    }

    /// Client preset.
    #[must_use]
    pub fn client() -> Self {
        Self::for_mode(LaunchMode::Client)
    }

    /// Headless server preset. Runs unthrottled.
    #[must_use]
    pub fn server() -> Self {
        Self::for_mode(LaunchMode::ServerNoUi).with_frame_limiter(false)
    }

    /// Builder method to set the active domain.
    #[must_use]
    pub fn with_domain(mut self, domain: Domain) -> Self {
        self.domain = domain;
        self
    }

    /// Builder method to set the worker thread count.
    #[must_use]
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = Some(threads);
        self
    }

    /// Builder method to set the target frame time.
    #[must_use]
    pub fn with_target_frame_time(mut self, frame_time: Duration) -> Self {
        self.target_frame_time = frame_time;
        self
    }

    /// Builder method to set the minimum delta time.
    #[must_use]
    pub fn with_min_delta(mut self, min_delta: f32) -> Self {
        self.min_delta = min_delta;
        self
    }

    /// Builder method to enable/disable the frame limiter.
    #[must_use]
    pub fn with_frame_limiter(mut self, enabled: bool) -> Self {
        self.frame_limiter = enabled;
        self
    }

    /// Worker thread count, resolving the automatic default.
    #[must_use]
    pub fn resolved_worker_threads(&self) -> usize {
        self.worker_threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get() / 2)
                .unwrap_or(1)
                .max(1)
        })
    }

    /// Checks that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns an error for zero worker threads, a zero frame time, or a
    /// minimum delta that is not a positive finite number.
    pub fn validate(&self) -> Result<()> {
        if self.worker_threads == Some(0) {
            return Err(invalid("worker_threads must be at least 1"));
        }
        if self.target_frame_time.is_zero() {
            return Err(invalid("target_frame_time must be non-zero"));
        }
        if !(self.min_delta.is_finite() && self.min_delta > 0.0) {
            return Err(invalid("min_delta must be a positive number"));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> Error {
    Error::new(ErrorKind::InvalidConfig(message.to_string()))
}

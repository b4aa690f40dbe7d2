//! Error types for the Cadence system.
//!
//! Uses `thiserror` for ergonomic error definition with rich context.
//!
//! Every condition the scheduler treats as fatal (cyclic constraints, lookups of
//! missing subsystems, unknown entities) is reported as an [`Error`] rather than
//! a panic. The engine bootstrap decides to abort; the core never guesses a
//! best-effort fallback.

use std::fmt;

use thiserror::Error;

use crate::domain::Domain;
use crate::entity::{EntityHandle, EntityRef};

/// The main error type for Cadence operations.
#[derive(Debug, Clone, Error)]
#[error("{kind}")]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// Frames describing what was being done when the error occurred,
    /// innermost first.
    pub context: Vec<String>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: Vec::new(),
        }
    }

    /// Adds a context frame to this error.
    #[must_use]
    pub fn with_context(mut self, frame: impl Into<String>) -> Self {
        self.context.push(frame.into());
        self
    }

    /// Renders the error together with its context frames.
    ///
    /// This is the diagnostic printed when a fatal error aborts the engine.
    #[must_use]
    pub fn diagnostic(&self) -> String {
        let mut out = self.kind.to_string();
        for frame in &self.context {
            out.push_str("\n  while ");
            out.push_str(frame);
        }
        out
    }

    /// Creates a self-dependency error.
    #[must_use]
    pub fn self_dependency(node: impl fmt::Display) -> Self {
        Self::new(ErrorKind::SelfDependency(node.to_string()))
    }

    /// Creates a dependency cycle error naming the residual nodes.
    #[must_use]
    pub fn dependency_cycle<N: fmt::Display>(residual: impl IntoIterator<Item = N>) -> Self {
        Self::new(ErrorKind::DependencyCycle {
            residual: residual.into_iter().map(|n| n.to_string()).collect(),
        })
    }

    /// Creates an unknown graph node error.
    #[must_use]
    pub fn unknown_node(node: impl fmt::Display) -> Self {
        Self::new(ErrorKind::UnknownNode(node.to_string()))
    }

    /// Creates an error for an identity that has no declared metadata.
    #[must_use]
    pub fn undeclared(identity: impl fmt::Display) -> Self {
        Self::new(ErrorKind::Undeclared(identity.to_string()))
    }

    /// Creates an error for an identity registered twice.
    #[must_use]
    pub fn already_registered(identity: impl fmt::Display) -> Self {
        Self::new(ErrorKind::AlreadyRegistered(identity.to_string()))
    }

    /// Creates an error for a lookup of an identity that was never registered.
    #[must_use]
    pub fn not_registered(identity: impl fmt::Display) -> Self {
        Self::new(ErrorKind::NotRegistered(identity.to_string()))
    }

    /// Creates an unknown entity error.
    #[must_use]
    pub fn unknown_entity(entity: impl Into<EntityRef>) -> Self {
        Self::new(ErrorKind::UnknownEntity(entity.into()))
    }

    /// Creates a stale entity handle error.
    #[must_use]
    pub fn stale_entity(handle: EntityHandle) -> Self {
        Self::new(ErrorKind::StaleEntity(handle))
    }

    /// Creates an invalid lifecycle state error.
    #[must_use]
    pub fn invalid_state(operation: &'static str, state: impl fmt::Display) -> Self {
        Self::new(ErrorKind::InvalidState {
            operation,
            state: state.to_string(),
        })
    }

    /// Creates a failed tick error.
    #[must_use]
    pub fn tick_failed(failures: Vec<UnitFailure>) -> Self {
        Self::new(ErrorKind::TickFailed { failures })
    }
}

/// Categorized error kinds for pattern matching.
#[derive(Debug, Clone, Error)]
pub enum ErrorKind {
    /// A component declared an ordering constraint on itself.
    #[error("self dependency declared by {0}")]
    SelfDependency(String),

    /// Metadata for an identity was declared twice.
    #[error("metadata already declared for {0}")]
    AlreadyDeclared(String),

    /// An identity was registered twice in the same runtime.
    #[error("{0} is already registered")]
    AlreadyRegistered(String),

    /// An identity was used without declared metadata.
    #[error("no metadata declared for {0}")]
    Undeclared(String),

    /// An edge referenced a node that is not part of the graph.
    #[error("unknown graph node: {0}")]
    UnknownNode(String),

    /// Ordering constraints contain a cycle.
    #[error("dependency cycle among [{}]", .residual.join(", "))]
    DependencyCycle {
        /// Nodes that could not be ordered, in registration order.
        residual: Vec<String>,
    },

    /// Lookup of an identity that was never registered.
    #[error("{0} is not registered")]
    NotRegistered(String),

    /// Lookup of an identity skipped because of its capability domain.
    #[error("{identity} requires domain '{required}' but the active domain is '{active}'")]
    FilteredByDomain {
        /// The identity that was skipped.
        identity: String,
        /// The domain mask the identity declared.
        required: Domain,
        /// The domain the runtime was created with.
        active: Domain,
    },

    /// Entity identifier unknown to both the live set and the pending queue.
    #[error("entity not found: {0}")]
    UnknownEntity(EntityRef),

    /// Entity handle is stale (generation mismatch or destroyed).
    #[error("stale entity handle: {0:?}")]
    StaleEntity(EntityHandle),

    /// A data block of this kind is already attached.
    #[error("{kind} already attached to {entity:?}")]
    DataAlreadyPresent {
        /// The entity that was modified.
        entity: EntityHandle,
        /// The data kind name.
        kind: &'static str,
    },

    /// A data block of this kind is not attached.
    #[error("{kind} not attached to {entity:?}")]
    DataMissing {
        /// The entity that was queried.
        entity: EntityHandle,
        /// The data kind name.
        kind: &'static str,
    },

    /// An operation was called in the wrong lifecycle state.
    #[error("cannot {operation} while {state}")]
    InvalidState {
        /// The operation that was attempted.
        operation: &'static str,
        /// The state the runtime was in.
        state: String,
    },

    /// One or more behavioral units failed during a tick.
    #[error("tick failed: {} unit(s) failed{}", .failures.len(), first_failure(.failures))]
    TickFailed {
        /// Every unit failure recorded during the tick.
        failures: Vec<UnitFailure>,
    },

    /// The worker pool could not be created.
    #[error("worker pool error: {0}")]
    WorkerPool(String),

    /// Configuration values are out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Internal error (should not happen).
    #[error("internal error: {0}")]
    Internal(String),
}

fn first_failure(failures: &[UnitFailure]) -> String {
    failures
        .first()
        .map(|f| format!(" (first: {f})"))
        .unwrap_or_default()
}

/// A behavioral unit failure recorded during a parallel tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitFailure {
    /// Display name of the failing unit.
    pub unit: String,
    /// Error message or panic payload.
    pub message: String,
    /// Whether the unit panicked rather than returning an error.
    pub panicked: bool,
}

impl fmt::Display for UnitFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.panicked {
            write!(f, "{} panicked: {}", self.unit, self.message)
        } else {
            write!(f, "{}: {}", self.unit, self.message)
        }
    }
}

/// Result type alias using Cadence's error type.
pub type Result<T> = std::result::Result<T, Error>;

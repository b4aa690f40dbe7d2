//! Component identities.
//!
//! An [`Identity`] names one component *kind*. It is derived from the Rust
//! type at compile time, so no runtime reflection is needed: two identities
//! are equal exactly when they were created from the same type.

use std::any::{TypeId, type_name};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Stable key naming one component kind.
///
/// Equality and hashing use the `TypeId` only; the name is kept for
/// diagnostics and log output.
#[derive(Clone, Copy)]
pub struct Identity {
    type_id: TypeId,
    name: &'static str,
}

impl Identity {
    /// Returns the identity of `T`.
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: short_type_name(type_name::<T>()),
        }
    }

    /// Short display name (module path stripped).
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The underlying type id.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns true if this identity was created from `T`.
    #[must_use]
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for Identity {}

impl Hash for Identity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl PartialOrd for Identity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Identity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name
            .cmp(other.name)
            .then_with(|| self.type_id.cmp(&other.type_id))
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self.name)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Strip module paths from a fully-qualified type name, keeping generic
/// arguments (e.g. `app::render::RenderService` → `RenderService`,
/// `app::Wrapper<app::Inner>` → `Wrapper<app::Inner>`).
fn short_type_name(full: &'static str) -> &'static str {
    let path_end = full.find('<').unwrap_or(full.len());
    let start = full[..path_end].rfind("::").map_or(0, |pos| pos + 2);
    &full[start..]
}

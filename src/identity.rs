//! Type-erased identities and result values.
//!
//! A fetch program mixes requests against sources with different identity
//! and result types in one tree. [`Id`] and [`FetchValue`] erase those types
//! so the interpreter can group, deduplicate, and cache values uniformly;
//! the typed [`Fetch`](crate::Fetch) layer reconstructs concrete types when
//! values flow back into user closures.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Object-safe view of an identity value.
///
/// Equality and hashing incorporate the concrete [`TypeId`] so identities of
/// different Rust types never compare equal or collide structurally.
pub(crate) trait DynId: fmt::Debug + Send + Sync + 'static {
    fn as_any(&self) -> &dyn Any;
    fn eq_dyn(&self, other: &dyn DynId) -> bool;
    fn hash_dyn(&self, state: &mut dyn Hasher);
}

impl<T> DynId for T
where
    T: fmt::Debug + Eq + Hash + Send + Sync + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_dyn(&self, other: &dyn DynId) -> bool {
        other.as_any().downcast_ref::<T>().is_some_and(|o| self == o)
    }

    fn hash_dyn(&self, mut state: &mut dyn Hasher) {
        TypeId::of::<T>().hash(&mut state);
        self.hash(&mut state);
    }
}

/// An opaque identity naming one record within one data source.
///
/// Wraps any `Eq + Hash + Debug + Send + Sync + 'static` value. Cloning is
/// shallow. Two `Id`s are equal when they wrap equal values of the same
/// concrete type.
#[derive(Clone)]
pub struct Id(Arc<dyn DynId>);

impl Id {
    /// Erase an identity value.
    pub fn new<T>(value: T) -> Self
    where
        T: fmt::Debug + Eq + Hash + Send + Sync + 'static,
    {
        Self(Arc::new(value))
    }

    /// Borrow the underlying value, if it has type `T`.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref()
    }
}

impl PartialEq for Id {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_dyn(other.0.as_ref())
    }
}

impl Eq for Id {}

impl Hash for Id {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash_dyn(state);
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

/// A type-erased result value produced by a data source or a program node.
///
/// Values are shared behind an [`Arc`], so cloning is cheap; the same value
/// may sit in the cache, in a round's recorded response, and in several
/// program leaves at once.
#[derive(Clone)]
pub struct FetchValue {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl FetchValue {
    /// Erase a result value.
    pub fn new<T>(value: T) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        Self {
            value: Arc::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Recover the value as a `T`, cloning out of the shared allocation.
    ///
    /// Returns `None` if the value does not have type `T`.
    pub fn downcast<T>(&self) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.value.downcast_ref::<T>().cloned()
    }

    /// Name of the concrete type this value was erased from.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for FetchValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FetchValue<{}>", self.type_name)
    }
}

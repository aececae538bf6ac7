//! The contract every data-access backend implements.
//!
//! A [`DataSource`] resolves identities of one concrete type to results of
//! one concrete type; the interpreter talks to sources through the erased
//! [`ErasedSource`] form so heterogeneous sources can share a round.

use crate::identity::{FetchValue, Id};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::num::NonZeroUsize;

/// How the sub-batches of an oversized batch are dispatched once it has
/// been split to respect [`DataSource::max_batch_size`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchExecution {
    /// Sub-batches run concurrently.
    Parallel,
    /// Sub-batches run one after another, in identity order.
    Sequential,
}

/// A backend that resolves identities to values.
///
/// The `name` doubles as the source's descriptor: requests are grouped,
/// deduplicated, and cached per name, and two sources reporting the same
/// name are treated as the same source. Keeping names unique is the
/// implementor's obligation.
///
/// `batch` must behave like calling [`fetch`](Self::fetch) once per
/// identity and collecting the present results; identities the backend
/// does not know must be omitted from the returned map, never invented.
///
/// # Example
///
/// ```
/// use async_trait::async_trait;
/// use fetch_query::DataSource;
///
/// struct UserNames;
///
/// #[async_trait]
/// impl DataSource for UserNames {
///     type Id = u32;
///     type Value = String;
///
///     fn name(&self) -> &str {
///         "user-names"
///     }
///
///     async fn fetch(&self, id: &u32) -> anyhow::Result<Option<String>> {
///         Ok(Some(format!("user-{id}")))
///     }
/// }
/// ```
#[async_trait]
pub trait DataSource: Send + Sync + 'static {
    /// Identity type resolved by this source.
    type Id: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static;
    /// Result type produced by this source.
    type Value: Clone + Send + Sync + 'static;

    /// Stable, unique name identifying this source.
    fn name(&self) -> &str;

    /// Resolve a single identity. A miss yields `Ok(None)`.
    async fn fetch(&self, id: &Self::Id) -> anyhow::Result<Option<Self::Value>>;

    /// Resolve a set of identities at once. Missing identities are omitted
    /// from the returned map.
    ///
    /// The default implementation calls [`fetch`](Self::fetch) per identity;
    /// backends with a real batch capability should override it.
    async fn batch(&self, ids: &[Self::Id]) -> anyhow::Result<HashMap<Self::Id, Self::Value>> {
        let mut results = HashMap::with_capacity(ids.len());
        for id in ids {
            if let Some(value) = self.fetch(id).await? {
                results.insert(id.clone(), value);
            }
        }
        Ok(results)
    }

    /// Upper bound on the number of identities per `batch` call.
    /// `None` means unlimited.
    fn max_batch_size(&self) -> Option<NonZeroUsize> {
        None
    }

    /// Dispatch policy for the sub-batches of an oversized batch.
    fn batch_execution(&self) -> BatchExecution {
        BatchExecution::Parallel
    }
}

/// Object-safe, type-erased view of a [`DataSource`], used by program nodes
/// and the interpreter.
#[async_trait]
pub(crate) trait ErasedSource: Send + Sync {
    fn name(&self) -> &str;
    fn max_batch_size(&self) -> Option<NonZeroUsize>;
    fn batch_execution(&self) -> BatchExecution;
    async fn fetch_erased(&self, id: &Id) -> anyhow::Result<Option<FetchValue>>;
    async fn batch_erased(&self, ids: &[Id]) -> anyhow::Result<HashMap<Id, FetchValue>>;
}

#[async_trait]
impl<S: DataSource> ErasedSource for S {
    fn name(&self) -> &str {
        DataSource::name(self)
    }

    fn max_batch_size(&self) -> Option<NonZeroUsize> {
        DataSource::max_batch_size(self)
    }

    fn batch_execution(&self) -> BatchExecution {
        DataSource::batch_execution(self)
    }

    async fn fetch_erased(&self, id: &Id) -> anyhow::Result<Option<FetchValue>> {
        let id = typed_id::<S>(self, id)?;
        Ok(self.fetch(id).await?.map(FetchValue::new))
    }

    async fn batch_erased(&self, ids: &[Id]) -> anyhow::Result<HashMap<Id, FetchValue>> {
        let mut typed = Vec::with_capacity(ids.len());
        for id in ids {
            typed.push(typed_id::<S>(self, id)?.clone());
        }
        let results = self.batch(&typed).await?;
        Ok(results
            .into_iter()
            .map(|(id, value)| (Id::new(id), FetchValue::new(value)))
            .collect())
    }
}

/// Recover a source's concrete identity type from an erased [`Id`].
///
/// Fails only when two sources share a name but disagree on their identity
/// type, which breaks the name-uniqueness obligation.
fn typed_id<'a, S: DataSource>(source: &S, id: &'a Id) -> anyhow::Result<&'a S::Id> {
    id.downcast_ref::<S::Id>().ok_or_else(|| {
        anyhow::anyhow!(
            "identity {:?} has the wrong type for source '{}'",
            id,
            DataSource::name(source)
        )
    })
}

//! The unit of work a round executes.
//!
//! After the coalescing and batch-splitting passes have run, every round
//! dispatches exactly one [`Request`]: a single identity, one deduplicated
//! batch against one source, or several batches dispatched together.

use crate::identity::Id;
use crate::source::ErasedSource;
use std::fmt;
use std::sync::Arc;

/// A single identity requested from a single source.
#[derive(Clone)]
pub struct FetchOne {
    pub(crate) source: Arc<dyn ErasedSource>,
    pub(crate) id: Id,
}

impl FetchOne {
    pub(crate) fn new(source: Arc<dyn ErasedSource>, id: Id) -> Self {
        Self { source, id }
    }

    /// Name of the source this request targets.
    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// The requested identity.
    pub fn id(&self) -> &Id {
        &self.id
    }

    pub(crate) fn to_many(&self) -> FetchMany {
        FetchMany {
            source: self.source.clone(),
            ids: vec![self.id.clone()],
        }
    }
}

impl fmt::Debug for FetchOne {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchOne")
            .field("source", &self.source.name())
            .field("id", &self.id)
            .finish()
    }
}

/// A non-empty, deduplicated set of identities requested from one source.
///
/// Identities keep the order in which the program first mentioned them,
/// which is also the order batch-splitting chunks them in.
#[derive(Clone)]
pub struct FetchMany {
    pub(crate) source: Arc<dyn ErasedSource>,
    pub(crate) ids: Vec<Id>,
}

impl FetchMany {
    /// Returns `None` when `ids` is empty: an empty request is never legal.
    pub(crate) fn new(source: Arc<dyn ErasedSource>, ids: Vec<Id>) -> Option<Self> {
        if ids.is_empty() {
            return None;
        }
        Some(Self { source, ids })
    }

    /// Name of the source this request targets.
    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// The requested identities, in first-mention order.
    pub fn ids(&self) -> &[Id] {
        &self.ids
    }

    /// Number of identities in this batch.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// A batch is never empty; provided for completeness.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl fmt::Debug for FetchMany {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchMany")
            .field("source", &self.source.name())
            .field("ids", &self.ids)
            .finish()
    }
}

/// What one round dispatches.
#[derive(Clone, Debug)]
pub enum Request {
    /// One identity from one source.
    One(FetchOne),
    /// One batch against one source.
    Many(FetchMany),
    /// Independent batches dispatched in the same round. Batches against
    /// distinct sources run concurrently; several batches against the same
    /// source are the chunks of an oversized request.
    Concurrent(Vec<FetchMany>),
}

impl Request {
    /// The batches this request dispatches, in dispatch order.
    pub(crate) fn batches(&self) -> Vec<FetchMany> {
        match self {
            Request::One(one) => vec![one.to_many()],
            Request::Many(many) => vec![many.clone()],
            Request::Concurrent(batches) => batches.clone(),
        }
    }

    /// Names of the sources involved, in dispatch order, deduplicated.
    pub fn source_names(&self) -> Vec<&str> {
        match self {
            Request::One(one) => vec![one.source_name()],
            Request::Many(many) => vec![many.source_name()],
            Request::Concurrent(batches) => {
                let mut names: Vec<&str> = Vec::new();
                for batch in batches {
                    let name = batch.source_name();
                    if !names.contains(&name) {
                        names.push(name);
                    }
                }
                names
            }
        }
    }

    /// Total number of identities across all batches.
    pub fn identity_count(&self) -> usize {
        match self {
            Request::One(_) => 1,
            Request::Many(many) => many.len(),
            Request::Concurrent(batches) => batches.iter().map(FetchMany::len).sum(),
        }
    }
}

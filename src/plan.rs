//! The two rewriting passes that turn a program tree into round requests.
//!
//! [`collect_pending`] is the parallel-join coalescing pass: it walks the
//! tree and merges every fetch leaf that can run now — anything not behind
//! an unresolved [`FlatMap`](crate::program::Node::FlatMap) — into one
//! deduplicated group per source. [`schedule`] is the batch-size pass: it
//! splits groups that exceed their source's declared limit and decides
//! which chunks share a round.
//!
//! The interpreter re-runs both passes after every round, so the fixed
//! point is reached incrementally: each round consumes the largest request
//! the current tree can justify.

use crate::identity::Id;
use crate::program::Node;
use crate::request::{FetchMany, FetchOne, Request};
use crate::source::{BatchExecution, ErasedSource};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// All identities one source can resolve in the upcoming round.
pub(crate) struct PendingGroup {
    pub(crate) source: Arc<dyn ErasedSource>,
    /// Deduplicated, in first-mention order.
    pub(crate) ids: Vec<Id>,
    /// Identities at least one required (non-optional) fetch asked for.
    pub(crate) required: HashSet<Id>,
}

#[derive(Default)]
struct GroupBuilder {
    index: HashMap<String, usize>,
    groups: Vec<PendingGroup>,
    seen: Vec<HashSet<Id>>,
}

impl GroupBuilder {
    fn add(&mut self, source: &Arc<dyn ErasedSource>, id: &Id, required: bool) {
        let slot = match self.index.get(source.name()) {
            Some(&slot) => slot,
            None => {
                self.index.insert(source.name().to_string(), self.groups.len());
                self.groups.push(PendingGroup {
                    source: source.clone(),
                    ids: Vec::new(),
                    required: HashSet::new(),
                });
                self.seen.push(HashSet::new());
                self.groups.len() - 1
            }
        };
        let group = &mut self.groups[slot];
        if self.seen[slot].insert(id.clone()) {
            group.ids.push(id.clone());
        }
        if required {
            group.required.insert(id.clone());
        }
    }

    fn finish(mut self) -> Vec<PendingGroup> {
        self.groups
            .sort_by(|a, b| a.source.name().cmp(b.source.name()));
        self.groups
    }
}

/// Parallel-join coalescing: collect every fetch leaf that can execute
/// without waiting on a prior value.
///
/// `Pure`, `Error`, and `Map` preserve extractability; `FlatMap` hides its
/// continuation (only the left side is visited); both branches of a `Join`
/// contribute. Identities are deduplicated per source, and groups come back
/// ordered lexicographically by source name.
pub(crate) fn collect_pending(root: &Node) -> Vec<PendingGroup> {
    let mut builder = GroupBuilder::default();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        match node {
            Node::One { source, id, wrap } => builder.add(source, id, wrap.is_none()),
            Node::Map { inner, .. } | Node::FlatMap { inner, .. } => stack.push(inner),
            Node::Join { left, right, .. } => {
                // Visit left before right so first-mention order follows
                // the program text.
                stack.push(right);
                stack.push(left);
            }
            Node::Pure(_) | Node::Error(_) => {}
        }
    }
    builder.finish()
}

/// One source's share of a round, after cache hits have been removed.
pub(crate) struct MissingGroup {
    pub(crate) source: Arc<dyn ErasedSource>,
    pub(crate) ids: Vec<Id>,
}

/// Batch-size splitting: turn the cache-missed groups into the requests of
/// one or more rounds.
///
/// Chunks of a `Parallel` source stay in the same round's `Concurrent`; a
/// standalone oversized `Sequential` group becomes one round per chunk. A
/// `Sequential` group sharing a round with other sources keeps its chunks
/// in that round — they run in order within it, without blocking the other
/// sources' branches.
pub(crate) fn schedule(groups: Vec<MissingGroup>) -> Vec<Request> {
    let standalone_sequential = groups.len() == 1
        && groups
            .first()
            .is_some_and(|g| g.source.batch_execution() == BatchExecution::Sequential);

    let mut batches: Vec<FetchMany> = Vec::new();
    for group in groups {
        batches.extend(chunk_group(group));
    }

    if standalone_sequential && batches.len() > 1 {
        return batches.into_iter().map(Request::Many).collect();
    }

    vec![into_request(batches)]
}

fn chunk_group(group: MissingGroup) -> Vec<FetchMany> {
    let limit = group
        .source
        .max_batch_size()
        .map(|n| n.get())
        .unwrap_or(usize::MAX);
    group
        .ids
        .chunks(limit)
        .filter_map(|chunk| FetchMany::new(group.source.clone(), chunk.to_vec()))
        .collect()
}

fn into_request(mut batches: Vec<FetchMany>) -> Request {
    if batches.len() == 1 {
        // A singleton Concurrent is legal but must be simplified before the
        // round is recorded.
        let batch = batches.remove(0);
        if batch.len() == 1 {
            let id = batch.ids[0].clone();
            return Request::One(FetchOne::new(batch.source, id));
        }
        return Request::Many(batch);
    }
    Request::Concurrent(batches)
}

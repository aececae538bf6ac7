//! The round interpreter.
//!
//! Execution alternates between two phases until the program tree collapses
//! to a value: [`step`] rewrites the tree with everything known so far
//! (applying transforms, running continuations whose inputs arrived,
//! substituting fetched values into fetch leaves), and [`run_rounds`]
//! executes the coalesced requests of the current tree — consulting the
//! cache, dispatching sources in parallel, committing results, and
//! appending a [`Round`] to the environment.
//!
//! `step` is an explicit-stack machine rather than a recursive walk, so
//! programs built from very long `traverse`/`flat_map` chains evaluate in
//! constant stack space.

use crate::cache::{CacheKey, DataCache};
use crate::error::{self, FetchError};
use crate::identity::{FetchValue, Id};
use crate::plan::{self, MissingGroup, PendingGroup};
use crate::program::{BindFn, JoinFn, MapFn, Node, WrapFn};
use crate::request::{FetchMany, Request};
use crate::round::{Env, Round, RoundResponse};
use crate::source::{BatchExecution, ErasedSource};
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace, warn};

/// Everything one step of the interpreter knows about identities resolved
/// by the rounds that just ran: fetched or cached values, plus identities
/// the sources confirmed absent (only ever optional ones — a required
/// absence fails the round instead).
#[derive(Default)]
struct Resolution {
    values: HashMap<CacheKey, FetchValue>,
    absent: HashSet<CacheKey>,
}

/// Run a program tree to completion against the given cache.
pub(crate) async fn evaluate(
    node: Node,
    cache: Arc<dyn DataCache>,
) -> Result<(Env, FetchValue), FetchError> {
    let mut env = Env::new(cache);
    let mut node = node;
    let mut resolution = Resolution::default();
    loop {
        match step(node, &resolution, &env)? {
            Node::Pure(value) => return Ok((env, value)),
            blocked => {
                let groups = plan::collect_pending(&blocked);
                if groups.is_empty() {
                    return Err(error::internal(
                        "program is blocked but no fetch is runnable",
                    ));
                }
                resolution = run_rounds(groups, &mut env).await?;
                node = blocked;
            }
        }
    }
}

enum Task {
    Eval(Node),
    ApplyMap(MapFn),
    ApplyBind(BindFn),
    ApplyJoin(JoinFn),
}

/// Rewrite the tree as far as the current resolution allows.
///
/// Fetch leaves with a resolved value become `Pure`; transforms over pure
/// values are applied; continuations whose input is pure are run and their
/// output stepped in turn. Branches still waiting on a fetch are rebuilt
/// unchanged, so a blocked left side of a join never prevents the right
/// side from making progress.
fn step(root: Node, resolution: &Resolution, env: &Env) -> Result<Node, FetchError> {
    let mut tasks = vec![Task::Eval(root)];
    let mut results: Vec<Node> = Vec::new();

    while let Some(task) = tasks.pop() {
        match task {
            Task::Eval(node) => match node {
                Node::Pure(value) => results.push(Node::Pure(value)),
                Node::Error(cause) => {
                    return Err(FetchError::UnhandledException {
                        env: env.clone(),
                        cause,
                    });
                }
                Node::One { source, id, wrap } => {
                    results.push(resolve_leaf(source, id, wrap, resolution, env)?);
                }
                Node::Map { inner, f } => {
                    tasks.push(Task::ApplyMap(f));
                    tasks.push(Task::Eval(*inner));
                }
                Node::FlatMap { inner, k } => {
                    tasks.push(Task::ApplyBind(k));
                    tasks.push(Task::Eval(*inner));
                }
                Node::Join {
                    left,
                    right,
                    combine,
                } => {
                    tasks.push(Task::ApplyJoin(combine));
                    tasks.push(Task::Eval(*right));
                    tasks.push(Task::Eval(*left));
                }
            },
            Task::ApplyMap(f) => match pop(&mut results)? {
                Node::Pure(value) => results.push(Node::Pure(f(value)?)),
                blocked => results.push(Node::Map {
                    inner: Box::new(blocked),
                    f,
                }),
            },
            Task::ApplyBind(k) => match pop(&mut results)? {
                // The dependency is satisfied: materialize the continuation
                // and step whatever it produced.
                Node::Pure(value) => tasks.push(Task::Eval(k(value)?)),
                blocked => results.push(Node::FlatMap {
                    inner: Box::new(blocked),
                    k,
                }),
            },
            Task::ApplyJoin(combine) => {
                let right = pop(&mut results)?;
                let left = pop(&mut results)?;
                match (left, right) {
                    (Node::Pure(l), Node::Pure(r)) => results.push(Node::Pure(combine(l, r)?)),
                    (left, right) => results.push(Node::Join {
                        left: Box::new(left),
                        right: Box::new(right),
                        combine,
                    }),
                }
            }
        }
    }
    pop(&mut results)
}

fn resolve_leaf(
    source: Arc<dyn ErasedSource>,
    id: Id,
    wrap: Option<WrapFn>,
    resolution: &Resolution,
    env: &Env,
) -> Result<Node, FetchError> {
    let key = CacheKey::new(source.name(), id.clone());
    if let Some(value) = resolution.values.get(&key) {
        return match wrap {
            None => Ok(Node::Pure(value.clone())),
            Some(wrap) => Ok(Node::Pure(wrap(Some(value.clone()))?)),
        };
    }
    if resolution.absent.contains(&key) {
        return match wrap {
            Some(wrap) => Ok(Node::Pure(wrap(None)?)),
            None => Err(FetchError::NotFound {
                env: env.clone(),
                source_name: source.name().to_string(),
                id,
            }),
        };
    }
    Ok(Node::One { source, id, wrap })
}

fn pop(results: &mut Vec<Node>) -> Result<Node, FetchError> {
    results
        .pop()
        .ok_or_else(|| error::internal("interpreter result stack underflow"))
}

/// Serve the pending groups: cache hits first, then one round per
/// scheduled request. Returns the resolution the next `step` consumes.
async fn run_rounds(
    groups: Vec<PendingGroup>,
    env: &mut Env,
) -> Result<Resolution, FetchError> {
    let mut resolution = Resolution::default();
    let mut required: HashSet<CacheKey> = HashSet::new();
    let mut missing_groups: Vec<MissingGroup> = Vec::new();
    let mut cache_hits = 0usize;

    for group in &groups {
        let mut missing_ids = Vec::new();
        for id in &group.ids {
            let key = CacheKey::new(group.source.name(), id.clone());
            if group.required.contains(id) {
                required.insert(key.clone());
            }
            match env.cache().lookup(&key).await {
                Some(value) => {
                    cache_hits += 1;
                    resolution.values.insert(key, value);
                }
                None => missing_ids.push(id.clone()),
            }
        }
        if !missing_ids.is_empty() {
            missing_groups.push(MissingGroup {
                source: group.source.clone(),
                ids: missing_ids,
            });
        }
    }

    if missing_groups.is_empty() {
        // Fully served from cache: no source is called and no round is
        // recorded.
        trace!(hits = cache_hits, "all identities cached, skipping round");
        return Ok(resolution);
    }

    for request in plan::schedule(missing_groups) {
        execute_round(request, env, &required, &mut resolution).await?;
    }
    Ok(resolution)
}

/// One source's share of a round: its chunks, dispatched according to its
/// declared batch-execution policy.
struct SourceJob {
    source: Arc<dyn ErasedSource>,
    chunks: Vec<Vec<Id>>,
}

/// Dispatch one request, commit its results, and append the round.
///
/// The round is committed (cache filled, log appended) only when every
/// branch succeeded and no required identity is missing; a failed round
/// leaves the environment untouched.
async fn execute_round(
    request: Request,
    env: &mut Env,
    required: &HashSet<CacheKey>,
    resolution: &mut Resolution,
) -> Result<(), FetchError> {
    let jobs = group_by_source(request.batches());
    debug!(
        round = env.rounds().len(),
        sources = ?request.source_names(),
        identities = request.identity_count(),
        "dispatching round"
    );

    let cache_before = env.cache().clone();
    let start = Instant::now();
    let outcomes = join_all(jobs.iter().map(dispatch_job)).await;
    let end = Instant::now();

    // A failing branch fails the round, but only after every sibling has
    // completed; the first failure in descriptor order is surfaced.
    let mut response = RoundResponse::default();
    let mut missing: HashMap<String, Vec<Id>> = HashMap::new();
    let mut first_error: Option<anyhow::Error> = None;

    for (job, outcome) in jobs.iter().zip(outcomes) {
        match outcome {
            Err(cause) => {
                if first_error.is_none() {
                    first_error = Some(cause);
                }
            }
            Ok(mut values) => {
                for id in job.chunks.iter().flatten() {
                    let key = CacheKey::new(job.source.name(), id.clone());
                    match values.remove(id) {
                        Some(value) => response.insert(key, value),
                        None if required.contains(&key) => missing
                            .entry(job.source.name().to_string())
                            .or_default()
                            .push(id.clone()),
                        None => {
                            resolution.absent.insert(key);
                        }
                    }
                }
            }
        }
    }

    if let Some(cause) = first_error {
        return Err(FetchError::UnhandledException {
            env: env.clone(),
            cause: Arc::new(cause),
        });
    }

    if !missing.is_empty() {
        // A lone single-identity request gets the precise error.
        if let Request::One(one) = &request {
            return Err(FetchError::NotFound {
                env: env.clone(),
                source_name: one.source_name().to_string(),
                id: one.id().clone(),
            });
        }
        return Err(FetchError::MissingIdentities {
            env: env.clone(),
            missing,
        });
    }

    let mut cache = cache_before.clone();
    for (key, value) in response.iter() {
        cache = cache.insert(key.clone(), value.clone()).await;
        resolution.values.insert(key.clone(), value.clone());
    }
    trace!(
        fetched = response.len(),
        duration_millis = end.duration_since(start).as_secs_f64() * 1_000.0,
        "round complete"
    );
    env.evolve(Round::new(cache_before, request, response, start, end), cache);
    Ok(())
}

fn group_by_source(batches: Vec<FetchMany>) -> Vec<SourceJob> {
    let mut jobs: Vec<SourceJob> = Vec::new();
    for batch in batches {
        match jobs
            .iter_mut()
            .find(|job| job.source.name() == batch.source_name())
        {
            Some(job) => job.chunks.push(batch.ids.clone()),
            None => jobs.push(SourceJob {
                source: batch.source.clone(),
                chunks: vec![batch.ids.clone()],
            }),
        }
    }
    jobs
}

async fn dispatch_job(job: &SourceJob) -> anyhow::Result<HashMap<Id, FetchValue>> {
    if job.chunks.len() > 1 && job.source.batch_execution() == BatchExecution::Sequential {
        let mut merged = HashMap::new();
        for chunk in &job.chunks {
            merged.extend(dispatch_chunk(&job.source, chunk).await?);
        }
        return Ok(merged);
    }
    let results = join_all(
        job.chunks
            .iter()
            .map(|chunk| dispatch_chunk(&job.source, chunk)),
    )
    .await;
    let mut merged = HashMap::new();
    for result in results {
        merged.extend(result?);
    }
    Ok(merged)
}

async fn dispatch_chunk(
    source: &Arc<dyn ErasedSource>,
    ids: &[Id],
) -> anyhow::Result<HashMap<Id, FetchValue>> {
    if let [id] = ids {
        // Single-identity batches take the single-fetch path.
        return Ok(source
            .fetch_erased(id)
            .await?
            .map(|value| HashMap::from([(id.clone(), value)]))
            .unwrap_or_default());
    }
    let mut values = source.batch_erased(ids).await?;
    let requested: HashSet<&Id> = ids.iter().collect();
    let before = values.len();
    values.retain(|id, _| requested.contains(id));
    if values.len() < before {
        warn!(
            source = source.name(),
            dropped = before - values.len(),
            "batch response contained identities that were not requested"
        );
    }
    Ok(values)
}

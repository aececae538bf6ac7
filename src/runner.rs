//! Public entry points for executing fetch programs.
//!
//! Each entry point exists in two forms: the plain form runs against a
//! fresh [`InMemoryCache`], the `_with_cache` form accepts any
//! [`DataCache`] — typically an [`InMemoryCache`] shared across runs so
//! later runs skip identities earlier runs already fetched.

use crate::cache::{DataCache, InMemoryCache};
use crate::error::{self, Result};
use crate::interpreter;
use crate::program::Fetch;
use crate::round::{Env, Round};
use std::sync::Arc;
use tracing::debug;

/// Run a program and return its result.
pub async fn run<A>(program: Fetch<A>) -> Result<A>
where
    A: Clone + Send + Sync + 'static,
{
    run_with_cache(program, Arc::new(InMemoryCache::new())).await
}

/// Run a program against a caller-provided cache and return its result.
pub async fn run_with_cache<A>(program: Fetch<A>, cache: Arc<dyn DataCache>) -> Result<A>
where
    A: Clone + Send + Sync + 'static,
{
    let (_env, value) = run_all_with_cache(program, cache).await?;
    Ok(value)
}

/// Run a program and return the round log alongside its result.
pub async fn run_log<A>(program: Fetch<A>) -> Result<(Vec<Round>, A)>
where
    A: Clone + Send + Sync + 'static,
{
    run_log_with_cache(program, Arc::new(InMemoryCache::new())).await
}

/// Run a program against a caller-provided cache and return the round log
/// alongside its result.
pub async fn run_log_with_cache<A>(
    program: Fetch<A>,
    cache: Arc<dyn DataCache>,
) -> Result<(Vec<Round>, A)>
where
    A: Clone + Send + Sync + 'static,
{
    let (env, value) = run_all_with_cache(program, cache).await?;
    Ok((env.into_rounds(), value))
}

/// Run a program and return the full environment (round log and final
/// cache) alongside its result.
pub async fn run_all<A>(program: Fetch<A>) -> Result<(Env, A)>
where
    A: Clone + Send + Sync + 'static,
{
    run_all_with_cache(program, Arc::new(InMemoryCache::new())).await
}

/// Run a program against a caller-provided cache and return the full
/// environment alongside its result.
pub async fn run_all_with_cache<A>(
    program: Fetch<A>,
    cache: Arc<dyn DataCache>,
) -> Result<(Env, A)>
where
    A: Clone + Send + Sync + 'static,
{
    debug!("starting fetch run");
    let (env, value) = interpreter::evaluate(program.node, cache).await?;
    debug!(rounds = env.rounds().len(), "run complete");
    let result = value
        .downcast::<A>()
        .ok_or_else(|| error::value_mismatch::<A>("run result"))?;
    Ok((env, result))
}

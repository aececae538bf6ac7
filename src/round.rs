//! Execution records: rounds and the environment that accumulates them.

use crate::cache::{CacheKey, DataCache};
use crate::identity::FetchValue;
use crate::request::Request;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Raw values one round obtained from its sources, keyed by
/// `(source name, identity)`.
#[derive(Clone, Debug, Default)]
pub struct RoundResponse {
    values: HashMap<CacheKey, FetchValue>,
}

impl RoundResponse {
    pub(crate) fn insert(&mut self, key: CacheKey, value: FetchValue) {
        self.values.insert(key, value);
    }

    /// Look up the value fetched for a key, if the source returned one.
    pub fn get(&self, key: &CacheKey) -> Option<&FetchValue> {
        self.values.get(key)
    }

    /// Number of values in the response.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the response is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over `(key, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&CacheKey, &FetchValue)> {
        self.values.iter()
    }
}

/// Record of one execution cycle: the cache in effect when the round
/// started, the request issued, the raw response, and monotonic start/end
/// instants.
#[derive(Clone)]
pub struct Round {
    cache: Arc<dyn DataCache>,
    request: Request,
    response: RoundResponse,
    start: Instant,
    end: Instant,
}

impl Round {
    pub(crate) fn new(
        cache: Arc<dyn DataCache>,
        request: Request,
        response: RoundResponse,
        start: Instant,
        end: Instant,
    ) -> Self {
        Self {
            cache,
            request,
            response,
            start,
            end,
        }
    }

    /// The cache value in effect when the round started.
    pub fn cache(&self) -> &Arc<dyn DataCache> {
        &self.cache
    }

    /// The request this round dispatched.
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// The raw values the sources returned.
    pub fn response(&self) -> &RoundResponse {
        &self.response
    }

    /// Instant captured just before dispatch.
    pub fn start(&self) -> Instant {
        self.start
    }

    /// Instant captured after every branch of the round completed.
    pub fn end(&self) -> Instant {
        self.end
    }

    /// Wall-clock duration of the round in milliseconds.
    pub fn duration_millis(&self) -> f64 {
        self.end.duration_since(self.start).as_secs_f64() * 1_000.0
    }
}

impl fmt::Debug for Round {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Round")
            .field("request", &self.request)
            .field("response", &self.response)
            .field("duration_millis", &self.duration_millis())
            .finish_non_exhaustive()
    }
}

/// Accumulated state of one run: the ordered round log and the current
/// cache value. Rounds only append.
#[derive(Clone)]
pub struct Env {
    rounds: Vec<Round>,
    cache: Arc<dyn DataCache>,
}

impl Env {
    pub(crate) fn new(cache: Arc<dyn DataCache>) -> Self {
        Self {
            rounds: Vec::new(),
            cache,
        }
    }

    /// The rounds executed so far, in execution order.
    pub fn rounds(&self) -> &[Round] {
        &self.rounds
    }

    /// The current cache value.
    pub fn cache(&self) -> &Arc<dyn DataCache> {
        &self.cache
    }

    /// Consume the environment, keeping only the round log.
    pub fn into_rounds(self) -> Vec<Round> {
        self.rounds
    }

    /// Append a committed round and adopt the cache it produced.
    pub(crate) fn evolve(&mut self, round: Round, cache: Arc<dyn DataCache>) {
        self.rounds.push(round);
        self.cache = cache;
    }
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Env")
            .field("rounds", &self.rounds)
            .finish_non_exhaustive()
    }
}

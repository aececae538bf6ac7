//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use fetch_query::{BatchExecution, DataSource};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A data source over a fixed map, instrumented to record every call it
/// receives so tests can assert on batching, deduplication, and caching
/// behavior.
pub struct TrackedSource {
    name: &'static str,
    data: HashMap<i32, String>,
    max_batch_size: Option<usize>,
    batch_execution: BatchExecution,
    fetch_calls: AtomicUsize,
    batch_calls: AtomicUsize,
    fetched_ids: Mutex<Vec<i32>>,
    batched_ids: Mutex<Vec<Vec<i32>>>,
}

impl TrackedSource {
    pub fn new(name: &'static str, entries: impl IntoIterator<Item = (i32, String)>) -> Self {
        Self {
            name,
            data: entries.into_iter().collect(),
            max_batch_size: None,
            batch_execution: BatchExecution::Parallel,
            fetch_calls: AtomicUsize::new(0),
            batch_calls: AtomicUsize::new(0),
            fetched_ids: Mutex::new(Vec::new()),
            batched_ids: Mutex::new(Vec::new()),
        }
    }

    /// Identities 0..10, each mapped to its decimal string.
    pub fn digits(name: &'static str) -> Self {
        Self::counting(name, 10)
    }

    /// Identities 0..n, each mapped to its decimal string.
    pub fn counting(name: &'static str, n: i32) -> Self {
        Self::new(name, (0..n).map(|i| (i, i.to_string())))
    }

    pub fn with_max_batch(mut self, n: usize) -> Self {
        self.max_batch_size = Some(n);
        self
    }

    pub fn sequential(mut self) -> Self {
        self.batch_execution = BatchExecution::Sequential;
        self
    }

    /// Number of single-identity fetch calls received.
    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Number of batch calls received.
    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    /// Identities received through single fetches, in call order.
    pub fn fetched_ids(&self) -> Vec<i32> {
        self.fetched_ids.lock().unwrap().clone()
    }

    /// Identity sets received through batch calls, in call order.
    pub fn batched_ids(&self) -> Vec<Vec<i32>> {
        self.batched_ids.lock().unwrap().clone()
    }

    /// Every identity the source was asked for, across both call paths.
    pub fn all_requested_ids(&self) -> Vec<i32> {
        let mut ids = self.fetched_ids();
        ids.extend(self.batched_ids().into_iter().flatten());
        ids
    }
}

#[async_trait]
impl DataSource for TrackedSource {
    type Id = i32;
    type Value = String;

    fn name(&self) -> &str {
        self.name
    }

    async fn fetch(&self, id: &i32) -> anyhow::Result<Option<String>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.fetched_ids.lock().unwrap().push(*id);
        Ok(self.data.get(id).cloned())
    }

    async fn batch(&self, ids: &[i32]) -> anyhow::Result<HashMap<i32, String>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        self.batched_ids.lock().unwrap().push(ids.to_vec());
        Ok(ids
            .iter()
            .filter_map(|id| self.data.get(id).map(|value| (*id, value.clone())))
            .collect())
    }

    fn max_batch_size(&self) -> Option<NonZeroUsize> {
        self.max_batch_size.and_then(NonZeroUsize::new)
    }

    fn batch_execution(&self) -> BatchExecution {
        self.batch_execution
    }
}

/// A source with a different identity type, for heterogeneous rounds.
pub struct WordLengths;

#[async_trait]
impl DataSource for WordLengths {
    type Id = String;
    type Value = usize;

    fn name(&self) -> &str {
        "word-lengths"
    }

    async fn fetch(&self, id: &String) -> anyhow::Result<Option<usize>> {
        Ok(Some(id.len()))
    }
}

/// A source whose backend is down.
pub struct FailingSource;

#[async_trait]
impl DataSource for FailingSource {
    type Id = i32;
    type Value = String;

    fn name(&self) -> &str {
        "failing"
    }

    async fn fetch(&self, _id: &i32) -> anyhow::Result<Option<String>> {
        Err(anyhow::anyhow!("backend unavailable"))
    }
}

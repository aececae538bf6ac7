//! # fetch-query
//!
//! A Rust library for declarative data fetching with automatic batching,
//! deduplication, caching, and parallelism.
//!
//! Describe *what* data a computation needs as a [`Fetch`] program; the
//! library decides *how* to retrieve it with the fewest possible
//! round-trips:
//!
//! - Independent fetches ([`Fetch::join`], [`sequence`], [`traverse`]) are
//!   coalesced into one batch per source and one round across sources.
//! - Repeated identities are deduplicated within a round and cached across
//!   rounds (and across runs, when a cache is shared).
//! - Sources that declare a maximum batch size have oversized batches
//!   split for them, concurrently or sequentially as they prefer.
//! - Dependent fetches ([`Fetch::flat_map`]) run in later rounds, and
//!   everything that becomes runnable together is batched together.
//!
//! ## Quick Start
//!
//! ```
//! use async_trait::async_trait;
//! use fetch_query::{DataSource, of, run_log, traverse};
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! struct UserNames;
//!
//! #[async_trait]
//! impl DataSource for UserNames {
//!     type Id = u32;
//!     type Value = String;
//!
//!     fn name(&self) -> &str {
//!         "user-names"
//!     }
//!
//!     async fn fetch(&self, id: &u32) -> anyhow::Result<Option<String>> {
//!         Ok(Some(format!("user-{id}")))
//!     }
//!
//!     // Override `batch` when the backend has a real batch endpoint.
//!     async fn batch(&self, ids: &[u32]) -> anyhow::Result<HashMap<u32, String>> {
//!         Ok(ids.iter().map(|id| (*id, format!("user-{id}"))).collect())
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), fetch_query::FetchError> {
//!     let users = Arc::new(UserNames);
//!
//!     // Three fetches, one of them duplicated: a single round with a
//!     // single deduplicated batch.
//!     let program = traverse(vec![1, 2, 1], |id| of(id, &users));
//!     let (rounds, names) = run_log(program).await?;
//!
//!     assert_eq!(names, vec!["user-1", "user-2", "user-1"]);
//!     assert_eq!(rounds.len(), 1);
//!     Ok(())
//! }
//! ```
//!
//! ## Sharing a cache
//!
//! ```no_run
//! use fetch_query::{InMemoryCache, run_with_cache};
//! use std::sync::Arc;
//!
//! # async fn example(
//! #     first: fetch_query::Fetch<String>,
//! #     second: fetch_query::Fetch<String>,
//! # ) -> Result<(), fetch_query::FetchError> {
//! let cache = Arc::new(InMemoryCache::new());
//! run_with_cache(first, cache.clone()).await?;
//! // Identities the first run fetched are not fetched again.
//! run_with_cache(second, cache).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

/// Cache contract and bundled implementations
pub mod cache;
/// Error types and result definitions
pub mod error;
/// Type-erased identities and values
pub mod identity;
/// The fetch-program algebra and its builders
pub mod program;
/// Request types consumed by rounds
pub mod request;
/// Round records and the run environment
pub mod round;
/// Entry points for executing programs
pub mod runner;
/// The data-source contract
pub mod source;

mod interpreter;
mod plan;

// Re-export the user-facing surface
pub use cache::{CacheKey, DataCache, ForgetfulCache, InMemoryCache};
pub use error::{FetchError, Result};
pub use identity::{FetchValue, Id};
pub use program::{Fetch, maybe, of, sequence, traverse, tuple3, tuple4};
pub use request::{FetchMany, FetchOne, Request};
pub use round::{Env, Round, RoundResponse};
pub use runner::{run, run_all, run_all_with_cache, run_log, run_log_with_cache, run_with_cache};
pub use source::{BatchExecution, DataSource};

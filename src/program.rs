//! The fetch-program algebra.
//!
//! A [`Fetch<A>`] is an immutable description of a data-access computation.
//! Nothing is fetched until the program is handed to one of the
//! [`runner`](crate::runner) entry points; until then the tree can be
//! combined freely with [`map`](Fetch::map), [`flat_map`](Fetch::flat_map),
//! and [`join`](Fetch::join). Independent parts of the tree (joined
//! branches, [`sequence`]/[`traverse`] elements) are batched and
//! deduplicated into as few source calls as possible when the program runs.

use crate::error::{self, FetchError};
use crate::identity::{FetchValue, Id};
use crate::source::{DataSource, ErasedSource};
use std::marker::PhantomData;
use std::sync::Arc;

pub(crate) type MapFn = Box<dyn FnOnce(FetchValue) -> Result<FetchValue, FetchError> + Send>;
pub(crate) type BindFn = Box<dyn FnOnce(FetchValue) -> Result<Node, FetchError> + Send>;
pub(crate) type JoinFn =
    Box<dyn FnOnce(FetchValue, FetchValue) -> Result<FetchValue, FetchError> + Send>;
pub(crate) type WrapFn =
    Box<dyn FnOnce(Option<FetchValue>) -> Result<FetchValue, FetchError> + Send>;

/// Erased program tree. The typed [`Fetch`] wrapper guarantees that the
/// closures stored here only ever see values of the type they were built
/// for.
pub(crate) enum Node {
    /// A known value.
    Pure(FetchValue),
    /// Fetch one identity from one source.
    One {
        source: Arc<dyn ErasedSource>,
        id: Id,
        /// Present on optional fetches: turns the resolved value (or its
        /// absence) into the node's result. Required fetches pass the
        /// fetched value through unchanged and treat absence as a failure.
        wrap: Option<WrapFn>,
    },
    /// A user-lifted failure.
    Error(Arc<anyhow::Error>),
    /// Transform the inner value.
    Map { inner: Box<Node>, f: MapFn },
    /// Sequential dependency: the continuation runs only once the inner
    /// value is known, so nothing behind it can join an earlier round.
    FlatMap { inner: Box<Node>, k: BindFn },
    /// Independent pair: both sides may share a round.
    Join {
        left: Box<Node>,
        right: Box<Node>,
        combine: JoinFn,
    },
}

/// A declarative fetch program producing a value of type `A`.
///
/// Programs are inert values, consumed exactly once by
/// [`run`](crate::runner::run) and its variants.
pub struct Fetch<A> {
    pub(crate) node: Node,
    _marker: PhantomData<fn() -> A>,
}

impl<A> Fetch<A>
where
    A: Clone + Send + Sync + 'static,
{
    pub(crate) fn from_node(node: Node) -> Self {
        Self {
            node,
            _marker: PhantomData,
        }
    }

    /// Lift a known value; contributes no round when the program runs.
    pub fn pure(value: A) -> Self {
        Self::from_node(Node::Pure(FetchValue::new(value)))
    }

    /// Lift a failure. Running the program fails with
    /// [`FetchError::UnhandledException`] carrying `error` as the cause.
    pub fn error(error: impl Into<anyhow::Error>) -> Self {
        Self::from_node(Node::Error(Arc::new(error.into())))
    }

    /// Transform the result once it is available.
    pub fn map<B>(self, f: impl FnOnce(A) -> B + Send + 'static) -> Fetch<B>
    where
        B: Clone + Send + Sync + 'static,
    {
        let f: MapFn = Box::new(move |value| {
            let a = value
                .downcast::<A>()
                .ok_or_else(|| error::value_mismatch::<A>("map input"))?;
            Ok(FetchValue::new(f(a)))
        });
        Fetch::from_node(Node::Map {
            inner: Box::new(self.node),
            f,
        })
    }

    /// Sequence a dependent fetch: `k` sees the result of `self` and
    /// decides what to fetch next. The dependency is real — nothing `k`
    /// produces can be batched into a round that runs before `self`
    /// resolves.
    pub fn flat_map<B>(self, k: impl FnOnce(A) -> Fetch<B> + Send + 'static) -> Fetch<B>
    where
        B: Clone + Send + Sync + 'static,
    {
        let k: BindFn = Box::new(move |value| {
            let a = value
                .downcast::<A>()
                .ok_or_else(|| error::value_mismatch::<A>("flat_map input"))?;
            Ok(k(a).node)
        });
        Fetch::from_node(Node::FlatMap {
            inner: Box::new(self.node),
            k,
        })
    }

    /// Pair this program with an independent one. Both sides' fetches are
    /// coalesced into the same round wherever possible.
    pub fn join<B>(self, other: Fetch<B>) -> Fetch<(A, B)>
    where
        B: Clone + Send + Sync + 'static,
    {
        let combine: JoinFn = Box::new(move |left, right| {
            let a = left
                .downcast::<A>()
                .ok_or_else(|| error::value_mismatch::<A>("join left"))?;
            let b = right
                .downcast::<B>()
                .ok_or_else(|| error::value_mismatch::<B>("join right"))?;
            Ok(FetchValue::new((a, b)))
        });
        Fetch::from_node(Node::Join {
            left: Box::new(self.node),
            right: Box::new(other.node),
            combine,
        })
    }
}

/// Fetch one identity from a source. The resulting program fails with
/// [`FetchError::NotFound`] if the source has no value for `id`.
///
/// # Example
///
/// ```
/// use async_trait::async_trait;
/// use fetch_query::{of, run, DataSource};
/// use std::sync::Arc;
///
/// struct Squares;
///
/// #[async_trait]
/// impl DataSource for Squares {
///     type Id = u32;
///     type Value = u32;
///
///     fn name(&self) -> &str {
///         "squares"
///     }
///
///     async fn fetch(&self, id: &u32) -> anyhow::Result<Option<u32>> {
///         Ok(Some(id * id))
///     }
/// }
///
/// # #[tokio::main(flavor = "current_thread")] async fn main() {
/// let squares = Arc::new(Squares);
/// let program = of(7, &squares).map(|n| n + 1);
/// assert_eq!(run(program).await.unwrap(), 50);
/// # }
/// ```
pub fn of<S: DataSource>(id: S::Id, source: &Arc<S>) -> Fetch<S::Value> {
    Fetch::from_node(Node::One {
        source: source.clone(),
        id: Id::new(id),
        wrap: None,
    })
}

/// Fetch one identity from a source, tolerating its absence: a miss
/// resolves to `None` instead of failing the run.
pub fn maybe<S: DataSource>(id: S::Id, source: &Arc<S>) -> Fetch<Option<S::Value>> {
    let wrap: WrapFn = Box::new(move |resolved| {
        let value = match resolved {
            Some(value) => Some(
                value
                    .downcast::<S::Value>()
                    .ok_or_else(|| error::value_mismatch::<S::Value>("optional fetch"))?,
            ),
            None => None,
        };
        Ok(FetchValue::new(value))
    });
    Fetch::from_node(Node::One {
        source: source.clone(),
        id: Id::new(id),
        wrap: Some(wrap),
    })
}

/// Join three independent programs.
pub fn tuple3<A, B, C>(a: Fetch<A>, b: Fetch<B>, c: Fetch<C>) -> Fetch<(A, B, C)>
where
    A: Clone + Send + Sync + 'static,
    B: Clone + Send + Sync + 'static,
    C: Clone + Send + Sync + 'static,
{
    a.join(b).join(c).map(|((a, b), c)| (a, b, c))
}

/// Join four independent programs.
pub fn tuple4<A, B, C, D>(
    a: Fetch<A>,
    b: Fetch<B>,
    c: Fetch<C>,
    d: Fetch<D>,
) -> Fetch<(A, B, C, D)>
where
    A: Clone + Send + Sync + 'static,
    B: Clone + Send + Sync + 'static,
    C: Clone + Send + Sync + 'static,
    D: Clone + Send + Sync + 'static,
{
    a.join(b).join(c).join(d).map(|(((a, b), c), d)| (a, b, c, d))
}

/// Collect a list of independent programs into one program producing all
/// their results, in order.
///
/// The programs are joined as a balanced tree, so arbitrarily long lists
/// evaluate without deep recursion. Join is associative, which makes the
/// shape unobservable: all elements are still coalesced into the same
/// rounds.
pub fn sequence<A>(fetches: Vec<Fetch<A>>) -> Fetch<Vec<A>>
where
    A: Clone + Send + Sync + 'static,
{
    balanced(fetches)
}

/// Apply `f` to every item and collect the resulting programs, in order.
pub fn traverse<X, A>(items: Vec<X>, f: impl FnMut(X) -> Fetch<A>) -> Fetch<Vec<A>>
where
    A: Clone + Send + Sync + 'static,
{
    sequence(items.into_iter().map(f).collect())
}

fn balanced<A>(mut fetches: Vec<Fetch<A>>) -> Fetch<Vec<A>>
where
    A: Clone + Send + Sync + 'static,
{
    if fetches.len() <= 1 {
        return match fetches.pop() {
            Some(fetch) => fetch.map(|a| vec![a]),
            None => Fetch::pure(Vec::new()),
        };
    }
    let right = fetches.split_off(fetches.len() / 2);
    balanced(fetches)
        .join(balanced(right))
        .map(|(mut left, right)| {
            left.extend(right);
            left
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn depth(node: &Node) -> usize {
        match node {
            Node::Pure(_) | Node::One { .. } | Node::Error(_) => 1,
            Node::Map { inner, .. } | Node::FlatMap { inner, .. } => 1 + depth(inner),
            Node::Join { left, right, .. } => 1 + depth(left).max(depth(right)),
        }
    }

    #[test]
    fn test_sequence_of_nothing_is_pure() {
        let program = sequence(Vec::<Fetch<i32>>::new());
        assert!(matches!(program.node, Node::Pure(_)));
    }

    #[test]
    fn test_sequence_builds_balanced_tree() {
        let program = sequence((0..1024).map(Fetch::pure).collect());
        // A left fold would nest 1024 deep; the balanced shape stays
        // logarithmic (each level adds a Join plus a Map).
        assert!(depth(&program.node) < 64);
    }

    #[test]
    fn test_map_wraps_node() {
        let program = Fetch::pure(1).map(|n| n + 1);
        assert!(matches!(program.node, Node::Map { .. }));
    }
}

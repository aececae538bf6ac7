//! Failure modes: misses, short batches, lifted and raised errors.

mod support;

use fetch_query::{Fetch, FetchError, Id, maybe, of, run, run_log, tuple3};
use std::sync::Arc;
use support::{FailingSource, TrackedSource};

#[tokio::test]
async fn test_single_fetch_miss_is_not_found() {
    let numbers = Arc::new(TrackedSource::digits("numbers"));

    let err = run(of(99, &numbers)).await.unwrap_err();

    match err {
        FetchError::NotFound { env, source_name, id } => {
            assert_eq!(source_name, "numbers");
            assert_eq!(id, Id::new(99));
            assert!(env.rounds().is_empty());
        }
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn test_short_batch_is_missing_identities() {
    // The source only knows identity 1; the batch comes back short.
    let numbers = Arc::new(TrackedSource::new("numbers", [(1, "1".to_string())]));

    let err = run(of(1, &numbers).join(of(2, &numbers))).await.unwrap_err();

    match err {
        FetchError::MissingIdentities { env, missing } => {
            assert_eq!(missing.len(), 1);
            assert_eq!(missing["numbers"], vec![Id::new(2)]);
            // The failing round is never committed.
            assert!(env.rounds().is_empty());
        }
        other => panic!("expected MissingIdentities, got {other:?}"),
    }
}

#[tokio::test]
async fn test_lifted_error_is_unhandled_exception() {
    let numbers = Arc::new(TrackedSource::digits("numbers"));

    let program = of(1, &numbers).join(Fetch::<String>::error(anyhow::anyhow!("boom")));
    let err = run(program).await.unwrap_err();

    match err {
        FetchError::UnhandledException { env, cause } => {
            assert_eq!(cause.to_string(), "boom");
            assert!(env.rounds().is_empty());
        }
        other => panic!("expected UnhandledException, got {other:?}"),
    }
    // The lifted error fails the program before any source is consulted.
    assert_eq!(numbers.fetch_calls(), 0);
    assert_eq!(numbers.batch_calls(), 0);
}

#[tokio::test]
async fn test_source_failure_is_unhandled_exception() {
    let failing = Arc::new(FailingSource);

    let err = run(of(1, &failing)).await.unwrap_err();

    match err {
        FetchError::UnhandledException { cause, .. } => {
            assert!(cause.to_string().contains("backend unavailable"));
        }
        other => panic!("expected UnhandledException, got {other:?}"),
    }
}

#[tokio::test]
async fn test_failure_carries_committed_rounds() {
    let numbers = Arc::new(TrackedSource::digits("numbers"));

    // The first round commits; the dependent fetch then misses.
    let program = of(1, &numbers).flat_map({
        let numbers = numbers.clone();
        move |_| of(99, &numbers)
    });
    let err = run(program).await.unwrap_err();

    let env = err.env().expect("failure carries the environment");
    assert_eq!(env.rounds().len(), 1);
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_sibling_branch_completes_before_failure_surfaces() {
    let numbers = Arc::new(TrackedSource::digits("numbers"));
    let failing = Arc::new(FailingSource);

    let program = of(1, &failing).join(of(2, &numbers));
    let err = run(program).await.unwrap_err();

    assert!(err.is_unhandled());
    // The healthy branch was dispatched and ran to completion.
    assert_eq!(numbers.fetched_ids(), vec![2]);
}

#[tokio::test]
async fn test_optional_fetch_miss_resolves_to_none() {
    let numbers = Arc::new(TrackedSource::digits("numbers"));

    let (rounds, (hit, miss)) = run_log(maybe(1, &numbers).join(maybe(99, &numbers)))
        .await
        .unwrap();

    assert_eq!(hit, Some("1".to_string()));
    assert_eq!(miss, None);
    // The miss was still dispatched (and the round recorded).
    assert_eq!(rounds.len(), 1);
}

#[tokio::test]
async fn test_optional_miss_does_not_mask_required_miss() {
    let numbers = Arc::new(TrackedSource::digits("numbers"));

    let program = tuple3(
        maybe(98, &numbers),
        of(99, &numbers),
        of(1, &numbers),
    );
    let err = run(program).await.unwrap_err();

    match err {
        FetchError::MissingIdentities { missing, .. } => {
            // Only the required miss fails the round.
            assert_eq!(missing["numbers"], vec![Id::new(99)]);
        }
        other => panic!("expected MissingIdentities, got {other:?}"),
    }
}

#[tokio::test]
async fn test_required_and_optional_requests_for_same_identity() {
    let numbers = Arc::new(TrackedSource::digits("numbers"));

    let program = maybe(1, &numbers).join(of(1, &numbers));
    let (maybe_one, one) = run(program).await.unwrap();

    assert_eq!(maybe_one, Some("1".to_string()));
    assert_eq!(one, "1");
    // One dispatch serves both mentions.
    assert_eq!(numbers.fetch_calls(), 1);
}

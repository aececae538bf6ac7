//! Sequential dependencies, pure programs, and round ordering.

mod support;

use fetch_query::{Fetch, of, run, run_log, sequence};
use std::sync::Arc;
use support::TrackedSource;

#[tokio::test]
async fn test_pure_program_records_no_round() {
    let (rounds, value) = run_log(Fetch::pure(42)).await.unwrap();

    assert_eq!(value, 42);
    assert!(rounds.is_empty());
}

#[tokio::test]
async fn test_map_over_pure_applies_without_round() {
    let (rounds, value) = run_log(Fetch::pure(1).map(|n| n + 1)).await.unwrap();

    assert_eq!(value, 2);
    assert!(rounds.is_empty());
}

#[tokio::test]
async fn test_flat_map_over_pure_runs_continuation() {
    let program = Fetch::pure(2).flat_map(|n| Fetch::pure(n * 3));
    let value = run(program).await.unwrap();

    assert_eq!(value, 6);
}

#[tokio::test]
async fn test_map_transforms_fetched_value() {
    let numbers = Arc::new(TrackedSource::digits("numbers"));

    let program = of(4, &numbers).map(|s| format!("<{s}>"));
    let value = run(program).await.unwrap();

    assert_eq!(value, "<4>");
}

#[tokio::test]
async fn test_join_with_pure_adds_no_round() {
    let numbers = Arc::new(TrackedSource::digits("numbers"));

    let (rounds, (fetched, constant)) =
        run_log(of(1, &numbers).join(Fetch::pure("x"))).await.unwrap();

    assert_eq!(fetched, "1");
    assert_eq!(constant, "x");
    // Identical round log to running `of(1, ...)` alone.
    assert_eq!(rounds.len(), 1);
    assert_eq!(rounds[0].request().identity_count(), 1);
}

#[tokio::test]
async fn test_dependent_fetch_takes_two_rounds() {
    let words = Arc::new(TrackedSource::new(
        "words",
        [(1, "one".to_string()), (3, "three".to_string())],
    ));

    let program = of(1, &words).flat_map({
        let words = words.clone();
        move |value| of(value.len() as i32, &words)
    });
    let (rounds, value) = run_log(program).await.unwrap();

    assert_eq!(value, "three");
    assert_eq!(rounds.len(), 2);
    assert_eq!(words.fetched_ids(), vec![1, 3]);
}

#[tokio::test]
async fn test_round_order_follows_dependency_chain() {
    let numbers = Arc::new(TrackedSource::digits("numbers"));

    let program = of(1, &numbers)
        .flat_map({
            let numbers = numbers.clone();
            move |_| of(2, &numbers)
        })
        .flat_map({
            let numbers = numbers.clone();
            move |_| of(3, &numbers)
        });
    let (rounds, value) = run_log(program).await.unwrap();

    assert_eq!(value, "3");
    assert_eq!(rounds.len(), 3);
    assert_eq!(numbers.fetched_ids(), vec![1, 2, 3]);
}

#[tokio::test]
async fn test_rounds_have_monotonic_timestamps() {
    let numbers = Arc::new(TrackedSource::digits("numbers"));

    let program = of(1, &numbers).flat_map({
        let numbers = numbers.clone();
        move |_| of(2, &numbers)
    });
    let (rounds, _) = run_log(program).await.unwrap();

    for round in &rounds {
        assert!(round.end() >= round.start());
        assert!(round.duration_millis() >= 0.0);
    }
    assert!(rounds[1].start() >= rounds[0].end());
}

#[tokio::test]
async fn test_sequence_preserves_order() {
    let numbers = Arc::new(TrackedSource::digits("numbers"));

    let program = sequence(vec![of(3, &numbers), of(1, &numbers), of(2, &numbers)]);
    let values = run(program).await.unwrap();

    assert_eq!(values, vec!["3", "1", "2"]);
}

#[tokio::test]
async fn test_sequence_of_empty_list() {
    let values = run(sequence(Vec::<Fetch<String>>::new())).await.unwrap();
    assert!(values.is_empty());
}

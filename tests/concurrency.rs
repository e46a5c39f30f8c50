use futures::future::join_all;
use lambda_visit_counter::counter::{
    CounterRecord, CounterStore, InitOutcome, MemoryStore, StoreError,
};
use std::sync::Arc;
use std::time::Duration;

fn counter() -> Arc<CounterStore<MemoryStore>> {
    Arc::new(CounterStore::new(MemoryStore::new(), Duration::from_secs(5)))
}

async fn spawn_each<T, F, Fut>(
    counter: &Arc<CounterStore<MemoryStore>>,
    tasks: usize,
    op: F,
) -> Vec<Result<T, StoreError>>
where
    T: Send + 'static,
    F: Fn(Arc<CounterStore<MemoryStore>>) -> Fut,
    Fut: std::future::Future<Output = Result<T, StoreError>> + Send + 'static,
{
    let handles = (0..tasks).map(|_| tokio::spawn(op(Arc::clone(counter))));
    join_all(handles)
        .await
        .into_iter()
        .map(|res| res.expect("Task panicked"))
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_initialization_creates_exactly_once() {
    let counter = counter();
    let outcomes = spawn_each(&counter, 32, |c| async move {
        c.ensure_initialized("site").await
    })
    .await;
    let created = outcomes
        .iter()
        .filter(|o| **o == Ok(InitOutcome::Created))
        .count();
    let existing = outcomes
        .iter()
        .filter(|o| **o == Ok(InitOutcome::AlreadyExists))
        .count();
    assert_eq!(created, 1);
    assert_eq!(existing, 31);
    assert_eq!(
        counter.store().records().await,
        vec![CounterRecord {
            key: "site".into(),
            value: 0
        }]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_increments_are_not_lost() {
    let counter = counter();
    let values = spawn_each(&counter, 100, |c| async move { c.increment("site").await }).await;
    let mut values: Vec<i64> = values.into_iter().map(Result::unwrap).collect();
    values.sort_unstable();
    assert_eq!(values, (1..=100).collect::<Vec<_>>());
    assert_eq!(counter.store().value("site").await, Some(100));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn initialization_racing_increments_never_resets() {
    let counter = counter();
    assert_eq!(counter.increment("site").await, Ok(1));
    let (inits, increments) = futures::join!(
        spawn_each(&counter, 10, |c| async move {
            c.ensure_initialized("site").await
        }),
        spawn_each(&counter, 10, |c| async move { c.increment("site").await }),
    );
    assert!(inits.iter().all(|o| *o == Ok(InitOutcome::AlreadyExists)));
    assert!(increments.iter().all(Result::is_ok));
    assert_eq!(counter.store().value("site").await, Some(11));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn mixed_increments_and_decrements_balance() {
    let counter = counter();
    let _ = counter.ensure_initialized("site").await.unwrap();
    let (up, down) = futures::join!(
        spawn_each(&counter, 50, |c| async move { c.increment("site").await }),
        spawn_each(&counter, 20, |c| async move { c.decrement("site").await }),
    );
    assert!(up.iter().chain(down.iter()).all(Result::is_ok));
    assert_eq!(counter.store().value("site").await, Some(30));
}

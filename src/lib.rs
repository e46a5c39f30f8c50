//! This crate provides the lambdas behind a site visit counter. The counter
//! lives as a single record in a key-value store (DynamoDB) and is only ever
//! changed through atomic store requests, so concurrent invocations never
//! lose an update.
//!
//! * [`provision`]: CloudFormation custom resource which creates the counter
//!   record once, when the stack gets deployed
//! * [`visit`]: Lambda which increments (or decrements) the counter and
//!   returns the new value
//! * [`counter`]: The [`counter::CounterStore`] used by both lambdas and the
//!   available store backends
//!
//! # Running a lambda
//!
//! Both lambdas implement [`Runner`] and are started with [`exec_tokio`]:
//!
//! ```no_run
//! pub fn main() -> anyhow::Result<()> {
//!     lambda_visit_counter::exec_tokio::<
//!         _,
//!         _,
//!         lambda_visit_counter::visit::VisitRunner<lambda_visit_counter::counter::DynamoDbStore>,
//!         _,
//!     >()
//! }
//! ```
//!
//! Configuration is read from the environment, see [`config::Config::from_env`].
//!
//! # Custom lambdas
//!
//! Custom types can be used as long as types for events implement
//! [`serde::Deserialize`] and return types implement [`serde::Serialize`].
//!
//! ```no_run
//! #[derive(serde::Deserialize, Debug)]
//! struct Event {
//!     key: String,
//! }
//!
//! struct Runner;
//!
//! #[async_trait::async_trait]
//! impl lambda_visit_counter::Runner<
//!     lambda_visit_counter::counter::CounterStore<lambda_visit_counter::counter::MemoryStore>,
//!     Event,
//!     i64,
//! > for Runner {
//!     async fn setup(
//!         _region: &str,
//!     ) -> anyhow::Result<lambda_visit_counter::counter::CounterStore<lambda_visit_counter::counter::MemoryStore>> {
//!         Ok(lambda_visit_counter::counter::CounterStore::new(
//!             lambda_visit_counter::counter::MemoryStore::new(),
//!             std::time::Duration::from_secs(1),
//!         ))
//!     }
//!
//!     async fn run<'a>(
//!         shared: &'a lambda_visit_counter::counter::CounterStore<lambda_visit_counter::counter::MemoryStore>,
//!         event: lambda_visit_counter::LambdaEvent<'a, Event>,
//!     ) -> anyhow::Result<i64> {
//!         Ok(shared.increment(&event.event.key).await?)
//!     }
//! }
//!
//! pub fn main() -> anyhow::Result<()> {
//!     lambda_visit_counter::exec_tokio::<_, _, Runner, _>()
//! }
//! ```
//!
//! # Shared Data
//!
//! [`Runner::setup`] is invoked once per execution environment. The value it
//! returns (store clients, configuration) is shared by all invocations which
//! run in that environment.
//!
//! # Timeout handling
//!
//! Normally, if a lambda runs into a timeout, it will not create an error,
//! which then does not get propagated by `on_error` destinations.
//!
//! To fix that, a timeout handler is setup, which will "fail" 100 miliseconds
//! before the lambda would run into a timeout. There is no guarantee that this
//! handler will fail in time. It only works when the lambda code is currently
//! awaiting, giving tokio the chance to switch tasks.
//!
//! Requests to the store are bounded separately by
//! [`config::Config::request_timeout`].

#![warn(
    absolute_paths_not_starting_with_crate,
    anonymous_parameters,
    deprecated_in_future,
    elided_lifetimes_in_paths,
    explicit_outlives_requirements,
    keyword_idents,
    macro_use_extern_crate,
    meta_variable_misuse,
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    non_ascii_idents,
    trivial_casts,
    trivial_numeric_casts,
    unreachable_pub,
    unsafe_code,
    unstable_features,
    unused_extern_crates,
    unused_import_braces,
    unused_lifetimes,
    unused_qualifications,
    unused_results,
    variant_size_differences
)]
#![warn(
    clippy::correctness,
    clippy::style,
    clippy::complexity,
    clippy::perf,
    clippy::nursery
)]
#![allow(clippy::multiple_crate_versions, clippy::future_not_send)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod config;
pub mod counter;
pub mod logging;
pub mod provision;
pub mod visit;

/// Event of a single lambda invocation
#[derive(Debug)]
pub struct LambdaEvent<'a, Event> {
    /// Payload send to the lambda
    pub event: Event,
    /// CloudWatch log stream the invocation logs to
    pub log_stream: &'a str,
    /// Point in time at which lambda aborts the invocation.
    /// `None` when running locally through [`exec_test`]
    pub deadline: Option<tokio::time::Instant>,
}

/// Time before the deadline at which a running invocation is failed
pub const DEADLINE_MARGIN: std::time::Duration = std::time::Duration::from_millis(100);

/// Defines a type which is executed every time a lambda
/// is invoked.
///
/// Types:
/// * `Shared`: Type which is created once in [`Runner::setup`] and shared
///             between lambda invocations. Note that lambda will
///             create multiple environments for
///             simultaneous invocations and environments
///             are only kept alive for a certain time.
/// * `Event`:  The expected Event which is being send
///             to the lambda by AWS.
/// * `Return`: Type which is the result of the lambda
///             invocation being returned to AWS
#[async_trait::async_trait]
pub trait Runner<Shared, Event, Return>
where
    Shared: Send + Sync,
    Event: serde::de::DeserializeOwned + std::fmt::Debug + Send,
    Return: serde::Serialize + Send,
{
    /// Invoked only once before lambda runtime start. Does not get called on each
    /// lambda invocation. Creates the data shared between invocations, but
    /// should be short as it delays lambda startup
    async fn setup(region: &str) -> anyhow::Result<Shared>;

    /// Invoked for every lambda invocation
    ///
    /// More Info: <https://docs.aws.amazon.com/lambda/latest/dg/runtimes-context.html>
    async fn run<'a>(shared: &'a Shared, event: LambdaEvent<'a, Event>) -> anyhow::Result<Return>;
}

/// Lambda entrypoint. This function sets up a lambda
/// multi-thread runtimes and executes [`exec`]. If you
/// already have your own runtime, use the [`exec`]
/// function.
///
/// Types:
/// * `Shared`: See [`Runner`]
/// * `Event`:  The expected Event which is being send
///             to the lambda by AWS.
/// * `Run`:    Runner which is executed for each lambda
///             invocation.
/// * `Return`: Type which is the result of the lambda
///             invocation being returned to AWS
pub fn exec_tokio<Shared, Event, Run, Return>() -> anyhow::Result<()>
where
    Shared: Send + Sync,
    Event: serde::de::DeserializeOwned + std::fmt::Debug + Send,
    Run: Runner<Shared, Event, Return>,
    Return: serde::Serialize + Send,
{
    use anyhow::Context;
    use tokio::runtime::Builder;

    Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Unable to build tokio runtime")?
        .block_on(exec::<Shared, Event, Run, Return>())
}

/// Lambda entrypoint. This function requires a
/// running tokio runtime. Alternatively use [`exec_tokio`]
/// which creates one.
///
/// Types: See [`exec_tokio`]
pub async fn exec<Shared, Event, Run, Return>() -> anyhow::Result<()>
where
    Shared: Send + Sync,
    Event: serde::de::DeserializeOwned + std::fmt::Debug + Send,
    Run: Runner<Shared, Event, Return>,
    Return: serde::Serialize + Send,
{
    use anyhow::{anyhow, Context};
    use std::env;

    let region = env::var("AWS_REGION").context("Missing AWS_REGION env variable")?;
    let shared = Run::setup(&region).await?;
    log::info!("Starting lambda runtime");
    let shared_ref = &shared;
    lambda_runtime::run(lambda_runtime::service_fn(
        move |data: lambda_runtime::LambdaEvent<Event>| async move {
            let lambda_runtime::LambdaEvent { payload, context } = data;
            log::info!("Received lambda invocation with event: {:?}", payload);
            let event = LambdaEvent {
                event: payload,
                log_stream: &context.env_config.log_stream,
                deadline: Some(deadline_from_epoch(context.deadline)),
            };
            run::<_, Event, Run, Return>(shared_ref, event)
                .await
                .map_err(lambda_runtime::Error::from)
        },
    ))
    .await
    .map_err(|e| anyhow!(e))
}

async fn run<Shared, Event, Run, Return>(
    shared: &Shared,
    event: LambdaEvent<'_, Event>,
) -> anyhow::Result<Return>
where
    Shared: Send + Sync,
    Event: serde::de::DeserializeOwned + std::fmt::Debug + Send,
    Run: Runner<Shared, Event, Return>,
    Return: serde::Serialize + Send,
{
    use anyhow::anyhow;
    use futures::FutureExt;

    let deadline = event.deadline;
    let mut runner = Run::run(shared, event).fuse();
    let res = if let Some(deadline) = deadline {
        let mut timeout = Box::pin(timeout_handler(deadline).fuse());
        futures::select! {
            res = runner => res,
            _ = timeout => Err(anyhow!("Lambda failed by running into a timeout")),
        }
    } else {
        runner.await
    };
    log::info!("Completed lambda invocation");
    match res {
        Ok(res) => Ok(res),
        Err(err) => {
            log::error!("{:?}", err);
            Err(err)
        }
    }
}

/// Converts the lambda deadline (milliseconds since the unix epoch)
/// into an [`tokio::time::Instant`]
fn deadline_from_epoch(deadline_in_ms: u64) -> tokio::time::Instant {
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let remaining = Duration::from_millis(deadline_in_ms)
        .checked_sub(now)
        .unwrap_or_default();
    tokio::time::Instant::now() + remaining
}

async fn timeout_handler(deadline: tokio::time::Instant) {
    let deadline = deadline.checked_sub(DEADLINE_MARGIN).unwrap_or(deadline);
    log::info!("Setting deadline to: {:?}", deadline);
    tokio::time::sleep_until(deadline).await;
}

/// TestData which can be used to test lambda invocations
/// locally in combination with [`exec_test`].
#[derive(serde::Deserialize, Clone, Debug)]
pub struct TestData<Event> {
    region: String,
    invocations: Vec<Event>,
}

/// Lambda entrypoint. This function can be used to
/// test one or multiple lambda invocations locally.
/// Returns the results of all invocations.
///
/// Types: See [`exec_tokio`]
pub fn exec_test<Shared, Event, Run, Return>(test_data: &str) -> anyhow::Result<Vec<Return>>
where
    Shared: Send + Sync,
    Event: serde::de::DeserializeOwned + std::fmt::Debug + Send,
    Run: Runner<Shared, Event, Return>,
    Return: serde::Serialize + Send + std::fmt::Debug,
{
    use anyhow::Context;
    use tokio::runtime::Builder;

    log::info!("Creating tokio runtime");
    Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Unable to build tokio runtime")?
        .block_on(async {
            let test_data: TestData<Event> =
                serde_json::from_str(test_data).context("Unable to deserialize test_data")?;
            let shared = Run::setup(&test_data.region).await?;
            log::info!("Starting lambda test runtime");

            let mut results = Vec::with_capacity(test_data.invocations.len());
            for (i, data) in test_data.invocations.into_iter().enumerate() {
                log::info!("Invocation: {}", i);
                let event = LambdaEvent {
                    event: data,
                    log_stream: "local-test",
                    deadline: None,
                };
                let res = run::<_, Event, Run, Return>(&shared, event).await?;
                log::info!("{:?}", res);
                results.push(res);
            }
            Ok(results)
        })
}

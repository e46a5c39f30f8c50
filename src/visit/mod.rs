//! Provides the lambda which counts site visits.
//!
//! Every invocation increments the counter by one and returns the new
//! value. Events with `"action": "decrement"` subtract one instead.
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

use crate::counter::{Connect, CounterStore, KvStore};

/// Operation requested by the event
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Add one visit
    #[default]
    Increment,
    /// Remove one visit
    Decrement,
}

/// Event received by the visit counter. Fields other than `action` are
/// ignored, so any trigger payload is accepted.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Event {
    /// Defaults to [`Action::Increment`]
    #[serde(default)]
    pub action: Action,
}

/// Counter value after the update
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Response {
    /// Key of the counter
    pub site: String,
    /// New counter value
    pub visit_count: i64,
}

/// Data shared between invocations of the visit counter
#[derive(Debug)]
pub struct Shared<S> {
    /// Counter to update
    pub counter: CounterStore<S>,
    /// Key of the counted site
    pub key: String,
}

/// Applies the action of `event` to the counter
pub async fn process<S: KvStore>(shared: &Shared<S>, event: &Event) -> anyhow::Result<Response> {
    use anyhow::Context;

    let visit_count = match event.action {
        Action::Increment => shared.counter.increment(&shared.key).await,
        Action::Decrement => shared.counter.decrement(&shared.key).await,
    }
    .with_context(|| format!("Unable to {:?} counter {}", event.action, shared.key))?;
    Ok(Response {
        site: shared.key.clone(),
        visit_count,
    })
}

/// [`crate::Runner`] for the visit counter lambda
#[derive(Debug)]
pub struct VisitRunner<S>(std::marker::PhantomData<S>);

#[async_trait::async_trait]
impl<S> crate::Runner<Shared<S>, Event, Response> for VisitRunner<S>
where
    S: 'static + Connect,
{
    async fn setup(region: &str) -> anyhow::Result<Shared<S>> {
        let config = crate::config::Config::from_env()?;
        let store = S::connect(&config.table, region).await?;
        Ok(Shared {
            counter: CounterStore::new(store, config.request_timeout),
            key: config.key,
        })
    }

    async fn run<'a>(
        shared: &'a Shared<S>,
        event: crate::LambdaEvent<'a, Event>,
    ) -> anyhow::Result<Response> {
        process(shared, &event.event).await
    }
}

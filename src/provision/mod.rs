//! Provides the lambda used as CloudFormation custom resource to create the
//! counter record when the stack is deployed.
//!
//! # Usage
//!
//! ```no_run
//! pub fn main() -> anyhow::Result<()> {
//!     lambda_visit_counter::exec_tokio::<
//!         _,
//!         _,
//!         lambda_visit_counter::provision::ProvisionRunner<lambda_visit_counter::counter::DynamoDbStore>,
//!         _,
//!     >()
//! }
//! ```
//!
//! `Create` requests initialize the counter record, `Update` and `Delete`
//! requests leave the table untouched. A response is sent to the
//! `ResponseURL` of every request, including failed ones, so the stack
//! operation never waits for a timeout.

mod callback;

pub use callback::{Callback, HttpCallback};

use crate::counter::{Connect, CounterStore, InitOutcome, KvStore, StoreError};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Time kept free before the invocation deadline to deliver the response
pub const RESPONSE_RESERVE: Duration = Duration::from_millis(500);

/// Lifecycle step of the custom resource
#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Deserialize)]
pub enum RequestType {
    /// Resource gets created
    Create,
    /// Resource properties changed
    Update,
    /// Resource gets removed
    Delete,
}

/// `Event` which is send by CloudFormation to the custom resource lambda
#[derive(Clone, Debug, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Event {
    /// Current step of the resource lifecycle
    pub request_type: RequestType,
    /// Pre-signed url which expects the response
    #[serde(rename = "ResponseURL")]
    pub response_url: String,
    /// Stack containing the resource
    pub stack_id: String,
    /// Unique id of this request
    pub request_id: String,
    /// Type of the resource as defined in the template
    pub resource_type: String,
    /// Name of the resource in the template
    pub logical_resource_id: String,
    /// Id returned by a previous response. Missing on `Create`
    #[serde(default)]
    pub physical_resource_id: Option<String>,
    /// Properties of the resource
    #[serde(default)]
    pub resource_properties: ResourceProperties,
}

/// Properties set on the custom resource in the template
#[derive(Clone, Debug, Default, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResourceProperties {
    /// Overrides the configured counter key
    #[serde(default)]
    pub key: Option<String>,
    /// Other properties (e.g. `ServiceToken`)
    #[serde(flatten)]
    pub other: HashMap<String, serde_json::Value>,
}

/// Completion status reported to CloudFormation
#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Status {
    /// Request handled
    #[serde(rename = "SUCCESS")]
    Success,
    /// Request failed, the stack operation gets rolled back
    #[serde(rename = "FAILED")]
    Failed,
}

/// Body which is send to the `ResponseURL`
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Response {
    /// Completion status
    pub status: Status,
    /// Free-form message shown in the stack events
    pub reason: String,
    /// Id of the resource
    pub physical_resource_id: String,
    /// Copied from the request
    pub stack_id: String,
    /// Copied from the request
    pub request_id: String,
    /// Copied from the request
    pub logical_resource_id: String,
    /// Additional data describing what was done
    pub data: BTreeMap<String, String>,
}

impl Response {
    fn new(event: &Event, log_stream: &str, outcome: &Result<(&str, &str), StoreError>) -> Self {
        let details = format!("See the details in CloudWatch Log Stream: {}", log_stream);
        let (status, reason, (name, message)) = match *outcome {
            Ok(data) => (Status::Success, details, data),
            Err(ref err) => (
                Status::Failed,
                format!("{}. {}", err, details),
                ("Error", "Something went wrong"),
            ),
        };
        Self {
            status,
            reason,
            physical_resource_id: event
                .physical_resource_id
                .clone()
                .unwrap_or_else(|| log_stream.to_owned()),
            stack_id: event.stack_id.clone(),
            request_id: event.request_id.clone(),
            logical_resource_id: event.logical_resource_id.clone(),
            data: std::iter::once((name.to_owned(), message.to_owned())).collect(),
        }
    }
}

/// Data shared between invocations of the provisioning lambda
#[derive(Debug)]
pub struct Shared<S, C = HttpCallback> {
    /// Counter to initialize
    pub counter: CounterStore<S>,
    /// Sender for completion responses
    pub callback: C,
    /// Key used when the resource does not set one
    pub key: String,
}

/// Handles a single custom resource request and reports its completion
/// through `shared.callback`.
///
/// With a `deadline`, store requests are cut off [`RESPONSE_RESERVE`] before
/// it, so a response is sent even if the store hangs.
///
/// Returns an error if the request failed or the response could not be
/// delivered. A failed request is still reported to CloudFormation.
pub async fn process<S, C>(
    shared: &Shared<S, C>,
    event: &Event,
    log_stream: &str,
    deadline: Option<tokio::time::Instant>,
) -> anyhow::Result<Response>
where
    S: KvStore,
    C: Callback,
{
    use anyhow::Context;

    let key = event
        .resource_properties
        .key
        .as_deref()
        .unwrap_or(&shared.key);
    log::info!("{:?} request for counter {}", event.request_type, key);
    let budget = deadline.map_or(Duration::MAX, |deadline| {
        deadline
            .saturating_duration_since(tokio::time::Instant::now())
            .saturating_sub(RESPONSE_RESERVE)
    });
    let outcome = match event.request_type {
        RequestType::Create => {
            shared
                .counter
                .ensure_initialized_within(key, budget)
                .await
                .map(|outcome| match outcome {
                    InitOutcome::Created => ("Create", "Create RequestType was used"),
                    InitOutcome::AlreadyExists => {
                        ("Skip", "Item Already Exists. Item Creation Not Required")
                    }
                })
        }
        RequestType::Update => Ok(("Update", "Update RequestType was used")),
        RequestType::Delete => Ok(("Delete", "Delete RequestType was used")),
    };
    let response = Response::new(event, log_stream, &outcome);
    let sent = shared
        .callback
        .send(&event.response_url, &response)
        .await
        .context("Unable to deliver custom resource response");
    if let Err(ref err) = sent {
        log::error!("{:?}", err);
    }
    let _ = outcome.with_context(|| {
        format!(
            "{:?} request {} for counter {} failed",
            event.request_type, event.request_id, key
        )
    })?;
    sent.map(|()| response)
}

/// [`crate::Runner`] for the provisioning lambda
#[derive(Debug)]
pub struct ProvisionRunner<S, C = HttpCallback>(std::marker::PhantomData<(S, C)>);

#[async_trait::async_trait]
impl<S, C> crate::Runner<Shared<S, C>, Event, Response> for ProvisionRunner<S, C>
where
    S: 'static + Connect,
    C: 'static + Callback + Default,
{
    async fn setup(region: &str) -> anyhow::Result<Shared<S, C>> {
        let config = crate::config::Config::from_env()?;
        let store = S::connect(&config.table, region).await?;
        Ok(Shared {
            counter: CounterStore::new(store, config.request_timeout),
            callback: C::default(),
            key: config.key,
        })
    }

    async fn run<'a>(
        shared: &'a Shared<S, C>,
        event: crate::LambdaEvent<'a, Event>,
    ) -> anyhow::Result<Response> {
        process(shared, &event.event, event.log_stream, event.deadline).await
    }
}

use super::{Connect, KvStore, StoreError};
use crate::config::TableConfig;
use aws_sdk_dynamodb::error::{DisplayErrorContext, SdkError};
use aws_sdk_dynamodb::operation::put_item::PutItemError;
use aws_sdk_dynamodb::operation::update_item::{UpdateItemError, UpdateItemOutput};
use aws_sdk_dynamodb::types::{AttributeValue, ReturnValue};

/// [`KvStore`] backed by a DynamoDB table, using `aws-sdk-dynamodb`
#[derive(Debug, Clone)]
pub struct DynamoDbStore {
    client: aws_sdk_dynamodb::Client,
    table: TableConfig,
}

impl DynamoDbStore {
    /// Creates a store from an existing client
    pub const fn new(client: aws_sdk_dynamodb::Client, table: TableConfig) -> Self {
        Self { client, table }
    }

    async fn update(
        &self,
        key: &str,
        expression: &str,
        values: &[(&str, i64)],
    ) -> Result<i64, StoreError> {
        let mut request = self
            .client
            .update_item()
            .table_name(&self.table.name)
            .key(&self.table.key_attribute, AttributeValue::S(key.to_owned()))
            .update_expression(expression)
            .expression_attribute_names("#v", &self.table.value_attribute)
            .return_values(ReturnValue::UpdatedNew);
        for (name, value) in values {
            request =
                request.expression_attribute_values(*name, AttributeValue::N(value.to_string()));
        }
        let output = request.send().await.map_err(|err| {
            classify(
                err,
                UpdateItemError::is_conditional_check_failed_exception,
                |e| {
                    e.is_provisioned_throughput_exceeded_exception()
                        || e.is_request_limit_exceeded()
                        || e.is_internal_server_error()
                },
            )
        })?;
        self.updated_value(key, &output)
    }

    fn updated_value(&self, key: &str, output: &UpdateItemOutput) -> Result<i64, StoreError> {
        let attribute = &self.table.value_attribute;
        let value = output
            .attributes()
            .and_then(|attributes| attributes.get(attribute))
            .ok_or_else(|| {
                StoreError::Unexpected(format!("{} was not returned for {}", attribute, key))
            })?
            .as_n()
            .map_err(|_| {
                StoreError::Unexpected(format!("{} of {} is not a number", attribute, key))
            })?;
        value.parse().map_err(|_| {
            StoreError::Unexpected(format!(
                "{} of {} is not an integer: {}",
                attribute, key, value
            ))
        })
    }
}

#[async_trait::async_trait]
impl KvStore for DynamoDbStore {
    async fn insert_if_absent(&self, key: &str, value: i64) -> Result<(), StoreError> {
        let _ = self
            .client
            .put_item()
            .table_name(&self.table.name)
            .item(&self.table.key_attribute, AttributeValue::S(key.to_owned()))
            .item(
                &self.table.value_attribute,
                AttributeValue::N(value.to_string()),
            )
            .condition_expression("attribute_not_exists(#k) AND attribute_not_exists(#v)")
            .expression_attribute_names("#k", &self.table.key_attribute)
            .expression_attribute_names("#v", &self.table.value_attribute)
            .send()
            .await
            .map_err(|err| {
                classify(
                    err,
                    PutItemError::is_conditional_check_failed_exception,
                    |e| {
                        e.is_provisioned_throughput_exceeded_exception()
                            || e.is_request_limit_exceeded()
                            || e.is_internal_server_error()
                    },
                )
            })?;
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, default: i64) -> Result<i64, StoreError> {
        self.update(
            key,
            "SET #v = if_not_exists(#v, :default)",
            &[(":default", default)],
        )
        .await
    }

    async fn add(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        self.update(key, "SET #v = #v + :delta", &[(":delta", delta)])
            .await
    }

    async fn add_with_default(
        &self,
        key: &str,
        default: i64,
        delta: i64,
    ) -> Result<i64, StoreError> {
        self.update(
            key,
            "SET #v = if_not_exists(#v, :default) + :delta",
            &[(":default", default), (":delta", delta)],
        )
        .await
    }
}

#[async_trait::async_trait]
impl Connect for DynamoDbStore {
    async fn connect(table: &TableConfig, region: &str) -> anyhow::Result<Self> {
        let config = sdk_config(region).await;
        log::info!("Connecting to DynamoDB table {} in {}", table.name, region);
        Ok(Self::new(
            aws_sdk_dynamodb::Client::new(&config),
            table.clone(),
        ))
    }
}

/// Loads the SDK config with retries disabled. A retried `UpdateItem` whose
/// first attempt was applied would count twice.
async fn sdk_config(region: &str) -> aws_config::SdkConfig {
    aws_config::from_env()
        .region(aws_sdk_dynamodb::config::Region::new(region.to_owned()))
        .retry_config(aws_config::retry::RetryConfig::disabled())
        .load()
        .await
}

fn classify<E, R>(
    err: SdkError<E, R>,
    is_condition_failed: impl Fn(&E) -> bool,
    is_transient: impl Fn(&E) -> bool,
) -> StoreError
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let message = format!("{}", DisplayErrorContext(&err));
    match err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => {
            StoreError::Unavailable(message)
        }
        SdkError::ServiceError(ref service) if is_condition_failed(service.err()) => {
            StoreError::ConditionFailed
        }
        SdkError::ServiceError(ref service) if is_transient(service.err()) => {
            StoreError::Unavailable(message)
        }
        _ => StoreError::Unexpected(message),
    }
}

#[cfg(test)]
mod tests {
    use super::{classify, sdk_config, StoreError};
    use aws_sdk_dynamodb::error::SdkError;
    use aws_sdk_dynamodb::operation::put_item::PutItemError;

    #[tokio::test]
    async fn sdk_retries_are_disabled() {
        let config = sdk_config("eu-central-1").await;
        let attempts = config.retry_config().map(|retry| retry.max_attempts());
        assert_eq!(attempts, Some(1));
    }

    #[test]
    fn sdk_timeouts_are_unavailable() {
        let err: SdkError<PutItemError, ()> = SdkError::timeout_error("read timed out");
        let err = classify(
            err,
            PutItemError::is_conditional_check_failed_exception,
            |_| false,
        );
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert!(err.is_retryable());
    }
}

use super::{Connect, KvStore, StoreError};
use crate::config::TableConfig;
use rusoto_core::RusotoError;
use rusoto_dynamodb::{
    AttributeValue, DynamoDb, DynamoDbClient, PutItemError, PutItemInput, UpdateItemError,
    UpdateItemInput,
};
use std::collections::HashMap;

/// [`KvStore`] backed by a DynamoDB table, using `rusoto_dynamodb`
#[derive(Clone)]
pub struct RusotoDynamoDbStore {
    client: DynamoDbClient,
    table: TableConfig,
}

impl std::fmt::Debug for RusotoDynamoDbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RusotoDynamoDbStore")
            .field("client", &"[...]")
            .field("table", &self.table)
            .finish()
    }
}

impl RusotoDynamoDbStore {
    /// Creates a new store in the given region
    pub fn new(region: rusoto_core::Region, table: TableConfig) -> Self {
        Self {
            client: DynamoDbClient::new(region),
            table,
        }
    }

    fn string(value: &str) -> AttributeValue {
        AttributeValue {
            s: Some(value.to_owned()),
            ..AttributeValue::default()
        }
    }

    fn number(value: i64) -> AttributeValue {
        AttributeValue {
            n: Some(value.to_string()),
            ..AttributeValue::default()
        }
    }

    async fn update(
        &self,
        key: &str,
        expression: &str,
        values: &[(&str, i64)],
    ) -> Result<i64, StoreError> {
        let attribute = &self.table.value_attribute;
        let res = self
            .client
            .update_item(UpdateItemInput {
                table_name: self.table.name.clone(),
                key: std::iter::once((self.table.key_attribute.clone(), Self::string(key)))
                    .collect(),
                update_expression: Some(expression.to_owned()),
                expression_attribute_names: Some(
                    std::iter::once(("#v".to_owned(), attribute.clone())).collect(),
                ),
                expression_attribute_values: Some(
                    values
                        .iter()
                        .map(|(name, value)| ((*name).to_owned(), Self::number(*value)))
                        .collect(),
                ),
                return_values: Some("UPDATED_NEW".to_owned()),
                ..UpdateItemInput::default()
            })
            .await;
        let output = match res {
            Ok(output) => output,
            Err(RusotoError::Service(UpdateItemError::ConditionalCheckFailed(_))) => {
                return Err(StoreError::ConditionFailed)
            }
            Err(
                err @ RusotoError::Service(
                    UpdateItemError::ProvisionedThroughputExceeded(_)
                    | UpdateItemError::RequestLimitExceeded(_)
                    | UpdateItemError::InternalServerError(_),
                ),
            ) => return Err(StoreError::Unavailable(err.to_string())),
            Err(err) => return Err(Self::classify(err)),
        };
        let value = output
            .attributes
            .as_ref()
            .and_then(|attributes| attributes.get(attribute))
            .and_then(|value| value.n.as_deref())
            .ok_or_else(|| {
                StoreError::Unexpected(format!("{} was not returned for {}", attribute, key))
            })?;
        value.parse().map_err(|_| {
            StoreError::Unexpected(format!(
                "{} of {} is not an integer: {}",
                attribute, key, value
            ))
        })
    }

    fn classify<E: std::error::Error + 'static>(err: RusotoError<E>) -> StoreError {
        match err {
            RusotoError::HttpDispatch(_) => StoreError::Unavailable(err.to_string()),
            RusotoError::Unknown(ref response) if response.status.is_server_error() => {
                StoreError::Unavailable(err.to_string())
            }
            _ => StoreError::Unexpected(err.to_string()),
        }
    }
}

#[async_trait::async_trait]
impl KvStore for RusotoDynamoDbStore {
    async fn insert_if_absent(&self, key: &str, value: i64) -> Result<(), StoreError> {
        let item: HashMap<String, AttributeValue> = [
            (self.table.key_attribute.clone(), Self::string(key)),
            (self.table.value_attribute.clone(), Self::number(value)),
        ]
        .into_iter()
        .collect();
        let names: HashMap<String, String> = [
            ("#k".to_owned(), self.table.key_attribute.clone()),
            ("#v".to_owned(), self.table.value_attribute.clone()),
        ]
        .into_iter()
        .collect();
        let res = self
            .client
            .put_item(PutItemInput {
                table_name: self.table.name.clone(),
                item,
                condition_expression: Some(
                    "attribute_not_exists(#k) AND attribute_not_exists(#v)".to_owned(),
                ),
                expression_attribute_names: Some(names),
                ..PutItemInput::default()
            })
            .await;
        match res {
            Ok(_) => Ok(()),
            Err(RusotoError::Service(PutItemError::ConditionalCheckFailed(_))) => {
                Err(StoreError::ConditionFailed)
            }
            Err(
                err @ RusotoError::Service(
                    PutItemError::ProvisionedThroughputExceeded(_)
                    | PutItemError::RequestLimitExceeded(_)
                    | PutItemError::InternalServerError(_),
                ),
            ) => Err(StoreError::Unavailable(err.to_string())),
            Err(err) => Err(Self::classify(err)),
        }
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
impl Connect for RusotoDynamoDbStore {
    async fn connect(table: &TableConfig, region: &str) -> anyhow::Result<Self> {
        use anyhow::Context;
        use std::str::FromStr;

        let region =
            rusoto_core::Region::from_str(region).context("invalid region given to lambda")?;
        Ok(Self::new(region, table.clone()))
    }
}

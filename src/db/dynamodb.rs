//! DynamoDB member store.
//!
//! Table layout: partition key `phone` (the natural key), global secondary
//! index `id-index` on the server-assigned `id`. Creation uses a
//! conditional put so two concurrent registrations for the same phone
//! resolve to exactly one winner; the loser surfaces as
//! [`StoreError::Duplicate`].

use std::collections::HashMap;

use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::Region;
use aws_sdk_dynamodb::types::{AttributeValue, ReturnValue};
use aws_sdk_dynamodb::Client;
use chrono::{DateTime, Utc};
use tracing::{error, info};

use super::{MemberProfile, MemberStore, ProfileUpdate, StoreError};

const ID_INDEX: &str = "id-index";

#[derive(Debug, Clone)]
pub struct DynamoDbConfig {
    pub table_name: String,
    pub region: String,
    /// Endpoint override for local development (e.g. dynamodb-local).
    pub endpoint: Option<String>,
}

pub struct DynamoDbStore {
    client: Client,
    table_name: String,
}

impl DynamoDbStore {
    pub async fn new(config: DynamoDbConfig) -> Self {
        let region_provider = RegionProviderChain::first_try(Region::new(config.region.clone()));
        let mut loader =
            aws_config::defaults(aws_config::BehaviorVersion::latest()).region(region_provider);
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let shared_config = loader.load().await;

        Self {
            client: Client::new(&shared_config),
            table_name: config.table_name,
        }
    }

    fn item_from_profile(profile: &MemberProfile) -> HashMap<String, AttributeValue> {
        let mut item = HashMap::new();
        item.insert("phone".to_string(), AttributeValue::S(profile.phone.clone()));
        item.insert("id".to_string(), AttributeValue::S(profile.id.clone()));
        item.insert("name".to_string(), AttributeValue::S(profile.name.clone()));
        for (attr, value) in [
            ("email", &profile.email),
            ("gender", &profile.gender),
            ("date_of_birth", &profile.date_of_birth),
            ("bio", &profile.bio),
            ("avatar_url", &profile.avatar_url),
        ] {
            if let Some(value) = value {
                item.insert(attr.to_string(), AttributeValue::S(value.clone()));
            }
        }
        item.insert(
            "profile_complete".to_string(),
            AttributeValue::Bool(profile.profile_complete),
        );
        item.insert(
            "created_at".to_string(),
            AttributeValue::S(profile.created_at.to_rfc3339()),
        );
        item.insert(
            "updated_at".to_string(),
            AttributeValue::S(profile.updated_at.to_rfc3339()),
        );
        item
    }

    async fn query_by_id(&self, id: &str) -> Result<Option<MemberProfile>, StoreError> {
        let output = self
            .client
            .query()
            .table_name(&self.table_name)
            .index_name(ID_INDEX)
            .key_condition_expression("#id = :id")
            .expression_attribute_names("#id", "id")
            .expression_attribute_values(":id", AttributeValue::S(id.to_string()))
            .send()
            .await
            .map_err(backend_error)?;

        match output.items().first() {
            Some(item) => Ok(Some(profile_from_item(item)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl MemberStore for DynamoDbStore {
    async fn create(&self, profile: MemberProfile) -> Result<MemberProfile, StoreError> {
        let result = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(Self::item_from_profile(&profile)))
            .condition_expression("attribute_not_exists(phone)")
            .send()
            .await;

        match result {
            Ok(_) => {
                info!(phone = %profile.phone, id = %profile.id, "created member");
                Ok(profile)
            }
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_conditional_check_failed_exception() {
                    Err(StoreError::Duplicate)
                } else {
                    Err(backend_error(service_err))
                }
            }
        }
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<MemberProfile>, StoreError> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("phone", AttributeValue::S(phone.to_string()))
            .send()
            .await
            .map_err(backend_error)?;

        match output.item() {
            Some(item) => Ok(Some(profile_from_item(item)?)),
            None => Ok(None),
        }
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<MemberProfile>, StoreError> {
        self.query_by_id(id).await
    }

    async fn update(&self, id: &str, update: ProfileUpdate) -> Result<MemberProfile, StoreError> {
        // The table is keyed by phone, so resolve the id first. Phone
        // never changes, so the second step cannot race with a key move.
        let current = self.query_by_id(id).await?.ok_or(StoreError::NotFound)?;

        let mut assignments = vec!["#updated_at = :updated_at".to_string()];
        let mut builder = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key("phone", AttributeValue::S(current.phone.clone()))
            .expression_attribute_names("#updated_at", "updated_at")
            .expression_attribute_values(
                ":updated_at",
                AttributeValue::S(Utc::now().to_rfc3339()),
            );

        for (attr, value) in [
            ("name", &update.name),
            ("email", &update.email),
            ("gender", &update.gender),
            ("date_of_birth", &update.date_of_birth),
            ("bio", &update.bio),
            ("avatar_url", &update.avatar_url),
        ] {
            if let Some(value) = value {
                assignments.push(format!("#{attr} = :{attr}"));
                builder = builder
                    .expression_attribute_names(format!("#{attr}"), attr)
                    .expression_attribute_values(
                        format!(":{attr}"),
                        AttributeValue::S(value.clone()),
                    );
            }
        }

        let output = builder
            .update_expression(format!("SET {}", assignments.join(", ")))
            .return_values(ReturnValue::AllNew)
            .send()
            .await
            .map_err(backend_error)?;

        match output.attributes() {
            Some(item) => profile_from_item(item),
            None => Err(StoreError::NotFound),
        }
    }

    async fn list(&self) -> Result<Vec<MemberProfile>, StoreError> {
        let output = self
            .client
            .scan()
            .table_name(&self.table_name)
            .send()
            .await
            .map_err(backend_error)?;

        output.items().iter().map(profile_from_item).collect()
    }

    async fn ping(&self) -> bool {
        self.client
            .describe_table()
            .table_name(&self.table_name)
            .send()
            .await
            .is_ok()
    }
}

fn backend_error<E>(err: E) -> StoreError
where
    E: std::error::Error + Send + Sync + 'static,
{
    error!("DynamoDB operation failed: {err}");
    StoreError::Backend(anyhow::Error::new(err))
}

fn profile_from_item(item: &HashMap<String, AttributeValue>) -> Result<MemberProfile, StoreError> {
    Ok(MemberProfile {
        id: required_s(item, "id")?,
        phone: required_s(item, "phone")?,
        name: required_s(item, "name")?,
        email: optional_s(item, "email"),
        gender: optional_s(item, "gender"),
        date_of_birth: optional_s(item, "date_of_birth"),
        bio: optional_s(item, "bio"),
        avatar_url: optional_s(item, "avatar_url"),
        profile_complete: item
            .get("profile_complete")
            .and_then(|av| av.as_bool().ok())
            .copied()
            .unwrap_or(false),
        created_at: required_ts(item, "created_at")?,
        updated_at: required_ts(item, "updated_at")?,
    })
}

fn required_s(item: &HashMap<String, AttributeValue>, attr: &str) -> Result<String, StoreError> {
    item.get(attr)
        .and_then(|av| av.as_s().ok())
        .map(|s| s.to_string())
        .ok_or_else(|| StoreError::Backend(anyhow::anyhow!("missing attribute {attr}")))
}

fn optional_s(item: &HashMap<String, AttributeValue>, attr: &str) -> Option<String> {
    item.get(attr)
        .and_then(|av| av.as_s().ok())
        .map(|s| s.to_string())
}

fn required_ts(
    item: &HashMap<String, AttributeValue>,
    attr: &str,
) -> Result<DateTime<Utc>, StoreError> {
    let raw = required_s(item, attr)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Backend(anyhow::anyhow!("bad timestamp in {attr}: {e}")))
}

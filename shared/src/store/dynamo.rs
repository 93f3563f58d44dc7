use async_trait::async_trait;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoClient;
use std::collections::{BTreeMap, HashMap};

use super::{DataStore, CONNECTION_PREFIX, REPORT_PREFIX, USERNAME_PREFIX, USER_PREFIX};
use crate::error::StoreError;
use crate::location::LocationType;
use crate::types::{Connection, Report, Role, User, UserPatch};
use crate::workflow::ReportStatus;

type Item = HashMap<String, AttributeValue>;

/// Single-table DynamoDB store. Every record is `PK = SK = <PREFIX><id>` and
/// carries an `entity_type` so collections can be scanned.
pub struct DynamoStore {
    client: DynamoClient,
    table_name: String,
}

impl DynamoStore {
    pub fn new(client: DynamoClient, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    async fn get_item(&self, pk: &str) -> Result<Option<Item>, StoreError> {
        let result = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("PK", AttributeValue::S(pk.to_string()))
            .key("SK", AttributeValue::S(pk.to_string()))
            .send()
            .await
            .map_err(|e| backend_error(&e))?;
        Ok(result.item().cloned())
    }

    async fn scan_entities(&self, entity_type: &str) -> Result<Vec<Item>, StoreError> {
        let mut items = Vec::new();
        let mut start_key: Option<Item> = None;

        loop {
            let resp = self
                .client
                .scan()
                .table_name(&self.table_name)
                .filter_expression("entity_type = :type")
                .expression_attribute_values(":type", AttributeValue::S(entity_type.to_string()))
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| backend_error(&e))?;

            items.extend(resp.items().iter().cloned());

            match resp.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => break,
            }
        }

        tracing::info!("Scanned {} {} records", items.len(), entity_type);
        Ok(items)
    }

    async fn scan_collection<T>(
        &self,
        entity_type: &str,
        prefix: &str,
        parse: fn(&Item) -> T,
    ) -> Result<BTreeMap<String, T>, StoreError> {
        let items = self.scan_entities(entity_type).await?;
        let mut entries = BTreeMap::new();
        for item in &items {
            match item_str(item, "PK").as_deref().and_then(|pk| pk.strip_prefix(prefix)) {
                Some(id) => {
                    entries.insert(id.to_string(), parse(item));
                }
                None => tracing::warn!("Skipping {} record without a usable PK", entity_type),
            }
        }
        Ok(entries)
    }
}

#[async_trait]
impl DataStore for DynamoStore {
    async fn get_user(&self, uid: &str) -> Result<Option<User>, StoreError> {
        let pk = format!("{}{}", USER_PREFIX, uid);
        Ok(self.get_item(&pk).await?.as_ref().map(user_from_item))
    }

    async fn get_report(&self, report_id: &str) -> Result<Option<Report>, StoreError> {
        let pk = format!("{}{}", REPORT_PREFIX, report_id);
        Ok(self.get_item(&pk).await?.as_ref().map(report_from_item))
    }

    async fn lookup_username(&self, username: &str) -> Result<Option<String>, StoreError> {
        let pk = format!("{}{}", USERNAME_PREFIX, username);
        Ok(self
            .get_item(&pk)
            .await?
            .as_ref()
            .and_then(|item| item_str(item, "uid")))
    }

    async fn users(&self) -> Result<BTreeMap<String, User>, StoreError> {
        self.scan_collection("user", USER_PREFIX, user_from_item).await
    }

    async fn reports(&self) -> Result<BTreeMap<String, Report>, StoreError> {
        self.scan_collection("report", REPORT_PREFIX, report_from_item)
            .await
    }

    async fn update_user(&self, uid: &str, patch: &UserPatch) -> Result<(), StoreError> {
        if patch.is_empty() {
            return Ok(());
        }
        let pk = format!("{}{}", USER_PREFIX, uid);

        let mut update_expr = vec![];
        let mut expr_values = HashMap::new();

        if let Some(is_approved) = patch.is_approved {
            update_expr.push("isApproved = :approved");
            expr_values.insert(":approved".to_string(), AttributeValue::Bool(is_approved));
        }

        if let Some(resubmit) = patch.resubmit_id {
            update_expr.push("resubmitID = :resubmit");
            expr_values.insert(":resubmit".to_string(), AttributeValue::Bool(resubmit));
        }

        if let Some(disabled) = patch.disabled {
            update_expr.push("disabled = :disabled");
            expr_values.insert(":disabled".to_string(), AttributeValue::Bool(disabled));
        }

        if let Some(token) = &patch.fcm_token {
            update_expr.push("fcmToken = :token");
            expr_values.insert(":token".to_string(), AttributeValue::S(token.clone()));
        }

        let mut builder = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key("PK", AttributeValue::S(pk.clone()))
            .key("SK", AttributeValue::S(pk))
            .update_expression(format!("SET {}", update_expr.join(", ")))
            .condition_expression("attribute_exists(PK)");

        for (k, v) in expr_values {
            builder = builder.expression_attribute_values(k, v);
        }

        match builder.send().await {
            Ok(_) => Ok(()),
            Err(e)
                if e.as_service_error()
                    .map(|se| se.is_conditional_check_failed_exception())
                    .unwrap_or(false) =>
            {
                Err(StoreError::NotFound(format!("users/{}", uid)))
            }
            Err(e) => Err(backend_error(&e)),
        }
    }

    async fn transition_report_status(
        &self,
        report_id: &str,
        from: ReportStatus,
        to: ReportStatus,
    ) -> Result<(), StoreError> {
        let pk = format!("{}{}", REPORT_PREFIX, report_id);

        let result = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key("PK", AttributeValue::S(pk.clone()))
            .key("SK", AttributeValue::S(pk))
            .update_expression("SET #status = :to")
            .condition_expression("attribute_exists(PK) AND #status = :from")
            .expression_attribute_names("#status", "status")
            .expression_attribute_values(":to", AttributeValue::S(to.as_str().to_string()))
            .expression_attribute_values(":from", AttributeValue::S(from.as_str().to_string()))
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e)
                if e.as_service_error()
                    .map(|se| se.is_conditional_check_failed_exception())
                    .unwrap_or(false) =>
            {
                // Either the report is gone or somebody else moved it first.
                match self.get_report(report_id).await? {
                    None => Err(StoreError::NotFound(format!("reports/{}", report_id))),
                    Some(_) => Err(StoreError::Conflict(format!("reports/{}", report_id))),
                }
            }
            Err(e) => Err(backend_error(&e)),
        }
    }

    async fn mark_publicized(&self, report_id: &str) -> Result<(), StoreError> {
        let pk = format!("{}{}", REPORT_PREFIX, report_id);

        let result = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key("PK", AttributeValue::S(pk.clone()))
            .key("SK", AttributeValue::S(pk))
            .update_expression("SET publicized = :publicized")
            .condition_expression("attribute_exists(PK)")
            .expression_attribute_values(":publicized", AttributeValue::Bool(true))
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e)
                if e.as_service_error()
                    .map(|se| se.is_conditional_check_failed_exception())
                    .unwrap_or(false) =>
            {
                Err(StoreError::NotFound(format!("reports/{}", report_id)))
            }
            Err(e) => Err(backend_error(&e)),
        }
    }

    async fn save_connection(&self, connection: &Connection) -> Result<(), StoreError> {
        let pk = format!("{}{}", CONNECTION_PREFIX, connection.connection_id);

        self.client
            .put_item()
            .table_name(&self.table_name)
            .item("PK", AttributeValue::S(pk.clone()))
            .item("SK", AttributeValue::S(pk))
            .item("connection_id", AttributeValue::S(connection.connection_id.clone()))
            .item("user_id", AttributeValue::S(connection.user_id.clone()))
            .item("role", AttributeValue::S(connection.role.as_str().to_string()))
            .item("connected_at", AttributeValue::S(connection.connected_at.clone()))
            .item("entity_type", AttributeValue::S("connection".to_string()))
            .send()
            .await
            .map_err(|e| backend_error(&e))?;

        tracing::info!(
            "Connection saved: {} (user: {})",
            connection.connection_id,
            connection.user_id
        );
        Ok(())
    }

    async fn remove_connection(&self, connection_id: &str) -> Result<(), StoreError> {
        let pk = format!("{}{}", CONNECTION_PREFIX, connection_id);

        self.client
            .delete_item()
            .table_name(&self.table_name)
            .key("PK", AttributeValue::S(pk.clone()))
            .key("SK", AttributeValue::S(pk))
            .send()
            .await
            .map_err(|e| backend_error(&e))?;

        tracing::info!("Connection removed: {}", connection_id);
        Ok(())
    }

    async fn get_connection(&self, connection_id: &str) -> Result<Option<Connection>, StoreError> {
        let pk = format!("{}{}", CONNECTION_PREFIX, connection_id);
        Ok(self.get_item(&pk).await?.as_ref().and_then(connection_from_item))
    }

    async fn connections(&self) -> Result<Vec<Connection>, StoreError> {
        let items = self.scan_entities("connection").await?;
        Ok(items.iter().filter_map(connection_from_item).collect())
    }
}

fn backend_error<E>(e: &E) -> StoreError
where
    E: std::error::Error + 'static,
{
    let message = DisplayErrorContext(e).to_string();
    tracing::error!("DynamoDB request failed: {}", message);
    StoreError::Backend(message)
}

fn item_str(item: &Item, key: &str) -> Option<String> {
    item.get(key)
        .and_then(|v| v.as_s().ok())
        .map(|s| s.to_string())
}

fn item_bool(item: &Item, key: &str) -> bool {
    item.get(key)
        .and_then(|v| v.as_bool().ok())
        .copied()
        .unwrap_or(false)
}

/// Strings or numbers rendered as text (the mobile client writes both).
fn item_text(item: &Item, key: &str) -> Option<String> {
    match item.get(key) {
        Some(AttributeValue::S(s)) => Some(s.clone()),
        Some(AttributeValue::N(n)) => Some(n.clone()),
        _ => None,
    }
}

pub(crate) fn user_from_item(item: &Item) -> User {
    User {
        username: item_str(item, "username"),
        name: item_str(item, "name"),
        email: item_str(item, "email"),
        contact: item_text(item, "contact"),
        home_address: item_str(item, "homeAddress"),
        present_address: item_str(item, "presentAddress"),
        age: item_text(item, "age"),
        role: item_str(item, "role").as_deref().and_then(Role::parse),
        is_approved: item_bool(item, "isApproved"),
        disabled: item_bool(item, "disabled"),
        resubmit_id: item_bool(item, "resubmitID"),
        id_front_url: item_str(item, "idFrontUrl"),
        id_back_url: item_str(item, "idBackUrl"),
        selfie_url: item_str(item, "selfieUrl"),
        fcm_token: item_str(item, "fcmToken").filter(|t| !t.is_empty()),
    }
}

pub(crate) fn report_from_item(item: &Item) -> Report {
    Report {
        reporter: item_str(item, "reporter"),
        emergency: item_str(item, "emergency"),
        other_emergency: item_str(item, "otherEmergency"),
        organization: item_str(item, "organization"),
        additional_message: item_str(item, "additionalMessage"),
        image_url: item_str(item, "imageUrl").filter(|u| !u.is_empty()),
        location_type: item_str(item, "locationType")
            .as_deref()
            .and_then(LocationType::parse),
        location: item_str(item, "location"),
        status: item_str(item, "status")
            .as_deref()
            .and_then(ReportStatus::parse),
        timestamp: item_text(item, "timestamp"),
        publicized: item_bool(item, "publicized"),
    }
}

fn connection_from_item(item: &Item) -> Option<Connection> {
    Some(Connection {
        connection_id: item_str(item, "connection_id")?,
        user_id: item_str(item, "user_id")?,
        role: item_str(item, "role").as_deref().and_then(Role::parse)?,
        connected_at: item_str(item, "connected_at").unwrap_or_default(),
    })
}

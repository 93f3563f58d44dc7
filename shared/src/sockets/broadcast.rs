use async_trait::async_trait;
use aws_sdk_apigatewaymanagement::Client as ApiGatewayManagementClient;

use super::messages::ServerMessage;
use crate::dispatch::Notice;
use crate::error::DashboardError;
use crate::store::DataStore;
use crate::sync::Region;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("connection {0} is gone")]
    Gone(String),
    #[error("post to connection failed: {0}")]
    Other(String),
}

/// Where outgoing WebSocket frames go.
#[async_trait]
pub trait ConnectionSink: Send + Sync {
    async fn post(&self, connection_id: &str, payload: &[u8]) -> Result<(), SinkError>;
}

pub struct ApiGatewaySink {
    client: ApiGatewayManagementClient,
}

impl ApiGatewaySink {
    pub fn new(client: ApiGatewayManagementClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ConnectionSink for ApiGatewaySink {
    async fn post(&self, connection_id: &str, payload: &[u8]) -> Result<(), SinkError> {
        self.client
            .post_to_connection()
            .connection_id(connection_id)
            .data(payload.to_vec().into())
            .send()
            .await
            .map(|_| ())
            .map_err(|e| {
                let gone = e
                    .as_service_error()
                    .map(|se| se.is_gone_exception())
                    .unwrap_or(false);
                if gone {
                    SinkError::Gone(connection_id.to_string())
                } else {
                    SinkError::Other(format!("{:?}", e))
                }
            })
    }
}

/// Push rebuilt regions to every open dashboard that may see them. Stale
/// connections are dropped from the store as they are found.
pub async fn broadcast_regions(
    store: &dyn DataStore,
    sink: &dyn ConnectionSink,
    regions: &[Region],
) -> Result<usize, DashboardError> {
    if regions.is_empty() {
        return Ok(0);
    }

    let connections = store.connections().await?;
    tracing::info!(
        "Broadcasting {} regions to {} connections",
        regions.len(),
        connections.len()
    );

    let mut delivered = 0;
    for conn in connections {
        let visible: Vec<Region> = regions
            .iter()
            .filter(|r| r.audience.map_or(true, |role| role == conn.role))
            .cloned()
            .collect();
        if visible.is_empty() {
            continue;
        }

        let payload = serde_json::to_vec(&ServerMessage::Render { regions: &visible })
            .map_err(|e| DashboardError::Backend(e.to_string()))?;

        match sink.post(&conn.connection_id, &payload).await {
            Ok(()) => delivered += 1,
            Err(SinkError::Gone(id)) => {
                tracing::warn!("Connection {} is stale, removing", id);
                if let Err(e) = store.remove_connection(&id).await {
                    tracing::error!("Failed to remove stale connection {}: {}", id, e);
                }
            }
            Err(e) => {
                tracing::warn!("Failed to send to connection {}: {}", conn.connection_id, e);
            }
        }
    }

    Ok(delivered)
}

/// Answer the connection that triggered an action.
pub async fn send_notice(
    sink: &dyn ConnectionSink,
    connection_id: &str,
    notice: &Notice,
) -> Result<(), DashboardError> {
    let payload = serde_json::to_vec(&ServerMessage::Notice { notice })
        .map_err(|e| DashboardError::Backend(e.to_string()))?;
    sink.post(connection_id, &payload)
        .await
        .map_err(|e| DashboardError::Backend(e.to_string()))
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingSink;
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::types::{Connection, Role};

    fn connection(id: &str, role: Role) -> Connection {
        Connection {
            connection_id: id.to_string(),
            user_id: format!("user-{}", id),
            role,
            connected_at: "2024-06-01T00:00:00Z".to_string(),
        }
    }

    #[tokio::test]
    async fn test_regions_respect_audience() {
        let store = MemoryStore::new();
        store.save_connection(&connection("c1", Role::Admin)).await.unwrap();
        store.save_connection(&connection("c2", Role::User)).await.unwrap();
        let sink = RecordingSink::default();

        let regions = vec![
            Region::new("activeReports", "2"),
            Region::new("reportsTableBody", "<tr></tr>").for_role(Role::Admin),
        ];
        let delivered = broadcast_regions(&store, &sink, &regions).await.unwrap();
        assert_eq!(delivered, 2);

        let admin = sink.frames_for("c1");
        assert_eq!(admin[0]["regions"].as_array().unwrap().len(), 2);
        let user = sink.frames_for("c2");
        assert_eq!(user[0]["regions"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_gone_connections_are_removed() {
        let store = MemoryStore::new();
        store.save_connection(&connection("c1", Role::Admin)).await.unwrap();
        store.save_connection(&connection("c2", Role::Admin)).await.unwrap();
        let sink = RecordingSink::default();
        sink.gone.lock().unwrap().push("c1".into());

        let delivered = broadcast_regions(&store, &sink, &[Region::new("totalUsers", "4")])
            .await
            .unwrap();
        assert_eq!(delivered, 1);
        let remaining: Vec<String> = store
            .connections()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.connection_id)
            .collect();
        assert_eq!(remaining, vec!["c2".to_string()]);
    }
}

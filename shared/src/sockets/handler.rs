use lambda_http::request::RequestContext;
use lambda_http::{http::StatusCode, Body, Error, Request, RequestExt, Response};
use std::sync::Arc;

use super::broadcast::send_notice;
use super::messages::ClientMessage;
use crate::dispatch::{dispatch, Notice};
use crate::error::DashboardError;
use crate::session::{caller_uid, Session};
use crate::types::{Connection, Role};
use crate::AppState;

fn header<'a>(event: &'a Request, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .find_map(|name| event.headers().get(*name))
        .and_then(|v| v.to_str().ok())
}

/// Connection id and route key, from the WebSocket request context or the
/// headers API Gateway forwards them in.
fn socket_ids(event: &Request) -> (Option<String>, Option<String>) {
    let (mut connection_id, mut route_key) = match event.request_context_ref() {
        Some(RequestContext::WebSocket(ctx)) => (ctx.connection_id.clone(), ctx.route_key.clone()),
        _ => (None, None),
    };
    if connection_id.is_none() {
        connection_id = header(event, &["connectionid", "connectionId"]).map(str::to_string);
    }
    if route_key.is_none() {
        route_key = header(event, &["routekey", "routeKey"]).map(str::to_string);
    }
    (connection_id, route_key)
}

pub fn is_websocket_event(event: &Request) -> bool {
    socket_ids(event).1.is_some()
}

fn empty(status: StatusCode) -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(status)
        .body(Body::Empty)
        .map_err(Box::new)?)
}

/// Handle WebSocket events ($connect, $disconnect, $default)
pub async fn handle_websocket_event(
    event: Request,
    state: Arc<AppState>,
) -> Result<Response<Body>, Error> {
    let (connection_id, route_key) = socket_ids(&event);
    let Some(connection_id) = connection_id else {
        tracing::warn!("WebSocket event without a connection id");
        return empty(StatusCode::BAD_REQUEST);
    };
    let route_key = route_key.unwrap_or_default();

    tracing::info!("WebSocket event: {} for connection: {}", route_key, connection_id);

    match route_key.as_str() {
        "$connect" => handle_connect(&event, &state, &connection_id).await,
        "$disconnect" => handle_disconnect(&state, &connection_id).await,
        "$default" => handle_message(&event, &state, &connection_id).await,
        _ => {
            tracing::warn!("Unknown WebSocket route: {}", route_key);
            empty(StatusCode::BAD_REQUEST)
        }
    }
}

/// `?token=` on the connect URL; browsers cannot set headers on a WebSocket.
fn connect_token(event: &Request) -> Option<&str> {
    event
        .query_string_parameters_ref()
        .and_then(|params| params.first("token"))
        .filter(|token| !token.is_empty())
}

/// Only admins may hold a dashboard connection; the role is stored with it.
async fn handle_connect(
    event: &Request,
    state: &AppState,
    connection_id: &str,
) -> Result<Response<Body>, Error> {
    let uid = match connect_token(event) {
        Some(token) => match state.identity.verify_access_token(token).await {
            Ok(uid) => Some(uid),
            Err(e) => {
                tracing::warn!("Refusing connection {}: {}", connection_id, e);
                return empty(StatusCode::UNAUTHORIZED);
            }
        },
        None => caller_uid(event, state.config.allow_dev_user_header),
    };
    let Some(uid) = uid else {
        tracing::warn!("Refusing anonymous connection {}", connection_id);
        return empty(StatusCode::UNAUTHORIZED);
    };

    let session = match Session::resolve(state.store.as_ref(), &uid).await {
        Ok(session) if session.role == Role::Admin => session,
        Ok(_) => {
            tracing::warn!("Refusing connection {} for non-admin {}", connection_id, uid);
            return empty(StatusCode::FORBIDDEN);
        }
        Err(e) => {
            tracing::warn!("Refusing connection {}: {}", connection_id, e);
            return empty(StatusCode::FORBIDDEN);
        }
    };

    let connection = Connection {
        connection_id: connection_id.to_string(),
        user_id: session.uid,
        role: session.role,
        connected_at: chrono::Utc::now().to_rfc3339(),
    };
    state.store.save_connection(&connection).await?;

    tracing::info!("WebSocket connect: {} (user: {})", connection_id, connection.user_id);
    empty(StatusCode::OK)
}

async fn handle_disconnect(state: &AppState, connection_id: &str) -> Result<Response<Body>, Error> {
    tracing::info!("WebSocket disconnect: {}", connection_id);
    state.store.remove_connection(connection_id).await?;
    empty(StatusCode::OK)
}

/// A click forwarded over the socket; answered with a notice frame.
async fn handle_message(
    event: &Request,
    state: &AppState,
    connection_id: &str,
) -> Result<Response<Body>, Error> {
    let session = state
        .store
        .get_connection(connection_id)
        .await?
        .map(|c| Session {
            uid: c.user_id,
            role: c.role,
        });

    let notice = match session {
        None => Notice::error(DashboardError::Unauthorized.to_string()),
        Some(session) => match serde_json::from_slice::<ClientMessage>(event.body()) {
            Ok(message) => {
                tracing::info!("WebSocket message action: {}", message.action);
                dispatch(
                    state.store.as_ref(),
                    state.backend.as_ref(),
                    &session,
                    &message.target(),
                )
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!("Action failed: {}", e);
                    Notice::error(e.to_string())
                })
            }
            Err(e) => {
                tracing::error!("Failed to parse WebSocket message: {}", e);
                Notice::error(format!("Invalid message format: {}", e))
            }
        },
    };

    if let Some(sink) = &state.sink {
        if let Err(e) = send_notice(sink.as_ref(), connection_id, &notice).await {
            tracing::warn!("Could not answer connection {}: {}", connection_id, e);
        }
    }

    let status = if notice.success {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(serde_json::to_string(&notice)?.into())
        .map_err(Box::new)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::testing::FakeIdentity;
    use crate::config::Config;
    use crate::sockets::broadcast::testing::RecordingSink;
    use crate::store::memory::MemoryStore;
    use crate::store::DataStore;
    use crate::types::{Report, User};
    use crate::workflow::ReportStatus;
    use std::collections::HashMap;

    fn config(dev_header: bool) -> Config {
        Config::from_lookup(|key: &str| match key {
            "COGNITO_CLIENT_ID" | "COGNITO_CLIENT_SECRET" | "COGNITO_USER_POOL_ID" => {
                Some("test".to_string())
            }
            "ALLOW_DEV_USER_HEADER" if dev_header => Some("true".to_string()),
            _ => None,
        })
        .unwrap()
    }

    fn state() -> (Arc<MemoryStore>, Arc<RecordingSink>, Arc<AppState>) {
        state_with(true)
    }

    fn state_with(dev_header: bool) -> (Arc<MemoryStore>, Arc<RecordingSink>, Arc<AppState>) {
        let store = Arc::new(MemoryStore::new());
        store.put_user(
            "admin-1",
            User {
                role: Some(Role::Admin),
                ..Default::default()
            },
        );
        store.put_user(
            "user-1",
            User {
                role: Some(Role::User),
                ..Default::default()
            },
        );
        store.put_report(
            "r1",
            Report {
                status: Some(ReportStatus::Pending),
                ..Default::default()
            },
        );
        let sink = Arc::new(RecordingSink::default());
        let identity = FakeIdentity::default()
            .with_session("admin-access", "admin-1")
            .with_session("user-access", "user-1");
        let state = AppState::new(
            config(dev_header),
            store.clone(),
            Arc::new(identity),
            None,
            Some(sink.clone()),
        );
        (store, sink, state)
    }

    fn ws_event(route: &str, uid: Option<&str>, body: &str) -> Request {
        let mut builder = lambda_http::http::Request::builder()
            .header("routekey", route)
            .header("connectionid", "conn-1");
        if let Some(uid) = uid {
            builder = builder.header("X-User-Id", uid);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_connect_is_admin_only() {
        let (store, _, state) = state();

        let resp = handle_websocket_event(ws_event("$connect", Some("user-1"), ""), state.clone())
            .await
            .unwrap();
        assert_eq!(resp.status(), 403);
        assert!(store.connections().await.unwrap().is_empty());

        let resp = handle_websocket_event(ws_event("$connect", Some("admin-1"), ""), state.clone())
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let connections = store.connections().await.unwrap();
        assert_eq!(connections[0].role, Role::Admin);

        handle_websocket_event(ws_event("$disconnect", None, ""), state)
            .await
            .unwrap();
        assert!(store.connections().await.unwrap().is_empty());
    }

    fn connect_with_token(token: &str) -> Request {
        let mut params = HashMap::new();
        params.insert("token".to_string(), token.to_string());
        ws_event("$connect", None, "").with_query_string_parameters(params)
    }

    #[tokio::test]
    async fn test_connect_with_access_token() {
        let (store, _, state) = state_with(false);

        let resp = handle_websocket_event(connect_with_token("admin-access"), state.clone())
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let connection = store.get_connection("conn-1").await.unwrap().unwrap();
        assert_eq!(connection.user_id, "admin-1");
        assert_eq!(connection.role, Role::Admin);
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_or_non_admin_token() {
        let (store, _, state) = state_with(false);

        let resp = handle_websocket_event(connect_with_token("expired"), state.clone())
            .await
            .unwrap();
        assert_eq!(resp.status(), 401);

        let resp = handle_websocket_event(connect_with_token("user-access"), state)
            .await
            .unwrap();
        assert_eq!(resp.status(), 403);
        assert!(store.connections().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_connect_ignores_user_header_outside_dev() {
        let (store, _, state) = state_with(false);
        let resp = handle_websocket_event(ws_event("$connect", Some("admin-1"), ""), state)
            .await
            .unwrap();
        assert_eq!(resp.status(), 401);
        assert!(store.connections().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_message_dispatches_with_connection_role() {
        let (store, sink, state) = state();
        handle_websocket_event(ws_event("$connect", Some("admin-1"), ""), state.clone())
            .await
            .unwrap();

        let resp = handle_websocket_event(
            ws_event("$default", None, r#"{"action":"reject","id":"r1"}"#),
            state,
        )
        .await
        .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(
            store.report("r1").unwrap().status,
            Some(ReportStatus::Rejected)
        );

        let frames = sink.frames_for("conn-1");
        assert_eq!(frames[0]["type"], "notice");
        assert_eq!(frames[0]["notice"]["success"], true);
    }

    #[tokio::test]
    async fn test_message_from_unknown_connection() {
        let (store, _, state) = state();
        let resp = handle_websocket_event(
            ws_event("$default", None, r#"{"action":"reject","id":"r1"}"#),
            state,
        )
        .await
        .unwrap();
        assert_eq!(resp.status(), 400);
        assert_eq!(
            store.report("r1").unwrap().status,
            Some(ReportStatus::Pending)
        );
    }
}

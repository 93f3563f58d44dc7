use alertify_shared::backend::{
    reply_response, service_key_matches, DisableUserRequest, PublicizeRequest,
    RegisterTokenRequest, SERVICE_KEY_HEADER,
};
use alertify_shared::dispatch::{dispatch, ActionTarget};
use alertify_shared::error::DashboardError;
use alertify_shared::session::{caller_uid, Session};
use alertify_shared::sync::{Page, ViewSync};
use alertify_shared::{auth, AppState};
use lambda_http::{
    http::{Method, StatusCode},
    Body, Error, Request, Response,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;

use crate::pages;

/// Main Lambda handler - routes pages, auth, dashboard and backend endpoints
pub(crate) async fn function_handler(
    event: Request,
    state: Arc<AppState>,
) -> Result<Response<Body>, Error> {
    let method = event.method();
    let path = event.uri().path();
    let body = event.body();
    tracing::info!("🚀 API Lambda invoked - Method: {} Path: {}", method, path);

    // Handle CORS preflight
    if method == "OPTIONS" {
        return Ok(Response::builder()
            .status(StatusCode::OK)
            .header("Access-Control-Allow-Origin", "*")
            .header("Access-Control-Allow-Methods", "GET,POST,OPTIONS")
            .header(
                "Access-Control-Allow-Headers",
                "Content-Type,Authorization,X-User-Id,X-Admin-Key",
            )
            .body(Body::Empty)
            .map_err(Box::new)?);
    }

    let ws_url = state
        .config
        .ws_api_endpoint
        .as_deref()
        .map(pages::socket_url);
    let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match (method, parts.as_slice()) {
        // --- PAGES ---
        (&Method::GET, []) => pages::html_response(pages::login_page()),
        (&Method::GET, ["pending"]) => pages::html_response(pages::pending_page()),
        (&Method::GET, ["admin", "dashboard"]) => {
            pages::html_response(pages::dashboard_page(ws_url.as_deref()))
        }
        (&Method::GET, ["admin", "users"]) => {
            pages::html_response(pages::users_page(ws_url.as_deref()))
        }
        (&Method::GET, ["admin", "reports"]) => {
            pages::html_response(pages::reports_page(ws_url.as_deref()))
        }

        // --- AUTH ---
        (&Method::POST, ["login"]) => {
            auth::login(state.store.as_ref(), state.identity.as_ref(), body).await
        }
        (&Method::POST, ["logout"]) => auth::logout(state.identity.as_ref(), body).await,

        // --- DASHBOARD ---
        (&Method::GET, ["admin", "regions", page]) => render_regions(&event, &state, page).await,
        (&Method::POST, ["admin", "actions"]) => run_action(&event, &state).await,

        // --- BACKEND ---
        (&Method::POST, ["disable_user"]) => {
            if let Err(e) = authorize_backend_call(&event, &state).await {
                return e.into_response();
            }
            match parse_body::<DisableUserRequest>(body) {
                Ok(request) => reply_response(state.local.handle_disable_user(&request).await),
                Err(e) => e.into_response(),
            }
        }
        (&Method::POST, ["publicize_report"]) => {
            if let Err(e) = authorize_backend_call(&event, &state).await {
                return e.into_response();
            }
            match parse_body::<PublicizeRequest>(body) {
                Ok(request) => reply_response(state.local.handle_publicize(&request).await),
                Err(e) => e.into_response(),
            }
        }
        (&Method::POST, ["register_fcm_token"]) => register_token(&event, &state).await,

        (_, ["login"] | ["logout"] | ["disable_user"] | ["publicize_report"]
            | ["register_fcm_token"] | ["admin", "actions"]) => method_not_allowed(),
        _ => not_found(),
    }
}

async fn admin_session(event: &Request, state: &AppState) -> Result<Session, DashboardError> {
    Session::require_admin(state.store.as_ref(), event, state.config.allow_dev_user_header).await
}

/// Backend endpoints serve signed-in admins and service callers holding the
/// shared key. A wrong key is refused outright.
async fn authorize_backend_call(event: &Request, state: &AppState) -> Result<(), DashboardError> {
    let presented = event
        .headers()
        .get(SERVICE_KEY_HEADER)
        .and_then(|v| v.to_str().ok());
    if let Some(presented) = presented {
        return match state.config.admin_backend_key.as_deref() {
            Some(expected) if service_key_matches(expected, presented) => Ok(()),
            _ => {
                tracing::warn!("Rejected backend call with an unknown service key");
                Err(DashboardError::Unauthorized)
            }
        };
    }
    admin_session(event, state).await.map(|_| ())
}

fn parse_body<T: DeserializeOwned + Default>(body: &Body) -> Result<T, DashboardError> {
    if body.is_empty() {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| {
        tracing::error!("Failed to parse request body: {}", e);
        DashboardError::BadRequest(format!("Invalid request body: {}", e))
    })
}

fn json_response(value: &impl serde::Serialize) -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::to_string(value)?.into())
        .map_err(Box::new)?)
}

/// GET /admin/regions/{page} - initial render of a page's regions
async fn render_regions(
    event: &Request,
    state: &AppState,
    page: &str,
) -> Result<Response<Body>, Error> {
    let session = match admin_session(event, state).await {
        Ok(session) => session,
        Err(e) => return e.into_response(),
    };
    let Some(page) = Page::parse(page) else {
        return not_found();
    };

    let regions = ViewSync::render_page(state.store.as_ref(), page, session.role).await;
    json_response(&serde_json::json!({ "regions": regions }))
}

/// POST /admin/actions - every `data-action` click lands here
async fn run_action(event: &Request, state: &AppState) -> Result<Response<Body>, Error> {
    let session = match admin_session(event, state).await {
        Ok(session) => session,
        Err(e) => return e.into_response(),
    };
    let target: ActionTarget = match parse_body(event.body()) {
        Ok(target) => target,
        Err(e) => return e.into_response(),
    };

    match dispatch(
        state.store.as_ref(),
        state.backend.as_ref(),
        &session,
        &target,
    )
    .await
    {
        Ok(notice) => json_response(&notice),
        Err(e) => {
            tracing::warn!("Action {} on {} failed: {}", target.action, target.id, e);
            e.into_response()
        }
    }
}

/// POST /register_fcm_token - a signed-in user registers their own device
async fn register_token(event: &Request, state: &AppState) -> Result<Response<Body>, Error> {
    let Some(uid) = caller_uid(event, state.config.allow_dev_user_header) else {
        return DashboardError::Unauthorized.into_response();
    };
    let request: RegisterTokenRequest = match parse_body(event.body()) {
        Ok(request) => request,
        Err(e) => return e.into_response(),
    };
    if request.uid.as_deref().is_some_and(|target| target != uid) {
        tracing::warn!("{} tried to register a token for {:?}", uid, request.uid);
        return DashboardError::Forbidden("Cannot register a token for another user".to_string())
            .into_response();
    }
    reply_response(state.local.handle_register_token(&request).await)
}

fn method_not_allowed() -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(StatusCode::METHOD_NOT_ALLOWED)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(
            serde_json::json!({"error": "Method not allowed"})
                .to_string()
                .into(),
        )
        .map_err(Box::new)?)
}

fn not_found() -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::json!({"error": "Not found"}).to_string().into())
        .map_err(Box::new)?)
}

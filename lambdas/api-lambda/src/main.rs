use alertify_shared::auth::{CognitoIdentity, IdentityProvider};
use alertify_shared::config::Config;
use alertify_shared::push::{FcmSender, PushSender};
use alertify_shared::sockets::broadcast::{ApiGatewaySink, ConnectionSink};
use alertify_shared::sockets::handler::{handle_websocket_event, is_websocket_event};
use alertify_shared::store::dynamo::DynamoStore;
use alertify_shared::AppState;
use aws_sdk_apigatewaymanagement::Client as ApiGatewayManagementClient;
use aws_sdk_cognitoidentityprovider::Client as CognitoClient;
use aws_sdk_dynamodb::Client as DynamoClient;
use lambda_http::{run, service_fn, tracing, Error, Request};
use std::sync::Arc;

mod http_handler;
mod pages;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing::init_default_subscriber();

    let config = Config::from_env()?;

    // Initialize AWS clients once at startup
    let aws_config = aws_config::load_from_env().await;

    // API Gateway Management client for WebSocket (optional endpoint)
    let sink = config.ws_api_endpoint.as_ref().map(|endpoint| {
        let api_config = aws_sdk_apigatewaymanagement::config::Builder::from(&aws_config)
            .endpoint_url(endpoint)
            .build();
        Arc::new(ApiGatewaySink::new(ApiGatewayManagementClient::from_conf(api_config)))
            as Arc<dyn ConnectionSink>
    });

    let push = match config.firebase_admin_json.as_deref() {
        Some(json) => Some(Arc::new(FcmSender::from_json(json)?) as Arc<dyn PushSender>),
        None => {
            tracing::warn!("FIREBASE_ADMIN_JSON not set, publicize will not send notifications");
            None
        }
    };

    let store = Arc::new(DynamoStore::new(
        DynamoClient::new(&aws_config),
        config.table_name.clone(),
    ));
    let identity: Arc<dyn IdentityProvider> = Arc::new(CognitoIdentity::new(
        CognitoClient::new(&aws_config),
        config.cognito.clone(),
    ));

    let state = AppState::new(config, store, identity, push, sink);

    run(service_fn(move |event: Request| {
        let state = Arc::clone(&state);
        async move {
            if is_websocket_event(&event) {
                handle_websocket_event(event, state).await
            } else {
                http_handler::function_handler(event, state).await
            }
        }
    }))
    .await
}

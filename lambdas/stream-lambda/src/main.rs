use alertify_shared::config::StreamConfig;
use alertify_shared::sockets::broadcast::{broadcast_regions, ApiGatewaySink};
use alertify_shared::store::dynamo::DynamoStore;
use alertify_shared::store::Collection;
use alertify_shared::sync::{Sequence, ViewSync};
use alertify_shared::types::Role;
use aws_lambda_events::event::dynamodb::{Event, EventRecord};
use aws_sdk_apigatewaymanagement::Client as ApiGatewayManagementClient;
use aws_sdk_dynamodb::Client as DynamoClient;
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

/// Lives as long as the container: listener state (last sequence seen,
/// failed listeners) carries over between invocations.
struct StreamState {
    store: DynamoStore,
    sink: ApiGatewaySink,
    sync: Mutex<ViewSync>,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();

    let config = StreamConfig::from_env()?;
    let aws_config = aws_config::load_from_env().await;

    let api_config = aws_sdk_apigatewaymanagement::config::Builder::from(&aws_config)
        .endpoint_url(&config.ws_api_endpoint)
        .build();

    let state = Arc::new(StreamState {
        store: DynamoStore::new(DynamoClient::new(&aws_config), config.table_name.clone()),
        sink: ApiGatewaySink::new(ApiGatewayManagementClient::from_conf(api_config)),
        sync: Mutex::new(ViewSync::all_pages(Role::Admin)),
    });

    run(service_fn(move |event: LambdaEvent<Event>| {
        let state = Arc::clone(&state);
        async move { function_handler(event, &state).await }
    }))
    .await
}

async fn function_handler(event: LambdaEvent<Event>, state: &StreamState) -> Result<(), Error> {
    tracing::info!(
        "DynamoDB Stream event received with {} records",
        event.payload.records.len()
    );

    let changes = changed_collections(&event.payload.records);
    if changes.is_empty() {
        return Ok(());
    }

    // one snapshot per changed collection, however many records touched it
    let mut sync = state.sync.lock().await;
    for (collection, seq) in changes {
        let regions = sync.publish(&state.store, collection, seq).await;
        match broadcast_regions(&state.store, &state.sink, &regions).await {
            Ok(delivered) => tracing::info!(
                "📡 {} change pushed to {} dashboards",
                collection.path(),
                delivered
            ),
            Err(e) => tracing::error!("Failed to broadcast {} change: {}", collection.path(), e),
        }
    }

    Ok(())
}

/// Partition key from a stream attribute, whether it serialises as a bare
/// string or as `{"S": "..."}`.
fn partition_key(value: &serde_json::Value) -> Option<String> {
    value
        .as_str()
        .or_else(|| value.get("S").and_then(|s| s.as_str()))
        .map(|s| s.to_string())
}

fn record_key(record: &EventRecord) -> Option<String> {
    // For REMOVE events, new_image is empty; keys are always present
    [
        &record.change.keys,
        &record.change.new_image,
        &record.change.old_image,
    ]
    .into_iter()
    .find_map(|item| {
        item.get("PK")
            .and_then(|attr| serde_json::to_value(attr).ok())
            .and_then(|v| partition_key(&v))
    })
}

fn fallback_sequence() -> Sequence {
    let micros = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or_default();
    Sequence::from(micros)
}

fn changed_collections(records: &[EventRecord]) -> Vec<(Collection, Sequence)> {
    latest_changes(records.iter().map(|record| {
        (
            record_key(record),
            record.change.sequence_number.clone(),
        )
    }))
}

/// Collections touched by a batch, each with the newest sequence number seen.
/// Connection and username index records belong to no collection.
fn latest_changes(
    changes: impl Iterator<Item = (Option<String>, Option<String>)>,
) -> Vec<(Collection, Sequence)> {
    let mut latest: BTreeMap<Collection, Sequence> = BTreeMap::new();
    for (pk, seq) in changes {
        let Some(collection) = pk.as_deref().and_then(Collection::from_key) else {
            continue;
        };
        let seq = seq.map(Sequence::new).unwrap_or_else(fallback_sequence);
        match latest.get(&collection) {
            Some(current) if *current >= seq => {}
            _ => {
                latest.insert(collection, seq);
            }
        }
    }
    latest.into_iter().collect()
}

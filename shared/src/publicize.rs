use std::collections::BTreeMap;

use crate::error::{DashboardError, StoreError};
use crate::location;
use crate::push::{Notification, PushSender};
use crate::store::DataStore;
use crate::types::Report;

pub const NOTIFICATION_TITLE: &str = "MP Alertify - Emergency Report";

/// How a publicize fan-out went.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub sent: usize,
    pub failed: usize,
}

/// Notification body: the emergency type, or the free-text type for "Others".
fn notification_body(report: &Report) -> String {
    let non_empty = |v: &Option<String>| v.clone().filter(|s| !s.is_empty());
    let body = match report.emergency.as_deref() {
        Some("Others") => non_empty(&report.other_emergency),
        _ => non_empty(&report.emergency),
    };
    body.unwrap_or_else(|| "Emergency Report".to_string())
}

pub fn build_notification(report_id: &str, report: &Report) -> Notification {
    let mut data = BTreeMap::new();
    data.insert("reportId".to_string(), report_id.to_string());
    data.insert("location".to_string(), location::notification_text(report));
    data.insert(
        "timestamp".to_string(),
        report.timestamp.clone().unwrap_or_default(),
    );

    Notification {
        title: NOTIFICATION_TITLE.to_string(),
        body: notification_body(report),
        data,
    }
}

/// Flag the report as publicized and push it to every registered device.
/// Individual push failures are logged and counted, never fatal.
pub async fn publicize_report(
    store: &dyn DataStore,
    push: Option<&dyn PushSender>,
    report_id: &str,
) -> Result<Delivery, DashboardError> {
    let report_id = report_id.trim();
    if report_id.is_empty() {
        return Err(DashboardError::BadRequest("Missing reportId".to_string()));
    }

    let report = store
        .get_report(report_id)
        .await?
        .ok_or_else(|| DashboardError::NotFound("Report not found".to_string()))?;

    store.mark_publicized(report_id).await.map_err(|e| match e {
        StoreError::NotFound(_) => DashboardError::NotFound("Report not found".to_string()),
        other => other.into(),
    })?;

    let notification = build_notification(report_id, &report);
    let tokens: Vec<String> = store
        .users()
        .await?
        .into_values()
        .filter_map(|user| user.fcm_token.filter(|t| !t.is_empty()))
        .collect();

    let Some(push) = push else {
        tracing::warn!(
            "⚠️ No push sender configured, skipping {} notifications for report {}",
            tokens.len(),
            report_id
        );
        return Ok(Delivery::default());
    };

    let mut delivery = Delivery::default();
    for token in &tokens {
        match push.send(token, &notification).await {
            Ok(()) => delivery.sent += 1,
            Err(e) => {
                tracing::error!("FCM error for report {}: {}", report_id, e);
                delivery.failed += 1;
            }
        }
    }

    tracing::info!(
        "📣 Report {} publicized: {} sent, {} failed",
        report_id,
        delivery.sent,
        delivery.failed
    );
    Ok(delivery)
}

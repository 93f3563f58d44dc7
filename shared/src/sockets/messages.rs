use serde::{Deserialize, Serialize};

use crate::dispatch::{ActionTarget, Notice};
use crate::sync::Region;

/// Incoming WebSocket message from a dashboard: the clicked `{action, id}`.
#[derive(Debug, Deserialize)]
pub struct ClientMessage {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub id: String,
}

impl ClientMessage {
    pub fn target(&self) -> ActionTarget {
        ActionTarget {
            action: self.action.clone(),
            id: self.id.clone(),
        }
    }
}

/// Outgoing WebSocket message.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage<'a> {
    /// Replace the inner HTML of each region's element.
    Render { regions: &'a [Region] },
    /// Result of an action the connection asked for.
    Notice { notice: &'a Notice },
}

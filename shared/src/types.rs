use serde::{Deserialize, Serialize};

use crate::location::LocationType;
use crate::workflow::ReportStatus;

// ========== ROLE ==========
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    /// Lenient parse of a stored role; anything unrecognised is `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "admin" => Some(Role::Admin),
            "user" => Some(Role::User),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

// ========== USER ==========
/// Mirror of `users/{uid}`. The uid is the key of the snapshot map, not a field.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub username: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub contact: Option<String>,
    pub home_address: Option<String>,
    pub present_address: Option<String>,
    pub age: Option<String>,
    pub role: Option<Role>,
    #[serde(default)]
    pub is_approved: bool,
    #[serde(default)]
    pub disabled: bool,
    #[serde(rename = "resubmitID", default)]
    pub resubmit_id: bool,
    pub id_front_url: Option<String>,
    pub id_back_url: Option<String>,
    pub selfie_url: Option<String>,
    pub fcm_token: Option<String>,
}

impl User {
    pub fn is_member(&self) -> bool {
        self.role == Some(Role::User)
    }
}

/// Merge applied to `users/{uid}`; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserPatch {
    pub is_approved: Option<bool>,
    pub resubmit_id: Option<bool>,
    pub disabled: Option<bool>,
    pub fcm_token: Option<String>,
}

impl UserPatch {
    pub fn is_empty(&self) -> bool {
        self.is_approved.is_none()
            && self.resubmit_id.is_none()
            && self.disabled.is_none()
            && self.fcm_token.is_none()
    }
}

// ========== REPORT ==========
/// Mirror of `reports/{id}`.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub reporter: Option<String>,
    pub emergency: Option<String>,
    pub other_emergency: Option<String>,
    pub organization: Option<String>,
    pub additional_message: Option<String>,
    pub image_url: Option<String>,
    pub location_type: Option<LocationType>,
    pub location: Option<String>,
    pub status: Option<ReportStatus>,
    pub timestamp: Option<String>,
    #[serde(default)]
    pub publicized: bool,
}

impl Report {
    /// Emergency type as displayed; "Others" is replaced by the free-text override.
    pub fn emergency_label(&self) -> String {
        match self.emergency.as_deref() {
            Some("Others") => self
                .other_emergency
                .clone()
                .unwrap_or_else(|| "Others".to_string()),
            Some(emergency) => emergency.to_string(),
            None => "N/A".to_string(),
        }
    }
}

// ========== CONNECTION ==========
/// Dashboard WebSocket connection; the role is resolved once at connect time.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Connection {
    pub connection_id: String,
    pub user_id: String,
    pub role: Role,
    pub connected_at: String,
}

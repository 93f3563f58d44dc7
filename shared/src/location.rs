use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::types::{Report, User};

/// How a report's location was captured on the device.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum LocationType {
    HomeAddress,
    PresentAddress,
    #[serde(rename = "Current Location", alias = "CurrentLocation")]
    CurrentLocation,
    #[serde(rename = "customLocation")]
    CustomLocation,
}

impl LocationType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "HomeAddress" => Some(LocationType::HomeAddress),
            "PresentAddress" => Some(LocationType::PresentAddress),
            "Current Location" | "CurrentLocation" => Some(LocationType::CurrentLocation),
            "customLocation" => Some(LocationType::CustomLocation),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LocationType::HomeAddress => "HomeAddress",
            LocationType::PresentAddress => "PresentAddress",
            LocationType::CurrentLocation => "Current Location",
            LocationType::CustomLocation => "customLocation",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coordinates {
    pub lat: String,
    pub lng: String,
}

impl Coordinates {
    pub fn map_url(&self) -> String {
        format!("https://www.google.com/maps?q={},{}", self.lat, self.lng)
    }
}

/// A location as it should be shown: a map link or plain text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayLocation {
    MapLink(Coordinates),
    Text(String),
}

fn coordinates_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"Lat:\s*([-\d.]+),\s*Lng:\s*([-\d.]+)").expect("valid coordinates pattern")
    })
}

/// Pull a `Lat: <num>, Lng: <num>` pair out of free text.
pub fn extract_coordinates(text: &str) -> Option<Coordinates> {
    let captures = coordinates_pattern().captures(text)?;
    Some(Coordinates {
        lat: captures[1].to_string(),
        lng: captures[2].to_string(),
    })
}

/// Map link when the text carries coordinates, the text verbatim otherwise.
pub fn display_text(text: &str) -> DisplayLocation {
    match extract_coordinates(text) {
        Some(coords) => DisplayLocation::MapLink(coords),
        None => DisplayLocation::Text(text.to_string()),
    }
}

/// Resolve where a report points to, using the reporter's profile for address tags.
pub fn resolve(report: &Report, reporter: Option<&User>) -> DisplayLocation {
    match report.location_type {
        Some(LocationType::HomeAddress) => DisplayLocation::Text(
            reporter
                .and_then(|u| u.home_address.clone())
                .unwrap_or_else(|| "No Home Address".to_string()),
        ),
        Some(LocationType::PresentAddress) => DisplayLocation::Text(
            reporter
                .and_then(|u| u.present_address.clone())
                .unwrap_or_else(|| "No Present Address".to_string()),
        ),
        Some(LocationType::CurrentLocation) | Some(LocationType::CustomLocation) => {
            display_text(report.location.as_deref().unwrap_or("Unknown Location"))
        }
        None => match report.location.as_deref() {
            Some(text) if !text.trim().is_empty() => display_text(text),
            _ => DisplayLocation::Text("N/A".to_string()),
        },
    }
}

/// Plain-text location for push payloads ("lat, lng" when coordinates are present).
pub fn notification_text(report: &Report) -> String {
    let raw = report.location.as_deref().unwrap_or("");
    match report.location_type {
        Some(LocationType::HomeAddress) | Some(LocationType::PresentAddress) => {
            if raw.is_empty() {
                "N/A".to_string()
            } else {
                raw.to_string()
            }
        }
        Some(LocationType::CurrentLocation) | Some(LocationType::CustomLocation) => {
            match extract_coordinates(raw) {
                Some(coords) => format!("{}, {}", coords.lat, coords.lng),
                None if raw.is_empty() => "Unknown Location".to_string(),
                None => raw.to_string(),
            }
        }
        None => "N/A".to_string(),
    }
}

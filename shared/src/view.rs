//! View models and HTML fragments for the dashboard regions.
//!
//! Every fragment is a full rebuild of its region. Buttons carry
//! `data-action` / `data-id` and are handled by one delegated listener on the
//! page, so nothing needs rebinding after a render.

use std::collections::BTreeMap;
use std::fmt::Write;

use crate::location::{self, DisplayLocation};
use crate::types::{Report, Role, User};
use crate::users::user_actions;
use crate::workflow::{available_actions, ReportAction, ReportStatus};

pub const TOTAL_USERS: &str = "totalUsers";
pub const PENDING_USERS: &str = "pendingUsers";
pub const ACTIVE_REPORTS: &str = "activeReports";
pub const USERS_CONTAINER: &str = "usersContainer";
pub const REPORTS_TABLE_BODY: &str = "reportsTableBody";

/// Escape text for HTML body and attribute contexts.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn or_dash(value: &Option<String>) -> String {
    escape(value.as_deref().unwrap_or("-"))
}

// ========== COUNTERS ==========

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserCounters {
    pub total_users: usize,
    pub pending_users: usize,
}

impl UserCounters {
    /// Role-`user` accounts, and those of them still awaiting approval.
    pub fn compute(users: &BTreeMap<String, User>) -> Self {
        users
            .values()
            .filter(|u| u.is_member())
            .fold(Self::default(), |mut acc, u| {
                acc.total_users += 1;
                if !u.is_approved {
                    acc.pending_users += 1;
                }
                acc
            })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportCounters {
    pub active_reports: usize,
}

impl ReportCounters {
    /// Anything not `Responded` is active, including unknown statuses.
    pub fn compute(reports: &BTreeMap<String, Report>) -> Self {
        Self {
            active_reports: reports
                .values()
                .filter(|r| r.status != Some(ReportStatus::Responded))
                .count(),
        }
    }
}

// ========== USERS ==========

fn user_card(uid: &str, user: &User) -> String {
    let mut heading = or_dash(&user.username);
    if user.is_approved {
        heading.push_str(" ✅");
    }
    if user.disabled {
        heading.push_str(" (Disabled)");
    }

    let mut buttons = String::new();
    for action in user_actions(user) {
        let _ = write!(
            buttons,
            r#"<button class="card-btn {action}-btn" data-action="{action}" data-id="{id}">{label}</button>"#,
            action = action.as_str(),
            id = escape(uid),
            label = action.label(),
        );
    }

    format!(
        r#"<div class="user-card" data-uid="{id}"><h3>{heading}</h3><p><strong>Name:</strong> {name}</p><p><strong>Email:</strong> {email}</p><p><strong>UID:</strong> {id}</p>{buttons}</div>"#,
        id = escape(uid),
        heading = heading,
        name = or_dash(&user.name),
        email = or_dash(&user.email),
        buttons = buttons,
    )
}

/// Cards for role-`user` accounts only.
pub fn render_user_cards(users: &BTreeMap<String, User>) -> String {
    let cards: Vec<String> = users
        .iter()
        .filter(|(_, u)| u.is_member())
        .map(|(uid, u)| user_card(uid, u))
        .collect();

    if cards.is_empty() {
        "<p>No users found.</p>".to_string()
    } else {
        cards.concat()
    }
}

pub fn render_user_details(user: &User) -> String {
    let image = |label: &str, url: &Option<String>| match url {
        Some(url) if !url.is_empty() => format!(
            r#"<p><strong>{}:</strong></p><img src="{}" class="swal-img">"#,
            label,
            escape(url)
        ),
        _ => format!("<p><strong>{}:</strong> -</p>", label),
    };

    format!(
        r#"<div class="details-wrapper"><div class="detail-group"><p><strong>Name:</strong> {}</p><p><strong>Email:</strong> {}</p><p><strong>Age:</strong> {}</p><p><strong>Contact:</strong> {}</p><p><strong>Home Address:</strong> {}</p><p><strong>Present Address:</strong> {}</p></div><hr/><div class="image-group">{}{}{}</div></div>"#,
        or_dash(&user.name),
        or_dash(&user.email),
        or_dash(&user.age),
        or_dash(&user.contact),
        or_dash(&user.home_address),
        or_dash(&user.present_address),
        image("ID Front", &user.id_front_url),
        image("ID Back", &user.id_back_url),
        image("Selfie", &user.selfie_url),
    )
}

// ========== REPORTS ==========

fn badge_color(status: Option<ReportStatus>) -> &'static str {
    match status {
        Some(ReportStatus::Rejected) => "#e74c3c",
        Some(ReportStatus::Respond) => "#f1c40f",
        Some(ReportStatus::OnRoute) => "#3498db",
        Some(ReportStatus::Responded) => "#2ecc71",
        Some(ReportStatus::Pending) | None => "#7f8c8d",
    }
}

pub fn status_badge(status: Option<ReportStatus>) -> String {
    format!(
        r#"<span class="badge" style="background:{};padding:6px 10px;border-radius:6px;color:white;font-size:12px;">{}</span>"#,
        badge_color(status),
        status.map(|s| s.as_str()).unwrap_or("unknown")
    )
}

fn action_class(action: ReportAction) -> &'static str {
    match action {
        ReportAction::Reject => "gray",
        ReportAction::Respond => "yellow",
        ReportAction::OnRoute => "blue",
        ReportAction::Responded => "green",
        ReportAction::Publicize => "purple",
    }
}

pub fn render_location(location: &DisplayLocation) -> String {
    match location {
        DisplayLocation::MapLink(coords) => format!(
            r#"<a href="{}" target="_blank">{}, {}</a>"#,
            escape(&coords.map_url()),
            escape(&coords.lat),
            escape(&coords.lng)
        ),
        DisplayLocation::Text(text) => escape(text),
    }
}

fn report_row(id: &str, report: &Report, reporter: Option<&User>, role: Role) -> String {
    let name = reporter
        .and_then(|u| u.name.as_deref())
        .unwrap_or("Unknown User");
    let contact = reporter
        .and_then(|u| u.contact.as_deref())
        .unwrap_or("N/A");
    let image = match report.image_url.as_deref() {
        Some(url) if !url.is_empty() => format!(r#"<img src="{}" alt="Attachment">"#, escape(url)),
        _ => "<span>No Image</span>".to_string(),
    };

    let buttons: Vec<String> = available_actions(report.status, role)
        .into_iter()
        .map(|action| {
            format!(
                r#"<button class="btn {}" data-action="{}" data-id="{}">{}</button>"#,
                action_class(action),
                action.as_str(),
                escape(id),
                action.label()
            )
        })
        .collect();

    format!(
        "<tr data-report=\"{id}\"><td>{name}</td><td>{emergency}</td><td>{description}</td><td>{org}</td><td>{image}</td><td>{contact}</td><td>{location}</td><td>{badge}<br>{buttons}</td></tr>",
        id = escape(id),
        name = escape(name),
        emergency = escape(&report.emergency_label()),
        description = escape(report.additional_message.as_deref().unwrap_or("No description")),
        org = escape(report.organization.as_deref().unwrap_or("N/A")),
        image = image,
        contact = escape(contact),
        location = render_location(&location::resolve(report, reporter)),
        badge = status_badge(report.status),
        buttons = buttons.join(" "),
    )
}

/// Table rows for every report. Reporter details come from `users`, read
/// once per render.
pub fn render_report_rows(
    reports: &BTreeMap<String, Report>,
    users: &BTreeMap<String, User>,
    role: Role,
) -> String {
    if reports.is_empty() {
        return r#"<tr><td colspan="8" style="text-align:center;">No reports found</td></tr>"#
            .to_string();
    }

    reports
        .iter()
        .map(|(id, report)| {
            let reporter = report.reporter.as_deref().and_then(|uid| users.get(uid));
            report_row(id, report, reporter, role)
        })
        .collect()
}

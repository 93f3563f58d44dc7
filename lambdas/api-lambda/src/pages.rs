//! Page shells. Each admin page is a set of stable region containers plus one
//! delegated click listener; region content always comes from the server.

use alertify_shared::view::escape;
use lambda_http::{http::StatusCode, Body, Error, Response};

/// Client script shared by the admin pages: session headers, region
/// rendering, delegated `data-action` clicks and the live socket.
const DASHBOARD_SCRIPT: &str = r#"
const session = {
  uid: localStorage.getItem("uid"),
  token: localStorage.getItem("idToken"),
  access: localStorage.getItem("accessToken"),
};
if (!session.uid) { window.location.href = "/"; }

function headers() {
  const h = { "Content-Type": "application/json", "X-User-Id": session.uid || "" };
  if (session.token) h["Authorization"] = "Bearer " + session.token;
  return h;
}

function signOut(message) {
  if (message) alert(message);
  fetch("/logout", { method: "POST", headers: headers(), body: JSON.stringify({ access_token: session.access || "" }) })
    .finally(() => { localStorage.clear(); window.location.href = "/"; });
}

function render(regions) {
  for (const region of regions) {
    const el = document.getElementById(region.target);
    if (el) el.innerHTML = region.html;
  }
}

function showNotice(notice) {
  if (notice.html) {
    const box = document.getElementById("details");
    box.innerHTML = "<h3>" + notice.title + "</h3>" + notice.html;
    box.hidden = false;
    return;
  }
  alert(notice.success ? notice.title + " " + notice.message : "Error! " + (notice.message || notice.error));
}

async function loadRegions(page) {
  const res = await fetch("/admin/regions/" + page, { headers: headers() });
  const data = await res.json();
  if (res.status === 401 || res.status === 403) return signOut(data.error);
  render(data.regions || []);
}

const CONFIRM = {
  approve: "Approve this user?",
  resubmit: "Require ID resubmission? Approval will be reset.",
  disable: "Disable this user?",
  enable: "Enable this user?",
  publicize: "Publicize this report and notify all users?",
};

document.addEventListener("click", async (e) => {
  const el = e.target.closest("[data-action]");
  if (!el) return;
  const action = el.dataset.action;
  const id = el.dataset.id;
  if (CONFIRM[action] && !confirm(CONFIRM[action])) return;
  try {
    const res = await fetch("/admin/actions", { method: "POST", headers: headers(), body: JSON.stringify({ action, id }) });
    const notice = await res.json();
    if (res.status === 401 || res.status === 403) return signOut(notice.error);
    showNotice(notice.title ? notice : { success: false, message: notice.error });
  } catch (err) {
    console.error("Action failed:", err);
    alert("Error! Request failed.");
  }
});

document.getElementById("logout")?.addEventListener("click", () => signOut());
document.getElementById("hamburger")?.addEventListener("click", () => document.getElementById("sideNav").classList.toggle("closed"));

const wsUrl = document.body.dataset.wsUrl;
if (wsUrl) {
  const ws = new WebSocket(wsUrl + "?token=" + encodeURIComponent(session.access || ""));
  ws.onmessage = (msg) => {
    const frame = JSON.parse(msg.data);
    if (frame.type === "render") render(frame.regions);
  };
}

loadRegions(document.body.dataset.page);
"#;

const LOGIN_SCRIPT: &str = r#"
document.getElementById("loginForm").addEventListener("submit", async (e) => {
  e.preventDefault();
  const username = document.getElementById("username").value.trim();
  const password = document.getElementById("password").value.trim();
  const error = document.getElementById("error");
  if (!username || !password) { error.textContent = "Please enter username and password."; return; }
  const res = await fetch("/login", { method: "POST", headers: { "Content-Type": "application/json" }, body: JSON.stringify({ username, password }) });
  const data = await res.json();
  if (!res.ok) { error.textContent = data.error; return; }
  localStorage.setItem("uid", data.uid);
  localStorage.setItem("idToken", data.id_token);
  localStorage.setItem("accessToken", data.access_token);
  window.location.href = data.redirect;
});
"#;

fn nav() -> &'static str {
    r#"<button id="hamburger">&#9776;</button>
<nav id="sideNav"><a href="/admin/dashboard">Dashboard</a><a href="/admin/users">Manage Users</a><a href="/admin/reports">View Reports</a><button id="logout">Logout</button></nav>"#
}

fn shell(title: &str, body_attrs: &str, content: &str, script: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="utf-8"><meta name="viewport" content="width=device-width, initial-scale=1"><title>{title} | MP Alertify</title></head>
<body{body_attrs}>
{content}
<script>{script}</script>
</body>
</html>"#
    )
}

fn admin_page(page: &str, title: &str, content: &str, ws_url: Option<&str>) -> String {
    let ws_attr = ws_url
        .map(|url| format!(r#" data-ws-url="{}""#, escape(url)))
        .unwrap_or_default();
    let body_attrs = format!(r#" data-page="{}"{}"#, page, ws_attr);
    let content = format!(
        r#"{}<main><h1>{}</h1>{}<div id="details" hidden></div></main>"#,
        nav(),
        title,
        content
    );
    shell(title, &body_attrs, &content, DASHBOARD_SCRIPT)
}

/// Browser URL of the socket API, derived from its management endpoint.
pub(crate) fn socket_url(management_endpoint: &str) -> String {
    management_endpoint
        .replacen("https://", "wss://", 1)
        .trim_end_matches('/')
        .to_string()
}

pub(crate) fn login_page() -> String {
    shell(
        "Login",
        "",
        r#"<main><h1>MP Alertify Admin</h1>
<form id="loginForm"><input id="username" placeholder="Username" autocomplete="username"><input id="password" type="password" placeholder="Password" autocomplete="current-password"><button type="submit">Login</button></form>
<p id="error"></p></main>"#,
        LOGIN_SCRIPT,
    )
}

pub(crate) fn pending_page() -> String {
    shell(
        "Pending Approval",
        "",
        r#"<main><h1>Account pending approval</h1><p>Your account is waiting for an administrator to approve it.</p><a href="/">Back to login</a></main>"#,
        "localStorage.clear();",
    )
}

pub(crate) fn dashboard_page(ws_url: Option<&str>) -> String {
    admin_page(
        "dashboard",
        "Dashboard",
        r#"<section class="cards"><div class="card"><h3>Total Users</h3><p id="totalUsers">-</p></div><div class="card"><h3>Pending Approvals</h3><p id="pendingUsers">-</p></div><div class="card"><h3>Active Reports</h3><p id="activeReports">-</p></div></section>"#,
        ws_url,
    )
}

pub(crate) fn users_page(ws_url: Option<&str>) -> String {
    admin_page(
        "users",
        "Manage Users",
        r#"<section id="usersContainer"><p>Loading users...</p></section>"#,
        ws_url,
    )
}

pub(crate) fn reports_page(ws_url: Option<&str>) -> String {
    admin_page(
        "reports",
        "View Reports",
        r#"<table><thead><tr><th>Name</th><th>Emergency</th><th>Description</th><th>Organization</th><th>Image</th><th>Contact</th><th>Location</th><th>Status</th></tr></thead><tbody id="reportsTableBody"></tbody></table>"#,
        ws_url,
    )
}

pub(crate) fn html_response(html: String) -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "text/html; charset=utf-8")
        .body(html.into())
        .map_err(Box::new)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_pages_carry_region_containers() {
        let html = dashboard_page(Some("wss://ws.example/prod"));
        for id in ["totalUsers", "pendingUsers", "activeReports"] {
            assert!(html.contains(&format!(r#"id="{}""#, id)));
        }
        assert!(html.contains(r#"data-page="dashboard""#));
        assert!(html.contains(r#"data-ws-url="wss://ws.example/prod""#));

        assert!(users_page(None).contains(r#"id="usersContainer""#));
        assert!(reports_page(None).contains(r#"id="reportsTableBody""#));
        assert!(!reports_page(None).contains("data-ws-url"));
    }

    #[test]
    fn test_socket_url_attribute_is_escaped() {
        let html = users_page(Some(r#"wss://ws.example/prod"><script>x</script>"#));
        assert!(html.contains(
            r#"data-ws-url="wss://ws.example/prod&quot;&gt;&lt;script&gt;x&lt;/script&gt;""#
        ));
        assert!(!html.contains("<script>x</script>"));
    }

    #[test]
    fn test_socket_url() {
        assert_eq!(
            socket_url("https://abc.execute-api.ap-southeast-1.amazonaws.com/prod/"),
            "wss://abc.execute-api.ap-southeast-1.amazonaws.com/prod"
        );
    }
}

/// Server-rendered dashboard
///
/// Browser-facing pages under /dashboard sharing the API's session cookie:
/// - Login form and logout
/// - One listing page per main table, with foreign keys shown as names

pub mod render;

use crate::{
    api::AppState,
    schema::{record_id, EntityKind, Record},
    storage::{Database, StoreResult},
};
use axum::{
    extract::{Form, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Router,
};
use render::Table;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

/// Listing pages, in navigation order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Projects,
    Researchers,
    Laboratories,
    Partners,
    Equipment,
    Events,
    Publications,
}

impl Page {
    pub const ALL: [Page; 7] = [
        Page::Projects,
        Page::Researchers,
        Page::Laboratories,
        Page::Partners,
        Page::Equipment,
        Page::Events,
        Page::Publications,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            Page::Projects => "projects",
            Page::Researchers => "researchers",
            Page::Laboratories => "laboratories",
            Page::Partners => "partners",
            Page::Equipment => "equipment",
            Page::Events => "events",
            Page::Publications => "publications",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Page::Projects => "Projects",
            Page::Researchers => "Researchers",
            Page::Laboratories => "Laboratories",
            Page::Partners => "Partners",
            Page::Equipment => "Equipment",
            Page::Events => "Events",
            Page::Publications => "Publications",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|page| page.slug() == slug)
    }
}

#[derive(Debug, Deserialize)]
struct LoginForm {
    username: String,
    password: String,
}

/// Create dashboard routes
pub fn create_dashboard_routes() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(index))
        .route("/dashboard/", get(index))
        .route("/dashboard/login", get(login_form).post(login_submit))
        .route("/dashboard/logout", get(logout))
        .route("/dashboard/{page}", get(listing))
}

async fn index(State(state): State<AppState>, headers: HeaderMap) -> Redirect {
    if state.auth.session_from_headers(&headers).await.is_some() {
        Redirect::to("/dashboard/projects")
    } else {
        Redirect::to("/dashboard/login")
    }
}

async fn login_form(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if state.auth.session_from_headers(&headers).await.is_some() {
        return Redirect::to("/dashboard/projects").into_response();
    }
    Html(render::login_page(None, "")).into_response()
}

async fn login_submit(State(state): State<AppState>, Form(form): Form<LoginForm>) -> Response {
    let username = form.username.trim();
    match state.auth.login(&state.db, username, &form.password).await {
        Ok(Some((token, _))) => (
            [(header::SET_COOKIE, state.auth.session_cookie(&token))],
            Redirect::to("/dashboard/projects"),
        )
            .into_response(),
        Ok(None) => (
            StatusCode::UNAUTHORIZED,
            Html(render::login_page(Some("Invalid username or password"), username)),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("❌ Dashboard login failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Html(render::error_page())).into_response()
        }
    }
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    state.auth.logout(&headers).await;
    (
        [(header::SET_COOKIE, state.auth.clear_cookie())],
        Redirect::to("/dashboard/login"),
    )
        .into_response()
}

async fn listing(State(state): State<AppState>, Path(page): Path<String>, headers: HeaderMap) -> Response {
    let Some(page) = Page::from_slug(&page) else {
        return (StatusCode::NOT_FOUND, Html(render::not_found_page())).into_response();
    };
    let Some(session) = state.auth.session_from_headers(&headers).await else {
        return Redirect::to("/dashboard/login").into_response();
    };

    match build_table(&state.db, page).await {
        Ok(table) => Html(render::listing_page(page, &session.subject, &table)).into_response(),
        Err(e) => {
            tracing::error!("❌ Failed to load dashboard page {}: {}", page.slug(), e);
            (StatusCode::INTERNAL_SERVER_ERROR, Html(render::error_page())).into_response()
        }
    }
}

/// Display text for a stored value
fn text(record: &Record, column: &str) -> String {
    match record.get(column) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(true)) => "yes".to_string(),
        Some(Value::Bool(false)) => "no".to_string(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// id -> display name for every record of a table
async fn names(db: &Database, kind: EntityKind, column: &str) -> StoreResult<HashMap<i64, String>> {
    Ok(db
        .select(kind, &[])
        .await?
        .iter()
        .filter_map(|record| record_id(record).map(|id| (id, text(record, column))))
        .collect())
}

/// Resolve a foreign key column through a name map
fn lookup(names: &HashMap<i64, String>, record: &Record, column: &str) -> String {
    match record.get(column).and_then(Value::as_i64) {
        Some(id) => names.get(&id).cloned().unwrap_or_else(|| format!("#{}", id)),
        None => String::new(),
    }
}

async fn build_table(db: &Database, page: Page) -> StoreResult<Table> {
    let table = match page {
        Page::Projects => {
            let managers = names(db, EntityKind::Researcher, "FULL_NAME").await?;
            Table {
                headers: vec!["Name", "Manager", "Status", "Budget", "Begins", "Ends"],
                rows: db
                    .select(EntityKind::Project, &[])
                    .await?
                    .iter()
                    .map(|r| {
                        vec![
                            text(r, "NAME_PROJECT"),
                            lookup(&managers, r, "ID_MANAGER"),
                            text(r, "STATUS"),
                            text(r, "BUDGET"),
                            text(r, "DATE_BEGIN"),
                            text(r, "DATE_END"),
                        ]
                    })
                    .collect(),
            }
        }
        Page::Researchers => {
            let grades = names(db, EntityKind::Grade, "NAME_GRADE").await?;
            Table {
                headers: vec!["Name", "Grade", "Position", "Email", "Phone", "Active"],
                rows: db
                    .select(EntityKind::Researcher, &[])
                    .await?
                    .iter()
                    .map(|r| {
                        vec![
                            text(r, "FULL_NAME"),
                            lookup(&grades, r, "ID_GRADE"),
                            text(r, "POSITION"),
                            text(r, "EMAIL"),
                            text(r, "NUM_TEL"),
                            text(r, "ACTIVE"),
                        ]
                    })
                    .collect(),
            }
        }
        Page::Laboratories => {
            let directors = names(db, EntityKind::Researcher, "FULL_NAME").await?;
            Table {
                headers: vec!["Name", "Director"],
                rows: db
                    .select(EntityKind::Laboratory, &[])
                    .await?
                    .iter()
                    .map(|r| vec![text(r, "NAME_LAB"), lookup(&directors, r, "DIRECTOR")])
                    .collect(),
            }
        }
        Page::Partners => Table {
            headers: vec!["Name", "Email", "Phone", "Address", "Since", "Website", "Amount"],
            rows: db
                .select(EntityKind::Partner, &[])
                .await?
                .iter()
                .map(|r| {
                    vec![
                        text(r, "NAME_PARTNER"),
                        text(r, "EMAIL_PARTNER"),
                        text(r, "PHONE"),
                        text(r, "ADDRESS"),
                        text(r, "CREATION_DATE"),
                        text(r, "WEBSITE"),
                        text(r, "AMOUNT"),
                    ]
                })
                .collect(),
        },
        Page::Equipment => {
            let labs = names(db, EntityKind::Laboratory, "NAME_LAB").await?;
            Table {
                headers: vec!["Name", "Purchased", "Laboratory"],
                rows: db
                    .select(EntityKind::Equipment, &[])
                    .await?
                    .iter()
                    .map(|r| {
                        vec![
                            text(r, "NAME_EQUIPMENT"),
                            text(r, "PURCHASE_DATE"),
                            lookup(&labs, r, "LABORATORY_ID"),
                        ]
                    })
                    .collect(),
            }
        }
        Page::Events => {
            let organisers = names(db, EntityKind::Researcher, "FULL_NAME").await?;
            let types = names(db, EntityKind::EventType, "NAME_TYPE").await?;
            Table {
                headers: vec!["Name", "Type", "Organiser", "Begins", "Hour", "Ends", "Place"],
                rows: db
                    .select(EntityKind::Event, &[])
                    .await?
                    .iter()
                    .map(|r| {
                        vec![
                            text(r, "NAME_EVENT"),
                            lookup(&types, r, "TYPE_EVENT"),
                            lookup(&organisers, r, "ID_ORGANISOR"),
                            text(r, "DATE_BEGIN"),
                            text(r, "HOUR"),
                            text(r, "DATE_END"),
                            text(r, "PLACE"),
                        ]
                    })
                    .collect(),
            }
        }
        Page::Publications => {
            let authors = names(db, EntityKind::Researcher, "FULL_NAME").await?;
            Table {
                headers: vec!["Title", "Author", "Date", "Link"],
                rows: db
                    .select(EntityKind::Publication, &[])
                    .await?
                    .iter()
                    .map(|r| {
                        vec![
                            text(r, "TITLE"),
                            lookup(&authors, r, "ID_RESEARCHER"),
                            text(r, "DATE_PUB"),
                            text(r, "LINK"),
                        ]
                    })
                    .collect(),
            }
        }
    };
    Ok(table)
}

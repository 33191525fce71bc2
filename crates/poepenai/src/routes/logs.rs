use axum::{
    Router,
    extract::State,
    http::HeaderMap,
    response::Html,
    routing::get,
};
use serde::Serialize;
use tera::{Context, Tera};

use crate::error::ApiError;
use crate::state::AppState;

const LOGS_TEMPLATE: &str = include_str!("../../templates/logs.html");
const LOG_ENTRIES_TEMPLATE: &str = include_str!("../../templates/logentries.html");

pub const LOGS_PAGE_MESSAGE: &str = "Serving logs page";
pub const LOGS_FRAGMENT_MESSAGE: &str = "Serving logs page content (HTMX request)";

/// Compile the embedded logs page templates
pub fn templates() -> Result<Tera, tera::Error> {
    let mut tera = Tera::default();
    tera.add_raw_templates(vec![
        ("logentries.html", LOG_ENTRIES_TEMPLATE),
        ("logs.html", LOGS_TEMPLATE),
    ])?;
    Ok(tera)
}

/// One captured log line, with the fields the page highlights pulled out
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub raw: String,
    /// Whether the line was a JSON record with a `msg` field
    pub structured: bool,
    pub time: String,
    pub level: String,
    pub msg: String,
}

impl LogEntry {
    pub fn parse(line: String) -> Self {
        let fields = serde_json::from_str::<serde_json::Value>(&line).ok();
        let field = |name: &str| {
            fields
                .as_ref()
                .and_then(|value| value.get(name))
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
        };
        let msg = field("msg");
        Self {
            structured: msg.is_some(),
            time: field("time").unwrap_or_default(),
            level: field("level").unwrap_or_default(),
            msg: msg.unwrap_or_default(),
            raw: line,
        }
    }

    fn is_logs_page_request(&self) -> bool {
        self.structured && matches!(self.msg.as_str(), LOGS_PAGE_MESSAGE | LOGS_FRAGMENT_MESSAGE)
    }
}

/// Parse captured lines, dropping the ones produced by serving this page
pub fn visible_entries(lines: Vec<String>) -> Vec<LogEntry> {
    lines
        .into_iter()
        .map(LogEntry::parse)
        .filter(|entry| !entry.is_logs_page_request())
        .collect()
}

#[derive(Serialize)]
struct LogsPage {
    logs: Vec<LogEntry>,
}

async fn logs_page(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Html<String>, ApiError> {
    log::info!("{LOGS_PAGE_MESSAGE}");

    let is_htmx = headers
        .get("HX-Request")
        .and_then(|value| value.to_str().ok())
        == Some("true");

    let page = LogsPage {
        logs: visible_entries(state.log_ring.snapshot()),
    };
    let context = Context::from_serialize(&page)?;

    let template = if is_htmx {
        log::info!("{LOGS_FRAGMENT_MESSAGE}");
        "logentries.html"
    } else {
        "logs.html"
    };

    let html = state.templates.render(template, &context).map_err(|e| {
        log::error!("Failed to execute logs template (is_htmx: {is_htmx}): {e}");
        ApiError::from(e)
    })?;
    Ok(Html(html))
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/logs", get(logs_page))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates_compile() {
        let tera = templates().unwrap();
        let context = Context::from_serialize(LogsPage { logs: Vec::new() }).unwrap();
        assert!(tera.render("logs.html", &context).unwrap().contains("<html"));
    }

    #[test]
    fn test_visible_entries_filters_own_requests() {
        let lines = vec![
            r#"{"time":"t1","level":"INFO","target":"x","msg":"Starting server"}"#.to_string(),
            r#"{"time":"t2","level":"INFO","target":"x","msg":"Serving logs page"}"#.to_string(),
            r#"{"time":"t3","level":"INFO","target":"x","msg":"Serving logs page content (HTMX request)"}"#
                .to_string(),
            "not json at all".to_string(),
        ];

        let entries = visible_entries(lines);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].msg, "Starting server");
        assert_eq!(entries[0].level, "INFO");
        assert_eq!(entries[1].raw, "not json at all");
        assert!(!entries[1].structured);
    }
}
